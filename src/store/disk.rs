use std::path::{Path, PathBuf};

use super::{CredentialRecord, Identity, StoreError};

pub(crate) fn credential_path(dir: &Path, identity: &Identity) -> PathBuf {
    dir.join(format!("{}.json", identity.file_stem()))
}

/// Write `value` as JSON to `path` via a temp file and rename.
pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let buf = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, buf)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize credential to `dir/{identity_hex}.json`.
pub(crate) fn write_credential(dir: &Path, record: &CredentialRecord) -> Result<(), StoreError> {
    write_json(&credential_path(dir, &record.identity), record)
}

pub(crate) fn read_credential(path: &Path) -> Result<CredentialRecord, StoreError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(StoreError::Corrupt("empty file".into()));
    }
    let record: CredentialRecord =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if path.file_stem().and_then(|s| s.to_str()) != Some(record.identity.file_stem().as_str()) {
        return Err(StoreError::Corrupt(format!(
            "file name does not match identity {}",
            record.identity
        )));
    }
    Ok(record)
}

pub(crate) fn delete_credential(dir: &Path, identity: &Identity) -> Result<(), StoreError> {
    std::fs::remove_file(credential_path(dir, identity))?;
    Ok(())
}

/// Load all valid credential files from `dir`. Logs and skips corrupt files.
pub(crate) fn load_all(dir: &Path) -> Result<Vec<CredentialRecord>, StoreError> {
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_credential(&path) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt credential file");
            }
        }
    }
    Ok(records)
}
