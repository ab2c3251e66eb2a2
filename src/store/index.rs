use std::collections::HashMap;
use std::path::PathBuf;

use super::{CredentialRecord, Identity, StoreError, disk};

/// Identity → credential registry.
///
/// Every mutation is written through to disk before the in-memory map
/// changes. Shared as `Arc<Mutex<CredentialStore>>`; holding the lock across
/// the read-check-write in [`CredentialStore::bump_counter`] is what makes
/// the counter update atomic per identity.
pub struct CredentialStore {
    creds_dir:   Option<PathBuf>,
    by_identity: HashMap<Identity, CredentialRecord>,
}

impl CredentialStore {
    /// Load all credentials from disk into memory.
    pub fn load(creds_dir: PathBuf) -> Result<Self, StoreError> {
        let mut by_identity = HashMap::new();
        for record in disk::load_all(&creds_dir)? {
            by_identity.insert(record.identity.clone(), record);
        }
        Ok(Self { creds_dir: Some(creds_dir), by_identity })
    }

    /// Store that lives only in memory.
    pub fn ephemeral() -> Self {
        Self { creds_dir: None, by_identity: HashMap::new() }
    }

    /// Bind a credential to its identity. An existing binding is replaced;
    /// the previous record is returned.
    pub fn register(&mut self, record: CredentialRecord) -> Result<Option<CredentialRecord>, StoreError> {
        if let Some(dir) = &self.creds_dir {
            disk::write_credential(dir, &record)?;
        }
        let identity = record.identity.clone();
        let previous = self.by_identity.insert(identity.clone(), record);
        if previous.is_some() {
            tracing::warn!(identity = %identity, "Credential overwritten");
        } else {
            tracing::info!(identity = %identity, "Credential stored");
        }
        Ok(previous)
    }

    pub fn lookup(&self, identity: &Identity) -> Option<&CredentialRecord> {
        self.by_identity.get(identity)
    }

    /// Advance the stored counter. Fails unless `new_counter` is strictly
    /// greater than the stored value.
    pub fn bump_counter(&mut self, identity: &Identity, new_counter: u32) -> Result<(), StoreError> {
        let record = self.by_identity.get(identity).ok_or(StoreError::NotFound)?;
        if new_counter <= record.counter {
            return Err(StoreError::CounterNotIncreased { stored: record.counter, received: new_counter });
        }
        let mut updated = record.clone();
        updated.counter = new_counter;
        if let Some(dir) = &self.creds_dir {
            disk::write_credential(dir, &updated)?;
        }
        self.by_identity.insert(identity.clone(), updated);
        tracing::info!(identity = %identity, counter = new_counter, "Counter advanced");
        Ok(())
    }

    /// Delete every credential, on disk and in memory. Returns how many
    /// were removed.
    ///
    /// A record leaves memory only once its file is gone, so a failed
    /// deletion leaves the rest of the store matching the disk.
    pub fn clear(&mut self) -> Result<usize, StoreError> {
        let identities: Vec<Identity> = self.by_identity.keys().cloned().collect();
        let mut removed = 0;
        for identity in identities {
            if let Some(dir) = &self.creds_dir {
                disk::delete_credential(dir, &identity)?;
            }
            self.by_identity.remove(&identity);
            removed += 1;
        }
        Ok(removed)
    }

    pub fn credential_count(&self) -> usize {
        self.by_identity.len()
    }
}
