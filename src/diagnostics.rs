use std::path::Path;

use crate::config::Config;

pub fn check(cfg: &Config) -> anyhow::Result<()> {
    let mut errors: Vec<String> = Vec::new();

    // Check 1: origin is a URL with a host, and the RP id covers that host
    match url::Url::parse(&cfg.origin) {
        Ok(origin) => match origin.host_str() {
            Some(host) if rp_id_covers(&cfg.rp_id, host) => {}
            Some(host) => errors.push(format!(
                "RP id '{}' does not cover origin host '{host}'\n  \
                 → pass --rp-id {host} or a parent domain of it",
                cfg.rp_id
            )),
            None => errors.push(format!("origin '{}' has no host", cfg.origin)),
        },
        Err(e) => errors.push(format!(
            "cannot parse origin '{}': {e}\n  \
             → pass a full URL: --origin https://wallet.example.com",
            cfg.origin
        )),
    }

    // Check 2: data dir writable
    match cfg.data_dir() {
        Ok(dir) => {
            if let Err(e) = probe_writable(&dir) {
                errors.push(format!(
                    "cannot write to data dir {}: {e}\n  \
                     → pass a writable --data-dir",
                    dir.display()
                ));
            }
        }
        Err(e) => errors.push(format!("{e}\n  → pass --data-dir explicitly")),
    }

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        eprintln!("ERROR: {err}");
    }
    anyhow::bail!("{} preflight check(s) failed", errors.len());
}

/// WebAuthn scopes a credential to the RP id and every subdomain of it.
fn rp_id_covers(rp_id: &str, host: &str) -> bool {
    host == rp_id || host.strip_suffix(rp_id).is_some_and(|prefix| prefix.ends_with('.'))
}

fn probe_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".passbound-probe");
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("passbound").chain(args.iter().copied()))
    }

    #[test]
    fn test_rp_id_covers_subdomains_only() {
        assert!(rp_id_covers("localhost", "localhost"));
        assert!(rp_id_covers("example.com", "wallet.example.com"));
        assert!(!rp_id_covers("example.com", "badexample.com"));
        assert!(!rp_id_covers("wallet.example.com", "example.com"));
    }

    #[test]
    fn test_check_passes_with_defaults_and_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&["--data-dir", dir.path().to_str().unwrap()]);
        check(&cfg).expect("defaults must pass preflight");
    }

    #[test]
    fn test_check_reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let cfg = config(&[
            "--origin",
            "https://wallet.example.com",
            "--rp-id",
            "other.com",
            "--data-dir",
            blocker.join("sub").to_str().unwrap(),
        ]);
        let err = check(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "2 preflight check(s) failed");
    }
}
