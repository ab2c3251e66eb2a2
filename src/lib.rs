pub mod config;
pub mod diagnostics;
pub mod error;

pub mod authenticator;
pub mod binder;
pub mod ceremony;
pub mod gate;
pub mod http;
pub mod keys;
pub mod ledger;
pub mod store;

pub use gate::{AuthorizationGate, GateContext, GateState, TransactionIntent};

use std::path::Path;
use std::sync::{Arc, Mutex};

pub const CREDENTIALS_DIR: &str = "credentials";
pub const SESSION_FILE: &str = "session.json";

/// Open the credential registry kept under `data_dir`.
pub fn open_registry(data_dir: &Path) -> error::Result<store::CredentialStore> {
    let creds_dir = data_dir.join(CREDENTIALS_DIR);
    std::fs::create_dir_all(&creds_dir)?;
    Ok(store::CredentialStore::load(creds_dir)?)
}

/// Open the credential registry and session state kept under `data_dir`.
pub fn open_stores(data_dir: &Path) -> error::Result<(store::CredentialStore, store::SessionStore)> {
    let registry = open_registry(data_dir)?;
    let session = store::SessionStore::load(data_dir.join(SESSION_FILE))?;
    Ok((registry, session))
}

pub async fn wipe(cfg: config::Config) -> anyhow::Result<()> {
    let data_dir = cfg.data_dir()?;
    let (mut registry, mut session) = open_stores(&data_dir)?;

    let count = registry.clear()?;
    println!("Deleted {count} credential(s) from {}", data_dir.join(CREDENTIALS_DIR).display());

    session.clear()?;
    println!("Session state cleared");
    Ok(())
}

pub async fn run(cfg: config::Config) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let level = match cfg.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    tracing::info!("Starting passbound");

    // Preflight checks
    diagnostics::check(&cfg)?;

    let data_dir = cfg.data_dir()?;
    std::fs::create_dir_all(&data_dir)?;

    // Single-instance lock
    let lock_dir = std::env::var("XDG_RUNTIME_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| data_dir.clone());
    let lock_path = lock_dir.join("passbound.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.try_write()
        .map_err(|_| anyhow::anyhow!("passbound is already running (lock: {})", lock_path.display()))?;

    let registry = open_registry(&data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to load credential registry: {e}"))?;
    tracing::info!(count = registry.credential_count(), "Credential registry loaded");

    tracing::info!(rp_id = %cfg.rp_id, origin = %cfg.origin, "Relying party configured");
    let state = http::AppState::new(
        Arc::new(ceremony::Broker::new(cfg.rp_name.clone(), cfg.ceremony_timeout_ms)),
        Arc::new(Mutex::new(registry)),
        Arc::new(ledger::MemoryLedger::new()),
        cfg.rp_id.clone(),
        cfg.origin.clone(),
        cfg.network.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .map_err(|e| anyhow::anyhow!("cannot listen on {}: {e}", cfg.listen))?;
    http::serve(listener, state).await?;
    Ok(())
}
