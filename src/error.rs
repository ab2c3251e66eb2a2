#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("Ceremony: {0}")]
    Ceremony(#[from] crate::ceremony::CeremonyError),
    #[error("Gate: {0}")]
    Gate(#[from] crate::gate::GateError),
    #[error("Ledger: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error("Key: {0}")]
    Key(#[from] crate::keys::KeyError),
    #[error("Binder: {0}")]
    Binder(#[from] crate::binder::BinderError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
