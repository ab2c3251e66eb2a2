pub mod credential;
pub mod disk;
pub mod index;
pub mod session;

pub use credential::{CredentialRecord, Identity};
pub use index::CredentialStore;
pub use session::{MintedWallet, SessionState, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("Not found")]
    NotFound,
    #[error("Counter {received} not greater than stored {stored}")]
    CounterNotIncreased { stored: u32, received: u32 },
}
