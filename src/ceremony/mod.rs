pub mod attestation;
pub mod authenticator_data;
pub mod broker;
pub(crate) mod cbor;
pub mod challenge;
pub mod client_data;
pub mod cose;
pub mod encoding;
pub mod options;
pub mod types;
pub mod verify;

pub use broker::Broker;
pub use challenge::{ChallengeIssuer, Clock, ManualClock, SystemClock};
pub use types::{
    AuthenticationInfo, AuthenticationOptions, AuthenticationResponseJson, AuthenticationVerification,
    RegistrationInfo, RegistrationOptions, RegistrationResponseJson, RegistrationVerification,
    StoredAuthenticator, Transport,
};

#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error("Encoding: {0}")]
    Encoding(String),
    #[error("CBOR: {0}")]
    Cbor(String),
    #[error("COSE key: {0}")]
    CoseKey(String),
    #[error("Unsupported algorithm {0}")]
    UnsupportedAlgorithm(i64),
    #[error("Signature does not verify")]
    BadSignature,
    #[error("Authenticator data: {0}")]
    AuthenticatorData(String),
    #[error("Client data: {0}")]
    ClientData(String),
    #[error("Unexpected ceremony type {0:?}")]
    WrongCeremonyType(String),
    #[error("Unexpected credential type {0:?}")]
    CredentialType(String),
    #[error("Challenge does not match the one issued")]
    ChallengeMismatch,
    #[error("Challenge was not issued by this broker")]
    UnknownChallenge,
    #[error("Challenge is stale ({age_ms} ms old)")]
    StaleChallenge { age_ms: u64 },
    #[error("Challenge was already used")]
    ChallengeReused,
    #[error("Unexpected origin {0:?}")]
    OriginMismatch(String),
    #[error("RP id hash does not match")]
    RpIdMismatch,
    #[error("User presence flag not set")]
    UserNotPresent,
    #[error("User verification flag not set")]
    UserNotVerified,
    #[error("Credential id does not match the stored credential")]
    CredentialIdMismatch,
    #[error("Signature counter {received} not greater than stored {stored}")]
    CounterNotIncreased { stored: u32, received: u32 },
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Attestation: {0}")]
    Attestation(String),
    #[error("{0}")]
    Internal(String),
}
