//! The platform-authenticator side of a ceremony.
//!
//! In production this is the user's browser and biometric prompt. The
//! [`soft::SoftAuthenticator`] stands in for it in tests and headless flows.

pub mod soft;

pub use soft::SoftAuthenticator;

use crate::ceremony::{
    AuthenticationOptions, AuthenticationResponseJson, CeremonyError, RegistrationOptions,
    RegistrationResponseJson,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthenticatorError {
    #[error("No credentials for {0}")]
    NoCredentials(String),
    #[error("Credential excluded")]
    CredentialExcluded,
    #[error("No supported algorithm offered")]
    UnsupportedAlgorithm,
    #[error("Ceremony: {0}")]
    Ceremony(#[from] CeremonyError),
    #[error("{0}")]
    Internal(String),
}

#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn make_credential(
        &self,
        options: &RegistrationOptions,
        origin: &str,
    ) -> Result<RegistrationResponseJson, AuthenticatorError>;

    async fn get_assertion(
        &self,
        options: &AuthenticationOptions,
        origin: &str,
    ) -> Result<AuthenticationResponseJson, AuthenticatorError>;
}
