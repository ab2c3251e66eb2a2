use std::sync::Arc;

use crate::ceremony::{
    AuthenticationOptions, AuthenticationResponseJson, AuthenticationVerification, Broker,
    RegistrationOptions, RegistrationResponseJson, RegistrationVerification, StoredAuthenticator,
};
use crate::http::wire::{
    CeremonyKind, GenerateAuthRequest, GenerateAuthResponse, VerifyAuthRequest, VerifyAuthResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport: {0}")]
    Transport(String),
    #[error("Broker returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// The gate's view of the challenge/ceremony broker.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    async fn generate_registration(
        &self,
        rp_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<RegistrationOptions, ClientError>;

    async fn generate_authentication(&self, rp_id: &str) -> Result<AuthenticationOptions, ClientError>;

    async fn verify_registration(
        &self,
        rp_id: &str,
        response: &RegistrationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
    ) -> Result<RegistrationVerification, ClientError>;

    async fn verify_authentication(
        &self,
        rp_id: &str,
        response: &AuthenticationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
        stored: &StoredAuthenticator,
    ) -> Result<AuthenticationVerification, ClientError>;
}

/// Calls a [`Broker`] in the same process.
pub struct LocalBroker(pub Arc<Broker>);

#[async_trait::async_trait]
impl BrokerClient for LocalBroker {
    async fn generate_registration(
        &self,
        rp_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<RegistrationOptions, ClientError> {
        self.0
            .begin_registration(rp_id, user_id, user_name)
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn generate_authentication(&self, rp_id: &str) -> Result<AuthenticationOptions, ClientError> {
        self.0.begin_authentication(rp_id).map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn verify_registration(
        &self,
        rp_id: &str,
        response: &RegistrationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
    ) -> Result<RegistrationVerification, ClientError> {
        Ok(self.0.complete_registration(response, expected_challenge, expected_origin, rp_id))
    }

    async fn verify_authentication(
        &self,
        rp_id: &str,
        response: &AuthenticationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
        stored: &StoredAuthenticator,
    ) -> Result<AuthenticationVerification, ClientError> {
        Ok(self.0.complete_authentication(response, expected_challenge, expected_origin, rp_id, stored))
    }
}

/// Calls `/generate-auth` and `/verify-auth` on a remote server.
pub struct HttpBroker {
    base:   url::Url,
    client: reqwest::Client,
}

impl HttpBroker {
    pub fn new(base: url::Url) -> Self {
        Self { base, client: reqwest::Client::new() }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ClientError>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let url = self.base.join(path).map_err(|e| ClientError::Transport(e.to_string()))?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn verify(&self, request: VerifyAuthRequest) -> Result<VerifyAuthResponse, ClientError> {
        self.post("verify-auth", &request).await
    }
}

#[async_trait::async_trait]
impl BrokerClient for HttpBroker {
    async fn generate_registration(
        &self,
        rp_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<RegistrationOptions, ClientError> {
        let request = GenerateAuthRequest {
            kind: CeremonyKind::Register,
            rp_id: rp_id.to_string(),
            user_id: Some(user_id.to_string()),
            user_name: Some(user_name.to_string()),
        };
        match self.post("generate-auth", &request).await? {
            GenerateAuthResponse::Register { options, .. } => Ok(options),
            GenerateAuthResponse::Auth { .. } => {
                Err(ClientError::Decode("authentication options for a registration".into()))
            }
        }
    }

    async fn generate_authentication(&self, rp_id: &str) -> Result<AuthenticationOptions, ClientError> {
        let request = GenerateAuthRequest {
            kind: CeremonyKind::Auth,
            rp_id: rp_id.to_string(),
            user_id: None,
            user_name: None,
        };
        match self.post("generate-auth", &request).await? {
            GenerateAuthResponse::Auth { options, .. } => Ok(options),
            GenerateAuthResponse::Register { .. } => {
                Err(ClientError::Decode("registration options for an authentication".into()))
            }
        }
    }

    async fn verify_registration(
        &self,
        rp_id: &str,
        response: &RegistrationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
    ) -> Result<RegistrationVerification, ClientError> {
        let request = VerifyAuthRequest {
            kind: CeremonyKind::Register,
            rp_id: rp_id.to_string(),
            auth_response: serde_json::to_value(response).map_err(|e| ClientError::Decode(e.to_string()))?,
            expected_challenge: expected_challenge.to_string(),
            expected_origin: expected_origin.to_string(),
            authenticator: None,
            user_name: None,
        };
        match self.verify(request).await? {
            VerifyAuthResponse::Register { verification, .. } => Ok(verification),
            VerifyAuthResponse::Auth { .. } => Err(ClientError::Decode("authentication verification".into())),
        }
    }

    /// Sends the gate's stored authenticator and no `userName`. The gate's
    /// registry owns the counter and advances it after this returns, so the
    /// server verifies only and records nothing.
    async fn verify_authentication(
        &self,
        rp_id: &str,
        response: &AuthenticationResponseJson,
        expected_challenge: &str,
        expected_origin: &str,
        stored: &StoredAuthenticator,
    ) -> Result<AuthenticationVerification, ClientError> {
        let request = VerifyAuthRequest {
            kind: CeremonyKind::Auth,
            rp_id: rp_id.to_string(),
            auth_response: serde_json::to_value(response).map_err(|e| ClientError::Decode(e.to_string()))?,
            expected_challenge: expected_challenge.to_string(),
            expected_origin: expected_origin.to_string(),
            authenticator: Some(stored.clone()),
            user_name: None,
        };
        match self.verify(request).await? {
            VerifyAuthResponse::Auth { verification, .. } => Ok(verification),
            VerifyAuthResponse::Register { .. } => Err(ClientError::Decode("registration verification".into())),
        }
    }
}
