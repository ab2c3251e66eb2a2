use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use std::sync::{Arc, Mutex, MutexGuard};

use super::grants::Grants;
use super::wire::{
    AccountResponse, CeremonyKind, ExecuteRequest, ExecuteResponse, GenerateAuthRequest,
    GenerateAuthResponse, MessageResponse, MintResponse, PubKeyRequest, VerifyAuthRequest,
    VerifyAuthResponse,
};
use crate::binder::{self, CommittedHash};
use crate::ceremony::{
    AuthenticationResponseJson, AuthenticationVerification, Broker, RegistrationResponseJson,
};
use crate::config::block_url;
use crate::gate::intent::{normalize_call_data, parse_amount};
use crate::gate::{ACCOUNT_EMPTY, GateError, TransactionIntent, execute_authorized};
use crate::keys::VirtualAccount;
use crate::ledger::{Ledger, LedgerError};
use crate::store::{CredentialRecord, CredentialStore, Identity};

const AUTH_FAILED: &str = "authentication failed";
const WALLET_CREATED: &str = "Wallet created";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub broker:   Arc<Broker>,
    pub registry: Arc<Mutex<CredentialStore>>,
    pub ledger:   Arc<dyn Ledger>,
    /// The only relying party and origin ceremonies are accepted for.
    pub rp_id:    String,
    pub origin:   String,
    /// Network name for block explorer links.
    pub network:  String,
    pub grants:   Arc<Grants>,
}

impl AppState {
    pub fn new(
        broker: Arc<Broker>,
        registry: Arc<Mutex<CredentialStore>>,
        ledger: Arc<dyn Ledger>,
        rp_id: impl Into<String>,
        origin: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            registry,
            ledger,
            rp_id: rp_id.into(),
            origin: origin.into(),
            network: network.into(),
            grants: Arc::new(Grants::new()),
        }
    }

    fn check_rp(&self, rp_id: &str) -> Result<(), Response> {
        if rp_id != self.rp_id {
            tracing::warn!(rp_id, "Ceremony for a foreign relying party refused");
            return Err(message(StatusCode::BAD_REQUEST, format!("unsupported rpID {rp_id}")));
        }
        Ok(())
    }

    fn registry(&self) -> Result<MutexGuard<'_, CredentialStore>, Response> {
        self.registry
            .lock()
            .map_err(|_| message(StatusCode::INTERNAL_SERVER_ERROR, "credential registry poisoned"))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate-auth", post(generate_auth).fallback(method_not_allowed))
        .route("/verify-auth", post(verify_auth).fallback(method_not_allowed))
        .route("/execute", post(execute).fallback(method_not_allowed))
        .route("/account", post(account).fallback(method_not_allowed))
        .route("/mint", post(mint).fallback(method_not_allowed))
        .with_state(state)
}

fn message(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(MessageResponse { message: message.into() })).into_response()
}

fn execute_failed(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ExecuteResponse { status: false, block_url: None, message: Some(message.into()) };
    (status, Json(body)).into_response()
}

fn ledger_failure(e: LedgerError) -> Response {
    match e {
        LedgerError::Reverted(reason) => message(StatusCode::METHOD_NOT_ALLOWED, reason),
        LedgerError::UnknownToken(_) => message(StatusCode::NOT_FOUND, e.to_string()),
        LedgerError::Provider(_) => {
            tracing::error!(error = %e, "Ledger call failed");
            message(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

fn unverified() -> AuthenticationVerification {
    AuthenticationVerification { verified: false, authentication_info: None }
}

async fn method_not_allowed() -> Response {
    message(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn generate_auth(
    State(state): State<AppState>,
    Json(req): Json<GenerateAuthRequest>,
) -> Result<Response, Response> {
    state.check_rp(&req.rp_id)?;
    let body = match req.kind {
        CeremonyKind::Register => {
            let (Some(user_id), Some(user_name)) = (req.user_id.as_deref(), req.user_name.as_deref()) else {
                return Err(message(StatusCode::BAD_REQUEST, "userID and userName are required"));
            };
            state
                .broker
                .begin_registration(&req.rp_id, user_id, user_name)
                .map(GenerateAuthResponse::register)
        }
        CeremonyKind::Auth => state.broker.begin_authentication(&req.rp_id).map(GenerateAuthResponse::auth),
    };
    let body = body.map_err(|e| {
        tracing::error!(error = %e, "Challenge not issued");
        message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(body).into_response())
}

async fn verify_auth(
    State(state): State<AppState>,
    Json(req): Json<VerifyAuthRequest>,
) -> Result<Response, Response> {
    state.check_rp(&req.rp_id)?;
    if req.expected_origin != state.origin {
        tracing::warn!(origin = %req.expected_origin, "Ceremony for a foreign origin refused");
        return Err(message(StatusCode::BAD_REQUEST, format!("unsupported expectedOrigin {}", req.expected_origin)));
    }
    let identity = req.user_name.as_deref().map(Identity::from);
    match req.kind {
        CeremonyKind::Register => {
            let response: RegistrationResponseJson = serde_json::from_value(req.auth_response)
                .map_err(|e| message(StatusCode::BAD_REQUEST, format!("invalid authResponse: {e}")))?;
            let verification = state.broker.complete_registration(
                &response,
                &req.expected_challenge,
                &req.expected_origin,
                &req.rp_id,
            );
            if let (Some(identity), Some(info), true) =
                (identity, verification.registration_info.as_ref(), verification.verified)
            {
                let record = CredentialRecord::from_registration(identity, info);
                state
                    .registry()?
                    .register(record)
                    .map_err(|e| message(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            }
            Ok(Json(VerifyAuthResponse::register(verification)).into_response())
        }
        CeremonyKind::Auth => {
            let response: AuthenticationResponseJson = serde_json::from_value(req.auth_response)
                .map_err(|e| message(StatusCode::BAD_REQUEST, format!("invalid authResponse: {e}")))?;
            // A registered identity is always checked against its own record.
            let record = match &identity {
                Some(identity) => state.registry()?.lookup(identity).cloned(),
                None => None,
            };
            let stored = match (&record, req.authenticator) {
                (Some(record), supplied) => {
                    let registered = record.to_authenticator();
                    let conflicting = supplied.is_some_and(|s| {
                        s.credential_id != registered.credential_id
                            || s.credential_public_key != registered.credential_public_key
                    });
                    if conflicting {
                        tracing::warn!(identity = %record.identity, "Supplied authenticator is not the registered credential");
                        return Ok(Json(VerifyAuthResponse::auth(unverified())).into_response());
                    }
                    registered
                }
                (None, Some(supplied)) => supplied,
                (None, None) => {
                    return Err(match &identity {
                        Some(identity) => {
                            message(StatusCode::NOT_FOUND, format!("no credential registered for {identity}"))
                        }
                        None => message(StatusCode::BAD_REQUEST, "authenticator or userName is required"),
                    });
                }
            };

            let mut verification = state.broker.complete_authentication(
                &response,
                &req.expected_challenge,
                &req.expected_origin,
                &req.rp_id,
                &stored,
            );
            let advanced = match (&record, &verification.authentication_info) {
                (Some(record), Some(info)) if verification.verified => Some((record, info.new_counter)),
                _ => None,
            };
            if let Some((record, new_counter)) = advanced {
                let bumped = state.registry()?.bump_counter(&record.identity, new_counter);
                let granted = bumped.map_err(|e| e.to_string()).and_then(|()| {
                    state
                        .grants
                        .issue(
                            record.identity.clone(),
                            record.public_key_string(),
                            state.broker.now_ms(),
                            state.broker.timeout_ms(),
                        )
                        .map_err(|e| e.to_string())
                });
                if let Err(e) = granted {
                    tracing::warn!(identity = %record.identity, error = %e, "Counter update refused");
                    verification = unverified();
                }
            }
            Ok(Json(VerifyAuthResponse::auth(verification)).into_response())
        }
    }
}

/// Transfer from a token-bound wallet on behalf of a registered user.
///
/// Spends the grant left by that user's last verified assertion.
async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Response, Response> {
    let identity = Identity::from(req.user_name.as_str());
    let record = state.registry()?.lookup(&identity).cloned();
    let authenticated = record.as_ref().is_some_and(|r| {
        let aaguid_matches = match (&r.aaguid, &req.aaguid) {
            (Some(recorded), Some(supplied)) => recorded.eq_ignore_ascii_case(supplied),
            _ => true,
        };
        r.public_key_string() == req.pub_key && aaguid_matches
    });
    if !authenticated {
        tracing::warn!(identity = %identity, "Execute refused: credential does not match");
        return Err(execute_failed(StatusCode::UNAUTHORIZED, AUTH_FAILED));
    }
    state.grants.redeem(&identity, &req.pub_key, state.broker.now_ms()).map_err(|e| {
        tracing::warn!(identity = %identity, error = %e, "Execute refused");
        execute_failed(StatusCode::UNAUTHORIZED, AUTH_FAILED)
    })?;

    let account = VirtualAccount::derive(&req.pub_key)
        .map_err(|e| execute_failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let intent = TransactionIntent {
        identity,
        token_id: req.token_id,
        sender: account.address(),
        recipient: req.recipient,
        value: parse_amount(&req.amount).map_err(|e| execute_failed(StatusCode::BAD_REQUEST, e.to_string()))?,
        data: normalize_call_data(req.call_data.as_deref())
            .map_err(|e| execute_failed(StatusCode::BAD_REQUEST, e.to_string()))?,
    };

    let balance = state.ledger.balance(intent.sender).await.map_err(ledger_failure)?;
    if balance.is_zero() {
        return Err(execute_failed(StatusCode::METHOD_NOT_ALLOWED, ACCOUNT_EMPTY));
    }

    let committed = state.ledger.token_hash_key(intent.token_id).await.map_err(ledger_failure)?;
    let binding = binder::check(&committed, &req.pub_key).map_err(|e| {
        tracing::warn!(token_id = intent.token_id, error = %e, "Execute refused");
        execute_failed(StatusCode::UNAUTHORIZED, AUTH_FAILED)
    })?;

    match execute_authorized(state.ledger.as_ref(), &intent, binding).await {
        Ok(receipt) => {
            let body = ExecuteResponse {
                status:    true,
                block_url: Some(block_url(&state.network, &receipt.transaction_hash)),
                message:   None,
            };
            Ok(Json(body).into_response())
        }
        Err(GateError::OnChainRevert(reason)) => Err(execute_failed(StatusCode::METHOD_NOT_ALLOWED, reason)),
        Err(e) => {
            tracing::error!(error = %e, "Execute failed");
            Err(execute_failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Virtual account address for a public key.
async fn account(Json(req): Json<PubKeyRequest>) -> Result<Response, Response> {
    let account = VirtualAccount::derive(&req.pub_key)
        .map_err(|e| message(StatusCode::BAD_REQUEST, e.to_string()))?;
    let body = AccountResponse { message: WALLET_CREATED.into(), address: account.address() };
    Ok(Json(body).into_response())
}

/// Mint a token from the public key's virtual account, committing the
/// key's hash.
async fn mint(State(state): State<AppState>, Json(req): Json<PubKeyRequest>) -> Result<Response, Response> {
    let account = VirtualAccount::derive(&req.pub_key)
        .map_err(|e| message(StatusCode::BAD_REQUEST, e.to_string()))?;
    let minter = account.address();
    if state.ledger.balance(minter).await.map_err(ledger_failure)?.is_zero() {
        return Err(message(StatusCode::METHOD_NOT_ALLOWED, ACCOUNT_EMPTY));
    }

    let hash = state.ledger.transaction_hash(&req.pub_key).await.map_err(ledger_failure)?;
    let (token_id, receipt) = state
        .ledger
        .mint(minter, CommittedHash::Committed(hash))
        .await
        .map_err(ledger_failure)?;
    let wallet = state.ledger.token_bound_wallet_address(token_id).await.map_err(ledger_failure)?;
    tracing::info!(token_id, %wallet, %minter, "Wallet minted");

    let body = MintResponse {
        message: WALLET_CREATED.into(),
        token_id: token_id.to_string(),
        wallet,
        block_url: block_url(&state.network, &receipt.transaction_hash),
    };
    Ok(Json(body).into_response())
}
