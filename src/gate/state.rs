use std::sync::{Arc, Mutex, MutexGuard};

use super::client::BrokerClient;
use super::intent::{IntentError, TransactionIntent};
use crate::authenticator::Authenticator;
use crate::binder::{self, Binding};
use crate::ceremony::encoding::b64url_encode;
use crate::ceremony::types::{CredentialDescriptor, PUBLIC_KEY_TYPE};
use crate::ceremony::{AuthenticationOptions, AuthenticationResponseJson};
use crate::keys::KeyError;
use crate::ledger::{Ledger, LedgerError, Receipt};
use crate::store::{CredentialRecord, CredentialStore, Identity, StoreError};

/// Why an authorization flow was rejected. Each one sends the flow back
/// to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// A broker call did not complete, or the ceremony never produced a response.
    #[error("authentication error: {0}")]
    Transport(String),
    #[error("authentication failed")]
    VerificationFailure,
    #[error("authentication failed: hash mismatch")]
    HashMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("{0}")]
    Rejected(#[from] Rejection),
    /// Submission reverted, or was refused because it certainly would.
    #[error("{0}")]
    OnChainRevert(String),
    #[error("Cannot {op} in state {state}")]
    InvalidTransition { op: &'static str, state: &'static str },
    #[error("Ledger: {0}")]
    Ledger(LedgerError),
    #[error("Store: {0}")]
    Store(#[from] StoreError),
    #[error("Intent: {0}")]
    Intent(#[from] IntentError),
    #[error("Key: {0}")]
    Key(#[from] KeyError),
}

impl From<LedgerError> for GateError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Reverted(reason) => GateError::OnChainRevert(reason),
            other => GateError::Ledger(other),
        }
    }
}

pub const WALLET_EMPTY: &str = "Wallet dont have any funds";
pub const ACCOUNT_EMPTY: &str = "Account dont have any funds";

/// Collaborators an authorization flow runs against.
#[derive(Clone)]
pub struct GateContext {
    pub broker:   Arc<dyn BrokerClient>,
    pub registry: Arc<Mutex<CredentialStore>>,
    pub ledger:   Arc<dyn Ledger>,
    pub rp_id:    String,
    pub origin:   String,
}

impl GateContext {
    pub(crate) fn registry(&self) -> Result<MutexGuard<'_, CredentialStore>, Rejection> {
        self.registry
            .lock()
            .map_err(|_| Rejection::Transport("credential registry poisoned".into()))
    }
}

#[derive(Debug, Clone)]
pub enum GateState {
    Idle,
    ChallengeRequested { options: AuthenticationOptions },
    CeremonyInFlight { options: AuthenticationOptions },
    Verifying { challenge: String, response: Box<AuthenticationResponseJson> },
    Authorized { binding: Binding },
    Rejected(Rejection),
}

impl GateState {
    pub fn name(&self) -> &'static str {
        match self {
            GateState::Idle => "Idle",
            GateState::ChallengeRequested { .. } => "ChallengeRequested",
            GateState::CeremonyInFlight { .. } => "CeremonyInFlight",
            GateState::Verifying { .. } => "Verifying",
            GateState::Authorized { .. } => "Authorized",
            GateState::Rejected(_) => "Rejected",
        }
    }
}

/// Sequences challenge → ceremony → verification → hash check → submission
/// for one transaction intent at a time.
///
/// A rejected flow stays observable as `Rejected` until the next
/// [`submit`](Self::submit) or [`reset`](Self::reset); both start from idle.
pub struct AuthorizationGate {
    ctx:    GateContext,
    state:  GateState,
    intent: Option<TransactionIntent>,
}

impl AuthorizationGate {
    pub fn new(ctx: GateContext) -> Self {
        Self { ctx, state: GateState::Idle, intent: None }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn intent(&self) -> Option<&TransactionIntent> {
        self.intent.as_ref()
    }

    /// `Idle → ChallengeRequested`.
    pub async fn submit(&mut self, intent: TransactionIntent) -> Result<(), GateError> {
        if !matches!(self.state, GateState::Idle | GateState::Rejected(_)) {
            return Err(self.invalid("submit"));
        }
        tracing::debug!(identity = %intent.identity, token_id = intent.token_id, "Intent submitted");
        self.intent = Some(intent);
        match self.ctx.broker.generate_authentication(&self.ctx.rp_id).await {
            Ok(options) => {
                self.state = GateState::ChallengeRequested { options };
                Ok(())
            }
            Err(e) => Err(self.reject(Rejection::Transport(e.to_string()))),
        }
    }

    /// `ChallengeRequested → CeremonyInFlight`. Returns the options to hand
    /// to the authenticator.
    pub fn begin_ceremony(&mut self) -> Result<AuthenticationOptions, GateError> {
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::ChallengeRequested { options } => {
                self.state = GateState::CeremonyInFlight { options: options.clone() };
                Ok(options)
            }
            other => {
                self.state = other;
                Err(self.invalid("begin ceremony"))
            }
        }
    }

    /// `CeremonyInFlight → Verifying`.
    pub fn receive_response(&mut self, response: AuthenticationResponseJson) -> Result<(), GateError> {
        match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::CeremonyInFlight { options } => {
                self.state = GateState::Verifying {
                    challenge: options.challenge,
                    response: Box::new(response),
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("receive response"))
            }
        }
    }

    /// The ceremony did not produce a response. `CeremonyInFlight → Rejected`.
    pub fn ceremony_failed(&mut self, reason: impl Into<String>) -> GateError {
        if !matches!(self.state, GateState::CeremonyInFlight { .. }) {
            return self.invalid("fail ceremony");
        }
        self.reject(Rejection::Transport(reason.into()))
    }

    /// `Verifying → Authorized | Rejected`.
    pub async fn verify(&mut self) -> Result<Binding, GateError> {
        let (challenge, response) = match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::Verifying { challenge, response } => (challenge, response),
            other => {
                self.state = other;
                return Err(self.invalid("verify"));
            }
        };
        let Some(intent) = self.intent.clone() else {
            return Err(self.invalid("verify"));
        };

        let record = match authenticate(&self.ctx, &intent.identity, &challenge, &response).await {
            Ok(record) => record,
            Err(rejection) => return Err(self.reject(rejection)),
        };

        let committed = match self.ctx.ledger.token_hash_key(intent.token_id).await {
            Ok(committed) => committed,
            Err(e) => return Err(self.reject(Rejection::Transport(e.to_string()))),
        };
        match binder::check(&committed, &record.public_key_string()) {
            Ok(binding) => {
                tracing::info!(
                    identity = %intent.identity,
                    token_id = intent.token_id,
                    open = (binding == Binding::Open),
                    "Intent authorized"
                );
                self.state = GateState::Authorized { binding };
                Ok(binding)
            }
            Err(e) => {
                tracing::warn!(token_id = intent.token_id, error = %e, "Hash binding failed");
                Err(self.reject(Rejection::HashMismatch))
            }
        }
    }

    /// `Authorized → Idle`, consuming the intent and submitting it to the
    /// bound wallet.
    pub async fn submit_transaction(&mut self) -> Result<Receipt, GateError> {
        let binding = match &self.state {
            GateState::Authorized { binding } => *binding,
            _ => return Err(self.invalid("submit transaction")),
        };
        let Some(intent) = self.intent.take() else {
            return Err(self.invalid("submit transaction"));
        };
        self.state = GateState::Idle;
        execute_authorized(self.ctx.ledger.as_ref(), &intent, binding).await
    }

    /// Abandon whatever is in flight.
    pub fn reset(&mut self) {
        if !matches!(self.state, GateState::Idle) {
            tracing::debug!(from = self.state.name(), "Gate reset");
        }
        self.state = GateState::Idle;
        self.intent = None;
    }

    /// Drive one intent through every transition with `authenticator`.
    pub async fn run(
        &mut self,
        intent: TransactionIntent,
        authenticator: &dyn Authenticator,
    ) -> Result<Receipt, GateError> {
        let identity = intent.identity.clone();
        self.submit(intent).await?;
        let options = self.begin_ceremony()?;
        let options = allow_registered(&self.ctx, &identity, options);
        let response = match authenticator.get_assertion(&options, &self.ctx.origin).await {
            Ok(response) => response,
            Err(e) => return Err(self.ceremony_failed(e.to_string())),
        };
        self.receive_response(response)?;
        self.verify().await?;
        self.submit_transaction().await
    }

    fn reject(&mut self, rejection: Rejection) -> GateError {
        tracing::warn!(from = self.state.name(), reason = %rejection, "Flow rejected");
        self.state = GateState::Rejected(rejection.clone());
        self.intent = None;
        GateError::Rejected(rejection)
    }

    fn invalid(&self, op: &'static str) -> GateError {
        GateError::InvalidTransition { op, state: self.state.name() }
    }
}

/// Narrow `options` to the credential registered for `identity`, as a
/// client does with `allowCredentials` before prompting.
pub(crate) fn allow_registered(
    ctx: &GateContext,
    identity: &Identity,
    mut options: AuthenticationOptions,
) -> AuthenticationOptions {
    if let Ok(registry) = ctx.registry() {
        if let Some(record) = registry.lookup(identity) {
            options.allow_credentials = vec![CredentialDescriptor {
                id: b64url_encode(&record.credential_id),
                kind: PUBLIC_KEY_TYPE.to_string(),
                transports: record.transports.clone(),
            }];
        }
    }
    options
}

/// Verify an authentication response against the credential bound to
/// `identity`, then advance its counter.
///
/// The counter update re-checks `new > stored` under the registry lock, so
/// of two concurrent ceremonies that both verified against the same stored
/// counter only one is accepted.
pub(crate) async fn authenticate(
    ctx: &GateContext,
    identity: &Identity,
    challenge: &str,
    response: &AuthenticationResponseJson,
) -> Result<CredentialRecord, Rejection> {
    let record = ctx.registry()?.lookup(identity).cloned();
    let Some(mut record) = record else {
        tracing::warn!(identity = %identity, "No credential registered");
        return Err(Rejection::VerificationFailure);
    };

    let verification = ctx
        .broker
        .verify_authentication(&ctx.rp_id, response, challenge, &ctx.origin, &record.to_authenticator())
        .await
        .map_err(|e| Rejection::Transport(e.to_string()))?;
    let info = match verification.authentication_info {
        Some(info) if verification.verified => info,
        _ => return Err(Rejection::VerificationFailure),
    };

    let bumped = ctx.registry()?.bump_counter(identity, info.new_counter);
    if let Err(e) = bumped {
        tracing::warn!(identity = %identity, error = %e, "Counter update refused");
        return Err(Rejection::VerificationFailure);
    }
    record.counter = info.new_counter;
    Ok(record)
}

/// Submit an authorized intent. Refuses up front when the bound wallet is
/// empty.
pub async fn execute_authorized(
    ledger: &dyn Ledger,
    intent: &TransactionIntent,
    binding: Binding,
) -> Result<Receipt, GateError> {
    let wallet = ledger.token_bound_wallet_address(intent.token_id).await?;
    if ledger.balance(wallet).await?.is_zero() {
        tracing::warn!(%wallet, token_id = intent.token_id, "Bound wallet is empty");
        return Err(GateError::OnChainRevert(WALLET_EMPTY.into()));
    }
    let receipt = ledger
        .execute(
            wallet,
            intent.sender,
            intent.recipient,
            intent.value,
            intent.data.clone(),
            binding.hash_key(),
        )
        .await?;
    tracing::info!(
        token_id = intent.token_id,
        tx = %receipt.transaction_hash,
        value = %intent.value,
        "Transaction submitted"
    );
    Ok(receipt)
}
