use alloy_primitives::utils::parse_ether;
use alloy_primitives::{Address, B256, Bytes, U256, address};
use std::sync::{Arc, Mutex};

use passbound::authenticator::SoftAuthenticator;
use passbound::binder::{Binding, CommittedHash, derive_hash};
use passbound::ceremony::{
    AuthenticationOptions, AuthenticationResponseJson, AuthenticationVerification, Broker,
    RegistrationOptions, RegistrationResponseJson, RegistrationVerification, StoredAuthenticator,
};
use passbound::gate::{
    ACCOUNT_EMPTY, AuthorizationGate, BrokerClient, ClientError, GateContext, GateError, GateState,
    LocalBroker, Rejection, TransactionIntent, WALLET_EMPTY, enroll, enroll_open, mint_with_passkey,
    sign_in,
};
use passbound::keys::VirtualAccount;
use passbound::ledger::{Ledger, LedgerError, MemoryLedger, Receipt};
use passbound::store::{CredentialRecord, CredentialStore, Identity, SessionStore};

const RP_ID: &str = "localhost";
const ORIGIN: &str = "http://localhost:3000";
const OWNER: Address = address!("00000000000000000000000000000000000000a1");
const RECIPIENT: Address = address!("00000000000000000000000000000000000000bb");

struct Harness {
    ctx:    GateContext,
    ledger: Arc<MemoryLedger>,
}

fn harness() -> Harness {
    harness_with(Arc::new(LocalBroker(Arc::new(Broker::new("passbound test", 60_000)))))
}

fn harness_with(broker: Arc<dyn BrokerClient>) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let ctx = GateContext {
        broker,
        registry: Arc::new(Mutex::new(CredentialStore::ephemeral())),
        ledger: ledger.clone(),
        rp_id: RP_ID.into(),
        origin: ORIGIN.into(),
    };
    Harness { ctx, ledger }
}

/// Register a fresh credential from `auth` under `identity`. Returns its
/// public-key string.
async fn register_as(h: &Harness, auth: &SoftAuthenticator, identity: Identity) -> String {
    let options = h
        .ctx
        .broker
        .generate_registration(RP_ID, "default-id", &identity.to_string())
        .await
        .unwrap();
    let response = auth.create(&options, ORIGIN).unwrap();
    let verification = h
        .ctx
        .broker
        .verify_registration(RP_ID, &response, &options.challenge, ORIGIN)
        .await
        .unwrap();
    assert!(verification.verified);
    let record = CredentialRecord::from_registration(identity, verification.registration_info.as_ref().unwrap());
    let public_key = record.public_key_string();
    h.ctx.registry.lock().unwrap().register(record).unwrap();
    public_key
}

async fn fund_wallet(h: &Harness, token_id: u64) -> Address {
    let wallet = h.ledger.token_bound_wallet_address(token_id).await.unwrap();
    h.ledger.fund(wallet, parse_ether("1").unwrap());
    wallet
}

fn intent(identity: Identity, token_id: u64, sender: Address) -> TransactionIntent {
    TransactionIntent::from_input(identity, token_id, sender, &RECIPIENT.to_string(), "0.5", None).unwrap()
}

#[tokio::test]
async fn test_bound_key_authorizes_and_executes() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    let pk = register_as(&h, &auth, Identity::wallet_user(0)).await;
    let (token_id, _) = h.ledger.mint(OWNER, CommittedHash::for_public_key(&pk)).await.unwrap();
    assert_eq!(token_id, 0);
    let wallet = fund_wallet(&h, 0).await;

    let mut gate = AuthorizationGate::new(h.ctx.clone());
    gate.run(intent(Identity::wallet_user(0), 0, OWNER), &auth).await.unwrap();
    assert!(matches!(gate.state(), GateState::Idle), "a submitted intent returns the gate to idle");

    let executed = h.ledger.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].wallet, wallet);
    assert_eq!(executed[0].to, RECIPIENT);
    assert_eq!(executed[0].value, parse_ether("0.5").unwrap());
    assert_eq!(executed[0].hash_key, CommittedHash::Committed(derive_hash(&pk)));
    assert_eq!(executed[0].data, Bytes::new(), "empty call data goes out as 0x");
    assert_eq!(executed[0].data.to_string(), "0x");
}

#[tokio::test]
async fn test_other_key_rejected_with_hash_mismatch() {
    let h = harness();
    let original = SoftAuthenticator::new();
    let pk = register_as(&h, &original, Identity::wallet_user(0)).await;
    h.ledger.mint(OWNER, CommittedHash::for_public_key(&pk)).await.unwrap();
    fund_wallet(&h, 0).await;

    // a different credential now answers for the identity
    let impostor = SoftAuthenticator::new();
    let pk2 = register_as(&h, &impostor, Identity::wallet_user(0)).await;
    assert_ne!(pk, pk2);

    let mut gate = AuthorizationGate::new(h.ctx.clone());
    let err = gate.run(intent(Identity::wallet_user(0), 0, OWNER), &impostor).await.unwrap_err();
    assert!(matches!(err, GateError::Rejected(Rejection::HashMismatch)), "got {err:?}");
    assert!(matches!(gate.state(), GateState::Rejected(Rejection::HashMismatch)));
    assert!(gate.intent().is_none());
    assert!(h.ledger.executed().is_empty(), "no on-chain call after a hash mismatch");
}

#[tokio::test]
async fn test_open_token_authorizes_on_verification_alone() {
    let h = harness();
    let enrollment = enroll_open(&h.ctx, OWNER).await.unwrap();
    assert!(enrollment.hash_key.is_open());
    fund_wallet(&h, enrollment.token_id).await;

    let auth = SoftAuthenticator::new();
    register_as(&h, &auth, Identity::wallet_user(0)).await;

    let mut gate = AuthorizationGate::new(h.ctx.clone());
    gate.submit(intent(Identity::wallet_user(0), enrollment.token_id, OWNER)).await.unwrap();
    let options = gate.begin_ceremony().unwrap();
    let response = auth.get(&options, ORIGIN).unwrap();
    gate.receive_response(response).unwrap();
    let binding = gate.verify().await.unwrap();
    assert_eq!(binding, Binding::Open);
    assert!(matches!(gate.state(), GateState::Authorized { binding: Binding::Open }));

    gate.submit_transaction().await.unwrap();
    assert_eq!(h.ledger.executed()[0].hash_key, CommittedHash::Open);
}

#[tokio::test]
async fn test_unverified_ceremony_rejected() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    let pk = register_as(&h, &auth, Identity::wallet_user(0)).await;
    h.ledger.mint(OWNER, CommittedHash::for_public_key(&pk)).await.unwrap();
    fund_wallet(&h, 0).await;

    let mut gate = AuthorizationGate::new(h.ctx.clone());
    gate.run(intent(Identity::wallet_user(0), 0, OWNER), &auth).await.unwrap();

    // rewound counter: a replayed assertion
    auth.set_counter(0);
    let err = gate.run(intent(Identity::wallet_user(0), 0, OWNER), &auth).await.unwrap_err();
    assert!(matches!(err, GateError::Rejected(Rejection::VerificationFailure)), "got {err:?}");
    assert!(matches!(gate.state(), GateState::Rejected(Rejection::VerificationFailure)));
    assert_eq!(h.ledger.executed().len(), 1);

    // retry from Rejected once the authenticator is ahead again
    auth.set_counter(10);
    gate.run(intent(Identity::wallet_user(0), 0, OWNER), &auth).await.unwrap();
    assert_eq!(h.ledger.executed().len(), 2);
    let counter = h.ctx.registry.lock().unwrap().lookup(&Identity::wallet_user(0)).unwrap().counter;
    assert_eq!(counter, 11);
}

#[tokio::test]
async fn test_out_of_order_responses_only_later_counter_wins() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    let pk = register_as(&h, &auth, Identity::wallet_user(0)).await;
    h.ledger.mint(OWNER, CommittedHash::for_public_key(&pk)).await.unwrap();
    fund_wallet(&h, 0).await;

    let mut first = AuthorizationGate::new(h.ctx.clone());
    let mut second = AuthorizationGate::new(h.ctx.clone());
    first.submit(intent(Identity::wallet_user(0), 0, OWNER)).await.unwrap();
    second.submit(intent(Identity::wallet_user(0), 0, OWNER)).await.unwrap();
    let first_options = first.begin_ceremony().unwrap();
    let second_options = second.begin_ceremony().unwrap();
    let first_response = auth.get(&first_options, ORIGIN).unwrap(); // counter 1
    let second_response = auth.get(&second_options, ORIGIN).unwrap(); // counter 2
    first.receive_response(first_response).unwrap();
    second.receive_response(second_response).unwrap();

    second.verify().await.unwrap();
    let err = first.verify().await.unwrap_err();
    assert!(matches!(err, GateError::Rejected(Rejection::VerificationFailure)), "got {err:?}");
}

#[tokio::test]
async fn test_empty_wallet_refused_before_submission() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    let pk = register_as(&h, &auth, Identity::wallet_user(0)).await;
    h.ledger.mint(OWNER, CommittedHash::for_public_key(&pk)).await.unwrap();

    let mut gate = AuthorizationGate::new(h.ctx.clone());
    let err = gate.run(intent(Identity::wallet_user(0), 0, OWNER), &auth).await.unwrap_err();
    match err {
        GateError::OnChainRevert(reason) => assert_eq!(reason, WALLET_EMPTY),
        other => panic!("expected an on-chain refusal, got {other:?}"),
    }
    assert!(matches!(gate.state(), GateState::Idle), "on-chain failure is not a gate rejection");
    assert!(h.ledger.executed().is_empty());
}

#[tokio::test]
async fn test_revert_reason_surfaced() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    let pk = register_as(&h, &auth, Identity::wallet_user(0)).await;
    h.ledger.mint(OWNER, CommittedHash::for_public_key(&pk)).await.unwrap();
    fund_wallet(&h, 0).await;

    let stranger = address!("00000000000000000000000000000000000000cc");
    let mut gate = AuthorizationGate::new(h.ctx.clone());
    let err = gate.run(intent(Identity::wallet_user(0), 0, stranger), &auth).await.unwrap_err();
    match err {
        GateError::OnChainRevert(reason) => assert_eq!(reason, "Not token owner"),
        other => panic!("expected a revert, got {other:?}"),
    }
}

struct DownBroker;

#[async_trait::async_trait]
impl BrokerClient for DownBroker {
    async fn generate_registration(
        &self,
        _rp_id: &str,
        _user_id: &str,
        _user_name: &str,
    ) -> Result<RegistrationOptions, ClientError> {
        Err(ClientError::Status { status: 502, body: "bad gateway".into() })
    }

    async fn generate_authentication(&self, _rp_id: &str) -> Result<AuthenticationOptions, ClientError> {
        Err(ClientError::Status { status: 502, body: "bad gateway".into() })
    }

    async fn verify_registration(
        &self,
        _rp_id: &str,
        _response: &RegistrationResponseJson,
        _challenge: &str,
        _origin: &str,
    ) -> Result<RegistrationVerification, ClientError> {
        Err(ClientError::Transport("connection refused".into()))
    }

    async fn verify_authentication(
        &self,
        _rp_id: &str,
        _response: &AuthenticationResponseJson,
        _challenge: &str,
        _origin: &str,
        _stored: &StoredAuthenticator,
    ) -> Result<AuthenticationVerification, ClientError> {
        Err(ClientError::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn test_broker_transport_error_rejects() {
    let h = harness_with(Arc::new(DownBroker));
    let mut gate = AuthorizationGate::new(h.ctx.clone());

    let err = gate.submit(intent(Identity::wallet_user(0), 0, OWNER)).await.unwrap_err();
    assert!(matches!(err, GateError::Rejected(Rejection::Transport(_))), "got {err:?}");
    assert!(matches!(gate.state(), GateState::Rejected(Rejection::Transport(_))));

    gate.reset();
    assert!(matches!(gate.state(), GateState::Idle));
    assert!(gate.intent().is_none());
}

#[tokio::test]
async fn test_ceremony_without_credential_rejects() {
    let h = harness();
    let enrolled = SoftAuthenticator::new();
    register_as(&h, &enrolled, Identity::wallet_user(0)).await;

    // authenticator that holds no credential for the rp
    let empty = SoftAuthenticator::new();
    let mut gate = AuthorizationGate::new(h.ctx.clone());
    let err = gate.run(intent(Identity::wallet_user(0), 0, OWNER), &empty).await.unwrap_err();
    assert!(matches!(err, GateError::Rejected(Rejection::Transport(_))), "got {err:?}");
}

#[tokio::test]
async fn test_transitions_out_of_order_refused() {
    let h = harness();
    let mut gate = AuthorizationGate::new(h.ctx.clone());

    assert!(matches!(gate.begin_ceremony(), Err(GateError::InvalidTransition { state: "Idle", .. })));
    assert!(matches!(gate.verify().await, Err(GateError::InvalidTransition { .. })));
    assert!(matches!(gate.submit_transaction().await, Err(GateError::InvalidTransition { .. })));
    assert!(matches!(gate.state(), GateState::Idle));

    gate.submit(intent(Identity::wallet_user(0), 0, OWNER)).await.unwrap();
    assert!(matches!(gate.state(), GateState::ChallengeRequested { .. }));
    assert!(matches!(
        gate.submit(intent(Identity::wallet_user(0), 0, OWNER)).await,
        Err(GateError::InvalidTransition { op: "submit", state: "ChallengeRequested" })
    ));
    gate.begin_ceremony().unwrap();
    assert!(matches!(gate.state(), GateState::CeremonyInFlight { .. }));
    assert!(matches!(gate.begin_ceremony(), Err(GateError::InvalidTransition { .. })));
    assert!(matches!(gate.state(), GateState::CeremonyInFlight { .. }), "a refused transition keeps the state");
}

#[tokio::test]
async fn test_unregistered_identity_rejected() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    register_as(&h, &auth, Identity::wallet_user(0)).await;
    h.ledger.mint(OWNER, CommittedHash::Open).await.unwrap();

    let mut gate = AuthorizationGate::new(h.ctx.clone());
    let err = gate.run(intent(Identity::wallet_user(9), 0, OWNER), &auth).await.unwrap_err();
    assert!(matches!(err, GateError::Rejected(Rejection::VerificationFailure)), "got {err:?}");
}

#[tokio::test]
async fn test_enroll_binds_credential_to_token() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    h.ledger.mint(OWNER, CommittedHash::Open).await.unwrap();

    let enrollment = enroll(&h.ctx, &auth, OWNER).await.unwrap();
    assert_eq!(enrollment.token_id, 1);
    assert_eq!(h.ledger.owner_of(1).await.unwrap(), OWNER);
    let record = h.ctx.registry.lock().unwrap().lookup(&Identity::Token(1)).cloned().unwrap();
    assert_eq!(enrollment.hash_key, CommittedHash::for_public_key(&record.public_key_string()));
    assert_eq!(h.ledger.token_hash_key(1).await.unwrap(), enrollment.hash_key);

    fund_wallet(&h, 1).await;
    let mut gate = AuthorizationGate::new(h.ctx.clone());
    gate.run(intent(Identity::Token(1), 1, OWNER), &auth).await.unwrap();
    assert_eq!(h.ledger.executed().len(), 1);
}

/// Ledger where another mint lands right after the next id is read.
struct RacingLedger {
    inner: Arc<MemoryLedger>,
}

#[async_trait::async_trait]
impl Ledger for RacingLedger {
    async fn next_token_id(&self) -> Result<u64, LedgerError> {
        let id = self.inner.next_token_id().await?;
        self.inner.mint(OWNER, CommittedHash::Open).await?;
        Ok(id)
    }

    async fn transaction_hash(&self, public_key: &str) -> Result<B256, LedgerError> {
        self.inner.transaction_hash(public_key).await
    }

    async fn mint(&self, minter: Address, hash_key: CommittedHash) -> Result<(u64, Receipt), LedgerError> {
        self.inner.mint(minter, hash_key).await
    }

    async fn token_bound_wallet_address(&self, token_id: u64) -> Result<Address, LedgerError> {
        self.inner.token_bound_wallet_address(token_id).await
    }

    async fn token_hash_key(&self, token_id: u64) -> Result<CommittedHash, LedgerError> {
        self.inner.token_hash_key(token_id).await
    }

    async fn owner_of(&self, token_id: u64) -> Result<Address, LedgerError> {
        self.inner.owner_of(token_id).await
    }

    async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        self.inner.balance(address).await
    }

    async fn execute(
        &self,
        wallet: Address,
        sender: Address,
        to: Address,
        value: U256,
        data: Bytes,
        hash_key: CommittedHash,
    ) -> Result<Receipt, LedgerError> {
        self.inner.execute(wallet, sender, to, value, data, hash_key).await
    }
}

#[tokio::test]
async fn test_enroll_stores_credential_under_minted_id() {
    let h = harness();
    let holder = SoftAuthenticator::new();
    let holder_key = register_as(&h, &holder, Identity::Token(0)).await;

    let mut ctx = h.ctx.clone();
    ctx.ledger = Arc::new(RacingLedger { inner: h.ledger.clone() });
    let auth = SoftAuthenticator::new();
    let enrollment = enroll(&ctx, &auth, OWNER).await.unwrap();
    assert_eq!(enrollment.token_id, 1, "mint should receive the id after the racing mint");

    let registry = h.ctx.registry.lock().unwrap();
    let untouched = registry.lookup(&Identity::Token(0)).unwrap();
    assert_eq!(untouched.public_key_string(), holder_key, "token 0 credential must not be overwritten");
    let bound = registry.lookup(&Identity::Token(1)).unwrap();
    assert_eq!(
        enrollment.hash_key,
        CommittedHash::for_public_key(&bound.public_key_string()),
        "new credential should be stored under the minted id"
    );
}

#[tokio::test]
async fn test_sign_in_then_mint_with_passkey() {
    let h = harness();
    let auth = SoftAuthenticator::new();
    let session = Arc::new(Mutex::new(SessionStore::ephemeral()));

    let signed_in = sign_in(&h.ctx, &auth, &session).await.unwrap();
    let account = VirtualAccount::derive(&signed_in.public_key).unwrap();
    assert_eq!(signed_in.virtual_address, account.address());
    {
        let session = session.lock().unwrap();
        assert_eq!(session.state().public_key.as_deref(), Some(signed_in.public_key.as_str()));
        assert_eq!(session.state().virtual_address, Some(account.address()));
    }

    let err = mint_with_passkey(&h.ctx, &auth, &session).await.unwrap_err();
    match err {
        GateError::OnChainRevert(reason) => assert_eq!(reason, ACCOUNT_EMPTY),
        other => panic!("expected an unfunded account refusal, got {other:?}"),
    }

    h.ledger.fund(account.address(), parse_ether("1").unwrap());
    let enrollment = mint_with_passkey(&h.ctx, &auth, &session).await.unwrap();
    assert_eq!(enrollment.token_id, 0);
    assert_eq!(enrollment.hash_key, CommittedHash::for_public_key(&signed_in.public_key));
    assert_eq!(h.ledger.owner_of(0).await.unwrap(), account.address());
    assert_eq!(session.lock().unwrap().state().minted_wallets.len(), 1);

    // the virtual account transacts from the minted wallet
    fund_wallet(&h, 0).await;
    let mut gate = AuthorizationGate::new(h.ctx.clone());
    let identity = Identity::from("nft-bound-wallet");
    gate.run(intent(identity, 0, account.address()), &auth).await.unwrap();
    assert_eq!(h.ledger.executed().len(), 1);
}
