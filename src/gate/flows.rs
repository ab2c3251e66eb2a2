//! Enrollment and minting: the flows that bind a credential to a token
//! before any transaction is authorized against it.

use alloy_primitives::Address;
use std::sync::{Arc, Mutex};

use super::state::{ACCOUNT_EMPTY, GateContext, GateError, Rejection, allow_registered, authenticate};
use crate::authenticator::Authenticator;
use crate::binder::{CommittedHash, derive_hash, public_key_string};
use crate::ceremony::RegistrationInfo;
use crate::config::{SIGN_IN_USER_ID, SIGN_IN_USER_NAME};
use crate::keys::VirtualAccount;
use crate::ledger::Receipt;
use crate::store::{CredentialRecord, Identity, MintedWallet, SessionStore};

#[derive(Debug, Clone)]
pub struct SignIn {
    pub public_key:      String,
    pub virtual_address: Address,
}

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub token_id: u64,
    pub wallet:   Address,
    pub hash_key: CommittedHash,
    pub receipt:  Receipt,
}

/// Run a registration ceremony and return the verified credential.
async fn register(
    ctx: &GateContext,
    authenticator: &dyn Authenticator,
    user_id: &str,
    user_name: &str,
) -> Result<RegistrationInfo, GateError> {
    let options = ctx
        .broker
        .generate_registration(&ctx.rp_id, user_id, user_name)
        .await
        .map_err(|e| Rejection::Transport(e.to_string()))?;
    let response = authenticator
        .make_credential(&options, &ctx.origin)
        .await
        .map_err(|e| Rejection::Transport(e.to_string()))?;
    let verification = ctx
        .broker
        .verify_registration(&ctx.rp_id, &response, &options.challenge, &ctx.origin)
        .await
        .map_err(|e| Rejection::Transport(e.to_string()))?;
    match verification.registration_info {
        Some(info) if verification.verified => Ok(info),
        _ => {
            tracing::warn!(user_name, "Registration not verified");
            Err(Rejection::VerificationFailure.into())
        }
    }
}

fn store_credential(ctx: &GateContext, identity: Identity, info: &RegistrationInfo) -> Result<CredentialRecord, GateError> {
    let record = CredentialRecord::from_registration(identity, info);
    ctx.registry()?.register(record.clone())?;
    Ok(record)
}

/// Passkey sign-in: register a credential for the fixed sign-in user and
/// derive the session's virtual account from its public key.
pub async fn sign_in(
    ctx: &GateContext,
    authenticator: &dyn Authenticator,
    session: &Arc<Mutex<SessionStore>>,
) -> Result<SignIn, GateError> {
    let info = register(ctx, authenticator, SIGN_IN_USER_ID, SIGN_IN_USER_NAME).await?;
    let record = store_credential(ctx, Identity::User(SIGN_IN_USER_NAME.into()), &info)?;
    let public_key = record.public_key_string();
    let account = VirtualAccount::derive(&public_key)?;

    let mut session = session
        .lock()
        .map_err(|_| Rejection::Transport("session store poisoned".into()))?;
    session.update(|s| {
        s.public_key = Some(public_key.clone());
        s.virtual_address = Some(account.address());
    })?;
    tracing::info!(address = %account.address(), "Signed in");
    Ok(SignIn { public_key, virtual_address: account.address() })
}

/// Mint a token whose wallet is bound to a freshly registered credential.
///
/// The user name `walletId-{id}` is predicted from the next token id, but
/// the credential is only stored once the mint reports the id it actually
/// assigned.
pub async fn enroll(
    ctx: &GateContext,
    authenticator: &dyn Authenticator,
    owner: Address,
) -> Result<Enrollment, GateError> {
    let predicted = ctx.ledger.next_token_id().await?;
    let user_name = Identity::wallet_user(predicted).to_string();
    let user_id = format!("{predicted}@{owner}");

    let info = register(ctx, authenticator, &user_id, &user_name).await?;
    let hash_key = CommittedHash::for_public_key(&public_key_string(&info.credential_public_key));
    let enrollment = mint(ctx, owner, hash_key).await?;
    if enrollment.token_id != predicted {
        tracing::warn!(expected = predicted, token_id = enrollment.token_id, "Token id moved during enrollment");
    }
    store_credential(ctx, Identity::Token(enrollment.token_id), &info)?;
    Ok(enrollment)
}

/// Mint a token without a bound credential.
pub async fn enroll_open(ctx: &GateContext, owner: Address) -> Result<Enrollment, GateError> {
    mint(ctx, owner, CommittedHash::Open).await
}

/// Authenticate with the signed-in passkey, then mint from its virtual
/// account a token bound to the session's public key.
pub async fn mint_with_passkey(
    ctx: &GateContext,
    authenticator: &dyn Authenticator,
    session: &Arc<Mutex<SessionStore>>,
) -> Result<Enrollment, GateError> {
    let public_key = session
        .lock()
        .map_err(|_| Rejection::Transport("session store poisoned".into()))?
        .state()
        .public_key
        .clone()
        .ok_or(Rejection::VerificationFailure)?;

    let identity = Identity::User(SIGN_IN_USER_NAME.into());
    let options = ctx
        .broker
        .generate_authentication(&ctx.rp_id)
        .await
        .map_err(|e| Rejection::Transport(e.to_string()))?;
    let options = allow_registered(ctx, &identity, options);
    let response = authenticator
        .get_assertion(&options, &ctx.origin)
        .await
        .map_err(|e| Rejection::Transport(e.to_string()))?;
    authenticate(ctx, &identity, &options.challenge, &response).await?;

    let account = VirtualAccount::derive(&public_key)?;
    if ctx.ledger.balance(account.address()).await?.is_zero() {
        return Err(GateError::OnChainRevert(ACCOUNT_EMPTY.into()));
    }
    let hash_key = CommittedHash::Committed(derive_hash(&public_key));
    let enrollment = mint(ctx, account.address(), hash_key).await?;

    session
        .lock()
        .map_err(|_| Rejection::Transport("session store poisoned".into()))?
        .update(|s| {
            s.minted_wallets.push(MintedWallet { token_id: enrollment.token_id, wallet: enrollment.wallet })
        })?;
    Ok(enrollment)
}

async fn mint(ctx: &GateContext, minter: Address, hash_key: CommittedHash) -> Result<Enrollment, GateError> {
    let (token_id, receipt) = ctx.ledger.mint(minter, hash_key).await?;
    let wallet = ctx.ledger.token_bound_wallet_address(token_id).await?;
    tracing::info!(token_id, %wallet, open = hash_key.is_open(), "Wallet enrolled");
    Ok(Enrollment { token_id, wallet, hash_key, receipt })
}
