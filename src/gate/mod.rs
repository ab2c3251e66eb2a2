//! Authorization gate: sequences a transaction intent through a WebAuthn
//! ceremony and the hash binding before it reaches the bound wallet.

pub mod client;
pub mod flows;
pub mod intent;
pub mod state;

pub use client::{BrokerClient, ClientError, HttpBroker, LocalBroker};
pub use flows::{Enrollment, SignIn, enroll, enroll_open, mint_with_passkey, sign_in};
pub use intent::{IntentError, TransactionIntent};
pub use state::{
    ACCOUNT_EMPTY, AuthorizationGate, GateContext, GateError, GateState, Rejection, WALLET_EMPTY,
    execute_authorized,
};
