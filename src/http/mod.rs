//! JSON-over-HTTP surface: the ceremony endpoints plus the wallet
//! endpoints that act on behalf of a passkey.

pub mod grants;
pub mod handlers;
pub mod wire;

pub use grants::{GrantError, Grants};
pub use handlers::{AppState, router};

pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Listening");
    }
    axum::serve(listener, router(state)).await
}
