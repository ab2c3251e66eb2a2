use std::path::PathBuf;

/// Authenticator UI timeout handed out in ceremony options, and the maximum
/// age of a challenge at verification time.
pub const CEREMONY_TIMEOUT_MS: u64 = 60_000;
/// COSE algorithm ids offered at registration: ES256, RS256.
pub const SUPPORTED_ALGORITHMS: [i64; 2] = [-7, -257];
/// Committed hash value meaning "minted without WebAuthn".
pub const OPEN_MODE_SENTINEL: &str = "false";
/// User name used by the passkey sign-in flow.
pub const SIGN_IN_USER_NAME: &str = "nft-bound-wallet";
pub const SIGN_IN_USER_ID: &str = "default-id";

#[derive(clap::Parser, Debug, Clone)]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub listen: String,
    /// Relying party id credentials are scoped to.
    #[arg(long, default_value = "localhost")]
    pub rp_id: String,
    #[arg(long, default_value = "SimpleWebAuthn Example")]
    pub rp_name: String,
    /// Origin the frontend is served from.
    #[arg(long, default_value = "http://localhost:3000")]
    pub origin: String,
    /// Network name used for block explorer links.
    #[arg(long, default_value = "sepolia")]
    pub network: String,
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, default_value_t = CEREMONY_TIMEOUT_MS)]
    pub ceremony_timeout_ms: u64,
    /// Delete all stored credentials and session state, then exit.
    #[arg(long)]
    pub wipe: bool,
}

impl Config {
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(directories::ProjectDirs::from("", "", "passbound")
            .ok_or_else(|| anyhow::anyhow!("cannot determine XDG data dir"))?
            .data_dir()
            .to_path_buf())
    }
}

/// `https://{network}.etherscan.io/tx/{hash}`, with `homestead` shown as `mainnet`.
pub fn block_url(network: &str, tx_hash: &alloy_primitives::B256) -> String {
    let network = if network == "homestead" { "mainnet" } else { network };
    format!("https://{network}.etherscan.io/tx/{tx_hash}")
}
