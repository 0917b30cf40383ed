//! Shared outbound HTTP client.

use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// Default per-request timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest is built without a bundled crypto provider; install aws-lc-rs once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Client for provider calls. `http2_prior_knowledge` is left to the caller.
pub fn builder(timeout: Duration) -> reqwest::ClientBuilder {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
        .pool_idle_timeout(Duration::from_secs(90));
    if timeout > Duration::ZERO {
        builder = builder.timeout(timeout);
    }
    builder
}

/// Build a client with the default timeout.
pub fn build_client() -> Result<reqwest::Client> {
    Ok(builder(DEFAULT_REQUEST_TIMEOUT).build()?)
}
