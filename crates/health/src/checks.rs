//! Stock probes for common dependencies.

use std::time::Duration;

use anyhow::{Context, bail};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::probe::ProbeSpec;

/// Reachability of a TCP endpoint, e.g. a message broker.
pub fn tcp_probe(name: impl Into<String>, addr: impl Into<String>, dial_timeout: Duration) -> ProbeSpec {
    let addr = addr.into();
    ProbeSpec::new(name, move |token: CancellationToken| {
        let addr = addr.clone();
        async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => bail!("dial to {addr} cancelled"),
                dialed = tokio::time::timeout(dial_timeout, TcpStream::connect(&addr)) => {
                    dialed
                        .map_err(|_| anyhow::anyhow!("dial to {addr} timed out"))?
                        .with_context(|| format!("dial to {addr} failed"))?;
                    Ok(())
                }
            }
        }
    })
}

/// GET `url` and expect a 2xx answer.
pub fn http_probe(name: impl Into<String>, client: reqwest::Client, url: impl Into<String>) -> ProbeSpec {
    let url = url.into();
    ProbeSpec::new(name, move |token: CancellationToken| {
        let client = client.clone();
        let url = url.clone();
        async move {
            let response = tokio::select! {
                biased;
                _ = token.cancelled() => bail!("request to {url} cancelled"),
                response = client.get(&url).send() => response
                    .with_context(|| format!("request to {url} failed"))?,
            };
            let status = response.status();
            if !status.is_success() {
                bail!("{url} answered {status}");
            }
            Ok(())
        }
    })
}
