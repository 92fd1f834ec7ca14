//! Shared helpers for spinning up throwaway loopback servers in integration tests.

use anyhow::Context as _;
use tokio::net::TcpListener;

/// Binds a loopback listener on an OS-assigned free port and returns it
/// together with the `http://127.0.0.1:{port}` base URL tests should dial.
pub async fn bind_loopback() -> anyhow::Result<(TcpListener, url::Url)> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("failed to bind loopback listener")?;
    let port = listener.local_addr().context("failed to read local address")?.port();
    let url = url::Url::parse(&format!("http://127.0.0.1:{port}")).expect("well-formed loopback URL");
    Ok((listener, url))
}

/// Picks a free port without binding it, for callers that need the number
/// before the listener is constructed (e.g. building a target URI up front).
pub fn free_port() -> anyhow::Result<u16> {
    portpicker::pick_unused_port().context("no free port available")
}
