//! Loopback Redirect Authorization Prompt
//!
//! Desktop OAuth apps register a `http://127.0.0.1:<port>/<path>` redirect
//! URI. The prompt binds that address, opens the system browser on the
//! authorization URL and waits for the callback request. Connections are
//! served concurrently: browsers open speculative sockets that never send a
//! request, and those must not hold up the real callback.

use async_trait::async_trait;
use bridge_traits::{
    auth::AuthorizationPrompt,
    error::{BridgeError, Result},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

const MAX_REQUEST_BYTES: usize = 16 * 1024;

/// How long a connection may take to send its request head.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Signed in</title></head>\
<body><p>Authorization complete. You can close this window.</p></body></html>";

type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Authorization prompt backed by the system browser and a loopback listener.
///
/// The listener lives inside the `authorize` future, so dropping the future
/// (for example when the caller's timeout elapses) closes the socket.
#[derive(Clone)]
pub struct LoopbackAuthorizationPrompt {
    launcher: BrowserLauncher,
}

impl LoopbackAuthorizationPrompt {
    pub fn new() -> Self {
        Self::with_launcher(|url| open::that_detached(url))
    }

    /// Use a custom launcher instead of the system browser.
    pub fn with_launcher<F>(launcher: F) -> Self
    where
        F: Fn(&str) -> std::io::Result<()> + Send + Sync + 'static,
    {
        Self {
            launcher: Arc::new(launcher),
        }
    }

    fn bind_address(redirect: &Url) -> Result<String> {
        if redirect.scheme() != "http" {
            return Err(BridgeError::NotAvailable(format!(
                "loopback prompt needs an http redirect URI, got {}",
                redirect.scheme()
            )));
        }
        let host = redirect
            .host_str()
            .ok_or_else(|| BridgeError::OperationFailed("redirect URI has no host".to_string()))?;
        let port = redirect.port_or_known_default().unwrap_or(80);
        // IPv6 hosts come back bracketed from `host_str`
        Ok(format!("{}:{}", host, port))
    }

    /// Read the request head and return the request target (`/path?query`).
    async fn read_request_target(stream: &mut TcpStream) -> Result<Option<String>> {
        let mut buffer = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];

        while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if buffer.len() > MAX_REQUEST_BYTES {
                return Ok(None);
            }
        }

        let head = String::from_utf8_lossy(&buffer);
        let request_line = head.lines().next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
            _ => Ok(None),
        }
    }

    /// Serve one connection. Returns the callback URL when this connection
    /// carried the redirect; anything else is answered (best effort) and
    /// dropped.
    async fn serve_connection(
        mut stream: TcpStream,
        peer: SocketAddr,
        redirect: Arc<Url>,
    ) -> Option<String> {
        let head = timeout(REQUEST_HEAD_TIMEOUT, Self::read_request_target(&mut stream)).await;
        let target = match head {
            Ok(Ok(Some(target))) => target,
            Ok(Ok(None)) => {
                debug!(peer = %peer, "Ignoring malformed request on redirect listener");
                return None;
            }
            Ok(Err(e)) => {
                debug!(peer = %peer, error = %e, "Redirect connection failed");
                return None;
            }
            Err(_) => {
                debug!(peer = %peer, "Closing idle redirect connection");
                return None;
            }
        };

        let callback = match redirect.join(&target) {
            Ok(callback) => callback,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Unparseable request target");
                return None;
            }
        };

        // Browsers also ask for /favicon.ico and friends
        if callback.path() != redirect.path() {
            if let Err(e) = Self::respond(&mut stream, "404 Not Found", "").await {
                debug!(peer = %peer, error = %e, "Could not answer stray request");
            }
            return None;
        }

        if let Err(e) = Self::respond(&mut stream, "200 OK", SUCCESS_PAGE).await {
            warn!(error = %e, "Could not show the completion page");
        }
        Some(callback.to_string())
    }

    async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

impl Default for LoopbackAuthorizationPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationPrompt for LoopbackAuthorizationPrompt {
    #[instrument(skip(self, authorization_url))]
    async fn authorize(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
    ) -> Result<Option<String>> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| BridgeError::OperationFailed(format!("invalid redirect URI: {}", e)))?;
        let address = Self::bind_address(&redirect)?;

        let listener = TcpListener::bind(&address).await.map_err(|e| {
            BridgeError::ConnectionFailed(format!("cannot listen on {}: {}", address, e))
        })?;
        debug!(address = %address, "Listening for authorization redirect");

        if let Err(e) = (self.launcher)(authorization_url) {
            warn!(error = %e, "Could not open browser");
            info!("Open this URL to continue signing in: {}", authorization_url);
        }

        let redirect = Arc::new(redirect);
        // Dropping the set aborts connections still being served
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    connections.spawn(Self::serve_connection(stream, peer, redirect.clone()));
                }
                Some(served) = connections.join_next() => {
                    if let Ok(Some(callback)) = served {
                        debug!("Authorization redirect received");
                        return Ok(Some(callback));
                    }
                }
            }
        }
    }
}
