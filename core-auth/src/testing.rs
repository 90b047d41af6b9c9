//! In-memory bridge fakes for tests.
//!
//! Enabled inside this crate's tests and, for downstream crates, through the
//! `test-support` feature.

use async_trait::async_trait;
use bridge_traits::{
    auth::AuthorizationPrompt,
    error::{BridgeError, Result},
    http::{HttpClient, HttpRequest, HttpResponse, StreamingResponse},
    network::{NetworkInfo, NetworkMonitor, NetworkStatus},
    storage::SecureStore,
};
use crate::{
    AccountSummary, Connection, CredentialKey, CredentialStore, ProviderKind,
    TokenLifecycleManager, TokenRecord, TokenRefresher,
};
use bridge_traits::time::SystemClock;
use core_runtime::EventBus;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// `SecureStore` backed by a `HashMap`.
#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// `HttpClient` that replays queued responses in order and records requests.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, status: u16, body: impl Into<String>) -> &Self {
        lock(&self.responses).push_back(Ok(HttpResponse::new(status, body.into())));
        self
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(status, body.to_string())
    }

    pub fn push_error(&self, error: BridgeError) -> &Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    fn next(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        lock(&self.requests).push(request);
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            Err(BridgeError::OperationFailed(format!(
                "no scripted response for {}",
                url
            )))
        })
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.next(request)
    }

    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        let response = self.next(request)?;
        Ok(StreamingResponse {
            status: response.status,
            headers: response.headers,
            body: Box::new(std::io::Cursor::new(response.body.to_vec())),
        })
    }
}

/// `NetworkMonitor` reporting a fixed status.
pub struct FixedNetworkMonitor(pub NetworkStatus);

#[async_trait]
impl NetworkMonitor for FixedNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(NetworkInfo::new(self.0))
    }
}

/// How a [`ScriptedPrompt`] answers.
#[derive(Debug, Clone)]
pub enum PromptReply {
    /// Redirect with `code`, echoing the `state` from the authorization URL.
    Code(String),
    /// Redirect with an explicit query string (state is not echoed).
    Query(String),
    /// User closed the window.
    Dismissed,
    /// Never answers.
    Hang,
}

/// `AuthorizationPrompt` that answers without a browser and counts calls.
pub struct ScriptedPrompt {
    reply: PromptReply,
    calls: AtomicUsize,
    last_url: Mutex<Option<String>>,
}

impl ScriptedPrompt {
    pub fn new(reply: PromptReply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        lock(&self.last_url).clone()
    }
}

#[async_trait]
impl AuthorizationPrompt for ScriptedPrompt {
    async fn authorize(
        &self,
        authorization_url: &str,
        redirect_uri: &str,
    ) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_url) = Some(authorization_url.to_string());

        match &self.reply {
            PromptReply::Code(code) => {
                let url = url::Url::parse(authorization_url)
                    .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
                let state = url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                Ok(Some(format!(
                    "{}?code={}&state={}",
                    redirect_uri, code, state
                )))
            }
            PromptReply::Query(query) => Ok(Some(format!("{}?{}", redirect_uri, query))),
            PromptReply::Dismissed => Ok(None),
            PromptReply::Hang => {
                std::future::pending::<()>().await;
                Ok(None)
            }
        }
    }
}

/// `TokenRefresher` that always issues `access_token`, valid for an hour.
pub struct StaticRefresher {
    access_token: String,
    calls: AtomicUsize,
}

impl StaticRefresher {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, refresh_token: &str) -> crate::Result<TokenRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenRecord::issued_at(
            chrono::Utc::now(),
            self.access_token.clone(),
            Some(refresh_token.to_string()),
            "Bearer",
            3600,
        ))
    }
}

/// A signed-in [`Connection`] holding `access_token`, backed by an in-memory
/// store. Refreshes go to `refresher`.
pub async fn signed_in_connection(
    provider: ProviderKind,
    access_token: &str,
    refresher: Arc<dyn TokenRefresher>,
) -> Connection {
    let manager = Arc::new(TokenLifecycleManager::new(
        CredentialKey::default_for(provider),
        CredentialStore::new(Arc::new(MemorySecureStore::new())),
        refresher,
        Arc::new(SystemClock),
        std::time::Duration::from_secs(60),
        EventBus::new(16),
    ));

    let record = TokenRecord::issued_at(
        chrono::Utc::now(),
        access_token,
        Some("refresh-token".to_string()),
        "Bearer",
        3600,
    );
    if let Err(e) = manager.install(record).await {
        panic!("installing test tokens failed: {}", e);
    }

    Connection::new(provider, manager, AccountSummary::new("test-account"))
}
