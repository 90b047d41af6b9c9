//! Resilient Request Executor
//!
//! Every authenticated call goes through [`RequestExecutor`]. It injects the
//! connection's bearer token and recovers from exactly one authorization
//! failure per call:
//!
//! 1. send with the current token
//! 2. on 401, refresh once (shared with any concurrent caller) and resend
//! 3. on a second 401, log the connection out and fail with `AuthExpired`
//!
//! Transient 5xx/transport failures are retried by the `HttpClient` itself;
//! the executor never retries not-found or other client errors.

use crate::error::{CloudError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, StreamingResponse};
use bytes::Bytes;
use core_auth::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const MAX_ERROR_BODY: usize = 512;

/// Back-end specific reading of unsuccessful responses.
pub trait ResponseClassifier: Send + Sync {
    /// Whether `status` means the access token was rejected.
    fn is_unauthorized(&self, status: u16) -> bool {
        status == 401
    }

    /// Map an unsuccessful response onto the error taxonomy.
    fn classify(&self, context: &str, response: &HttpResponse) -> CloudError {
        classify_status(context, response)
    }
}

/// Classifier that only looks at the status code.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusClassifier;

impl ResponseClassifier for StatusClassifier {}

/// 404 → `NotFound`, 409/412 → `Conflict`, everything else → `RemoteError`.
pub fn classify_status(context: &str, response: &HttpResponse) -> CloudError {
    match response.status {
        404 | 410 => CloudError::NotFound(context.to_string()),
        409 | 412 => CloudError::Conflict(context.to_string()),
        status => CloudError::remote(status, error_excerpt(response)),
    }
}

/// Start of the response body, for diagnostics.
pub fn error_excerpt(response: &HttpResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    let mut end = text.len().min(MAX_ERROR_BODY);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].trim().to_string()
}

/// Serialize a JSON request body once so it can be resent on retry.
pub fn json_body<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| CloudError::RemoteError {
            status: None,
            message: format!("Failed to encode request body: {}", e),
        })
}

/// Authenticated request runner bound to one [`Connection`].
#[derive(Clone)]
pub struct RequestExecutor {
    http_client: Arc<dyn HttpClient>,
    connection: Connection,
    classifier: Arc<dyn ResponseClassifier>,
}

impl RequestExecutor {
    pub fn new(http_client: Arc<dyn HttpClient>, connection: Connection) -> Self {
        Self {
            http_client,
            connection,
            classifier: Arc::new(StatusClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ResponseClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn classifier(&self) -> &dyn ResponseClassifier {
        self.classifier.as_ref()
    }

    /// Run a request built by `build`, returning the successful response.
    ///
    /// `build` is called once per attempt; `context` names the operation in
    /// errors and logs.
    #[instrument(skip(self, build), fields(provider = %self.connection.provider()))]
    pub async fn execute<F>(&self, context: &str, build: F) -> Result<HttpResponse>
    where
        F: Fn() -> HttpRequest + Send + Sync,
    {
        let response = self
            .with_authorization(
                context,
                |token| self.http_client.execute(build().bearer_token(token)),
                |response: &HttpResponse| response.status,
            )
            .await?;

        if response.is_success() {
            debug!(status = response.status, "Request succeeded");
            Ok(response)
        } else {
            Err(self.classifier.classify(context, &response))
        }
    }

    /// [`execute`](Self::execute) and decode the body as JSON.
    pub async fn execute_json<T, F>(&self, context: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> HttpRequest + Send + Sync,
    {
        let response = self.execute(context, build).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Like [`execute`](Self::execute) but leaves the body unread.
    #[instrument(skip(self, build), fields(provider = %self.connection.provider()))]
    pub async fn execute_streaming<F>(&self, context: &str, build: F) -> Result<StreamingResponse>
    where
        F: Fn() -> HttpRequest + Send + Sync,
    {
        let response = self
            .with_authorization(
                context,
                |token| self.http_client.execute_streaming(build().bearer_token(token)),
                |response: &StreamingResponse| response.status,
            )
            .await?;

        if response.is_success() {
            return Ok(response);
        }

        let buffered = response.into_response().await?;
        Err(self.classifier.classify(context, &buffered))
    }

    async fn with_authorization<R, S, Fut>(
        &self,
        context: &str,
        mut send: S,
        status_of: impl Fn(&R) -> u16,
    ) -> Result<R>
    where
        S: FnMut(String) -> Fut,
        Fut: Future<Output = bridge_traits::error::Result<R>>,
    {
        let token = self.connection.access_token().await?;
        let response = send(token.clone()).await?;

        let status = status_of(&response);
        if !self.classifier.is_unauthorized(status) {
            return Ok(response);
        }

        info!(status, context, "Access token rejected, refreshing");
        let fresh = self.connection.refresh_rejected(&token).await?;

        let response = send(fresh).await?;
        let status = status_of(&response);
        if !self.classifier.is_unauthorized(status) {
            return Ok(response);
        }

        warn!(status, context, "Access token rejected after refresh, logging out");
        if let Err(e) = self.connection.logout().await {
            warn!(error = %e, "Failed to clear credentials after repeated rejection");
        }

        Err(CloudError::AuthExpired(format!(
            "{}: access token rejected after refresh",
            context
        )))
    }
}
