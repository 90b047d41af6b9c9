use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use bytes::Bytes;
use core_auth::{AccountFetcher, AccountSummary, AuthError};
use std::sync::Arc;
use tracing::instrument;

use crate::connector::API_BASE;
use crate::types::FullAccount;

/// Fetches the signed-in user via `users/get_current_account`.
pub struct DropboxAccountFetcher {
    http_client: Arc<dyn HttpClient>,
}

impl DropboxAccountFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl AccountFetcher for DropboxAccountFetcher {
    #[instrument(skip(self, access_token))]
    async fn fetch_account(&self, access_token: &str) -> core_auth::Result<AccountSummary> {
        // The endpoint takes no arguments but requires a JSON `null` body
        let request = HttpRequest::post(format!("{}/users/get_current_account", API_BASE))
            .bearer_token(access_token)
            .header("Content-Type", "application/json")
            .body(Bytes::from_static(b"null"));

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::AccountFetchFailed(format!(
                "get_current_account returned status {}",
                response.status
            )));
        }

        let account: FullAccount = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::AccountFetchFailed(e.to_string()))?;

        let mut summary = AccountSummary::new(account.account_id);
        summary.display_name = Some(account.name.display_name);
        summary.email = account.email;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::testing::ScriptedHttpClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_account() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(
            200,
            json!({
                "account_id": "dbid:AAH4",
                "name": {"display_name": "Franz Ferdinand", "given_name": "Franz"},
                "email": "franz@example.com"
            }),
        );

        let account = DropboxAccountFetcher::new(http.clone())
            .fetch_account("token")
            .await
            .unwrap();

        assert_eq!(account.account_id, "dbid:AAH4");
        assert_eq!(account.display_name.as_deref(), Some("Franz Ferdinand"));
        assert_eq!(account.email.as_deref(), Some("franz@example.com"));
        assert_eq!(http.requests()[0].body.as_deref(), Some(&b"null"[..]));
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(401, r#"{"error_summary": "invalid_access_token/"}"#);

        let result = DropboxAccountFetcher::new(http).fetch_account("bad").await;
        assert!(matches!(result, Err(AuthError::AccountFetchFailed(_))));
    }
}
