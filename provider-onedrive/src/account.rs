use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_auth::{AccountFetcher, AccountSummary, AuthError};
use std::sync::Arc;
use tracing::instrument;

use crate::connector::GRAPH_BASE;
use crate::types::GraphUser;

/// Fetches the signed-in user from Graph `/me`.
pub struct GraphAccountFetcher {
    http_client: Arc<dyn HttpClient>,
}

impl GraphAccountFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl AccountFetcher for GraphAccountFetcher {
    #[instrument(skip(self, access_token))]
    async fn fetch_account(&self, access_token: &str) -> core_auth::Result<AccountSummary> {
        let request = HttpRequest::get(format!(
            "{}/me?$select=id,displayName,mail,userPrincipalName",
            GRAPH_BASE
        ))
        .bearer_token(access_token);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::AccountFetchFailed(format!(
                "/me returned status {}",
                response.status
            )));
        }

        let user: GraphUser = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::AccountFetchFailed(e.to_string()))?;

        let mut account = AccountSummary::new(user.id);
        account.display_name = user.display_name;
        // Personal accounts often leave `mail` empty
        account.email = user.mail.or(user.user_principal_name);
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::testing::ScriptedHttpClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_falls_back_to_principal_name() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(
            200,
            json!({"id": "u1", "displayName": "Grace", "mail": null, "userPrincipalName": "grace@contoso.com"}),
        );

        let account = GraphAccountFetcher::new(http)
            .fetch_account("token")
            .await
            .unwrap();

        assert_eq!(account.account_id, "u1");
        assert_eq!(account.display_name.as_deref(), Some("Grace"));
        assert_eq!(account.email.as_deref(), Some("grace@contoso.com"));
    }
}
