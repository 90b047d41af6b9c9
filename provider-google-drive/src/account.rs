use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_auth::{AccountFetcher, AccountSummary, AuthError};
use std::sync::Arc;
use tracing::instrument;

use crate::connector::DRIVE_API_BASE;
use crate::types::AboutResponse;

/// Fetches the signed-in user from `about?fields=user`.
pub struct DriveAccountFetcher {
    http_client: Arc<dyn HttpClient>,
}

impl DriveAccountFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl AccountFetcher for DriveAccountFetcher {
    #[instrument(skip(self, access_token))]
    async fn fetch_account(&self, access_token: &str) -> core_auth::Result<AccountSummary> {
        let request = HttpRequest::get(format!("{}/about?fields=user", DRIVE_API_BASE))
            .bearer_token(access_token.to_string());

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::AccountFetchFailed(format!(
                "about returned status {}",
                response.status
            )));
        }

        let about: AboutResponse = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::AccountFetchFailed(e.to_string()))?;

        let mut account = AccountSummary::new(about.user.permission_id);
        account.display_name = about.user.display_name;
        account.email = about.user.email_address;
        Ok(account)
    }
}
