//! Error classification for Google Drive responses

use bridge_traits::http::HttpResponse;
use core_cloud::executor::{classify_status, error_excerpt, ResponseClassifier};
use core_cloud::CloudError;

use crate::types::ErrorEnvelope;

/// Reads Drive's `{"error": {"errors": [{"reason": ...}]}}` envelope.
///
/// Drive reports some missing resources as 403/`notFound` and rate limits as
/// 403/`rateLimitExceeded`, so the status alone is not enough.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveClassifier;

impl ResponseClassifier for DriveClassifier {
    fn classify(&self, context: &str, response: &HttpResponse) -> CloudError {
        let envelope: Option<ErrorEnvelope> = serde_json::from_slice(&response.body).ok();

        let Some(envelope) = envelope else {
            return classify_status(context, response);
        };

        let reason = envelope
            .error
            .errors
            .first()
            .map(|detail| detail.reason.as_str())
            .unwrap_or_default();

        match reason {
            "notFound" => CloudError::NotFound(context.to_string()),
            "duplicate" => CloudError::Conflict(context.to_string()),
            _ if response.status == 404 || response.status == 409 => {
                classify_status(context, response)
            }
            _ => {
                let message = if envelope.error.message.is_empty() {
                    error_excerpt(response)
                } else {
                    envelope.error.message.clone()
                };
                CloudError::remote(response.status, message)
            }
        }
    }
}
