use bridge_traits::http::HttpResponse;
use core_cloud::executor::{classify_status, ResponseClassifier};
use core_cloud::CloudError;

use crate::types::ApiErrorEnvelope;

/// Reads Dropbox's `error_summary` on endpoint errors (status 409).
///
/// Summaries look like `path/not_found/..` or
/// `path/conflict/folder/...`; only the tags matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropboxClassifier;

impl ResponseClassifier for DropboxClassifier {
    fn classify(&self, context: &str, response: &HttpResponse) -> CloudError {
        if response.status != 409 {
            return classify_status(context, response);
        }

        let Ok(envelope) = serde_json::from_slice::<ApiErrorEnvelope>(&response.body) else {
            return classify_status(context, response);
        };

        let summary = envelope.error_summary;
        let has_tag = |tag: &str| summary.split('/').any(|part| part == tag);

        if has_tag("not_found") {
            CloudError::NotFound(context.to_string())
        } else if has_tag("not_folder") {
            CloudError::NotADirectory(context.to_string())
        } else if has_tag("not_file") {
            CloudError::Unsupported(format!("{}: path is a folder", context))
        } else if has_tag("conflict") || has_tag("shared_link_already_exists") {
            CloudError::Conflict(context.to_string())
        } else {
            CloudError::remote(response.status, summary)
        }
    }
}
