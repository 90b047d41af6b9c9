use bridge_traits::http::HttpResponse;
use core_cloud::executor::{classify_status, ResponseClassifier};
use core_cloud::CloudError;

use crate::types::GraphErrorEnvelope;

/// Maps Graph error codes onto the storage taxonomy.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphClassifier;

impl ResponseClassifier for GraphClassifier {
    fn classify(&self, context: &str, response: &HttpResponse) -> CloudError {
        let Ok(envelope) = serde_json::from_slice::<GraphErrorEnvelope>(&response.body) else {
            return classify_status(context, response);
        };

        match envelope.error.code.as_str() {
            "itemNotFound" => CloudError::NotFound(context.to_string()),
            "nameAlreadyExists" => CloudError::Conflict(context.to_string()),
            _ if matches!(response.status, 404 | 409 | 410 | 412) => {
                classify_status(context, response)
            }
            code => CloudError::remote(
                response.status,
                format!("{}: {}", code, envelope.error.message),
            ),
        }
    }
}
