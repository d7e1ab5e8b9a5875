//! HTTP utility functions for consistent error handling across API clients

use reqwest::Response;
use tracing::warn;

use crate::errors::{SyncError, SyncResult};

/// Turn a non-success response into `UpstreamStatus`, logging the body
pub async fn handle_api_response(service: &str, response: Response) -> SyncResult<Response> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!("{} API error: {} - {}", service, status, error_text);
        return Err(SyncError::UpstreamStatus {
            service: service.to_string(),
            status: status.as_u16(),
            body: error_text,
        });
    }
    Ok(response)
}

/// Map a failed send into a transport error for the named service
pub fn transport_error(service: &str, error: reqwest::Error) -> SyncError {
    SyncError::Transport {
        service: service.to_string(),
        message: error.to_string(),
    }
}

/// Parse JSON response with consistent error handling
pub async fn parse_json_response<T>(response: Response, context: &str) -> SyncResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let body = response.text().await.map_err(|e| SyncError::Transport {
        service: context.to_string(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&body).map_err(|e| SyncError::Decode {
        context: context.to_string(),
        message: e.to_string(),
    })
}
