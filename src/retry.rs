//! Status-code policy for provider calls.
//!
//! A call gets at most two attempts: the second one only happens after a 401
//! and a successful token refresh.

use serde_json::Value;

use crate::error::IntegrationError;
use crate::transport::HttpResponse;

pub const MAX_AUTH_ATTEMPTS: u8 = 2;

/// Result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Value),
    Unauthorized(HttpResponse),
    Failed(IntegrationError),
}

pub fn classify(response: HttpResponse, api_name: &str) -> AttemptOutcome {
    match response.status {
        200 => AttemptOutcome::Success(response.body),
        401 => AttemptOutcome::Unauthorized(response),
        _ => AttemptOutcome::Failed(api_request_error(response, api_name)),
    }
}

pub fn api_request_error(response: HttpResponse, api_name: &str) -> IntegrationError {
    let message = error_message(&response.body).unwrap_or_else(|| {
        format!(
            "Unexpected status code {} received when making request to the {} API",
            response.status, api_name
        )
    });
    IntegrationError::ApiRequest {
        status: response.status,
        message,
        body: response.body,
    }
}

/// Google APIs nest the message under `error`; some proxies put it at the top level.
fn error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
