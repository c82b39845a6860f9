use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntegrationError>;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Unable to complete network request: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("{message}")]
    ApiRequest {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("Authentication failed with status {status} after refreshing the access token")]
    AuthRetryExhausted { status: u16 },

    #[error("Unable to refresh token: {0}")]
    TokenRefresh(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Plain error object handed back to the host instead of a Rust error.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReadableError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl IntegrationError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NetworkError",
            Self::ApiRequest { .. } | Self::AuthRetryExhausted { .. } => "ApiRequestError",
            Self::TokenRefresh(_) => "TokenRefreshError",
            Self::Config(_) => "ConfigError",
            Self::Validation(_) => "ValidationError",
            Self::Json(_) => "JsonError",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn readable(&self) -> ReadableError {
        let detail = match self {
            Self::Network { source, .. } => source
                .as_ref()
                .map(|e| serde_json::json!({ "cause": e.to_string() })),
            Self::ApiRequest { status, body, .. } => {
                Some(serde_json::json!({ "statusCode": status, "body": body }))
            }
            Self::AuthRetryExhausted { status } => {
                Some(serde_json::json!({ "statusCode": status }))
            }
            _ => None,
        };

        ReadableError {
            name: self.name().to_string(),
            message: self.to_string(),
            detail,
        }
    }

    pub fn to_readable_json(&self) -> Value {
        serde_json::to_value(self.readable())
            .unwrap_or_else(|_| serde_json::json!({ "message": self.to_string() }))
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        IntegrationError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}
