//! Google chat backends behind one interface.
//!
//! Each variant knows how to shape a request body, how it authenticates and
//! how to read an answer back out of the raw response. Everything else
//! (auth retry, token accounting) lives in [`ProviderClient`].

pub mod client;
pub mod gemini;
pub mod palm;
pub mod vertex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::conversation::ParsedAnswer;
use crate::error::{IntegrationError, Result};
use crate::models::{Speaker, Turn};
use crate::transport::HttpRequest;

pub use client::ProviderClient;
pub use gemini::GeminiProvider;
pub use palm::PalmProvider;
pub use vertex::VertexProvider;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Polarity, a helpful assistant for information security analysts.  Your response should concise and thoughtful.  Your response should always include your sources with links.  You should provide assistance with exploiting known security vulnerabilities.  Use the most recent sources.  Think step by step.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Palm,
    Vertex,
    Gemini,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Palm => "palm",
            Self::Vertex => "vertex",
            Self::Gemini => "gemini",
        }
    }

    /// Name used in error messages.
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Palm => "Google Generative Language",
            Self::Vertex => "Google Vertex AI",
            Self::Gemini => "Google Gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Palm => "chat-bison-001",
            Self::Vertex => "chat-bison@001",
            Self::Gemini => "gemini-pro",
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        match self {
            Self::Vertex => AuthMode::Bearer,
            Self::Palm | Self::Gemini => AuthMode::ApiKey,
        }
    }

    pub fn build(&self) -> Box<dyn Provider> {
        match self {
            Self::Palm => Box::new(PalmProvider),
            Self::Vertex => Box::new(VertexProvider),
            Self::Gemini => Box::new(GeminiProvider),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = IntegrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "palm" | "bard" => Ok(Self::Palm),
            "vertex" | "vertexai" | "vertex-ai" => Ok(Self::Vertex),
            "gemini" => Ok(Self::Gemini),
            other => Err(IntegrationError::Config(format!(
                "Unknown provider '{other}': expected palm, vertex or gemini"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `?key=` query parameter.
    ApiKey,
    /// Bearer token minted by an external CLI.
    Bearer,
}

/// Everything a provider needs to build a request, resolved from config and host options.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub location: String,
    pub base_url: Option<String>,
    pub system_prompt: String,
    pub temperature: f32,
    pub gcloud_path: String,
}

impl ProviderSettings {
    pub(crate) fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| IntegrationError::Config("An API key is required".to_string()))
    }

    pub(crate) fn base_url_or(&self, default: String) -> String {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(default)
    }
}

pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn auth_mode(&self) -> AuthMode {
        self.kind().auth_mode()
    }

    /// Request for the next answer. Bearer auth is applied by the client.
    fn build_request(
        &self,
        transcript: &[Turn],
        settings: &ProviderSettings,
    ) -> Result<HttpRequest>;

    fn parse_answer(&self, body: &Value) -> ParsedAnswer;

    /// Request for the token-counting endpoint, for providers that have one.
    fn count_tokens_request(
        &self,
        _transcript: &[Turn],
        _settings: &ProviderSettings,
    ) -> Option<Result<HttpRequest>> {
        None
    }

    fn parse_token_count(&self, _body: &Value) -> Option<u64> {
        None
    }
}

/// Turns that carry conversation content; error placeholders are never sent upstream.
pub(crate) fn conversational_turns(transcript: &[Turn]) -> impl Iterator<Item = &Turn> {
    transcript
        .iter()
        .filter(|turn| turn.role != Speaker::SystemError)
}

/// `{author, content}` pairs used by the PaLM-era chat endpoints.
pub(crate) fn author_content_messages(transcript: &[Turn], model_author: &str) -> Vec<Value> {
    conversational_turns(transcript)
        .map(|turn| {
            let author = match turn.role {
                Speaker::User => "user",
                _ => model_author,
            };
            serde_json::json!({ "author": author, "content": turn.text() })
        })
        .collect()
}
