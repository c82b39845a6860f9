use serde_json::{Value, json};

use super::{Provider, ProviderKind, ProviderSettings, author_content_messages};
use crate::conversation::ParsedAnswer;
use crate::error::Result;
use crate::models::{Filter, Turn};
use crate::transport::HttpRequest;

const PALM_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta2";

/// The `generateMessage` chat endpoint (Bard / PaLM 2).
pub struct PalmProvider;

impl Provider for PalmProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Palm
    }

    fn build_request(
        &self,
        transcript: &[Turn],
        settings: &ProviderSettings,
    ) -> Result<HttpRequest> {
        let api_key = settings.require_api_key()?;
        let url = format!(
            "{}/models/{}:generateMessage",
            settings.base_url_or(PALM_API_URL.to_string()),
            settings.model
        );
        let body = json!({
            "prompt": {
                "context": settings.system_prompt,
                "examples": [],
                "messages": author_content_messages(transcript, "model")
            },
            "temperature": settings.temperature,
            "candidateCount": 1
        });
        Ok(HttpRequest::post(url, body).with_query("key", api_key))
    }

    fn parse_answer(&self, body: &Value) -> ParsedAnswer {
        if let Some(content) = body
            .pointer("/candidates/0/content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
        {
            return ParsedAnswer::Content(content.to_string());
        }

        if let Some(filter) = body.pointer("/filters/0") {
            return ParsedAnswer::Filtered(Filter {
                reason: filter
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("BLOCKED_REASON_UNSPECIFIED")
                    .to_string(),
                message: filter
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                safety_ratings: Vec::new(),
            });
        }

        ParsedAnswer::Empty
    }
}
