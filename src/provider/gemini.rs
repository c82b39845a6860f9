use serde_json::{Value, json};

use super::{Provider, ProviderKind, ProviderSettings, conversational_turns};
use crate::conversation::ParsedAnswer;
use crate::error::Result;
use crate::models::{Filter, Speaker, Turn};
use crate::transport::HttpRequest;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the answer was withheld rather than completed.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "OTHER",
];

pub struct GeminiProvider;

impl GeminiProvider {
    fn contents(transcript: &[Turn]) -> Vec<Value> {
        conversational_turns(transcript)
            .map(|turn| {
                let role = match turn.role {
                    Speaker::User => "user",
                    _ => "model",
                };
                json!({ "role": role, "parts": turn.parts })
            })
            .collect()
    }

    fn endpoint(settings: &ProviderSettings, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            settings.base_url_or(GEMINI_API_URL.to_string()),
            settings.model,
            method
        )
    }
}

impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn build_request(
        &self,
        transcript: &[Turn],
        settings: &ProviderSettings,
    ) -> Result<HttpRequest> {
        let api_key = settings.require_api_key()?;
        let body = json!({
            "contents": Self::contents(transcript),
            "systemInstruction": { "parts": [{ "text": settings.system_prompt }] },
            "generationConfig": {
                "temperature": settings.temperature,
                "candidateCount": 1
            }
        });
        Ok(HttpRequest::post(Self::endpoint(settings, "generateContent"), body)
            .with_query("key", api_key))
    }

    fn parse_answer(&self, body: &Value) -> ParsedAnswer {
        let Some(candidate) = body.pointer("/candidates/0") else {
            // No candidate at all usually means the prompt itself was blocked.
            if let Some(reason) = body
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
            {
                return ParsedAnswer::Filtered(Filter {
                    reason: reason.to_string(),
                    message: None,
                    safety_ratings: ratings(body.pointer("/promptFeedback/safetyRatings")),
                });
            }
            return ParsedAnswer::Empty;
        };

        let text = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if !text.is_empty() {
            return ParsedAnswer::Content(text);
        }

        match candidate.get("finishReason").and_then(Value::as_str) {
            Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => {
                ParsedAnswer::Filtered(Filter {
                    reason: reason.to_string(),
                    message: None,
                    safety_ratings: ratings(candidate.get("safetyRatings")),
                })
            }
            _ => ParsedAnswer::Empty,
        }
    }

    fn count_tokens_request(
        &self,
        transcript: &[Turn],
        settings: &ProviderSettings,
    ) -> Option<Result<HttpRequest>> {
        Some(settings.require_api_key().map(|api_key| {
            HttpRequest::post(
                Self::endpoint(settings, "countTokens"),
                json!({ "contents": Self::contents(transcript) }),
            )
            .with_query("key", api_key)
        }))
    }

    fn parse_token_count(&self, body: &Value) -> Option<u64> {
        body.get("totalTokens").and_then(Value::as_u64)
    }
}

fn ratings(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
