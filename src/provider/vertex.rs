use serde_json::{Value, json};

use super::{Provider, ProviderKind, ProviderSettings, author_content_messages};
use crate::conversation::ParsedAnswer;
use crate::error::{IntegrationError, Result};
use crate::models::{Filter, Turn};
use crate::transport::HttpRequest;

/// Vertex AI `predict` for the chat-bison publisher models.
pub struct VertexProvider;

impl VertexProvider {
    fn default_base_url(location: &str) -> String {
        format!("https://{location}-aiplatform.googleapis.com/v1")
    }
}

impl Provider for VertexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vertex
    }

    fn build_request(
        &self,
        transcript: &[Turn],
        settings: &ProviderSettings,
    ) -> Result<HttpRequest> {
        let project = settings
            .project
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                IntegrationError::Config("A Google Cloud project is required".to_string())
            })?;
        let url = format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:predict",
            settings.base_url_or(Self::default_base_url(&settings.location)),
            project,
            settings.location,
            settings.model
        );
        let body = json!({
            "instances": [{
                "context": settings.system_prompt,
                "examples": [],
                "messages": author_content_messages(transcript, "bot")
            }],
            "parameters": {
                "temperature": settings.temperature,
                "candidateCount": 1
            }
        });
        Ok(HttpRequest::post(url, body))
    }

    fn parse_answer(&self, body: &Value) -> ParsedAnswer {
        let Some(prediction) = body.pointer("/predictions/0") else {
            return ParsedAnswer::Empty;
        };

        // safetyAttributes is an object for text models and a list for chat models.
        let attributes: Vec<Value> = match prediction.get("safetyAttributes") {
            Some(Value::Array(list)) => list.clone(),
            Some(obj @ Value::Object(_)) => vec![obj.clone()],
            _ => Vec::new(),
        };
        let blocked = attributes
            .iter()
            .any(|a| a.get("blocked").and_then(Value::as_bool).unwrap_or(false));

        let content = prediction
            .pointer("/candidates/0/content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());

        match content {
            Some(content) if !blocked => ParsedAnswer::Content(content.to_string()),
            _ if blocked => ParsedAnswer::Filtered(Filter {
                reason: "SAFETY".to_string(),
                message: None,
                safety_ratings: attributes,
            }),
            _ => ParsedAnswer::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            model: "chat-bison@001".to_string(),
            api_key: None,
            project: Some("threat-intel".to_string()),
            location: "us-central1".to_string(),
            base_url: None,
            system_prompt: "ctx".to_string(),
            temperature: 0.2,
            gcloud_path: "gcloud".to_string(),
        }
    }

    #[test]
    fn test_request_shape() {
        let transcript = vec![Turn::user("Q1"), Turn::model("A1"), Turn::user("Q2")];
        let req = VertexProvider.build_request(&transcript, &settings()).unwrap();
        assert_eq!(
            req.url,
            "https://us-central1-aiplatform.googleapis.com/v1/projects/threat-intel/locations/us-central1/publishers/google/models/chat-bison@001:predict"
        );
        assert!(req.query.is_empty());
        assert!(req.bearer_token.is_none());
        let messages = &req.body["instances"][0]["messages"];
        assert_eq!(messages[1]["author"], "bot");
        assert_eq!(messages[2]["content"], "Q2");
    }

    #[test]
    fn test_requires_project() {
        let mut s = settings();
        s.project = None;
        let err = VertexProvider.build_request(&[Turn::user("Q")], &s).unwrap_err();
        assert!(matches!(err, IntegrationError::Config(_)));
    }

    #[test]
    fn test_parse_prediction() {
        let body = json!({
            "predictions": [{
                "candidates": [{ "author": "bot", "content": "An answer." }],
                "safetyAttributes": [{ "blocked": false, "categories": [], "scores": [] }]
            }]
        });
        assert_eq!(
            VertexProvider.parse_answer(&body),
            ParsedAnswer::Content("An answer.".to_string())
        );
    }

    #[test]
    fn test_parse_blocked_prediction() {
        let body = json!({
            "predictions": [{
                "candidates": [{ "author": "bot", "content": "" }],
                "safetyAttributes": { "blocked": true, "categories": ["Violent"], "scores": [0.9] }
            }]
        });
        match VertexProvider.parse_answer(&body) {
            ParsedAnswer::Filtered(filter) => {
                assert_eq!(filter.reason, "SAFETY");
                assert_eq!(filter.safety_ratings[0]["categories"][0], "Violent");
            }
            other => panic!("expected filtered answer, got {other:?}"),
        }
        assert_eq!(
            VertexProvider.parse_answer(&json!({ "predictions": [] })),
            ParsedAnswer::Empty
        );
    }
}
