use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accepts a plain value or a host select object (`{"value": ..., "display": ...}`)
/// and yields the value as a string.
fn deserialize_select_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SelectValue {
        Text(String),
        Int(i64),
        Float(f64),
        Select { value: Box<SelectValue> },
        Null,
    }

    fn flatten(value: SelectValue) -> Option<String> {
        match value {
            SelectValue::Text(s) => Some(s),
            SelectValue::Int(i) => Some(i.to_string()),
            SelectValue::Float(f) => Some(f.to_string()),
            SelectValue::Select { value } => flatten(*value),
            SelectValue::Null => None,
        }
    }

    Ok(flatten(SelectValue::deserialize(deserializer)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "user", alias = "0")]
    User,
    #[serde(rename = "model", alias = "bot", alias = "assistant", alias = "1")]
    Model,
    #[serde(rename = "system-error")]
    SystemError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// Why a provider suppressed an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<Value>,
}

/// One message in a conversation.
///
/// Serialized as `{"role", "parts", "filter"?}`. The flat `{"author", "content"}`
/// shape used by older chat endpoints is accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTurn")]
pub struct Turn {
    pub role: Speaker,
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

#[derive(Deserialize)]
struct RawTurn {
    #[serde(alias = "author")]
    role: Speaker,
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    filter: Option<Filter>,
}

impl From<RawTurn> for Turn {
    fn from(raw: RawTurn) -> Self {
        let mut parts = raw.parts;
        if parts.is_empty() {
            if let Some(content) = raw.content {
                parts.push(Part { text: content });
            }
        }
        Self {
            role: raw.role,
            parts,
            filter: raw.filter,
        }
    }
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            parts: vec![Part { text: text.into() }],
            filter: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Model,
            parts: vec![Part { text: text.into() }],
            filter: None,
        }
    }

    pub fn system_error(filter: Filter) -> Self {
        Self {
            role: Speaker::SystemError,
            parts: Vec::new(),
            filter: Some(filter),
        }
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub type Transcript = Vec<Turn>;

/// Normalized reply from a provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub turn: Turn,
    pub token_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub user: UserContext,
}

fn default_gcloud_path() -> String {
    "gcloud".to_string()
}

fn default_disclaimer() -> String {
    "Please affirm that no confidential information will be shared with your submission to Google. Click Accept to run your search.".to_string()
}

fn default_disclaimer_interval() -> Option<String> {
    Some("all".to_string())
}

/// Per-call option values supplied by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default, deserialize_with = "deserialize_select_value")]
    pub api_key: Option<String>,
    #[serde(default, deserialize_with = "deserialize_select_value")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_select_value")]
    pub project: Option<String>,
    #[serde(default, deserialize_with = "deserialize_select_value")]
    pub location: Option<String>,
    #[serde(default = "default_gcloud_path")]
    pub gcloud_path: String,
    #[serde(default)]
    pub show_disclaimer: bool,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
    #[serde(
        default = "default_disclaimer_interval",
        deserialize_with = "deserialize_select_value"
    )]
    pub disclaimer_interval: Option<String>,
    #[serde(default)]
    pub log_searches: bool,
    #[serde(default)]
    pub answer_on_lookup: Option<bool>,
    #[serde(rename = "_request", default)]
    pub request: RequestContext,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            project: None,
            location: None,
            gcloud_path: default_gcloud_path(),
            show_disclaimer: false,
            disclaimer: default_disclaimer(),
            disclaimer_interval: default_disclaimer_interval(),
            log_searches: false,
            answer_on_lookup: None,
            request: RequestContext::default(),
        }
    }
}

impl Options {
    pub fn user(&self) -> &UserContext {
        &self.request.user
    }
}

/// An entity recognized by the host. Fields other than `value` are passed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupDetails {
    pub question: String,
    pub username: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub show_disclaimer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub log_searches: bool,
    pub responses: Transcript,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupData {
    pub summary: Vec<String>,
    pub details: LookupDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub entity: Entity,
    pub data: LookupData,
}

/// Follow-up actions posted by the host UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum MessagePayload {
    #[serde(rename = "question")]
    Question {
        responses: Transcript,
        #[serde(default, rename = "acceptedDisclaimer")]
        accepted_disclaimer: bool,
    },
    #[serde(rename = "declineDisclaimer")]
    DeclineDisclaimer {
        #[serde(default)]
        search: Transcript,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub responses: Transcript,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    pub accepted_disclaimer: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub declined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionError {
    pub key: String,
    pub message: String,
}
