use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::disclaimer::DisclaimerPolicy;
use crate::models::{OptionError, Options};
use crate::provider::{AuthMode, ProviderKind};

/// A single line of 5-256 characters ending in a question mark.
static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*[^\r\n]{5,256}\?[ \t]*$").expect("question pattern is valid")
});

pub fn is_question(text: &str) -> bool {
    QUESTION_RE.is_match(text)
}

/// Host option payloads wrap every value as `{"value": ...}`; strip that layer.
pub fn unwrap_option_values(options: Value) -> Value {
    match options {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::Object(mut inner)
                            if key != "_request" && inner.contains_key("value") =>
                        {
                            inner.remove("value").unwrap_or(Value::Null)
                        }
                        other => other,
                    };
                    (key, value)
                })
                .collect(),
        ),
        other => other,
    }
}

pub fn validate_options(options: &Options, kind: ProviderKind) -> Vec<OptionError> {
    let mut errors = Vec::new();
    let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

    match kind.auth_mode() {
        AuthMode::ApiKey => {
            if blank(&options.api_key) {
                errors.push(OptionError {
                    key: "apiKey".to_string(),
                    message: "You must provide a Google Cloud API key".to_string(),
                });
            }
        }
        AuthMode::Bearer => {
            if blank(&options.project) {
                errors.push(OptionError {
                    key: "project".to_string(),
                    message: "You must provide a Google Cloud project ID".to_string(),
                });
            }
            if options.gcloud_path.trim().is_empty() {
                errors.push(OptionError {
                    key: "gcloudPath".to_string(),
                    message: "You must provide the path to the gcloud CLI".to_string(),
                });
            }
        }
    }

    if let Err(e) = DisclaimerPolicy::parse_interval(options.disclaimer_interval.as_deref()) {
        errors.push(OptionError {
            key: "disclaimerInterval".to_string(),
            message: e.to_string(),
        });
    }

    if options.show_disclaimer && options.disclaimer.trim().is_empty() {
        errors.push(OptionError {
            key: "disclaimer".to_string(),
            message: "Disclaimer content cannot be empty when the disclaimer is enabled"
                .to_string(),
        });
    }

    errors
}
