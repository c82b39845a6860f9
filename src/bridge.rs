//! Line-delimited JSON protocol between a host process and the integration.
//!
//! Each request is `{"id", "method", "params"}` on one line; each reply is
//! `{"id", "result"}` or `{"id", "error"}` on one line. Errors are always the
//! readable JSON form, never a dropped connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IntegrationError, Result};
use crate::integration::Integration;
use crate::models::{Entity, MessagePayload, Options};
use crate::validation::unwrap_option_values;

#[derive(Debug, Deserialize)]
pub struct BridgeRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct BridgeReply {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Deserialize)]
struct LookupParams {
    entities: Vec<Entity>,
    #[serde(default)]
    options: Options,
}

#[derive(Deserialize)]
struct MessageParams {
    payload: MessagePayload,
    #[serde(default)]
    options: Options,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateParams {
    user_options: Value,
}

pub async fn dispatch(integration: &Integration, request: BridgeRequest) -> BridgeReply {
    let id = request.id.clone();
    match call(integration, request).await {
        Ok(result) => BridgeReply {
            id,
            result: Some(result),
            error: None,
        },
        Err(e) => BridgeReply {
            id,
            result: None,
            error: Some(e.to_readable_json()),
        },
    }
}

async fn call(integration: &Integration, request: BridgeRequest) -> Result<Value> {
    match request.method.as_str() {
        "doLookup" => {
            let params: LookupParams = serde_json::from_value(request.params)?;
            let results = integration.do_lookup(params.entities, &params.options).await?;
            Ok(serde_json::to_value(results)?)
        }
        "onMessage" => {
            let params: MessageParams = serde_json::from_value(request.params)?;
            let response = integration.on_message(params.payload, &params.options).await?;
            Ok(serde_json::to_value(response)?)
        }
        "validateOptions" => {
            let params: ValidateParams = serde_json::from_value(request.params)?;
            let options: Options =
                serde_json::from_value(unwrap_option_values(params.user_options))?;
            Ok(serde_json::to_value(integration.validate_options(&options))?)
        }
        other => Err(IntegrationError::Validation(format!("Unknown method '{other}'"))),
    }
}

/// Handle one raw input line and produce the reply line.
pub async fn handle_line(integration: &Integration, line: &str) -> String {
    let reply = match serde_json::from_str::<BridgeRequest>(line) {
        Ok(request) => {
            tracing::debug!(method = %request.method, "Bridge request");
            dispatch(integration, request).await
        }
        Err(e) => {
            tracing::warn!("Malformed bridge request: {}", e);
            BridgeReply {
                id: Value::Null,
                result: None,
                error: Some(IntegrationError::Json(e).to_readable_json()),
            }
        }
    };
    serde_json::to_string(&reply).unwrap_or_else(|e| encoding_failure(&e.to_string()))
}

/// Reply used when a reply itself cannot be serialized.
fn encoding_failure(message: &str) -> String {
    serde_json::json!({
        "id": null,
        "error": { "name": "JsonError", "message": message }
    })
    .to_string()
}
