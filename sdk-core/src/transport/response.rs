//! Normalized action responses

use crate::error::SealpostError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Error,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Error => "error",
        }
    }
}

/// Every outcome of a transport call, successful or not, in one shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Action-specific payload
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ActionResponse {
    pub fn success(data: Map<String, Value>) -> Self {
        Self {
            status: ActionStatus::Success,
            message: None,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Error,
            message: Some(message.into()),
            data: Map::new(),
        }
    }

    pub fn from_error(err: &SealpostError) -> Self {
        Self::error(err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Normalize a raw HTTP exchange.
    ///
    /// Below 400 the body must be a JSON object; a missing or unrecognized
    /// `status` counts as success. From 400 up a JSON object body is kept with
    /// `status` forced to `error` when absent or unrecognized, anything else
    /// becomes `API Error (<code>): <body>`. A non-string `message` is
    /// rendered as JSON text.
    pub fn from_http(status: u16, body: &str) -> Self {
        if status < 400 {
            parse_object(body, ActionStatus::Success).unwrap_or_else(|e| Self::from_error(&e))
        } else {
            parse_object(body, ActionStatus::Error).unwrap_or_else(|_| {
                Self::from_error(&SealpostError::Server {
                    status,
                    body: body.to_string(),
                })
            })
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "status": "error", "message": "unserializable response" })
        })
    }
}

fn parse_object(body: &str, default_status: ActionStatus) -> Result<ActionResponse, SealpostError> {
    let mut map = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(SealpostError::Decode("response body is not a JSON object")),
        Err(_) => return Err(SealpostError::Decode("response body is not valid JSON")),
    };
    let status_known = matches!(map.get("status"), Some(Value::String(s)) if s == "success" || s == "error");
    if !status_known {
        map.insert("status".into(), Value::String(default_status.as_str().to_string()));
    }
    match map.remove("message") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => {
            map.insert("message".into(), Value::String(message));
        }
        Some(other) => {
            map.insert("message".into(), Value::String(other.to_string()));
        }
    }

    serde_json::from_value(Value::Object(map))
        .map_err(|_| SealpostError::Decode("response body has an unexpected shape"))
}
