//! Shared JSON-RPC protocol types for the stdio and HTTP transports.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::NexusError;

/// Method prefix for tool invocations; the tool name is the last path segment.
pub const TOOLS_CALL_PREFIX: &str = "tools/call/";
/// Method prefix for notifications, which never get a reply.
pub const NOTIFICATIONS_PREFIX: &str = "notifications/";

/// Leading `"id"` member of a truncated or otherwise unparseable object.
static LEADING_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*\{\s*"id"\s*:\s*(-?\d+(?:\.\d+)?|"(?:[^"\\]|\\.)*")"#)
        .expect("leading id pattern is valid")
});

/// Keeps an explicit `"id": null` distinct from a missing `id`.
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Incoming message from either transport.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

/// A line that could not be decoded into a [`Message`].
#[derive(Debug, Clone)]
pub struct MalformedMessage {
    /// Caller id salvaged from the line, if any. Never `null`.
    pub id: Option<Value>,
    pub reason: String,
}

impl Message {
    pub fn new(id: Option<Value>, method: impl Into<String>, params: Option<Map<String, Value>>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Decode one stdio line. On failure, try to salvage the caller's `id`.
    pub fn from_line(line: &str) -> Result<Self, MalformedMessage> {
        serde_json::from_str::<Message>(line).map_err(|e| MalformedMessage {
            id: recover_id(line),
            reason: e.to_string(),
        })
    }

    /// Classified view of `method`.
    pub fn kind(&self) -> Method {
        Method::classify(&self.method)
    }

    /// Params as a JSON value; missing or `null` params become `{}`.
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone().unwrap_or_default())
    }
}

/// Best-effort `id` recovery: a full JSON parse first, then a leading `"id"` member.
fn recover_id(line: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(line) {
        return value.get("id").filter(|id| !id.is_null()).cloned();
    }

    let raw = LEADING_ID.captures(line)?.get(1)?.as_str();
    serde_json::from_str::<Value>(raw).ok()
}

/// Closed set of methods, classified once per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ListTools,
    /// Tool name taken from the final `/`-delimited segment.
    CallTool(String),
    /// Notification kind (the part after `notifications/`).
    Notification(String),
    Unknown(String),
}

impl Method {
    pub fn classify(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialize,
            "tools/list" => Self::ListTools,
            m if m.starts_with(TOOLS_CALL_PREFIX) => {
                let name = m.rsplit('/').next().unwrap_or_default();
                Self::CallTool(name.to_string())
            }
            m if m.starts_with(NOTIFICATIONS_PREFIX) => {
                Self::Notification(m[NOTIFICATIONS_PREFIX.len()..].to_string())
            }
            m => Self::Unknown(m.to_string()),
        }
    }
}

/// Error object carried by a failed [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
}

/// Exactly one of `result` / `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorEnvelope),
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

impl Response {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            outcome: Outcome::Error(ErrorEnvelope {
                code,
                message: message.into(),
            }),
        }
    }

    /// Build an error response from a [`NexusError`].
    pub fn from_nexus_error(id: Option<Value>, err: NexusError) -> Self {
        let (code, message) = err.into_rpc();
        Self::error(id, code, message)
    }
}

#[cfg(test)]
impl Response {
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    pub fn error_envelope(&self) -> Option<&ErrorEnvelope> {
        match &self.outcome {
            Outcome::Result(_) => None,
            Outcome::Error(e) => Some(e),
        }
    }
}

/// Anything that turns a [`Message`] into at most one [`Response`].
///
/// Implemented by the local dispatcher and by the HTTP bridge client, so the
/// stdio engine does not care where tools actually run.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> Option<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_methods() {
        assert_eq!(Method::classify("initialize"), Method::Initialize);
        assert_eq!(Method::classify("tools/list"), Method::ListTools);
        assert_eq!(
            Method::classify("tools/call/fs_read_file"),
            Method::CallTool("fs_read_file".into())
        );
        assert_eq!(
            Method::classify("tools/call/ns/deep/name"),
            Method::CallTool("name".into())
        );
        assert_eq!(Method::classify("tools/call/"), Method::CallTool(String::new()));
        assert_eq!(
            Method::classify("notifications/initialized"),
            Method::Notification("initialized".into())
        );
        assert_eq!(Method::classify("tools/call"), Method::Unknown("tools/call".into()));
        assert_eq!(Method::classify("ping"), Method::Unknown("ping".into()));
    }

    #[test]
    fn test_message_id_absent_vs_null() {
        let absent = Message::from_line(r#"{"method":"initialize"}"#).unwrap();
        assert_eq!(absent.id, None);

        let null = Message::from_line(r#"{"id":null,"method":"initialize"}"#).unwrap();
        assert_eq!(null.id, Some(Value::Null));

        let string = Message::from_line(r#"{"id":"abc","method":"tools/list"}"#).unwrap();
        assert_eq!(string.id, Some(json!("abc")));
    }

    #[test]
    fn test_params_must_be_mapping_or_null() {
        let msg = Message::from_line(r#"{"id":1,"method":"x","params":null}"#).unwrap();
        assert_eq!(msg.params_value(), json!({}));

        let bad = Message::from_line(r#"{"id":7,"method":"x","params":[1,2]}"#).unwrap_err();
        assert_eq!(bad.id, Some(json!(7)));
    }

    #[test]
    fn test_recover_id() {
        let err = Message::from_line("not json at all").unwrap_err();
        assert_eq!(err.id, None);

        // Valid JSON, but no method.
        let err = Message::from_line(r#"{"id":4}"#).unwrap_err();
        assert_eq!(err.id, Some(json!(4)));

        // Explicit null is not a usable id.
        let err = Message::from_line(r#"{"id":null}"#).unwrap_err();
        assert_eq!(err.id, None);

        // Truncated line with a leading id.
        let err = Message::from_line(r#"{"id": "req-9", "method": "tools/li"#).unwrap_err();
        assert_eq!(err.id, Some(json!("req-9")));

        // An "id" buried in params of a truncated line is not trusted.
        let err = Message::from_line(r#"{"method":"x","params":{"id":3"#).unwrap_err();
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::success(Some(json!(1)), json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {"a": 1}}));

        let err = serde_json::to_value(Response::error(Some(json!(2)), -32601, "Method not found"))
            .unwrap();
        assert_eq!(
            err,
            json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "Method not found"}})
        );

        let no_id = serde_json::to_value(Response::success(None, json!(true))).unwrap();
        assert!(no_id.get("id").is_none());
    }

    #[test]
    fn test_response_decodes_from_wire() {
        let resp: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32000,"message":"x"}}"#)
                .unwrap();
        assert_eq!(resp.id, Some(json!(3)));
        assert_eq!(resp.error_envelope().map(|e| e.code), Some(-32000));
        assert!(resp.result().is_none());

        let resp: Response = serde_json::from_str(r#"{"id":"a","result":[1,2]}"#).unwrap();
        assert_eq!(resp.result(), Some(&json!([1, 2])));
    }
}
