//! JSON-RPC wire types and call-argument coercion

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier attached to a request so the peer can echo it back.
///
/// Ids are chosen by the caller (`"init-1"`, `"call-1"`, ...). Nothing
/// checks that they are unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A JSON-RPC request or notification.
///
/// A message without an `id` is a notification and the peer sends nothing
/// back for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub const JSONRPC_VERSION: &'static str = "2.0";

    pub fn request(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self {
            jsonrpc: Self::JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: Self::JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    /// Replace the request id, keeping method and params.
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Serialize as a single line of compact JSON, without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A call argument after best-effort type coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ArgValue {
    /// Coerce a raw command-line value.
    ///
    /// A value containing `.` is tried as a float, anything else as an
    /// integer. When the parse fails the original text is kept as-is, so
    /// `"1.2.3"` stays a string and `"007"` becomes `7`. Non-finite floats
    /// have no JSON form and also stay strings.
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        if raw.contains('.') {
            match trimmed.parse::<f64>() {
                Ok(value) if value.is_finite() => Self::Float(value),
                _ => Self::Text(raw.to_string()),
            }
        } else {
            match trimmed.parse::<i64>() {
                Ok(value) => Self::Integer(value),
                Err(_) => Self::Text(raw.to_string()),
            }
        }
    }
}

/// Arguments for a `tools/call` request, keyed by parameter name.
pub type CallArguments = BTreeMap<String, ArgValue>;

/// Build [`CallArguments`] from raw `(key, value)` pairs. Later duplicates win.
pub fn coerce_arguments<K, V>(raw_params: impl IntoIterator<Item = (K, V)>) -> CallArguments
where
    K: Into<String>,
    V: AsRef<str>,
{
    raw_params
        .into_iter()
        .map(|(key, value)| (key.into(), ArgValue::coerce(value.as_ref())))
        .collect()
}

/// Which branch of a response envelope the peer sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Result,
    Error,
    /// Parsed as JSON but carries neither `result` nor `error`.
    Other,
}

impl ResponseKind {
    pub fn of(response: &serde_json::Value) -> Self {
        if response.get("error").is_some() {
            Self::Error
        } else if response.get("result").is_some() {
            Self::Result
        } else {
            Self::Other
        }
    }
}
