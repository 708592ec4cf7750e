//! Builders for the MCP requests the harness sends

use crate::error::{HarnessError, Result};
use crate::protocol::{coerce_arguments, JsonRpcRequest};
use serde_json::json;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "test-client";
pub const CLIENT_VERSION: &str = "1.0.0";

pub const INITIALIZE_ID: &str = "init-1";
pub const LIST_ID: &str = "list-1";
pub const CALL_ID: &str = "call-1";

pub fn build_initialize() -> JsonRpcRequest {
    JsonRpcRequest::request(
        INITIALIZE_ID,
        "initialize",
        Some(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            }
        })),
    )
}

pub fn build_list() -> JsonRpcRequest {
    JsonRpcRequest::request(LIST_ID, "tools/list", None)
}

pub fn build_initialized_notification() -> JsonRpcRequest {
    JsonRpcRequest::notification("notifications/initialized")
}

/// Build a `tools/call` request.
///
/// The tool is identified either by `tool_id` or by `tool_name`. When both
/// are given `tool_id` is used and `tool_name` is ignored. Each raw
/// parameter value goes through [`crate::ArgValue::coerce`].
pub fn build_call<K, V>(
    tool_id: Option<&str>,
    tool_name: Option<&str>,
    raw_params: impl IntoIterator<Item = (K, V)>,
) -> Result<JsonRpcRequest>
where
    K: Into<String>,
    V: AsRef<str>,
{
    let mut params = serde_json::Map::new();
    match (tool_id, tool_name) {
        (Some(id), _) => {
            params.insert("id".into(), json!(id));
        }
        (None, Some(name)) => {
            params.insert("name".into(), json!(name));
        }
        (None, None) => {
            return Err(HarnessError::configuration(
                "either a tool id or a tool name is required for a call request",
            ));
        }
    }

    let arguments = coerce_arguments(raw_params);
    params.insert("arguments".into(), serde_json::to_value(arguments)?);

    Ok(JsonRpcRequest::request(
        CALL_ID,
        "tools/call",
        Some(serde_json::Value::Object(params)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    const NO_PARAMS: [(&str, &str); 0] = [];

    #[test]
    fn initialize_is_deterministic() {
        assert_eq!(build_initialize(), build_initialize());

        let value = serde_json::to_value(build_initialize()).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], "init-1");
        assert_eq!(value["method"], "initialize");
        assert_eq!(value["params"]["protocolVersion"], "2024-11-05");
        assert_eq!(value["params"]["capabilities"], json!({}));
        assert_eq!(value["params"]["clientInfo"]["name"], "test-client");
        assert_eq!(value["params"]["clientInfo"]["version"], "1.0.0");
    }

    #[test]
    fn list_has_no_params() {
        assert_eq!(build_list(), build_list());
        assert_eq!(
            build_list().to_line().unwrap(),
            r#"{"jsonrpc":"2.0","id":"list-1","method":"tools/list"}"#
        );
    }

    #[test]
    fn initialized_notification_has_no_id() {
        let notification = build_initialized_notification();
        assert!(notification.is_notification());
        assert_eq!(notification.method, "notifications/initialized");
    }

    #[test]
    fn call_without_identification_is_rejected() {
        let err = build_call(None, None, [("petId", "10")]).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn call_by_name_coerces_arguments() {
        let request = build_call(None, Some("getPetById"), [("petId", "10")]).unwrap();
        assert_eq!(request.id, Some(RequestId::from("call-1")));
        assert_eq!(request.method, "tools/call");
        assert_eq!(
            request.params,
            Some(json!({"name": "getPetById", "arguments": {"petId": 10}}))
        );
    }

    #[test]
    fn id_takes_precedence_over_name() {
        let request = build_call(Some("GET-pet--petId-"), Some("getPetById"), NO_PARAMS).unwrap();
        let params = request.params.unwrap();
        assert_eq!(params["id"], "GET-pet--petId-");
        assert!(params.get("name").is_none());
        assert_eq!(params["arguments"], json!({}));
    }

    #[test]
    fn call_accepts_owned_pairs() {
        let raw = vec![
            ("weight".to_string(), "4.5".to_string()),
            ("status".to_string(), "available".to_string()),
        ];
        let request = build_call(None, Some("findPets"), raw).unwrap();
        assert_eq!(
            request.params.unwrap()["arguments"],
            json!({"weight": 4.5, "status": "available"})
        );
    }
}
