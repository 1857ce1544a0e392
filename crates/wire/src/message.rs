use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server-advertised configuration, received exactly once per connection
/// attempt, just after transport establishment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub server_id: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub max_payload: u64,
    #[serde(default)]
    pub proto: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default)]
    pub tls_required: bool,
    #[serde(default)]
    pub headers: bool,
    /// Fields advertised by the server that this client doesn't model
    /// explicitly (e.g. cluster/gateway info). Preserved for forward
    /// compatibility, never interpreted.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Client-advertised settings sent as the `CONNECT` command's JSON
/// document. Fields left `None` are omitted from the serialized form
/// entirely (never emitted as `null`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectOptions {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub pedantic: bool,
    #[serde(default)]
    pub tls_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lang: String,
    pub version: String,
    pub protocol: i32,
    #[serde(default)]
    pub echo: bool,
    #[serde(default)]
    pub headers: bool,
    #[serde(default)]
    pub no_responders: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_options_omit_absent_credentials() {
        let opts = ConnectOptions {
            lang: "rust".to_owned(),
            version: "0.1.0".to_owned(),
            protocol: 1,
            ..Default::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(!json.contains("\"user\""));
        assert!(!json.contains("null"));
    }

    #[test]
    fn info_tolerates_unknown_fields() {
        let raw = r#"{"server_id":"abc","max_payload":1048576,"cluster":"foo","ports":[1,2]}"#;
        let info: Info = serde_json::from_str(raw).unwrap();
        assert_eq!(info.server_id, "abc");
        assert_eq!(info.max_payload, 1_048_576);
        assert!(info.extra.contains_key("cluster"));
    }
}
