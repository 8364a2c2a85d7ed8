use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Routine-version configuration carried alongside a step.
///
/// Only the parts this core reads are typed; anything else is passed through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_data_api: Option<CallDataApiConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Configuration for calling an external data API from a routine step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDataApiConfig {
    pub schema: CallDataApiSchema,
    /// Routine-level timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Routine-level retry count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDataApiSchema {
    /// Endpoint URL template.
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Header templates; values may be any JSON and are stringified after resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    /// Body template, resolved structurally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Call-level timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Call-level retry count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ApiAuthentication>,
    /// Output name → dot path (with optional `[index]` segments) into the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<BTreeMap<String, String>>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAuthentication {
    /// "none", "bearer", "apiKey", "basic"
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ApiAuthSettings>,
}

impl ApiAuthentication {
    pub fn is_none(&self) -> bool {
        self.auth_type.eq_ignore_ascii_case("none")
    }

    pub fn service(&self) -> Option<&str> {
        self.settings
            .as_ref()
            .and_then(|s| s.service.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn header_name(&self) -> Option<&str> {
        self.settings.as_ref().and_then(|s| s.header_name.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAuthSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_call_data_api() {
        let cfg: RoutineConfig = serde_json::from_value(json!({
            "callDataApi": {
                "schema": {
                    "endpoint": "https://api.example.com/weather?city={{input.city}}",
                    "authentication": { "type": "apiKey", "settings": { "service": "weather", "headerName": "X-Key" } },
                    "outputMapping": { "temp": "data.main.temp" }
                },
                "timeout": 5000
            },
            "callDataCode": { "ignored": true }
        }))
        .unwrap();

        let api = cfg.call_data_api.unwrap();
        assert_eq!(api.schema.method, "GET");
        assert_eq!(api.timeout, Some(5000));
        let auth = api.schema.authentication.unwrap();
        assert!(!auth.is_none());
        assert_eq!(auth.service(), Some("weather"));
        assert_eq!(auth.header_name(), Some("X-Key"));
        assert!(cfg.extra.contains_key("callDataCode"));
    }

    #[test]
    fn test_blank_service_counts_as_missing() {
        let auth: ApiAuthentication =
            serde_json::from_value(json!({ "type": "bearer", "settings": { "service": "  " } }))
                .unwrap();
        assert!(auth.service().is_none());
    }
}
