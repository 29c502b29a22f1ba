use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped message travelling on the bus: `{type, tabId, ...payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "tabId", default)]
    pub tab_id: String,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, tab_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            tab_id: tab_id.into(),
            payload: Map::new(),
        }
    }

    /// Build an envelope whose payload fields come from a serializable struct
    ///
    /// Non-object payloads (unit structs, `()`) produce an empty payload.
    pub fn with_payload<T: Serialize>(
        kind: impl Into<String>,
        tab_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        let mut envelope = Self::new(kind, tab_id);
        match serde_json::to_value(payload).context("Failed to serialize payload")? {
            Value::Object(fields) => envelope.payload = fields,
            Value::Null => {}
            other => anyhow::bail!("Envelope payload must be an object, got {}", other),
        }
        Ok(envelope)
    }

    /// Add a single payload field
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Decode the payload into a typed message
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.payload.clone()))
            .with_context(|| format!("Malformed {} payload", self.kind))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to encode envelope")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to decode envelope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_flattens_payload() {
        let envelope = Envelope::new("START_RECORDING", "tab-1").with("quality", "high");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            json,
            json!({"type": "START_RECORDING", "tabId": "tab-1", "quality": "high"})
        );
    }

    #[test]
    fn test_envelope_collects_unknown_fields() {
        let envelope = Envelope::from_bytes(
            br#"{"type":"start-recording-response","tabId":"tab-9","success":false,"error":"denied"}"#,
        )
        .unwrap();

        assert!(envelope.is("start-recording-response"));
        assert_eq!(envelope.tab_id, "tab-9");
        assert_eq!(envelope.field("success"), Some(&json!(false)));
        assert_eq!(envelope.str_field("error"), Some("denied"));
    }

    #[test]
    fn test_missing_tab_id_defaults_to_empty() {
        let envelope = Envelope::from_bytes(br#"{"type":"GET_AUTH_STATUS"}"#).unwrap();
        assert_eq!(envelope.tab_id, "");
        assert!(envelope.payload.is_empty());
    }

    #[test]
    fn test_with_payload_rejects_scalars() {
        assert!(Envelope::with_payload("X", "tab-1", &42).is_err());
        assert!(Envelope::with_payload("X", "tab-1", &()).unwrap().payload.is_empty());
    }
}
