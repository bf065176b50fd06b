use serde::{Deserialize, Serialize};

/// One feed event. The payload is carried as-is; no field is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(serde_json::Value);

impl Record {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Parse one raw message as a generic JSON value.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw).map(Self)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Record {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_structures() {
        let raw = br#"{"did":"did:plc:abc","commit":{"ops":[1,2,{"x":null}]},"time_us":17}"#;
        let record = Record::decode(raw).unwrap();
        assert_eq!(
            record.value(),
            &json!({"did": "did:plc:abc", "commit": {"ops": [1, 2, {"x": null}]}, "time_us": 17})
        );
    }

    #[test]
    fn decodes_scalars() {
        assert_eq!(Record::decode(b"42").unwrap(), Record::new(json!(42)));
        assert_eq!(Record::decode(b" \"hi\" ").unwrap(), Record::new(json!("hi")));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Record::decode(b"{\"unterminated\":").is_err());
        assert!(Record::decode(b"").is_err());
        assert!(Record::decode(b"{} trailing").is_err());
    }

    #[test]
    fn serializes_transparently() {
        let record = Record::new(json!({"a": [1, "two"]}));
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"a":[1,"two"]}"#);
    }
}
