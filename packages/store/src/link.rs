//! IPLD-style links.
//!
//! Logical documents represent links to other objects as `{"/": "<cid>"}`.
//! Some producers emit bare CID strings instead; the deserializer accepts
//! both so upstream manifests load either way.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A link to another object in the store, serialized as `{"/": "<cid>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    #[serde(rename = "/")]
    pub cid: String,
}

impl Link {
    /// Create a link to the given CID.
    pub fn new(cid: impl Into<String>) -> Self {
        Self { cid: cid.into() }
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Map {
                #[serde(rename = "/")]
                cid: String,
            },
            Plain(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Map { cid } => Ok(Link { cid }),
            Repr::Plain(cid) => Ok(Link { cid }),
        }
    }
}

impl From<&str> for Link {
    fn from(cid: &str) -> Self {
        Link::new(cid)
    }
}

impl From<String> for Link {
    fn from(cid: String) -> Self {
        Link { cid }
    }
}

/// Extract the CID out of a raw link value, tolerating both encodings.
pub fn link_cid(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.get("/").and_then(Value::as_str),
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_as_slash_map() {
        let link = Link::new("bafyabc");
        assert_eq!(serde_json::to_value(&link).unwrap(), json!({"/": "bafyabc"}));
    }

    #[test]
    fn test_deserializes_both_encodings() {
        let from_map: Link = serde_json::from_value(json!({"/": "bafyabc"})).unwrap();
        let from_str: Link = serde_json::from_value(json!("bafyabc")).unwrap();
        assert_eq!(from_map, from_str);
        assert_eq!(from_map.cid, "bafyabc");
    }

    #[test]
    fn test_link_cid_helper() {
        assert_eq!(link_cid(&json!({"/": "a"})), Some("a"));
        assert_eq!(link_cid(&json!("b")), Some("b"));
        assert_eq!(link_cid(&json!(42)), None);
        assert_eq!(link_cid(&json!({"other": "x"})), None);
    }
}
