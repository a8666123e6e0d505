//! Content items returned by `tools/call`.
//!
//! Items are kept as their `type` tag plus the remaining raw fields, so
//! content kinds and annotations this crate knows nothing about survive a
//! parse and re-serialize unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Content kind, e.g. `text`, `image`, `resource`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Every other field of the item.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Content {
    /// Create text content.
    pub fn text(text: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::String(text.into()));
        Self {
            kind: "text".to_string(),
            fields,
        }
    }

    /// Get as text if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.fields.get("text").and_then(Value::as_str)
        } else {
            None
        }
    }
}
