//! Conversion of discovered tools into oracle function declarations.

use serde_json::{Value, json};
use switchboard_mcp_types::Tool;

/// Reduce a tool's input schema to the parameter shape function-calling
/// dialects accept.
///
/// ```json
/// { "type": "object", "properties": { ... }, "required": [ ... ] }
/// ```
///
/// Missing or malformed `properties` and `required` become empty.
pub fn normalize_parameters(input_schema: &Value) -> Value {
    let properties = input_schema
        .get("properties")
        .filter(|p| p.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));

    let required = input_schema
        .get("required")
        .filter(|r| r.is_array())
        .cloned()
        .unwrap_or_else(|| json!([]));

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Description shown to the oracle, falling back to the owning server.
pub fn tool_description(tool: &Tool, server_id: &str) -> String {
    tool.description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Tool from {server_id}"))
}
