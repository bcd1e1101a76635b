//! Synthesizes a JSON document that validates against a JSON-Schema object,
//! for `response_format: {type: "json_schema"}` and tool-call arguments.
//!
//! This is not a general schema validator — it produces one plausible
//! instance covering `type`, `properties`/`required`, `items` and `enum`,
//! which is what a fabricated response needs.

use serde_json::{json, Value};

pub fn synthesize(schema: &Value) -> Value {
    let kind = schema.get("type").and_then(Value::as_str).unwrap_or("object");

    if let Some(choices) = schema.get("enum").and_then(Value::as_array)
        && let Some(first) = choices.first()
    {
        return first.clone();
    }

    match kind {
        "object" => {
            let mut out = serde_json::Map::new();
            let properties = schema.get("properties").and_then(Value::as_object);
            let required: Vec<&str> = schema.get("required").and_then(Value::as_array).map(|r| r.iter().filter_map(Value::as_str).collect()).unwrap_or_default();

            if let Some(properties) = properties {
                for (name, prop_schema) in properties {
                    if required.is_empty() || required.contains(&name.as_str()) {
                        out.insert(name.clone(), synthesize(prop_schema));
                    }
                }
            }
            Value::Object(out)
        }
        "array" => {
            let item_schema = schema.get("items").cloned().unwrap_or_else(|| json!({"type": "string"}));
            Value::Array(vec![synthesize(&item_schema)])
        }
        "string" => json!("generated"),
        "integer" => json!(0),
        "number" => json!(0.0),
        "boolean" => json!(true),
        "null" => Value::Null,
        _ => json!("generated"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_required_object_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}},
            "required": ["name"]
        });
        let value = synthesize(&schema);
        assert!(value.get("name").is_some());
        assert!(value.get("age").is_none());
    }

    #[test]
    fn enum_picks_first_choice() {
        let schema = json!({"enum": ["a", "b", "c"]});
        assert_eq!(synthesize(&schema), json!("a"));
    }

    #[test]
    fn array_synthesizes_one_item() {
        let schema = json!({"type": "array", "items": {"type": "integer"}});
        let value = synthesize(&schema);
        assert_eq!(value, json!([0]));
    }
}
