//! `{{name}}` placeholder substitution for request templates.
//!
//! Names are word characters only. Unknown names become the empty string,
//! anything else between braces is left untouched.

use serde_json::{Map, Value};

/// Replace every `{{name}}` in `template` with the matching entry of `data`.
pub fn interpolate(template: &str, data: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        match placeholder_name(after_open) {
            Some(name) => {
                if let Some(value) = data.get(name) {
                    out.push_str(&value_to_string(value));
                }
                rest = &after_open[name.len() + 2..];
            }
            None => {
                // not a placeholder, emit one brace and rescan
                out.push('{');
                rest = &rest[start + 1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Interpolate every string inside a JSON value, keys excluded.
pub fn interpolate_value(template: &Value, data: &Map<String, Value>) -> Value {
    match template {
        Value::String(s) => Value::String(interpolate(s, data)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate_value(v, data)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// How a request value reads once spliced into text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn placeholder_name(s: &str) -> Option<&str> {
    let end = s.find("}}")?;
    let name = &s[..end];
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn substitutes_path_parameter() {
        let d = data(json!({"id": 33}));
        assert_eq!(interpolate("/posts/{{id}}", &d), "/posts/33");
    }

    #[test]
    fn unresolved_placeholder_becomes_empty() {
        let d = data(json!({}));
        assert_eq!(interpolate("https://x/{{p}}?a={{q}}", &d), "https://x/?a=");
    }

    #[test]
    fn non_placeholders_are_left_alone() {
        let d = data(json!({"a": "1"}));
        assert_eq!(interpolate("{{ a }} {a} {{a}} {{", &d), "{{ a }} {a} 1 {{");
        assert_eq!(interpolate("{{{a}}}", &d), "{1}");
    }

    #[test]
    fn interpolates_nested_body() {
        let d = data(json!({"code": "c1", "flag": true}));
        let body = json!({"grant": "{{code}}", "list": ["{{flag}}", 1], "n": null});
        assert_eq!(
            interpolate_value(&body, &d),
            json!({"grant": "c1", "list": ["true", 1], "n": null})
        );
    }
}
