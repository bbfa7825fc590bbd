//! `{{vars.X}}` placeholder interpolation over a `serde_json::Value` tree
//! (§4.4). Total: malformed or unresolved placeholders are left literal
//! rather than erroring the whole step over a typo.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*vars\.([A-Za-z0-9_.]+)\s*\}\}").unwrap());

/// Walks `value`, interpolating every string leaf against `vars`. Non-string
/// leaves (numbers, bools, null) and container shapes pass through
/// untouched.
pub fn interpolate(value: &Value, vars: &Value) -> Value {
    match value {
        Value::String(s) => interpolate_string(s, vars),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate(v, vars)).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), interpolate(v, vars))).collect()),
        other => other.clone(),
    }
}

fn interpolate_string(s: &str, vars: &Value) -> Value {
    if let Some(caps) = PLACEHOLDER.captures(s) {
        let whole_match = caps.get(0).unwrap();
        if whole_match.start() == 0 && whole_match.end() == s.len() {
            // The entire string is one placeholder: substitute the raw
            // value so non-string args (numbers, objects) survive intact.
            let path = &caps[1];
            return resolve_path(vars, path).cloned().unwrap_or_else(|| Value::String(s.to_string()));
        }
    }

    let replaced = PLACEHOLDER.replace_all(s, |caps: &regex::Captures| {
        let path = &caps[1];
        match resolve_path(vars, path) {
            Some(Value::String(v)) => v.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

fn resolve_path<'a>(vars: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = vars;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_whole_string_placeholder_with_raw_value() {
        let vars = json!({"count": 3, "user": {"name": "ada"}});
        assert_eq!(interpolate(&json!("{{vars.count}}"), &vars), json!(3));
        assert_eq!(interpolate(&json!("{{vars.user.name}}"), &vars), json!("ada"));
    }

    #[test]
    fn substitutes_mid_string_placeholder_as_text() {
        let vars = json!({"name": "ada"});
        assert_eq!(interpolate(&json!("hello {{vars.name}}!"), &vars), json!("hello ada!"));
    }

    #[test]
    fn unresolved_placeholder_is_left_literal() {
        let vars = json!({});
        assert_eq!(interpolate(&json!("{{vars.missing}}"), &vars), json!("{{vars.missing}}"));
    }

    #[test]
    fn recurses_into_nested_objects_and_arrays() {
        let vars = json!({"x": "y"});
        let input = json!({"a": ["{{vars.x}}", 5], "b": {"c": "{{vars.x}}"}});
        let output = interpolate(&input, &vars);
        assert_eq!(output, json!({"a": ["y", 5], "b": {"c": "y"}}));
    }
}
