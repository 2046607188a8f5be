// src/services/response_parser.rs
//! Lenient extraction of JSON answers from free-form model output.
//!
//! Model text is untrusted: everything here returns `None` or an empty
//! collection for missing or ill-typed fields instead of failing. Only a
//! response with no JSON object at all is an error.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Find the JSON object in a model reply.
///
/// Candidates are tried in order and the first one that parses to an object
/// wins: the trimmed reply as-is, the body of the first fenced block, the
/// reply with every fence marker removed, then the outermost `{...}` span of
/// the reply.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("response is empty".to_string());
    }

    let mut candidates = vec![trimmed.to_string()];
    if trimmed.contains("```") {
        if let Some(body) = fenced_body(trimmed) {
            candidates.push(body.to_string());
        }
        candidates.push(remove_fence_markers(trimmed));
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            candidates.push(trimmed[start..=end].to_string());
        }
    }

    let mut first_error = None;
    for candidate in candidates.iter().filter(|c| !c.trim().is_empty()) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => {
                first_error.get_or_insert_with(|| {
                    format!("expected a JSON object, got {}", type_name(&other))
                });
            }
            Err(e) => {
                first_error.get_or_insert_with(|| format!("no JSON object found: {}", e));
            }
        }
    }
    Err(first_error.unwrap_or_else(|| "response is empty".to_string()))
}

/// Text between the first fence line and the next fence, if any.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_open = &text[start + 3..];
    // Skip an optional language tag on the fence line.
    let body = &after_open[after_open.find('\n')? + 1..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    let body = body.trim();
    (!body.is_empty()).then_some(body)
}

fn remove_fence_markers(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First non-blank string found under any of `keys`.
pub fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Number or numeric string; `None` for anything else, including NaN.
pub fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let n = match obj.get(*key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            _ => None,
        }?;
        n.is_finite().then_some(n)
    })
}

pub fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Clamp a loosely-typed score into 0..=100.
pub fn score_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u8> {
    number_field(obj, keys).map(|n| n.round().clamp(0.0, 100.0) as u8)
}

/// Ordered, de-duplicated list of strings. Accepts an array or a comma-separated string.
pub fn string_list_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for key in keys {
        let items: Vec<String> = match obj.get(*key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .collect(),
            Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
            _ => continue,
        };
        for item in items {
            if !item.is_empty() && !out.iter().any(|seen| seen.eq_ignore_ascii_case(&item)) {
                out.push(item);
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

pub fn string_set_field(obj: &Map<String, Value>, keys: &[&str]) -> BTreeSet<String> {
    string_list_field(obj, keys)
        .into_iter()
        .map(|s| s.to_ascii_lowercase())
        .filter(|s| !matches!(s.as_str(), "none" | "n/a"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_plain_json() {
        let map = extract_json_object(r#"{"object_type": "glass jar"}"#).unwrap();
        assert_eq!(map["object_type"], "glass jar");
    }

    #[test]
    fn strips_markdown_fences() {
        let text = "Here you go:\n```json\n{\"verdict\": \"Reusable\"}\n```\nThanks!";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["verdict"], "Reusable");
    }

    #[test]
    fn object_before_stray_closing_fence_survives() {
        let map = extract_json_object("{\"object_type\": \"glass jar\"}\n```").unwrap();
        assert_eq!(map["object_type"], "glass jar");
    }

    #[test]
    fn fences_inside_string_values_are_kept() {
        let text = r#"{"description": "label reads ```fragile```", "object_type": "box"}"#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["object_type"], "box");
        assert_eq!(map["description"], "label reads ```fragile```");
    }

    #[test]
    fn unterminated_fence_still_yields_object() {
        let map = extract_json_object("```json\n{\"safety_score\": 61}").unwrap();
        assert_eq!(map["safety_score"], 61);
    }

    #[test]
    fn finds_object_inside_prose() {
        let text = "Sure. The analysis is {\"safety_score\": 80} as requested.";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["safety_score"], 80);
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        assert!(extract_json_object("").is_err());
        assert!(extract_json_object("I cannot help with that").is_err());
        assert!(extract_json_object("[1, 2, 3]").is_err());
        assert!(extract_json_object("{\"unterminated\": ").is_err());
    }

    #[test]
    fn string_field_skips_blank_and_non_strings() {
        let map = obj(json!({"a": "  ", "b": 3, "c": " plastic "}));
        assert_eq!(string_field(&map, &["a", "b", "c"]), Some("plastic".to_string()));
        assert_eq!(string_field(&map, &["missing"]), None);
    }

    #[test]
    fn number_field_accepts_numeric_strings() {
        let map = obj(json!({"n": "42.5", "p": "80%", "word": "high"}));
        assert_eq!(number_field(&map, &["n"]), Some(42.5));
        assert_eq!(number_field(&map, &["p"]), Some(80.0));
        assert_eq!(number_field(&map, &["word"]), None);
    }

    #[test]
    fn score_field_clamps() {
        let map = obj(json!({"high": 150, "low": -20, "text": "high", "mid": 72.6}));
        assert_eq!(score_field(&map, &["high"]), Some(100));
        assert_eq!(score_field(&map, &["low"]), Some(0));
        assert_eq!(score_field(&map, &["text"]), None);
        assert_eq!(score_field(&map, &["mid"]), Some(73));
    }

    #[test]
    fn string_list_accepts_arrays_and_csv() {
        let map = obj(json!({
            "arr": ["PET", "pet", "", "Paper label", 4],
            "csv": "steel, tin ,"
        }));
        assert_eq!(string_list_field(&map, &["arr"]), vec!["PET", "Paper label"]);
        assert_eq!(string_list_field(&map, &["csv"]), vec!["steel", "tin"]);
        assert!(string_list_field(&map, &["missing"]).is_empty());
    }

    #[test]
    fn string_set_drops_none_markers() {
        let map = obj(json!({"flags": ["Rust", "none", "dent"]}));
        let set = string_set_field(&map, &["flags"]);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["dent", "rust"]);
    }

    #[test]
    fn bool_field_reads_strings() {
        let map = obj(json!({"a": "Yes", "b": false, "c": "perhaps"}));
        assert_eq!(bool_field(&map, &["a"]), Some(true));
        assert_eq!(bool_field(&map, &["b"]), Some(false));
        assert_eq!(bool_field(&map, &["c"]), None);
    }
}
