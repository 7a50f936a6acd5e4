// Reply extraction for batch (`/upload`) responses.

use serde_json::Value;

/// Fields that may carry the reply inside an object `result`, highest priority first.
const TEXT_FIELDS: [&str; 4] = ["content", "answer", "text", "output"];

/// Extract the reply text from a batch payload.
///
/// Looks at `result` (or the payload itself when there is no `result`). A string is
/// taken as is; an object yields its first known text field, or failing that the
/// first string value in key order. Empty strings never count.
pub fn extract_result_text(payload: &Value) -> Option<String> {
    let target = payload.get("result").unwrap_or(payload);
    match target {
        Value::String(text) => non_empty(text),
        Value::Object(map) => TEXT_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(|v| v.as_str()).and_then(non_empty))
            .or_else(|| {
                map.values()
                    .find_map(|v| v.as_str().and_then(non_empty))
            }),
        _ => None,
    }
}

/// Like [`extract_result_text`], substituting `fallback` when nothing qualifies.
pub fn resolve_batch_text(payload: &Value, fallback: &str) -> String {
    extract_result_text(payload).unwrap_or_else(|| fallback.to_string())
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn string_result_is_used_directly() {
        assert_eq!(
            extract_result_text(&json!({ "result": "hi there" })),
            Some("hi there".to_string())
        );
    }

    #[test]
    fn known_fields_follow_priority_order() {
        let payload = json!({
            "result": { "output": "o", "text": "t", "answer": "a", "content": "c" }
        });
        assert_eq!(extract_result_text(&payload), Some("c".to_string()));

        let payload = json!({ "result": { "output": "o", "text": "t", "answer": "a" } });
        assert_eq!(extract_result_text(&payload), Some("a".to_string()));

        let payload = json!({ "result": { "output": "o", "text": "t" } });
        assert_eq!(extract_result_text(&payload), Some("t".to_string()));

        let payload = json!({ "result": { "output": "o", "content": "" } });
        assert_eq!(extract_result_text(&payload), Some("o".to_string()));
    }

    #[test]
    fn falls_back_to_first_string_value_in_key_order() {
        let payload = json!({ "result": { "foo": 123, "bar": "ok" } });
        assert_eq!(extract_result_text(&payload), Some("ok".to_string()));

        let raw = r#"{"result":{"zeta":"first","alpha":"second"}}"#;
        let payload: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_result_text(&payload), Some("first".to_string()));
    }

    #[test]
    fn unusable_payloads_resolve_to_fallback() {
        for payload in [
            json!({ "result": { "foo": 1, "bar": [ "nested" ] } }),
            json!({ "result": "" }),
            json!({ "result": null }),
            json!({}),
            Value::Null,
            json!([ "a" ]),
        ] {
            assert_eq!(resolve_batch_text(&payload, "fallback"), "fallback", "{payload}");
        }
    }

    #[test]
    fn payload_without_result_is_read_directly() {
        assert_eq!(
            extract_result_text(&json!({ "answer": "direct" })),
            Some("direct".to_string())
        );
        assert_eq!(extract_result_text(&json!("bare")), Some("bare".to_string()));
    }
}
