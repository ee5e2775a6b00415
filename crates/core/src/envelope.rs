use serde_json::Value;

/// How many envelope layers we will peel before giving up. Engine responses
/// nest at most twice in practice; the bound keeps a malformed
/// self-referential payload from looping.
const MAX_UNWRAP_DEPTH: usize = 4;

/// Peels the engine's result envelopes off a raw response.
///
/// Two conventions are recognized: `{"status":"ok","data":...}` from the
/// REST surface, and `{"data":...,"meta":...}` / `{"data":...,"dryRun":...}`
/// from generic operate. Anything else is returned as-is.
pub fn unwrap_data(raw: Value) -> Value {
    let mut current = raw;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let unwrappable = match current.as_object() {
            Some(map) => {
                let has_data = map.contains_key("data");
                let status_ok = map.get("status").and_then(Value::as_str) == Some("ok");
                let generic = map.contains_key("meta") || map.contains_key("dryRun");
                has_data && (status_ok || generic)
            }
            None => false,
        };
        if !unwrappable {
            break;
        }
        if let Value::Object(mut map) = current {
            current = map.remove("data").unwrap_or(Value::Null);
        } else {
            break;
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::unwrap_data;

    #[test]
    fn status_ok_envelope_is_unwrapped() {
        let raw = json!({ "status": "ok", "data": { "hosts": [] } });
        assert_eq!(unwrap_data(raw), json!({ "hosts": [] }));
    }

    #[test]
    fn generic_operate_envelope_is_unwrapped() {
        let raw = json!({ "data": [1, 2, 3], "meta": { "namespace": "PROD" } });
        assert_eq!(unwrap_data(raw), json!([1, 2, 3]));

        let raw = json!({ "data": { "applied": false }, "dryRun": true });
        assert_eq!(unwrap_data(raw), json!({ "applied": false }));
    }

    #[test]
    fn nested_envelopes_unwrap_fully() {
        let raw = json!({
            "status": "ok",
            "data": { "data": { "rows": [] }, "meta": {} }
        });
        assert_eq!(unwrap_data(raw), json!({ "rows": [] }));
    }

    #[test]
    fn unwrap_depth_is_bounded() {
        let mut raw = json!({ "rows": [] });
        for _ in 0..10 {
            raw = json!({ "status": "ok", "data": raw });
        }

        let unwrapped = unwrap_data(raw);
        // Four layers peeled, the rest left intact.
        assert!(unwrapped.get("status").is_some());
    }

    #[test]
    fn bare_payloads_pass_through() {
        assert_eq!(unwrap_data(json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_data(json!("plain")), json!("plain"));
        assert_eq!(unwrap_data(json!({ "hosts": [] })), json!({ "hosts": [] }));
        // `data` alone, without a status or meta marker, is payload not envelope.
        assert_eq!(unwrap_data(json!({ "data": 1 })), json!({ "data": 1 }));
    }
}
