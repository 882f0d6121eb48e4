//! Node payloads.
//!
//! A payload is an opaque JSON value attached to a node. The engine never
//! interprets it beyond equality, which must be deterministic: object keys
//! compare in sorted order regardless of insertion order.

/// Scalar leaf value of a node.
pub type Payload = serde_json::Value;

/// Deterministic equality of two optional payloads.
pub fn compare_payloads(a: Option<&Payload>, b: Option<&Payload>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_key_order_is_irrelevant() {
        let a: Payload = serde_json::from_str(r#"{"x": 1, "y": [true, null]}"#).unwrap();
        let b: Payload = serde_json::from_str(r#"{"y": [true, null], "x": 1}"#).unwrap();
        assert!(compare_payloads(Some(&a), Some(&b)));
    }

    #[test]
    fn test_absent_payload_differs_from_null() {
        assert!(compare_payloads(None, None));
        assert!(!compare_payloads(None, Some(&json!(null))));
        assert!(!compare_payloads(Some(&json!(1)), Some(&json!(1.5))));
    }
}
