use serde_json::Value;

/// Numeric view of a JSON value; integers and floats coerce consistently.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

pub fn is_finite_number(value: &Value) -> bool {
    as_f64(value).map(f64::is_finite).unwrap_or(false)
}

/// Tolerance-aware equality: numbers compare within `tolerance`, everything
/// else falls back to exact equality.
pub fn tolerance_eq(a: &Value, b: &Value, tolerance: f64) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_f64_coerces_int_and_float() {
        assert_eq!(as_f64(&json!(3)), Some(3.0));
        assert_eq!(as_f64(&json!(3.5)), Some(3.5));
        assert_eq!(as_f64(&json!("3")), None);
        assert_eq!(as_f64(&json!(true)), None);
    }

    #[test]
    fn test_tolerance_eq() {
        assert!(tolerance_eq(&json!(1.0), &json!(1.05), 0.1));
        assert!(!tolerance_eq(&json!(1.0), &json!(1.2), 0.1));
        assert!(tolerance_eq(&json!(2), &json!(2.0), 0.0));
        assert!(tolerance_eq(&json!("a"), &json!("a"), 0.5));
        assert!(!tolerance_eq(&json!("a"), &json!(1), 10.0));
        assert!(!tolerance_eq(&json!(null), &json!(0), 10.0));
    }
}
