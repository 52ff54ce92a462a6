//! Casting option values to the type of their default.

use serde_json::{Number, Value};

/// Error returned when a value cannot take the type of its default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {value} to {expected}")]
pub struct CoerceError {
    expected: &'static str,
    value: String,
}

impl CoerceError {
    fn new(expected: &'static str, value: &Value) -> Self {
        Self {
            expected,
            value: value.to_string(),
        }
    }
}

/// Coerce `value` to the JSON type of `reference`.
///
/// Integers truncate floats and parse numeric strings, floats parse strings,
/// strings take the JSON text of other scalars, booleans use truthiness.
/// Lists are coerced element-wise to the type of the reference's first
/// element. Mappings must already be mappings.
pub fn coerce(value: &Value, reference: &Value) -> Result<Value, CoerceError> {
    match reference {
        Value::Array(items) => match (value, items.first()) {
            (Value::Array(values), Some(first)) => values
                .iter()
                .map(|v| coerce(v, first))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Value::Array(_), None) => Ok(value.clone()),
            _ => Err(CoerceError::new("list", value)),
        },
        Value::Bool(_) => Ok(Value::Bool(truthy(value))),
        Value::Number(n) if n.is_f64() => to_float(value)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| CoerceError::new("float", value)),
        Value::Number(_) => to_int(value)
            .map(Value::from)
            .ok_or_else(|| CoerceError::new("int", value)),
        Value::String(_) => Ok(match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }),
        Value::Object(_) => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(CoerceError::new("mapping", value)),
        },
        Value::Null => Err(CoerceError::new("typed value", value)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| {
                let f = n.as_f64()?.trunc();
                (f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
            }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn float_truncates_to_int() {
        assert_eq!(coerce(&json!(10.1), &json!(10)).unwrap(), json!(10));
        assert_eq!(coerce(&json!(-3.9), &json!(10)).unwrap(), json!(-3));
    }

    #[test]
    fn numeric_string_to_int() {
        assert_eq!(coerce(&json!(" 12 "), &json!(10)).unwrap(), json!(12));
        assert!(coerce(&json!("1.5"), &json!(10)).is_err());
        assert!(coerce(&json!("ten"), &json!(10)).is_err());
    }

    #[test]
    fn int_to_float() {
        assert_eq!(coerce(&json!(3), &json!(1.5)).unwrap(), json!(3.0));
        assert_eq!(coerce(&json!("2.5"), &json!(1.5)).unwrap(), json!(2.5));
    }

    #[test]
    fn scalars_to_string() {
        assert_eq!(coerce(&json!(1), &json!("metric")).unwrap(), json!("1"));
        assert_eq!(coerce(&json!("british"), &json!("metric")).unwrap(), json!("british"));
    }

    #[test]
    fn truthiness_to_bool() {
        assert_eq!(coerce(&json!(0), &json!(true)).unwrap(), json!(false));
        assert_eq!(coerce(&json!("x"), &json!(false)).unwrap(), json!(true));
        assert_eq!(coerce(&json!([]), &json!(true)).unwrap(), json!(false));
    }

    #[test]
    fn lists_coerce_element_wise() {
        assert_eq!(coerce(&json!([1.7, "2"]), &json!([0])).unwrap(), json!([1, 2]));
        assert_eq!(coerce(&json!(["a", 1]), &json!([])).unwrap(), json!(["a", 1]));
        assert!(coerce(&json!(["a"]), &json!([0])).is_err());
        assert!(coerce(&json!("abc"), &json!([0])).is_err());
    }

    #[test]
    fn mappings_must_be_mappings() {
        assert!(coerce(&json!({"a": 1}), &json!({})).is_ok());
        assert!(coerce(&json!(1), &json!({})).is_err());
    }

    #[test]
    fn null_default_rejects_everything() {
        assert!(coerce(&json!(1), &Value::Null).is_err());
    }
}
