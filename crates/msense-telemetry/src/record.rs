//! Store record to feature vector mapping

use crate::error::TelemetryError;
use msense_core::{FeatureVector, FEATURE_LEN, FEATURE_NAMES};
use serde_json::Value;
use std::collections::HashMap;

/// Store attribute backing each canonical feature, in canonical order
pub const FIELD_MAPPING: [(&str, &str); FEATURE_LEN] = [
    ("heart_rate", "hr_mean"),
    ("rmssd", "HRV_RMSSD_mean"),
    ("temperature", "objectTemp_mean"),
    ("steps", "steps_sum"),
    ("sleep_duration", "activity_mean"),
];

/// One item as returned by the store: attribute name to typed value
pub type Item = HashMap<String, Value>;

/// Map a store item onto the canonical features
///
/// Absent attributes default to zero.
///
/// # Errors
/// [`TelemetryError::NonNumeric`] if a mapped attribute holds a value that
/// is not a number
pub fn map_item(item: &Item) -> Result<FeatureVector, TelemetryError> {
    let mut values = [0.0; FEATURE_LEN];
    for (slot, ((feature, attribute), expected)) in
        values.iter_mut().zip(FIELD_MAPPING.iter().zip(FEATURE_NAMES))
    {
        debug_assert_eq!(*feature, expected);
        if let Some(raw) = item.get(*attribute) {
            *slot = attribute_number(attribute, raw)?;
        }
    }
    Ok(FeatureVector::from_array(values))
}

/// Decode a typed attribute value (`{"N": "72.5"}`, `{"S": "72.5"}`)
fn attribute_number(attribute: &str, raw: &Value) -> Result<f64, TelemetryError> {
    let non_numeric = || TelemetryError::NonNumeric {
        field: attribute.to_string(),
        value: raw.to_string(),
    };
    let text = match raw {
        Value::Object(typed) => match (typed.get("N"), typed.get("S")) {
            (Some(Value::String(n)), _) | (None, Some(Value::String(n))) => n.as_str(),
            _ => return Err(non_numeric()),
        },
        Value::Number(n) => return n.as_f64().ok_or_else(non_numeric),
        _ => return Err(non_numeric()),
    };
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(non_numeric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_all_fields_in_order() {
        let fv = map_item(&item(json!({
            "hr_mean": {"N": "72.5"},
            "HRV_RMSSD_mean": {"N": "48"},
            "objectTemp_mean": {"N": "36.6"},
            "steps_sum": {"N": "1200"},
            "activity_mean": {"N": "6.5"},
            "deviceId": {"S": "watch-1"}
        })))
        .unwrap();
        assert_eq!(fv.as_array(), [72.5, 48.0, 36.6, 1200.0, 6.5]);
    }

    #[test]
    fn absent_fields_default_to_zero() {
        let fv = map_item(&item(json!({"hr_mean": {"N": "60"}}))).unwrap();
        assert_eq!(fv.as_array(), [60.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let fv = map_item(&item(json!({"steps_sum": {"S": " 42 "}}))).unwrap();
        assert_eq!(fv.steps(), 42.0);
    }

    #[test]
    fn non_numeric_value_is_an_error() {
        let err = map_item(&item(json!({"hr_mean": {"S": "high"}}))).unwrap_err();
        assert!(matches!(err, TelemetryError::NonNumeric { ref field, .. } if field == "hr_mean"));

        let err = map_item(&item(json!({"hr_mean": {"BOOL": true}}))).unwrap_err();
        assert!(matches!(err, TelemetryError::NonNumeric { .. }));
    }
}
