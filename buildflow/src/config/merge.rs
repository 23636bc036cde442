//! Layered configuration merge.

use serde_json::{Map, Value};

/// Overlays configuration layers in increasing priority.
///
/// `defaults < file < options`. Each layer must be a JSON object (anything
/// else is ignored); keys from a later layer replace earlier ones, except
/// that `null` never erases a lower layer's value. Values are replaced
/// whole, so arrays keep their configured order.
#[must_use]
pub fn merge_layers(defaults: Value, file: Option<Value>, options: Value) -> Value {
    let mut merged = Map::new();

    for layer in [Some(defaults), file, Some(options)].into_iter().flatten() {
        if let Value::Object(fields) = layer {
            for (key, value) in fields {
                if value.is_null() {
                    continue;
                }
                merged.insert(key, value);
            }
        }
    }

    Value::Object(merged)
}
