//! Layer merge
//!
//! Objects merge key by key; arrays and scalars from the later layer replace
//! the earlier value outright. An explicit `null` clears a value.

use serde_json::Value;

/// Merge `overlay` into `base` in place
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                merge_into(base_map.entry(key).or_insert(Value::Null), overlay_value);
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Merge two values, `overlay` taking precedence
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

/// Merge layers in order; the last layer has the highest precedence
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
