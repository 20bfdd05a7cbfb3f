//! Deep merge of partial documents.

use serde_json::{Map, Value};

/// Merges `partial` into `target`.
///
/// Objects merge per key and arrays per position; any other value in
/// `partial` overwrites. Fields absent from `partial` are left untouched.
/// A container in `partial` replaces a target of a different shape.
pub fn deep_merge(target: &mut Value, partial: &Value) {
    match partial {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(existing) = target {
                for (name, value) in fields {
                    deep_merge(existing.entry(name.clone()).or_insert(Value::Null), value);
                }
            }
        }
        Value::Array(items) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(existing) = target {
                for (position, value) in items.iter().enumerate() {
                    match existing.get_mut(position) {
                        Some(slot) => deep_merge(slot, value),
                        None => {
                            let mut fresh = Value::Null;
                            deep_merge(&mut fresh, value);
                            existing.push(fresh);
                        }
                    }
                }
            }
        }
        scalar => *target = scalar.clone(),
    }
}
