//! Property-based test generators using proptest.

use proptest::prelude::*;
use remdoc_protocol::{Key, Scalar};
use serde_json::Value;

/// Strategy for valid principal and collection names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9_]{1,70}").expect("Invalid regex")
}

/// Strategy for valid passkeys.
pub fn passkey_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{4,40}").expect("Invalid regex")
}

/// Strategy for document keys.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        any::<i64>().prop_map(Key::Int),
        "[a-z0-9]{1,16}".prop_map(Key::Text),
    ]
}

/// Strategy for statement and index scalars.
pub fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<i32>().prop_map(|n| Scalar::Int(n.into())),
        (-1.0e6f64..1.0e6).prop_map(Scalar::Float),
        "[a-z]{0,8}".prop_map(Scalar::Text),
    ]
}

/// Strategy for arbitrary JSON documents of bounded depth.
pub fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for flat objects of scalars, as used for partial updates.
pub fn scalar_patch_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        prop_oneof![Just("title".to_string()), Just("body".to_string()), Just("stars".to_string())],
        prop_oneof![
            "[a-z]{0,6}".prop_map(Value::String),
            any::<i16>().prop_map(Value::from),
        ],
        0..3,
    )
    .prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use remdoc_protocol::{validate_passkey, validate_username};

    proptest! {
        #[test]
        fn generated_names_validate(name in name_strategy()) {
            prop_assert!(validate_username(&name).is_ok());
        }

        #[test]
        fn generated_passkeys_validate(passkey in passkey_strategy()) {
            prop_assert!(validate_passkey(&passkey).is_ok());
        }
    }
}
