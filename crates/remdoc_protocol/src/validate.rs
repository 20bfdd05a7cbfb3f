//! Name validators.
//!
//! Every name that ends up in a URL or an authorization header is checked
//! here first. Lengths are counted in characters.

use crate::error::{NameKind, ValidationError, ValidationReason, ValidationResult};

fn validate_name(
    value: &str,
    kind: NameKind,
    min: usize,
    max: usize,
    forbidden: impl Fn(char) -> bool,
) -> ValidationResult<String> {
    let len = value.chars().count();
    if len < min {
        return Err(ValidationError::new(kind, ValidationReason::TooShort));
    }
    if len > max {
        return Err(ValidationError::new(kind, ValidationReason::TooLong));
    }
    if value.chars().any(forbidden) {
        return Err(ValidationError::new(kind, ValidationReason::InvalidCharacters));
    }
    Ok(value.to_string())
}

fn is_non_word(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || c == '_')
}

fn is_control_whitespace(c: char) -> bool {
    matches!(c, '\u{8}' | '\t' | '\u{b}' | '\u{c}' | '\r' | '\n')
}

/// Validates a principal name: 1 to 70 word characters.
pub fn validate_username(username: &str) -> ValidationResult<String> {
    validate_name(username, NameKind::Username, 1, 70, is_non_word)
}

/// Validates a passkey: 4 to 140 characters, no backspace, tab, vertical
/// tab, form feed, carriage return or newline.
pub fn validate_passkey(passkey: &str) -> ValidationResult<String> {
    validate_name(passkey, NameKind::Passkey, 4, 140, is_control_whitespace)
}

/// Validates a collection name: 1 to 70 word characters.
pub fn validate_collection_name(name: &str) -> ValidationResult<String> {
    validate_name(name, NameKind::CollectionName, 1, 70, is_non_word)
}

/// Validates a store domain and returns the base URL.
///
/// The domain must not carry a scheme; a single trailing `/` is stripped.
pub fn validate_domain(domain: &str) -> ValidationResult<String> {
    let scheme_len = domain
        .find("://")
        .filter(|&idx| idx > 0 && domain[..idx].chars().all(|c| c.is_ascii_alphabetic()));
    if scheme_len.is_some() {
        return Err(ValidationError::new(
            NameKind::Url,
            ValidationReason::ExcludeProtocol,
        ));
    }
    if domain.is_empty() {
        return Err(ValidationError::new(NameKind::Url, ValidationReason::TooShort));
    }
    let trimmed = domain.strip_suffix('/').unwrap_or(domain);
    Ok(format!("http://{}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn username_bounds() {
        assert_eq!(validate_username("alice").unwrap(), "alice");
        assert_eq!(validate_username("a").unwrap(), "a");
        assert_eq!(
            validate_username("").unwrap_err().reason,
            ValidationReason::TooShort
        );
        assert_eq!(
            validate_username(&"x".repeat(71)).unwrap_err().reason,
            ValidationReason::TooLong
        );
        assert!(validate_username(&"x".repeat(70)).is_ok());
    }

    #[test]
    fn username_rejects_non_word_characters() {
        for bad in ["al ice", "bob!", "c-d", "émile", "x/y"] {
            let err = validate_username(bad).unwrap_err();
            assert_eq!(err.kind, NameKind::Username);
            assert_eq!(err.reason, ValidationReason::InvalidCharacters);
        }
        assert!(validate_username("user_01").is_ok());
    }

    #[test]
    fn passkey_rules() {
        assert!(validate_passkey("secret123").is_ok());
        assert!(validate_passkey("with spaces and ünïcode").is_ok());
        assert_eq!(
            validate_passkey("abc").unwrap_err().reason,
            ValidationReason::TooShort
        );
        assert_eq!(
            validate_passkey(&"p".repeat(141)).unwrap_err().reason,
            ValidationReason::TooLong
        );
        for bad in ["pass\tword", "pass\nword", "pass\rword", "pass\u{b}word"] {
            assert_eq!(
                validate_passkey(bad).unwrap_err().reason,
                ValidationReason::InvalidCharacters
            );
        }
    }

    #[test]
    fn collection_name_kind() {
        let err = validate_collection_name("no spaces").unwrap_err();
        assert_eq!(err.kind, NameKind::CollectionName);
        assert!(validate_collection_name("db1").is_ok());
    }

    #[test]
    fn domain_rules() {
        assert_eq!(validate_domain("localhost").unwrap(), "http://localhost");
        assert_eq!(
            validate_domain("store.example.com/").unwrap(),
            "http://store.example.com"
        );
        assert_eq!(
            validate_domain("localhost:8080").unwrap(),
            "http://localhost:8080"
        );
        assert_eq!(
            validate_domain("https://example.com").unwrap_err().reason,
            ValidationReason::ExcludeProtocol
        );
        assert!(validate_domain("").is_err());
    }

    proptest! {
        #[test]
        fn word_names_within_bounds_are_accepted(name in "[A-Za-z0-9_]{1,70}") {
            prop_assert_eq!(validate_username(&name).unwrap(), name.clone());
            prop_assert_eq!(validate_collection_name(&name).unwrap(), name);
        }
    }
}
