//! Device id format validation and the spoofing denylist.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted device id, in characters.
pub const MIN_DEVICE_ID_LEN: usize = 8;
/// Longest accepted device id, in characters.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// The rule a rejected device id violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidDeviceId {
    #[error("device id is {len} characters, minimum is {MIN_DEVICE_ID_LEN}")]
    TooShort { len: usize },

    #[error("device id is {len} characters, maximum is {MAX_DEVICE_ID_LEN}")]
    TooLong { len: usize },

    #[error("character {0:?} is not allowed; use letters, digits, '-', '_' or '.'")]
    InvalidCharacter(char),

    #[error("device id repeats a single character")]
    RepeatedCharacter,

    #[error("device id {0:?} is a placeholder value")]
    Placeholder(String),

    #[error("device id is a sequential digit string")]
    SequentialDigits,

    #[error("device id contains the credential word {0:?}")]
    CredentialWord(String),
}

impl InvalidDeviceId {
    /// Short machine-friendly name of the violated rule.
    pub fn rule(&self) -> &'static str {
        match self {
            InvalidDeviceId::TooShort { .. } => "min_length",
            InvalidDeviceId::TooLong { .. } => "max_length",
            InvalidDeviceId::InvalidCharacter(_) => "charset",
            InvalidDeviceId::RepeatedCharacter => "repeated_character",
            InvalidDeviceId::Placeholder(_) => "placeholder",
            InvalidDeviceId::SequentialDigits => "sequential_digits",
            InvalidDeviceId::CredentialWord(_) => "credential_word",
        }
    }
}

/// Heuristic patterns rejected as obvious spoofing attempts.
///
/// The defaults mirror what clients most often send when they fake an id;
/// deployments can widen or narrow the list through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyList {
    /// Values rejected when the whole id equals one of them (case-insensitive)
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,

    /// Words rejected when they appear anywhere in the id (case-insensitive)
    #[serde(default = "default_credential_words")]
    pub credential_words: Vec<String>,

    /// Reject ids made of one repeated character
    #[serde(default = "default_true")]
    pub reject_repeated: bool,

    /// Reject ascending or descending digit runs such as `12345678`
    #[serde(default = "default_true")]
    pub reject_sequential: bool,
}

impl Default for DenyList {
    fn default() -> Self {
        Self {
            placeholders: default_placeholders(),
            credential_words: default_credential_words(),
            reject_repeated: true,
            reject_sequential: true,
        }
    }
}

impl DenyList {
    /// A denylist that rejects nothing beyond the length and charset rules.
    pub fn empty() -> Self {
        Self {
            placeholders: Vec::new(),
            credential_words: Vec::new(),
            reject_repeated: false,
            reject_sequential: false,
        }
    }
}

fn default_placeholders() -> Vec<String> {
    [
        "test",
        "admin",
        "null",
        "undefined",
        "unknown",
        "default",
        "anonymous",
        "device",
        "deviceid",
        "device_id",
        "example",
        "changeme",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_credential_words() -> Vec<String> {
    ["password", "passwd", "secret", "apikey", "api_key"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// Check a device id and report the first violated rule.
pub fn check_device_id(id: &str, denylist: &DenyList) -> Result<(), InvalidDeviceId> {
    let len = id.chars().count();
    if len < MIN_DEVICE_ID_LEN {
        return Err(InvalidDeviceId::TooShort { len });
    }
    if len > MAX_DEVICE_ID_LEN {
        return Err(InvalidDeviceId::TooLong { len });
    }

    if let Some(bad) = id.chars().find(|c| !is_allowed_char(*c)) {
        return Err(InvalidDeviceId::InvalidCharacter(bad));
    }

    if denylist.reject_repeated && is_single_character_run(id) {
        return Err(InvalidDeviceId::RepeatedCharacter);
    }

    let lowered = id.to_ascii_lowercase();

    if let Some(placeholder) = denylist
        .placeholders
        .iter()
        .find(|p| p.eq_ignore_ascii_case(&lowered))
    {
        return Err(InvalidDeviceId::Placeholder(placeholder.clone()));
    }

    if denylist.reject_sequential && is_sequential_digits(id) {
        return Err(InvalidDeviceId::SequentialDigits);
    }

    if let Some(word) = denylist
        .credential_words
        .iter()
        .find(|w| !w.is_empty() && lowered.contains(&w.to_ascii_lowercase()))
    {
        return Err(InvalidDeviceId::CredentialWord(word.clone()));
    }

    Ok(())
}

/// Returns `true` if the id is acceptable. Rejection is silent.
pub fn validate_device_id(id: &str, denylist: &DenyList) -> bool {
    check_device_id(id, denylist).is_ok()
}

/// Guidance shown to clients whose device id was rejected.
pub fn recommendations() -> Vec<String> {
    vec![
        format!(
            "Use between {} and {} characters",
            MIN_DEVICE_ID_LEN, MAX_DEVICE_ID_LEN
        ),
        "Only use letters, digits, hyphens, underscores and dots".to_string(),
        "Avoid placeholder values, repeated characters and sequential digits".to_string(),
        "Request a generated id from /api/device/generate and persist it on the device"
            .to_string(),
    ]
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn is_single_character_run(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => false,
    }
}

fn is_sequential_digits(id: &str) -> bool {
    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u8> = id.bytes().map(|b| b - b'0').collect();
    let ascending = digits.windows(2).all(|w| w[1] == (w[0] + 1) % 10);
    let descending = digits.windows(2).all(|w| w[0] == (w[1] + 1) % 10);
    ascending || descending
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(id: &str) -> Result<(), InvalidDeviceId> {
        check_device_id(id, &DenyList::default())
    }

    #[test]
    fn test_accepts_well_formed_ids() {
        assert!(check("abcdefgh").is_ok());
        assert!(check("device_12345_mobile").is_ok());
        assert!(check("abcdefgh12345678").is_ok());
        assert!(check("a1.b2-c3_d4").is_ok());
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(check("test"), Err(InvalidDeviceId::TooShort { len: 4 }));
        assert_eq!(check("abcdefg"), Err(InvalidDeviceId::TooShort { len: 7 }));

        let max = "a1".repeat(64);
        assert_eq!(max.len(), 128);
        assert!(check(&max).is_ok());

        let too_long = format!("{}b", max);
        assert_eq!(check(&too_long), Err(InvalidDeviceId::TooLong { len: 129 }));
    }

    #[test]
    fn test_rejects_disallowed_characters() {
        assert_eq!(
            check("abcd efgh"),
            Err(InvalidDeviceId::InvalidCharacter(' '))
        );
        assert_eq!(
            check("abcd/efgh"),
            Err(InvalidDeviceId::InvalidCharacter('/'))
        );
        assert!(matches!(
            check("abcdéfghij"),
            Err(InvalidDeviceId::InvalidCharacter('é'))
        ));
    }

    #[test]
    fn test_rejects_repeated_characters() {
        assert_eq!(check("11111111"), Err(InvalidDeviceId::RepeatedCharacter));
        assert_eq!(check("aaaaaaaa"), Err(InvalidDeviceId::RepeatedCharacter));
        assert_eq!(
            check(&"z".repeat(40)),
            Err(InvalidDeviceId::RepeatedCharacter)
        );
    }

    #[test]
    fn test_rejects_placeholders_case_insensitively() {
        assert!(matches!(check("undefined"), Err(InvalidDeviceId::Placeholder(_))));
        assert!(matches!(check("UNDEFINED"), Err(InvalidDeviceId::Placeholder(_))));
        assert!(matches!(check("anonymous"), Err(InvalidDeviceId::Placeholder(_))));
        // Containing a placeholder is fine, equality is what is rejected
        assert!(check("testing-device-42").is_ok());
    }

    #[test]
    fn test_rejects_sequential_digits() {
        assert_eq!(check("12345678"), Err(InvalidDeviceId::SequentialDigits));
        assert_eq!(check("1234567890"), Err(InvalidDeviceId::SequentialDigits));
        assert_eq!(check("98765432"), Err(InvalidDeviceId::SequentialDigits));
        assert!(check("12345679").is_ok());
    }

    #[test]
    fn test_rejects_credential_words() {
        assert_eq!(
            check("my-Password-1"),
            Err(InvalidDeviceId::CredentialWord("password".to_string()))
        );
        assert!(matches!(check("supersecret99"), Err(InvalidDeviceId::CredentialWord(_))));
    }

    #[test]
    fn test_empty_denylist_only_checks_format() {
        let denylist = DenyList::empty();
        assert!(validate_device_id("aaaaaaaa", &denylist));
        assert!(validate_device_id("12345678", &denylist));
        assert!(validate_device_id("undefined", &denylist));
        assert!(!validate_device_id("short", &denylist));
    }

    #[test]
    fn test_rule_names() {
        assert_eq!(InvalidDeviceId::TooShort { len: 1 }.rule(), "min_length");
        assert_eq!(InvalidDeviceId::SequentialDigits.rule(), "sequential_digits");
    }

    #[test]
    fn test_denylist_from_yaml_uses_defaults() {
        let denylist: DenyList = serde_yaml::from_str("reject_sequential: false").unwrap();
        assert!(!denylist.reject_sequential);
        assert!(denylist.reject_repeated);
        assert!(denylist.placeholders.contains(&"admin".to_string()));
    }
}
