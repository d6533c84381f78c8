//! Shape checks applied before any metadata or backend call is made.

use crate::services::error::{GatewayError, GatewayResult};

pub const BUCKET_NAME_MAX_LEN: usize = 100;
pub const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Validate a bucket name or id.
///
/// - 1–100 characters
/// - no `/`
/// - no leading or trailing whitespace
pub fn validate_bucket_name(name: &str) -> GatewayResult<()> {
    let len = name.chars().count();
    if len == 0 || len > BUCKET_NAME_MAX_LEN {
        return Err(GatewayError::InvalidBucketName);
    }
    if name.contains('/') || name.trim() != name {
        return Err(GatewayError::InvalidBucketName);
    }
    Ok(())
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/`, contain `..`,
/// backslashes or control characters.
pub fn ensure_key_safe(key: &str) -> GatewayResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    if key.starts_with('/') || key.contains("..") {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Whether `mimetype` is accepted by a bucket's allow-list.
///
/// Parameters after `;` are ignored. Entries may be exact types or
/// `type/*` wildcards; comparison is case-insensitive.
pub fn mime_type_allowed(allowed: &[String], mimetype: &str) -> bool {
    let essence = mimetype
        .split(';')
        .next()
        .unwrap_or(mimetype)
        .trim()
        .to_ascii_lowercase();

    allowed.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        match entry.strip_suffix("/*") {
            Some(kind) => essence
                .split_once('/')
                .is_some_and(|(candidate, _)| candidate == kind),
            None => entry == essence,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names_with_slash_are_invalid() {
        for name in ["a/b", "/", "bucket/", "/bucket"] {
            let err = validate_bucket_name(name).unwrap_err();
            assert!(matches!(err, GatewayError::InvalidBucketName));
            assert_eq!(err.to_string(), "Bucket name invalid");
        }
    }

    #[test]
    fn bucket_name_length_and_whitespace() {
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name(&"a".repeat(101)).is_err());
        assert!(validate_bucket_name(" leading").is_err());
        assert!(validate_bucket_name("trailing ").is_err());
        assert!(validate_bucket_name("\tbucket").is_err());

        assert!(validate_bucket_name("a").is_ok());
        assert!(validate_bucket_name(&"a".repeat(100)).is_ok());
        assert!(validate_bucket_name("Mixed Case and spaces").is_ok());
        assert!(validate_bucket_name("ünïcödé").is_ok());
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        for key in ["", "/abs", "a/../b", "back\\slash", "nul\0byte"] {
            assert!(ensure_key_safe(key).is_err(), "{key:?} should be rejected");
        }
        assert!(ensure_key_safe(&"k".repeat(MAX_OBJECT_KEY_LEN + 1)).is_err());
        assert!(ensure_key_safe("folder/nested/file.png").is_ok());
    }

    #[test]
    fn mime_allow_list_supports_wildcards() {
        let allowed = vec!["image/*".to_string(), "application/pdf".to_string()];
        assert!(mime_type_allowed(&allowed, "image/png"));
        assert!(mime_type_allowed(&allowed, "IMAGE/JPEG"));
        assert!(mime_type_allowed(&allowed, "application/pdf; charset=binary"));
        assert!(!mime_type_allowed(&allowed, "text/plain"));
        assert!(!mime_type_allowed(&allowed, "imagex/png"));
    }
}
