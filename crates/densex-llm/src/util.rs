//! Common utilities for model clients

/// Minimum key length to display partial key
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 8;

/// Number of characters to show at start/end of masked key
const KEY_MASK_VISIBLE_CHARS: usize = 4;

/// Sensitive patterns to filter from error messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "api_key",
    "api-key",
    "api key",
    "apikey",
    "authorization",
    "bearer",
    "token",
    "secret",
    "password",
    "credential",
];

/// Mask API key for safe display in logs
///
/// Shows first 4 and last 4 characters for keys longer than 8 characters,
/// otherwise shows "****".
///
/// # Examples
/// ```
/// use densex_llm::util::mask_api_key;
/// assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
/// assert_eq!(mask_api_key("short"), "****");
/// ```
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return "****".to_string();
    }
    let head: String = chars[..KEY_MASK_VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - KEY_MASK_VISIBLE_CHARS..].iter().collect();
    format!("{head}...{tail}")
}

/// Mask an optional key (`None` for absent keys)
#[must_use]
pub fn mask_optional_key(key: Option<&str>) -> Option<String> {
    key.map(mask_api_key)
}

/// Sanitize error message for user display
///
/// If the error mentions anything credential-like, a generic message is
/// returned instead.
///
/// # Examples
/// ```
/// use densex_llm::util::sanitize_error_for_user;
/// assert_eq!(
///     sanitize_error_for_user("Invalid api_key provided"),
///     "An API error occurred. Please try again."
/// );
/// assert_eq!(sanitize_error_for_user("embedding failed"), "embedding failed");
/// ```
#[must_use]
pub fn sanitize_error_for_user(error: &str) -> String {
    let lower = error.to_lowercase();

    if SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "An API error occurred. Please try again.".to_string();
    }

    error.to_string()
}
