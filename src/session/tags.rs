use once_cell::sync::Lazy;
use regex::Regex;

static HASHTAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(\w+)").unwrap_or_else(|e| panic!("Invalid hashtag regex: {e}")));

/// Extracts `#word` tags in the order they appear. Repeats are kept, since
/// history stores the list as written; tokens are lowercased.
pub fn extract_hashtags(description: &str) -> Vec<String> {
    HASHTAG_PATTERN
        .captures_iter(description)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
