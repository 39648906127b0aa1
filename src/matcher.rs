//! Glob-style pattern matcher for action/resource tokens (spec §4.1).

use regex::Regex;

/// Matches `value` against a glob-style `pattern` (`*` = any sequence, `?` = single char).
///
/// - `pattern == value` is a fast-path true.
/// - `pattern == "*"` is always true.
/// - Otherwise the pattern is translated to an anchored regular expression (other regex
///   metacharacters escaped); if translation or compilation fails, falls back to exact-string
///   equality rather than panicking (spec §4.1, and invariant 5: "invalid regex patterns never
///   throw").
pub fn matches(value: &str, pattern: &str) -> bool {
    if pattern == value {
        return true;
    }
    if pattern == "*" {
        return true;
    }
    match compile_glob(pattern) {
        Some(re) => re.is_match(value),
        None => pattern == value,
    }
}

/// Returns the first pattern in `patterns` that matches `value`, if any.
pub fn find_matching_pattern<'a>(value: &str, patterns: &'a [String]) -> Option<&'a str> {
    patterns
        .iter()
        .find(|p| matches(value, p))
        .map(String::as_str)
}

fn compile_glob(pattern: &str) -> Option<Regex> {
    let mut regex_str = String::with_capacity(pattern.len() + 2);
    regex_str.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            _ => regex_str.push_str(&regex::escape(&ch.to_string())),
        }
    }
    regex_str.push('$');
    Regex::new(&regex_str).ok()
}
