//! Log-field previews.
//!
//! Prompts and rejected input lines can be long or multi-line; log fields
//! carry a bounded single-line preview instead.

/// Truncate by characters and append `suffix` when truncation occurs.
pub fn truncate_with_suffix_by_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}{suffix}")
}

/// One-line preview: control characters become spaces, then the result is
/// cut to `max_chars` with a trailing `...`.
pub fn log_preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    truncate_with_suffix_by_chars(flat.trim(), max_chars, "...")
}
