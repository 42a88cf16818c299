//! Escaping of user-supplied strings embedded in MongoDB query patterns.
//!
//! Prefix scans are expressed as anchored `$regex` filters. Relative paths may contain
//! characters with a meaning in PCRE (`.` is common in file names), so every prefix is escaped
//! before it becomes part of a pattern.

/// Escapes strings for use inside MongoDB regular expressions.
pub(crate) struct PatternSanitizer;

impl PatternSanitizer {
    /// Characters with a special meaning in PCRE outside a character class.
    const SPECIAL: [char; 14] = [
        '\\', '^', '$', '.', '|', '?', '*', '+', '(', ')', '[', ']', '{', '}',
    ];

    /// Escapes every special character in `input` with a backslash.
    pub(crate) fn escape(input: &str) -> String {
        let mut escaped = String::with_capacity(input.len());
        for c in input.chars() {
            if Self::SPECIAL.contains(&c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }

        escaped
    }

    /// Anchored pattern matching every string that starts with `prefix`.
    pub(crate) fn prefix_pattern(prefix: &str) -> String {
        format!("^{}", Self::escape(prefix))
    }
}
