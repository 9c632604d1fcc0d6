//! Text helpers for tool output.

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Cut `s` to at most `max_bytes` on a char boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    &s[..cutoff]
}

/// Truncate tool output and append a marker when anything was dropped.
/// A limit of 0 keeps the full text.
pub fn clip_output(s: String, max_bytes: usize) -> String {
    if max_bytes == 0 || s.len() <= max_bytes {
        return s;
    }
    let mut clipped = truncate_utf8(&s, max_bytes).to_string();
    clipped.push_str(TRUNCATION_MARKER);
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo";
        assert_eq!(truncate_utf8(s, 2), "h");
        assert_eq!(truncate_utf8(s, 3), "hé");
    }

    #[test]
    fn clip_output_marks_truncation() {
        let clipped = clip_output("x".repeat(20), 8);
        assert!(clipped.starts_with("xxxxxxxx"));
        assert!(clipped.ends_with("(truncated)"));
        assert_eq!(clip_output("short".to_string(), 8), "short");
        assert_eq!(clip_output("x".repeat(20), 0).len(), 20);
    }
}
