//! String utility functions

/// Truncate text to max length with ellipsis
pub fn truncate_preview(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.chars().count() > max_len {
        format!("{}...", text.chars().take(max_len).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Single-line rendering of multi-line text for terminal output
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_preview_short() {
        assert_eq!(truncate_preview("hello", 30), "hello");
    }

    #[test]
    fn test_truncate_preview_long() {
        let text = "a".repeat(31);
        let result = truncate_preview(&text, 30);
        assert_eq!(result, format!("{}...", "a".repeat(30)));
    }

    #[test]
    fn test_truncate_preview_exact_length() {
        let text = "b".repeat(30);
        assert_eq!(truncate_preview(&text, 30), text);
    }

    #[test]
    fn test_truncate_preview_counts_chars() {
        assert_eq!(truncate_preview("天气怎么样", 2), "天气...");
    }

    #[test]
    fn test_truncate_preview_trims_whitespace() {
        assert_eq!(truncate_preview("  hello  ", 30), "hello");
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("Let me\n  check\tthe weather"), "Let me check the weather");
    }
}
