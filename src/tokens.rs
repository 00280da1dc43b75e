/// Approximate token count for generated text: `round(words * 1.3)`.
///
/// No tokenizer is involved, so callers must present the value as approximate.
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.split_whitespace().count();
    (words as f64 * 1.3).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_has_no_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t"), 0);
    }

    #[test]
    fn word_count_is_scaled_and_rounded() {
        assert_eq!(estimate_tokens("hello"), 1);
        assert_eq!(estimate_tokens("hello there"), 3);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
    }
}
