//! Character n-gram shingling, over Unicode scalar values rather than bytes.

/// Collects a string's Unicode scalar values for windowing.
pub fn char_vec(text: &str) -> Vec<char> {
    text.chars().collect()
}

/// Sliding windows of `n` characters. Yields nothing if `chars.len() < n`
/// (including `n == 0`, which callers should reject earlier).
pub fn ngram_windows(chars: &[char], n: usize) -> std::slice::Windows<'_, char> {
    chars.windows(n)
}

/// UTF-8 encodes one n-gram window into a flat byte buffer suitable for hashing.
pub fn encode_window(window: &[char]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(window.len() * 2);
    let mut scratch = [0u8; 4];
    for &c in window {
        buf.extend_from_slice(c.encode_utf8(&mut scratch).as_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_over_ascii() {
        let chars = char_vec("hello");
        let grams: Vec<String> = ngram_windows(&chars, 3).map(|w| w.iter().collect()).collect();
        assert_eq!(grams, vec!["hel", "ell", "llo"]);
    }

    #[test]
    fn too_short_yields_no_windows() {
        let chars = char_vec("hi");
        assert_eq!(ngram_windows(&chars, 5).count(), 0);
    }

    #[test]
    fn windows_count_unicode_scalars_not_bytes() {
        // Each "e" has a combining accent; as chars these are two scalars,
        // but more than two UTF-8 bytes.
        let chars = char_vec("cafe\u{301}cafe\u{301}");
        assert!(chars.len() < "cafe\u{301}cafe\u{301}".len());
        assert_eq!(ngram_windows(&chars, 3).count(), chars.len() - 2);
    }
}
