//! Splitting text into chat-sized messages.

/// Split `text` into consecutive pieces of at most `max_len` characters.
///
/// Length is counted in Unicode scalar values, so a CJK character weighs the
/// same as an ASCII one. Concatenating the pieces yields `text` again.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
