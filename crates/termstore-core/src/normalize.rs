//! Text normalisation applied before interning.

/// Maximum stored length of a term text, in bytes.
///
/// Texts longer than this are truncated before they are interned, and the
/// uniqueness constraint applies to the truncated form: two texts sharing
/// their first `MAX_TEXT_BYTES` bytes intern to the same text id.
pub const MAX_TEXT_BYTES: usize = 255;

/// Cut `text` to at most `max_bytes` bytes without splitting a code point.
pub fn truncate_to_byte_length(text: &str, max_bytes: usize) -> &str {
  if text.len() <= max_bytes {
    return text;
  }
  let mut end = max_bytes;
  while !text.is_char_boundary(end) {
    end -= 1;
  }
  &text[..end]
}

/// [`truncate_to_byte_length`] at [`MAX_TEXT_BYTES`].
pub fn truncate_text(text: &str) -> &str { truncate_to_byte_length(text, MAX_TEXT_BYTES) }
