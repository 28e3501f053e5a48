//! Byte-to-unicode alphabet shared by the ByteLevel pre-tokenizer, the
//! ByteLevel decoder and the tiktoken vocabulary import.
//!
//! Every byte value maps to one printable character so that arbitrary UTF-8
//! (or raw bytes) can flow through a string-keyed BPE vocabulary:
//!
//! - `!`..=`~`, `¡`..=`¬` and `®`..=`ÿ` map to themselves
//! - the remaining 68 bytes (controls, space, DEL, NBSP, soft hyphen) map to
//!   `U+0100` onwards in byte order, so space becomes `Ġ` and `\n` becomes `Ċ`
//!
//! This is the GPT-2 alphabet used by HuggingFace ByteLevel tokenizers.

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

/// True when `b` keeps its own codepoint in the alphabet.
const fn maps_to_itself(b: u8) -> bool {
    matches!(b, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF)
}

static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut table = ['\0'; 256];
    let mut shifted = 0u32;
    for b in 0..=255u8 {
        let cp = if maps_to_itself(b) {
            b as u32
        } else {
            shifted += 1;
            0xFF + shifted
        };
        // Every value lies in 0..=0x143, all valid scalar values.
        table[b as usize] = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
    }
    table
});

static CHAR_TO_BYTE: LazyLock<FxHashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(b, &c)| (c, b as u8))
        .collect()
});

/// Character representing byte `b`.
#[inline]
pub fn byte_to_char(b: u8) -> char {
    BYTE_TO_CHAR[b as usize]
}

/// Byte represented by `c`, if `c` belongs to the alphabet.
#[inline]
pub fn char_to_byte(c: char) -> Option<u8> {
    CHAR_TO_BYTE.get(&c).copied()
}

/// Map raw bytes into their alphabet string.
///
/// ```
/// use tokenizers_core::core::byte_level::bytes_to_chars;
/// assert_eq!(bytes_to_chars(b" hi\n"), "\u{120}hi\u{10A}");
/// ```
#[inline]
pub fn bytes_to_chars(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_to_char(b)).collect()
}

/// Map an alphabet string back to bytes. Fails on characters outside the
/// alphabet.
#[inline]
pub fn chars_to_bytes(text: &str) -> Option<Vec<u8>> {
    text.chars().map(char_to_byte).collect()
}

/// Like [`chars_to_bytes`] but characters outside the alphabet are kept as
/// their own UTF-8 bytes. Used by the decoder, where added tokens such as
/// `<|endoftext|>` sit next to byte-level tokens.
pub fn chars_to_bytes_lossy(text: &str, out: &mut Vec<u8>) {
    let mut buf = [0u8; 4];
    for c in text.chars() {
        match char_to_byte(c) {
            Some(b) => out.push(b),
            None => out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
}

/// The 256 single-character strings of the alphabet, in byte order.
pub fn alphabet() -> impl Iterator<Item = char> {
    BYTE_TO_CHAR.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_is_a_bijection() {
        let unique: std::collections::HashSet<char> = alphabet().collect();
        assert_eq!(unique.len(), 256);
        for b in 0..=255u8 {
            assert_eq!(char_to_byte(byte_to_char(b)), Some(b));
        }
    }

    #[test]
    fn test_well_known_mappings() {
        assert_eq!(byte_to_char(b' '), 'Ġ');
        assert_eq!(byte_to_char(b'\n'), 'Ċ');
        assert_eq!(byte_to_char(b'\t'), 'ĉ');
        assert_eq!(byte_to_char(0), '\u{100}');
        assert_eq!(byte_to_char(b'a'), 'a');
        assert_eq!(byte_to_char(0xAD), '\u{143}');
    }

    #[test]
    fn test_multibyte_text_roundtrip() {
        let original = "Grüße, 世界 🦀";
        let mapped = bytes_to_chars(original.as_bytes());
        assert!(mapped.chars().all(|c| char_to_byte(c).is_some()));
        let bytes = chars_to_bytes(&mapped).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), original);
    }

    #[test]
    fn test_strict_decode_rejects_foreign_chars() {
        assert_eq!(chars_to_bytes("Ġ世"), None);
    }

    #[test]
    fn test_lossy_decode_keeps_foreign_chars() {
        let mut out = Vec::new();
        chars_to_bytes_lossy("<|end|>Ġok", &mut out);
        assert_eq!(out, b"<|end|> ok");
    }
}
