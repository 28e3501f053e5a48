//! Decoders: turn token strings back into text.
//!
//! Each decoder rewrites the token list (`decode_chain`); the results are
//! then concatenated. Chains compose through [`Decoder::Sequence`].

use serde::{Deserialize, Serialize};

use super::byte_level::chars_to_bytes_lossy;
use super::normalizer::ReplacePattern;
use super::pre_tokenizer::{PrependScheme, METASPACE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Decoder {
    /// Map byte-level characters back to bytes and decode them as UTF-8.
    ByteLevel,
    Metaspace {
        #[serde(default = "default_replacement")]
        replacement: char,
        #[serde(default)]
        prepend_scheme: Option<PrependScheme>,
        /// Older files use this instead of `prepend_scheme`.
        #[serde(default)]
        add_prefix_space: Option<bool>,
    },
    WordPiece {
        #[serde(default = "default_wordpiece_prefix")]
        prefix: String,
        #[serde(default = "default_true")]
        cleanup: bool,
    },
    /// Turns the end-of-word suffix into a space.
    #[serde(rename = "BPEDecoder")]
    BpeSuffix {
        #[serde(default = "default_suffix")]
        suffix: String,
    },
    /// Turns runs of `<0xNN>` tokens back into the bytes they encode.
    ByteFallback,
    Replace {
        pattern: ReplacePattern,
        content: String,
    },
    /// Drop up to `start` leading and `stop` trailing `content` characters
    /// from every token.
    Strip {
        content: char,
        #[serde(default)]
        start: usize,
        #[serde(default)]
        stop: usize,
    },
    Fuse,
    Sequence {
        decoders: Vec<Decoder>,
    },
}

fn default_true() -> bool {
    true
}

fn default_replacement() -> char {
    METASPACE
}

fn default_wordpiece_prefix() -> String {
    "##".to_owned()
}

fn default_suffix() -> String {
    "</w>".to_owned()
}

impl Decoder {
    pub fn metaspace(replacement: char, prepend_scheme: PrependScheme) -> Self {
        Decoder::Metaspace {
            replacement,
            prepend_scheme: Some(prepend_scheme),
            add_prefix_space: None,
        }
    }

    pub fn wordpiece(prefix: impl Into<String>, cleanup: bool) -> Self {
        Decoder::WordPiece {
            prefix: prefix.into(),
            cleanup,
        }
    }

    pub fn bpe_suffix(suffix: impl Into<String>) -> Self {
        Decoder::BpeSuffix {
            suffix: suffix.into(),
        }
    }

    /// Decode `tokens` into a string.
    pub fn decode(&self, tokens: Vec<String>) -> String {
        self.decode_chain(tokens).concat()
    }

    /// Rewrite the token list; concatenating the result gives the text.
    pub fn decode_chain(&self, tokens: Vec<String>) -> Vec<String> {
        match self {
            Decoder::ByteLevel => {
                let mut bytes = Vec::new();
                for token in &tokens {
                    chars_to_bytes_lossy(token, &mut bytes);
                }
                vec![String::from_utf8_lossy(&bytes).into_owned()]
            }
            Decoder::Metaspace {
                replacement,
                prepend_scheme,
                add_prefix_space,
            } => {
                let scheme = prepend_scheme.unwrap_or(match add_prefix_space {
                    Some(false) => PrependScheme::Never,
                    _ => PrependScheme::Always,
                });
                tokens
                    .into_iter()
                    .enumerate()
                    .map(|(i, token)| {
                        let token = token.replace(*replacement, " ");
                        match token.strip_prefix(' ') {
                            Some(rest) if i == 0 && scheme != PrependScheme::Never => {
                                rest.to_owned()
                            }
                            _ => token,
                        }
                    })
                    .collect()
            }
            Decoder::WordPiece { prefix, cleanup } => tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| {
                    let token = match token.strip_prefix(prefix.as_str()) {
                        Some(rest) if i != 0 => rest.to_owned(),
                        _ if i != 0 => format!(" {token}"),
                        _ => token,
                    };
                    if *cleanup {
                        cleanup_tokenization(&token)
                    } else {
                        token
                    }
                })
                .collect(),
            Decoder::BpeSuffix { suffix } => {
                let last = tokens.len().saturating_sub(1);
                tokens
                    .into_iter()
                    .enumerate()
                    .map(|(i, token)| token.replace(suffix.as_str(), if i == last { "" } else { " " }))
                    .collect()
            }
            Decoder::ByteFallback => byte_fallback(tokens),
            Decoder::Replace {
                pattern: ReplacePattern::String(pattern),
                content,
            } => tokens
                .into_iter()
                .map(|token| token.replace(pattern.as_str(), content))
                .collect(),
            Decoder::Strip {
                content,
                start,
                stop,
            } => tokens
                .into_iter()
                .map(|token| strip_chars(&token, *content, *start, *stop))
                .collect(),
            Decoder::Fuse => vec![tokens.concat()],
            Decoder::Sequence { decoders } => decoders
                .iter()
                .fold(tokens, |tokens, decoder| decoder.decode_chain(tokens)),
        }
    }
}

/// Undo the spacing WordPiece puts around punctuation and contractions.
fn cleanup_tokenization(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" do not", " don't")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

/// `<0xNN>` value, if `token` is a byte token.
fn parse_byte_token(token: &str) -> Option<u8> {
    let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

fn byte_fallback(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut pending: Vec<u8> = Vec::new();
    let flush = |pending: &mut Vec<u8>, out: &mut Vec<String>| {
        if pending.is_empty() {
            return;
        }
        match String::from_utf8(std::mem::take(pending)) {
            Ok(text) => out.push(text),
            // One replacement character per byte that did not decode.
            Err(err) => {
                let n = err.as_bytes().len();
                out.extend(std::iter::repeat("\u{fffd}".to_owned()).take(n));
            }
        }
    };
    for token in tokens {
        match parse_byte_token(&token) {
            Some(byte) => pending.push(byte),
            None => {
                flush(&mut pending, &mut out);
                out.push(token);
            }
        }
    }
    flush(&mut pending, &mut out);
    out
}

fn strip_chars(token: &str, content: char, start: usize, stop: usize) -> String {
    let chars: Vec<char> = token.chars().collect();
    let leading = chars.iter().take(start).take_while(|&&c| c == content).count();
    let trailing = chars[leading..]
        .iter()
        .rev()
        .take(stop)
        .take_while(|&&c| c == content)
        .count();
    chars[leading..chars.len() - trailing].iter().collect()
}
