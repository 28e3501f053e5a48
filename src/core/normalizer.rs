//! Text normalizers.
//!
//! A normalizer is a pure function of its configuration and input: it
//! rewrites a [`NormalizedString`] in place while keeping the per-byte
//! alignment to the original text intact.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;

use super::normalized::{NormalizationForm, NormalizedString};

/// Literal pattern for [`Normalizer::Replace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacePattern {
    String(String),
}

/// Supported normalizers, tagged the way `tokenizer.json` tags them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Normalizer {
    Lowercase,
    #[serde(rename = "NFC")]
    Nfc,
    #[serde(rename = "NFD")]
    Nfd,
    #[serde(rename = "NFKC")]
    Nfkc,
    #[serde(rename = "NFKD")]
    Nfkd,
    StripAccents,
    Strip {
        #[serde(default = "default_true")]
        strip_left: bool,
        #[serde(default = "default_true")]
        strip_right: bool,
    },
    Replace {
        pattern: ReplacePattern,
        content: String,
    },
    Prepend {
        prepend: String,
    },
    BertNormalizer {
        #[serde(default = "default_true")]
        clean_text: bool,
        #[serde(default = "default_true")]
        handle_chinese_chars: bool,
        /// Defaults to the value of `lowercase` when absent.
        #[serde(default)]
        strip_accents: Option<bool>,
        #[serde(default = "default_true")]
        lowercase: bool,
    },
    Sequence {
        normalizers: Vec<Normalizer>,
    },
}

fn default_true() -> bool {
    true
}

impl Normalizer {
    /// BERT's uncased normalizer.
    pub fn bert(lowercase: bool) -> Self {
        Normalizer::BertNormalizer {
            clean_text: true,
            handle_chinese_chars: true,
            strip_accents: None,
            lowercase,
        }
    }

    pub fn replace(pattern: &str, content: &str) -> Self {
        Normalizer::Replace {
            pattern: ReplacePattern::String(pattern.to_owned()),
            content: content.to_owned(),
        }
    }

    /// Normalize `text` from scratch.
    pub fn normalize_str(&self, text: &str) -> NormalizedString {
        let mut normalized = NormalizedString::from(text);
        self.normalize(&mut normalized);
        normalized
    }

    /// Apply this normalizer in place.
    pub fn normalize(&self, normalized: &mut NormalizedString) {
        match self {
            Normalizer::Lowercase => normalized.lowercase(),
            Normalizer::Nfc => normalized.normalize(NormalizationForm::Nfc),
            Normalizer::Nfd => normalized.normalize(NormalizationForm::Nfd),
            Normalizer::Nfkc => normalized.normalize(NormalizationForm::Nfkc),
            Normalizer::Nfkd => normalized.normalize(NormalizationForm::Nfkd),
            Normalizer::StripAccents => normalized.filter(|c| !is_combining_mark(c)),
            Normalizer::Strip {
                strip_left,
                strip_right,
            } => normalized.strip(*strip_left, *strip_right),
            Normalizer::Replace {
                pattern: ReplacePattern::String(pattern),
                content,
            } => normalized.replace(pattern, content),
            Normalizer::Prepend { prepend } => {
                if !normalized.is_empty() {
                    normalized.prepend(prepend)
                }
            }
            Normalizer::BertNormalizer {
                clean_text,
                handle_chinese_chars,
                strip_accents,
                lowercase,
            } => {
                if *clean_text {
                    bert_clean_text(normalized);
                }
                if *handle_chinese_chars {
                    normalized.flat_map_chars(pad_chinese_char);
                }
                if strip_accents.unwrap_or(*lowercase) {
                    normalized.normalize(NormalizationForm::Nfd);
                    normalized.filter(|c| !is_combining_mark(c));
                }
                if *lowercase {
                    normalized.lowercase();
                }
            }
            Normalizer::Sequence { normalizers } => {
                for n in normalizers {
                    n.normalize(normalized);
                }
            }
        }
    }
}

/// Drop NUL, U+FFFD and control characters; map any whitespace to a space.
fn bert_clean_text(normalized: &mut NormalizedString) {
    normalized.filter(|c| !(c == '\0' || c == '\u{fffd}' || is_bert_control(c)));
    normalized.map_chars(|c| if is_bert_whitespace(c) { ' ' } else { c });
}

fn is_bert_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r') || c.is_whitespace()
}

fn is_bert_control(c: char) -> bool {
    !matches!(c, '\t' | '\n' | '\r') && c.is_control()
}

/// CJK Unified Ideographs blocks, as BERT defines them.
pub(crate) fn is_chinese_char(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B920..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}

fn pad_chinese_char(c: char) -> impl Iterator<Item = char> {
    let padded = is_chinese_char(c);
    let (first, last) = if padded {
        (Some(' '), Some(' '))
    } else {
        (None, None)
    };
    first.into_iter().chain(std::iter::once(c)).chain(last)
}
