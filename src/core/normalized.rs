//! A string that remembers where each of its bytes came from.
//!
//! [`NormalizedString`] pairs the transformed text with one source range per
//! byte. Normalizers rewrite it against the original input; pre-tokenizers
//! slice it into words whose alignments point back into the normalized
//! text. Any byte range of the current text can then be translated to the
//! byte range of the text it was derived from.

use std::ops::Range;

use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::{
    is_nfc_quick, is_nfd_quick, is_nfkc_quick, is_nfkd_quick, IsNormalized, UnicodeNormalization,
};

use super::tokenizer::TokenizerError;

/// Byte range `(start, end)`.
pub type Offsets = (usize, usize);

/// Unicode normalization forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationForm {
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedString {
    normalized: String,
    /// Source range of every byte of `normalized`.
    alignments: Vec<Offsets>,
    /// Source range covered by the whole string, used for empty lookups.
    bounds: Offsets,
}

impl NormalizedString {
    /// Wrap `text` whose source starts at byte `base`.
    pub fn with_base(text: &str, base: usize) -> Self {
        let mut alignments = Vec::with_capacity(text.len());
        for (i, c) in text.char_indices() {
            let range = (base + i, base + i + c.len_utf8());
            alignments.extend(std::iter::repeat(range).take(c.len_utf8()));
        }
        Self {
            normalized: text.to_owned(),
            alignments,
            bounds: (base, base + text.len()),
        }
    }

    /// Validate raw input bytes and wrap them.
    pub fn from_utf8(bytes: &[u8]) -> Result<Self, TokenizerError> {
        let text = std::str::from_utf8(bytes).map_err(|e| TokenizerError::InvalidInput {
            valid_up_to: e.valid_up_to(),
        })?;
        Ok(Self::from(text))
    }

    #[inline]
    pub fn get(&self) -> &str {
        &self.normalized
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn alignments(&self) -> &[Offsets] {
        &self.alignments
    }

    /// Source range covered by this string.
    pub fn bounds(&self) -> Offsets {
        self.bounds
    }

    /// Translate a byte range of the current text to its source range.
    ///
    /// An empty range maps to an empty source range at the matching
    /// position. Returns `None` when the range is out of bounds or reversed.
    pub fn source_range(&self, range: Range<usize>) -> Option<Offsets> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        if range.start == range.end {
            let at = match self.alignments.get(range.start) {
                Some(&(start, _)) => start,
                None => self.alignments.last().map_or(self.bounds.0, |&(_, end)| end),
            };
            return Some((at, at));
        }
        Some((self.alignments[range.start].0, self.alignments[range.end - 1].1))
    }

    /// Sub-string for a byte range on character boundaries. Its alignments
    /// still point into the same source.
    pub fn slice(&self, range: Range<usize>) -> Option<Self> {
        let normalized = self.normalized.get(range.clone())?.to_owned();
        let bounds = self.source_range(range.clone())?;
        Some(Self {
            normalized,
            alignments: self.alignments[range].to_vec(),
            bounds,
        })
    }

    /// Characters of the current text with the source range of each.
    pub fn chars_with_sources(&self) -> impl Iterator<Item = (char, Offsets)> + '_ {
        self.normalized.char_indices().map(move |(i, c)| {
            let last = i + c.len_utf8() - 1;
            (c, (self.alignments[i].0, self.alignments[last].1))
        })
    }

    /// Replace the content with `chars`, each carrying its source range.
    pub fn rebuild<I>(&mut self, chars: I)
    where
        I: IntoIterator<Item = (char, Offsets)>,
    {
        let mut normalized = String::with_capacity(self.normalized.len());
        let mut alignments = Vec::with_capacity(self.alignments.len());
        for (c, range) in chars {
            normalized.push(c);
            alignments.extend(std::iter::repeat(range).take(c.len_utf8()));
        }
        self.normalized = normalized;
        self.alignments = alignments;
    }

    /// Replace each character by zero or more characters, all inheriting the
    /// source range of the character they replace.
    pub fn flat_map_chars<F, I>(&mut self, mut f: F)
    where
        F: FnMut(char) -> I,
        I: IntoIterator<Item = char>,
    {
        let mapped: Vec<(char, Offsets)> = self
            .chars_with_sources()
            .flat_map(|(c, range)| f(c).into_iter().map(move |o| (o, range)))
            .collect();
        self.rebuild(mapped);
    }

    pub fn map_chars<F: FnMut(char) -> char>(&mut self, mut f: F) {
        self.flat_map_chars(|c| std::iter::once(f(c)));
    }

    /// Keep only the characters for which `keep` returns true.
    pub fn filter<F: FnMut(char) -> bool>(&mut self, mut keep: F) {
        let kept: Vec<(char, Offsets)> = self
            .chars_with_sources()
            .filter(|&(c, _)| keep(c))
            .collect();
        self.rebuild(kept);
    }

    pub fn lowercase(&mut self) {
        if self.normalized.is_ascii() {
            self.normalized.make_ascii_lowercase();
            return;
        }
        self.flat_map_chars(char::to_lowercase);
    }

    /// Insert `prefix` in front. The inserted characters get an empty source
    /// range at the start of the string.
    pub fn prepend(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        let at = self.alignments.first().map_or(self.bounds.0, |&(start, _)| start);
        let mut alignments = Vec::with_capacity(prefix.len() + self.alignments.len());
        alignments.extend(std::iter::repeat((at, at)).take(prefix.len()));
        alignments.append(&mut self.alignments);
        self.normalized.insert_str(0, prefix);
        self.alignments = alignments;
    }

    /// Trim whitespace on the requested sides.
    pub fn strip(&mut self, left: bool, right: bool) {
        let text = self.normalized.as_str();
        let start = if left {
            text.len() - text.trim_start().len()
        } else {
            0
        };
        let end = if right {
            text.trim_end().len()
        } else {
            text.len()
        };
        if start == 0 && end == text.len() {
            return;
        }
        let end = end.max(start);
        self.normalized = text[start..end].to_owned();
        self.alignments = self.alignments[start..end].to_vec();
    }

    /// Replace every literal occurrence of `pattern` with `content`. The
    /// replacement inherits the source range of the whole match.
    pub fn replace(&mut self, pattern: &str, content: &str) {
        if pattern.is_empty() || !self.normalized.contains(pattern) {
            return;
        }
        let mut out: Vec<(char, Offsets)> = Vec::with_capacity(self.normalized.len());
        let mut last = 0;
        for (at, matched) in self.normalized.match_indices(pattern) {
            self.push_chars(last..at, &mut out);
            // `at..at + len` is inside the text, so this cannot fail.
            if let Some(range) = self.source_range(at..at + matched.len()) {
                out.extend(content.chars().map(|c| (c, range)));
            }
            last = at + matched.len();
        }
        self.push_chars(last..self.normalized.len(), &mut out);
        self.rebuild(out);
    }

    fn push_chars(&self, range: Range<usize>, out: &mut Vec<(char, Offsets)>) {
        let base = range.start;
        for (i, c) in self.normalized[range].char_indices() {
            let first = base + i;
            let last = first + c.len_utf8() - 1;
            out.push((c, (self.alignments[first].0, self.alignments[last].1)));
        }
    }

    /// Apply a Unicode normalization form.
    ///
    /// Text is processed in runs that begin at a starter character, so
    /// composition and reordering never cross a run; every output character
    /// of a run is aligned to the whole run.
    pub fn normalize(&mut self, form: NormalizationForm) {
        let chars = self.normalized.chars();
        let already = match form {
            NormalizationForm::Nfc => is_nfc_quick(chars),
            NormalizationForm::Nfd => is_nfd_quick(chars),
            NormalizationForm::Nfkc => is_nfkc_quick(chars),
            NormalizationForm::Nfkd => is_nfkd_quick(chars),
        };
        if already == IsNormalized::Yes {
            return;
        }

        let mut out = Vec::with_capacity(self.normalized.len());
        let mut run = String::new();
        let mut run_range: Option<Offsets> = None;
        let flush = |run: &mut String, range: Option<Offsets>, out: &mut Vec<(char, Offsets)>| {
            if let Some(range) = range {
                let emit = |c: char| out.push((c, range));
                match form {
                    NormalizationForm::Nfc => run.nfc().for_each(emit),
                    NormalizationForm::Nfd => run.nfd().for_each(emit),
                    NormalizationForm::Nfkc => run.nfkc().for_each(emit),
                    NormalizationForm::Nfkd => run.nfkd().for_each(emit),
                }
            }
            run.clear();
        };

        for (c, range) in self.chars_with_sources() {
            if starts_run(c, form) {
                flush(&mut run, run_range.take(), &mut out);
            }
            run.push(c);
            run_range = Some(match run_range {
                Some((start, end)) => (start.min(range.0), end.max(range.1)),
                None => range,
            });
        }
        flush(&mut run, run_range, &mut out);
        self.rebuild(out);
    }
}

impl From<&str> for NormalizedString {
    fn from(text: &str) -> Self {
        Self::with_base(text, 0)
    }
}

/// A starter begins a new run unless it can compose with what precedes it
/// (Hangul vowel jamo, the Bengali and Tamil two-part vowel signs).
fn starts_run(c: char, form: NormalizationForm) -> bool {
    if canonical_combining_class(c) != 0 {
        return false;
    }
    let single = std::iter::once(c);
    match form {
        NormalizationForm::Nfc => is_nfc_quick(single) == IsNormalized::Yes,
        NormalizationForm::Nfkc => is_nfkc_quick(single) == IsNormalized::Yes,
        NormalizationForm::Nfd | NormalizationForm::Nfkd => true,
    }
}
