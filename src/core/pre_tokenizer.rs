//! Pre-tokenizers: split normalized text into words.
//!
//! Every [`Word`] is a slice of the normalized text, possibly rewritten
//! (ByteLevel maps bytes into its alphabet, Metaspace swaps spaces for `▁`),
//! whose alignments point back into the normalized text. Words come out in
//! order and never overlap; the characters between them are the discarded
//! separators.

use std::fmt;
use std::sync::Arc;

use regexr::{Regex as RegexrRegex, RegexBuilder};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;

use super::byte_level::byte_to_char;
use super::normalized::{NormalizedString, Offsets};
use super::tokenizer::TokenizerError;

/// GPT-2 split pattern used by the ByteLevel pre-tokenizer.
pub const GPT2_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Default Metaspace replacement character.
pub const METASPACE: char = '\u{2581}';

/// A unit of text handed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    piece: NormalizedString,
}

impl Word {
    fn new(piece: NormalizedString) -> Self {
        Self { piece }
    }

    /// Text the model sees.
    pub fn text(&self) -> &str {
        self.piece.get()
    }

    /// Byte range of the word in the normalized text.
    pub fn span(&self) -> Offsets {
        self.piece.bounds()
    }

    /// The word with its alignments into the normalized text.
    pub fn normalized(&self) -> &NormalizedString {
        &self.piece
    }
}

/// All of `normalized` as one word, for pipelines without a pre-tokenizer.
pub(crate) fn single_word(normalized: &str) -> Vec<Word> {
    if normalized.is_empty() {
        return Vec::new();
    }
    vec![Word::new(NormalizedString::from(normalized))]
}

/// A compiled regex that clones cheaply and prints as its pattern.
#[derive(Clone)]
pub struct SharedRegex {
    pattern: String,
    regex: Arc<RegexrRegex>,
}

impl SharedRegex {
    pub fn new(pattern: &str) -> Result<Self, TokenizerError> {
        let regex = RegexBuilder::new(pattern).jit(true).build()?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex: Arc::new(regex),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    fn find_iter(&self, text: &str) -> Vec<Offsets> {
        self.regex
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

impl fmt::Debug for SharedRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedRegex").field(&self.pattern).finish()
    }
}

/// What happens to the matched delimiter when splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SplitBehavior {
    Removed,
    #[default]
    Isolated,
    MergedWithPrevious,
    MergedWithNext,
}

/// When Metaspace prepends its replacement character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrependScheme {
    #[default]
    Always,
    /// Only in front of the first segment of the input.
    First,
    Never,
}

#[derive(Debug, Clone)]
pub enum SplitPattern {
    String(String),
    Regex(SharedRegex),
}

impl SplitPattern {
    fn find_iter(&self, text: &str) -> Vec<Offsets> {
        match self {
            SplitPattern::String(s) if s.is_empty() => Vec::new(),
            SplitPattern::String(s) => text
                .match_indices(s.as_str())
                .map(|(at, m)| (at, at + m.len()))
                .collect(),
            SplitPattern::Regex(regex) => regex.find_iter(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ByteLevel {
    pub add_prefix_space: bool,
    regex: Option<SharedRegex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metaspace {
    pub replacement: char,
    pub prepend_scheme: PrependScheme,
    pub split: bool,
}

impl Default for Metaspace {
    fn default() -> Self {
        Self {
            replacement: METASPACE,
            prepend_scheme: PrependScheme::Always,
            split: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub pattern: SplitPattern,
    pub behavior: SplitBehavior,
    pub invert: bool,
}

/// Supported pre-tokenizers.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PreTokenizerConfig")]
pub enum PreTokenizer {
    /// `\w+|[^\w\s]+`
    Whitespace,
    /// Split on whitespace only.
    WhitespaceSplit,
    /// Whitespace split, then every punctuation character on its own.
    Bert,
    Punctuation(SplitBehavior),
    Digits {
        individual_digits: bool,
    },
    ByteLevel(ByteLevel),
    Metaspace(Metaspace),
    Split(Split),
    Sequence(Vec<PreTokenizer>),
}

impl PreTokenizer {
    /// GPT-2 style byte-level pre-tokenizer.
    pub fn byte_level(add_prefix_space: bool, use_regex: bool) -> Result<Self, TokenizerError> {
        let regex = if use_regex {
            Some(SharedRegex::new(GPT2_PATTERN)?)
        } else {
            None
        };
        Ok(PreTokenizer::ByteLevel(ByteLevel {
            add_prefix_space,
            regex,
        }))
    }

    pub fn metaspace(replacement: char, prepend_scheme: PrependScheme, split: bool) -> Self {
        PreTokenizer::Metaspace(Metaspace {
            replacement,
            prepend_scheme,
            split,
        })
    }

    /// Split on a regex.
    pub fn split_regex(
        pattern: &str,
        behavior: SplitBehavior,
        invert: bool,
    ) -> Result<Self, TokenizerError> {
        Ok(PreTokenizer::Split(Split {
            pattern: SplitPattern::Regex(SharedRegex::new(pattern)?),
            behavior,
            invert,
        }))
    }

    /// Split on a literal string.
    pub fn split_literal(pattern: &str, behavior: SplitBehavior, invert: bool) -> Self {
        PreTokenizer::Split(Split {
            pattern: SplitPattern::String(pattern.to_owned()),
            behavior,
            invert,
        })
    }

    /// Split `normalized` into words.
    pub fn pre_tokenize(&self, normalized: &str) -> Vec<Word> {
        self.pre_tokenize_segment(normalized, true)
    }

    /// Split into `(text, span)` pairs, spans being byte ranges of
    /// `normalized`.
    pub fn split(&self, normalized: &str) -> Vec<(String, Offsets)> {
        self.pre_tokenize(normalized)
            .into_iter()
            .map(|w| {
                let span = w.span();
                (w.piece.get().to_owned(), span)
            })
            .collect()
    }

    /// `first_segment` is false for text that follows an added token in the
    /// raw input; it only matters for [`PrependScheme::First`].
    pub(crate) fn pre_tokenize_segment(&self, normalized: &str, first_segment: bool) -> Vec<Word> {
        self.apply(single_word(normalized), first_segment)
    }

    fn apply(&self, words: Vec<Word>, first_segment: bool) -> Vec<Word> {
        if let PreTokenizer::Sequence(steps) = self {
            return steps
                .iter()
                .fold(words, |words, step| step.apply(words, first_segment));
        }
        let mut out = Vec::with_capacity(words.len());
        for (i, word) in words.into_iter().enumerate() {
            self.split_word(word, first_segment && i == 0, &mut out);
        }
        out
    }

    fn split_word(&self, word: Word, leading: bool, out: &mut Vec<Word>) {
        match self {
            PreTokenizer::Whitespace => push_runs(&word, out, |c| {
                if c.is_whitespace() {
                    CharClass::Skip
                } else if is_word_char(c) {
                    CharClass::Run(0)
                } else {
                    CharClass::Run(1)
                }
            }),
            PreTokenizer::WhitespaceSplit => push_runs(&word, out, |c| {
                if c.is_whitespace() {
                    CharClass::Skip
                } else {
                    CharClass::Run(0)
                }
            }),
            PreTokenizer::Bert => push_runs(&word, out, |c| {
                if c.is_whitespace() {
                    CharClass::Skip
                } else if is_punctuation(c) {
                    CharClass::Single
                } else {
                    CharClass::Run(0)
                }
            }),
            PreTokenizer::Punctuation(behavior) => {
                let matches = char_matches(word.text(), |c| is_punctuation(c), false);
                split_on_matches(&word, &matches, *behavior, false, out);
            }
            PreTokenizer::Digits { individual_digits } => {
                let matches =
                    char_matches(word.text(), |c| c.is_ascii_digit(), !individual_digits);
                split_on_matches(&word, &matches, SplitBehavior::Isolated, false, out);
            }
            PreTokenizer::ByteLevel(cfg) => {
                let mut piece = word.piece;
                if cfg.add_prefix_space && !piece.get().starts_with(' ') {
                    piece.prepend(" ");
                }
                let word = Word::new(piece);
                let mut pieces = Vec::new();
                match &cfg.regex {
                    Some(regex) => {
                        let matches = regex.find_iter(word.text());
                        split_on_matches(&word, &matches, SplitBehavior::Isolated, false, &mut pieces);
                    }
                    None => pieces.push(word),
                }
                for mut w in pieces {
                    map_to_byte_alphabet(&mut w.piece);
                    out.push(w);
                }
            }
            PreTokenizer::Metaspace(cfg) => {
                let mut piece = word.piece;
                let mut buf = [0u8; 4];
                piece.replace(" ", cfg.replacement.encode_utf8(&mut buf));
                let prepend = match cfg.prepend_scheme {
                    PrependScheme::Always => true,
                    PrependScheme::First => leading,
                    PrependScheme::Never => false,
                };
                if prepend && !piece.get().starts_with(cfg.replacement) {
                    piece.prepend(cfg.replacement.encode_utf8(&mut buf));
                }
                let word = Word::new(piece);
                if cfg.split {
                    let matches = char_matches(word.text(), |c| c == cfg.replacement, false);
                    split_on_matches(&word, &matches, SplitBehavior::MergedWithNext, false, out);
                } else {
                    out.push(word);
                }
            }
            PreTokenizer::Split(cfg) => {
                let matches = cfg.pattern.find_iter(word.text());
                split_on_matches(&word, &matches, cfg.behavior, cfg.invert, out);
            }
            PreTokenizer::Sequence(_) => {
                out.extend(self.apply(vec![word], leading));
            }
        }
    }
}

/// Rewrite each byte of the piece as its byte-level character; all
/// characters produced from one source character share its range.
fn map_to_byte_alphabet(piece: &mut NormalizedString) {
    let mapped: Vec<(char, Offsets)> = piece
        .chars_with_sources()
        .flat_map(|(c, range)| {
            let mut buf = [0u8; 4];
            let len = c.encode_utf8(&mut buf).len();
            (0..len).map(move |i| (byte_to_char(buf[i]), range))
        })
        .collect();
    piece.rebuild(mapped);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    /// Dropped separator.
    Skip,
    /// Joins adjacent characters of the same class.
    Run(u8),
    /// Always a word of its own.
    Single,
}

fn push_runs<F: Fn(char) -> CharClass>(word: &Word, out: &mut Vec<Word>, classify: F) {
    let text = word.text();
    let mut current: Option<(usize, CharClass)> = None;
    let mut ranges = Vec::new();
    for (i, c) in text.char_indices() {
        let class = classify(c);
        match current {
            Some((_, prev)) if prev == class && class != CharClass::Single => continue,
            Some((start, _)) => ranges.push((start, i)),
            None => {}
        }
        current = (class != CharClass::Skip).then_some((i, class));
    }
    if let Some((start, _)) = current {
        ranges.push((start, text.len()));
    }
    out.extend(
        ranges
            .into_iter()
            .filter_map(|(s, e)| word.piece.slice(s..e))
            .map(Word::new),
    );
}

/// Byte ranges of characters matching `pred`, either one per character or
/// merged into contiguous runs.
fn char_matches<F: Fn(char) -> bool>(text: &str, pred: F, contiguous: bool) -> Vec<Offsets> {
    let mut matches: Vec<Offsets> = Vec::new();
    for (i, c) in text.char_indices().filter(|&(_, c)| pred(c)) {
        let end = i + c.len_utf8();
        match matches.last_mut() {
            Some(last) if contiguous && last.1 == i => last.1 = end,
            _ => matches.push((i, end)),
        }
    }
    matches
}

fn split_on_matches(
    word: &Word,
    matches: &[Offsets],
    behavior: SplitBehavior,
    invert: bool,
    out: &mut Vec<Word>,
) {
    let len = word.text().len();
    let mut segments: Vec<(usize, usize, bool)> = Vec::with_capacity(matches.len() * 2 + 1);
    let mut last = 0;
    for &(start, end) in matches {
        if start > last {
            segments.push((last, start, invert));
        }
        if end > start {
            segments.push((start, end, !invert));
        }
        last = end;
    }
    if last < len {
        segments.push((last, len, invert));
    }

    let mut ranges: Vec<Offsets> = Vec::with_capacity(segments.len());
    match behavior {
        SplitBehavior::Removed => {
            ranges.extend(segments.iter().filter(|s| !s.2).map(|s| (s.0, s.1)));
        }
        SplitBehavior::Isolated => {
            ranges.extend(segments.iter().map(|s| (s.0, s.1)));
        }
        SplitBehavior::MergedWithPrevious => {
            for &(start, end, is_match) in &segments {
                match ranges.last_mut() {
                    Some(prev) if is_match => prev.1 = end,
                    _ => ranges.push((start, end)),
                }
            }
        }
        SplitBehavior::MergedWithNext => {
            let mut pending: Option<usize> = None;
            for &(start, end, is_match) in &segments {
                if is_match {
                    if let Some(p) = pending.replace(start) {
                        ranges.push((p, start));
                    }
                } else {
                    ranges.push((pending.take().unwrap_or(start), end));
                }
            }
            if let Some(p) = pending {
                ranges.push((p, len));
            }
        }
    }

    out.extend(
        ranges
            .into_iter()
            .filter(|&(s, e)| e > s)
            .filter_map(|(s, e)| word.piece.slice(s..e))
            .map(Word::new),
    );
}

/// The regex `\w` class: letters, marks, numbers, connector punctuation
/// and the zero-width joiners.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
        || is_combining_mark(c)
        || matches!(
            c,
            '_' | '\u{200C}'
                | '\u{200D}'
                | '\u{203F}'
                | '\u{2040}'
                | '\u{2054}'
                | '\u{FE33}'
                | '\u{FE34}'
                | '\u{FE4D}'..='\u{FE4F}'
                | '\u{FF3F}'
        )
}

/// ASCII punctuation and symbols, plus the Unicode punctuation (`P*`)
/// characters of the scripts commonly seen in text.
pub(crate) fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c as u32,
            0x00A1 | 0x00A7 | 0x00AB | 0x00B6 | 0x00B7 | 0x00BB | 0x00BF
                | 0x037E | 0x0387
                | 0x055A..=0x055F | 0x0589..=0x058A
                | 0x05BE | 0x05C0 | 0x05C3 | 0x05C6 | 0x05F3..=0x05F4
                | 0x0609..=0x060A | 0x060C..=0x060D | 0x061B | 0x061D..=0x061F
                | 0x066A..=0x066D | 0x06D4
                | 0x0964..=0x0965 | 0x0970 | 0x0DF4
                | 0x0E4F | 0x0E5A..=0x0E5B
                | 0x0F04..=0x0F12 | 0x0F14 | 0x0F3A..=0x0F3D | 0x0F85
                | 0x104A..=0x104F | 0x10FB | 0x1360..=0x1368 | 0x166E
                | 0x17D4..=0x17D6 | 0x17D8..=0x17DA | 0x1800..=0x180A
                | 0x2010..=0x2027 | 0x2030..=0x2043 | 0x2045..=0x2051 | 0x2053..=0x205E
                | 0x207D..=0x207E | 0x208D..=0x208E
                | 0x2308..=0x230B | 0x2329..=0x232A | 0x2768..=0x2775
                | 0x27C5..=0x27C6 | 0x27E6..=0x27EF | 0x2983..=0x2998
                | 0x29D8..=0x29DB | 0x29FC..=0x29FD
                | 0x2CF9..=0x2CFC | 0x2CFE..=0x2CFF
                | 0x2E00..=0x2E2E | 0x2E30..=0x2E4F | 0x2E52..=0x2E5D
                | 0x3001..=0x3003 | 0x3008..=0x3011 | 0x3014..=0x301F
                | 0x3030 | 0x303D | 0x30A0 | 0x30FB
                | 0xA4FE..=0xA4FF | 0xA60D..=0xA60F | 0xA673 | 0xA67E
                | 0xA8CE..=0xA8CF | 0xA8F8..=0xA8FA | 0xA92E..=0xA92F
                | 0xA95F | 0xA9C1..=0xA9CD | 0xAA5C..=0xAA5F | 0xABEB
                | 0xFD3E..=0xFD3F | 0xFE10..=0xFE19 | 0xFE30..=0xFE52
                | 0xFE54..=0xFE61 | 0xFE63 | 0xFE68 | 0xFE6A..=0xFE6B
                | 0xFF01..=0xFF03 | 0xFF05..=0xFF0A | 0xFF0C..=0xFF0F
                | 0xFF1A..=0xFF1B | 0xFF1F..=0xFF20 | 0xFF3B..=0xFF3D
                | 0xFF3F | 0xFF5B | 0xFF5D | 0xFF5F..=0xFF65
        )
}

// -----------------------------------------------------------------------------
// tokenizer.json shapes
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
enum SplitPatternConfig {
    String(String),
    Regex(String),
}

fn default_true() -> bool {
    true
}

fn default_replacement() -> char {
    METASPACE
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum PreTokenizerConfig {
    Whitespace,
    WhitespaceSplit,
    BertPreTokenizer,
    Punctuation {
        #[serde(default)]
        behavior: SplitBehavior,
    },
    Digits {
        #[serde(default)]
        individual_digits: bool,
    },
    ByteLevel {
        #[serde(default = "default_true")]
        add_prefix_space: bool,
        #[serde(default = "default_true")]
        use_regex: bool,
    },
    Metaspace {
        #[serde(default = "default_replacement")]
        replacement: char,
        #[serde(default)]
        prepend_scheme: Option<PrependScheme>,
        /// Older files use this instead of `prepend_scheme`.
        #[serde(default)]
        add_prefix_space: Option<bool>,
        #[serde(default = "default_true")]
        split: bool,
    },
    Split {
        pattern: SplitPatternConfig,
        behavior: SplitBehavior,
        #[serde(default)]
        invert: bool,
    },
    Sequence {
        pretokenizers: Vec<PreTokenizerConfig>,
    },
}

impl TryFrom<PreTokenizerConfig> for PreTokenizer {
    type Error = TokenizerError;

    fn try_from(config: PreTokenizerConfig) -> Result<Self, Self::Error> {
        Ok(match config {
            PreTokenizerConfig::Whitespace => PreTokenizer::Whitespace,
            PreTokenizerConfig::WhitespaceSplit => PreTokenizer::WhitespaceSplit,
            PreTokenizerConfig::BertPreTokenizer => PreTokenizer::Bert,
            PreTokenizerConfig::Punctuation { behavior } => PreTokenizer::Punctuation(behavior),
            PreTokenizerConfig::Digits { individual_digits } => {
                PreTokenizer::Digits { individual_digits }
            }
            PreTokenizerConfig::ByteLevel {
                add_prefix_space,
                use_regex,
            } => PreTokenizer::byte_level(add_prefix_space, use_regex)?,
            PreTokenizerConfig::Metaspace {
                replacement,
                prepend_scheme,
                add_prefix_space,
                split,
            } => {
                let scheme = prepend_scheme.unwrap_or(match add_prefix_space {
                    Some(false) => PrependScheme::Never,
                    _ => PrependScheme::Always,
                });
                PreTokenizer::metaspace(replacement, scheme, split)
            }
            PreTokenizerConfig::Split {
                pattern,
                behavior,
                invert,
            } => match pattern {
                SplitPatternConfig::String(s) => PreTokenizer::split_literal(&s, behavior, invert),
                SplitPatternConfig::Regex(r) => PreTokenizer::split_regex(&r, behavior, invert)?,
            },
            PreTokenizerConfig::Sequence { pretokenizers } => PreTokenizer::Sequence(
                pretokenizers
                    .into_iter()
                    .map(PreTokenizer::try_from)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(words: &[(String, Offsets)]) -> Vec<&str> {
        words.iter().map(|(w, _)| w.as_str()).collect()
    }

    fn spans(words: &[(String, Offsets)]) -> Vec<Offsets> {
        words.iter().map(|(_, s)| *s).collect()
    }

    #[test]
    fn test_whitespace() {
        let words = PreTokenizer::Whitespace.split("Hey friend!  How are_you?");
        assert_eq!(
            texts(&words),
            vec!["Hey", "friend", "!", "How", "are_you", "?"]
        );
        assert_eq!(spans(&words)[2], (10, 11));
    }

    #[test]
    fn test_whitespace_split() {
        let words = PreTokenizer::WhitespaceSplit.split(" a,b  c ");
        assert_eq!(texts(&words), vec!["a,b", "c"]);
        assert_eq!(spans(&words), vec![(1, 4), (6, 7)]);
    }

    #[test]
    fn test_bert_isolates_punctuation() {
        let words = PreTokenizer::Bert.split("Hi!! you");
        assert_eq!(texts(&words), vec!["Hi", "!", "!", "you"]);
    }

    #[test]
    fn test_whitespace_keeps_combining_marks() {
        let words = PreTokenizer::Whitespace.split("हिन्दी भाषा।");
        assert_eq!(texts(&words), vec!["हिन्दी", "भाषा", "।"]);
        assert_eq!(spans(&words)[0], (0, 18));

        let words = PreTokenizer::Whitespace.split("cafe\u{301} hi");
        assert_eq!(texts(&words), vec!["cafe\u{301}", "hi"]);
    }

    #[test]
    fn test_bert_unicode_punctuation() {
        assert_eq!(texts(&PreTokenizer::Bert.split("5µm ½ x²")), vec!["5µm", "½", "x²"]);
        assert_eq!(
            texts(&PreTokenizer::Bert.split("¿qué?«hola»")),
            vec!["¿", "qué", "?", "«", "hola", "»"]
        );
        assert_eq!(texts(&PreTokenizer::Bert.split("نعم، لا")), vec!["نعم", "،", "لا"]);
        assert_eq!(texts(&PreTokenizer::Bert.split("ठीक।")), vec!["ठीक", "।"]);
    }

    #[test]
    fn test_digits() {
        let joined = PreTokenizer::Digits {
            individual_digits: false,
        };
        assert_eq!(texts(&joined.split("ab123c")), vec!["ab", "123", "c"]);
        let single = PreTokenizer::Digits {
            individual_digits: true,
        };
        assert_eq!(texts(&single.split("a12")), vec!["a", "1", "2"]);
    }

    #[test]
    fn test_byte_level() {
        let pre = PreTokenizer::byte_level(false, true).unwrap();
        let words = pre.split("Hello my friend, é");
        assert_eq!(
            texts(&words),
            vec!["Hello", "Ġmy", "Ġfriend", ",", "ĠÃ©"]
        );
        assert_eq!(
            spans(&words),
            vec![(0, 5), (5, 8), (8, 15), (15, 16), (16, 19)]
        );
    }

    #[test]
    fn test_byte_level_prefix_space() {
        let pre = PreTokenizer::byte_level(true, true).unwrap();
        let words = pre.pre_tokenize("hi");
        assert_eq!(words[0].text(), "Ġhi");
        assert_eq!(words[0].span(), (0, 2));
    }

    #[test]
    fn test_metaspace() {
        let pre = PreTokenizer::metaspace(METASPACE, PrependScheme::Always, true);
        let words = pre.split("Hey  friend");
        assert_eq!(texts(&words), vec!["▁Hey", "▁", "▁friend"]);
        assert_eq!(spans(&words), vec![(0, 3), (3, 4), (4, 11)]);
    }

    #[test]
    fn test_metaspace_first_scheme() {
        let pre = PreTokenizer::metaspace(METASPACE, PrependScheme::First, false);
        assert_eq!(pre.pre_tokenize_segment("a b", true)[0].text(), "▁a▁b");
        assert_eq!(pre.pre_tokenize_segment("a b", false)[0].text(), "a▁b");
    }

    #[test]
    fn test_split_behaviors() {
        let text = "a-b-";
        let removed = PreTokenizer::split_literal("-", SplitBehavior::Removed, false);
        assert_eq!(texts(&removed.split(text)), vec!["a", "b"]);
        let prev = PreTokenizer::split_literal("-", SplitBehavior::MergedWithPrevious, false);
        assert_eq!(texts(&prev.split(text)), vec!["a-", "b-"]);
        let next = PreTokenizer::split_literal("-", SplitBehavior::MergedWithNext, false);
        assert_eq!(texts(&next.split(text)), vec!["a", "-b", "-"]);
        let inverted = PreTokenizer::split_literal("-", SplitBehavior::Removed, true);
        assert_eq!(texts(&inverted.split(text)), vec!["-", "-"]);
    }

    #[test]
    fn test_sequence() {
        let pre = PreTokenizer::Sequence(vec![
            PreTokenizer::WhitespaceSplit,
            PreTokenizer::Digits {
                individual_digits: true,
            },
        ]);
        let words = pre.split("ab 12");
        assert_eq!(texts(&words), vec!["ab", "1", "2"]);
        assert_eq!(spans(&words), vec![(0, 2), (3, 4), (4, 5)]);
    }

    #[test]
    fn test_spans_reconstruct_input() {
        let text = "The  quick, brown fox!";
        let words = PreTokenizer::Whitespace.split(text);
        let mut rebuilt = String::new();
        let mut last = 0;
        for (_, (start, end)) in &words {
            assert!(*start >= last);
            rebuilt.push_str(&text[last..*start]);
            rebuilt.push_str(&text[*start..*end]);
            last = *end;
        }
        rebuilt.push_str(&text[last..]);
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_deserialize() {
        let json = r#"{"type":"Sequence","pretokenizers":[
            {"type":"Split","pattern":{"Regex":"\\s+"},"behavior":"Removed","invert":false},
            {"type":"Metaspace","replacement":"▁","add_prefix_space":true}
        ]}"#;
        let pre: PreTokenizer = serde_json::from_str(json).unwrap();
        assert_eq!(texts(&pre.split("a b")), vec!["▁a", "▁b"]);
    }
}
