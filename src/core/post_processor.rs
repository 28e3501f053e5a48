//! Post-processors: insert special tokens, assign type ids and join pairs.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::byte_level::byte_to_char;
use super::encoding::{combine, Encoding};
use super::tokenizer::TokenizerError;

/// Which input a template piece stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sequence {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Piece {
    Sequence { id: Sequence, type_id: u32 },
    SpecialToken { id: String, type_id: u32 },
}

impl Piece {
    /// Parse `$A`, `$B:1`, `[CLS]`, `[SEP]:1` and similar.
    pub fn parse(piece: &str) -> Result<Self, TokenizerError> {
        let (name, type_id) = match piece.rsplit_once(':') {
            Some((name, type_id)) if !name.is_empty() => match type_id.parse::<u32>() {
                Ok(type_id) => (name, type_id),
                Err(_) => (piece, 0),
            },
            _ => (piece, 0),
        };
        match name {
            "$" | "$A" | "$a" => Ok(Piece::Sequence {
                id: Sequence::A,
                type_id,
            }),
            "$B" | "$b" => Ok(Piece::Sequence {
                id: Sequence::B,
                type_id,
            }),
            s if s.starts_with('$') => Err(TokenizerError::Configuration(format!(
                "unknown template sequence {piece:?}"
            ))),
            s => Ok(Piece::SpecialToken {
                id: s.to_owned(),
                type_id,
            }),
        }
    }
}

/// A special token as the template refers to it. One entry may expand to
/// several ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialToken {
    pub id: String,
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
}

impl SpecialToken {
    pub fn new(token: impl Into<String>, id: u32) -> Self {
        let token = token.into();
        Self {
            id: token.clone(),
            ids: vec![id],
            tokens: vec![token],
        }
    }
}

#[derive(Deserialize)]
struct TemplateConfig {
    single: Vec<Piece>,
    pair: Vec<Piece>,
    #[serde(default)]
    special_tokens: FxHashMap<String, SpecialToken>,
}

/// Template-driven post-processing, e.g. `[CLS] $A [SEP]` for single
/// inputs and `[CLS] $A [SEP] $B:1 [SEP]:1` for pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TemplateConfig")]
pub struct TemplateProcessing {
    single: Vec<Piece>,
    pair: Vec<Piece>,
    special_tokens: FxHashMap<String, SpecialToken>,
}

impl TryFrom<TemplateConfig> for TemplateProcessing {
    type Error = TokenizerError;

    fn try_from(config: TemplateConfig) -> Result<Self, Self::Error> {
        Self::from_pieces(config.single, config.pair, config.special_tokens.into_values())
    }
}

impl TemplateProcessing {
    /// Build from whitespace-separated templates.
    pub fn new(
        single: &str,
        pair: &str,
        special_tokens: impl IntoIterator<Item = SpecialToken>,
    ) -> Result<Self, TokenizerError> {
        let parse = |template: &str| {
            template
                .split_whitespace()
                .map(Piece::parse)
                .collect::<Result<Vec<_>, _>>()
        };
        Self::from_pieces(parse(single)?, parse(pair)?, special_tokens)
    }

    pub fn from_pieces(
        single: Vec<Piece>,
        pair: Vec<Piece>,
        special_tokens: impl IntoIterator<Item = SpecialToken>,
    ) -> Result<Self, TokenizerError> {
        let special_tokens: FxHashMap<String, SpecialToken> = special_tokens
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        for token in special_tokens.values() {
            if token.ids.len() != token.tokens.len() {
                return Err(TokenizerError::Configuration(format!(
                    "special token {:?} has {} ids but {} tokens",
                    token.id,
                    token.ids.len(),
                    token.tokens.len()
                )));
            }
        }
        for piece in single.iter().chain(&pair) {
            if let Piece::SpecialToken { id, .. } = piece {
                if !special_tokens.contains_key(id) {
                    return Err(TokenizerError::Configuration(format!(
                        "template uses {id:?} which has no special token entry"
                    )));
                }
            }
        }
        let has = |pieces: &[Piece], which: Sequence| {
            pieces
                .iter()
                .any(|p| matches!(p, Piece::Sequence { id, .. } if *id == which))
        };
        if has(&single, Sequence::B) {
            return Err(TokenizerError::Configuration(
                "single template cannot use $B".into(),
            ));
        }
        if !has(&pair, Sequence::A) || !has(&pair, Sequence::B) {
            return Err(TokenizerError::Configuration(
                "pair template must use both $A and $B".into(),
            ));
        }

        Ok(Self {
            single,
            pair,
            special_tokens,
        })
    }

    fn added_tokens(&self, is_pair: bool) -> usize {
        let template = if is_pair { &self.pair } else { &self.single };
        template
            .iter()
            .map(|piece| match piece {
                Piece::SpecialToken { id, .. } => {
                    self.special_tokens.get(id).map_or(0, |t| t.ids.len())
                }
                Piece::Sequence { .. } => 0,
            })
            .sum()
    }

    fn render(&self, first: Encoding, second: Option<Encoding>, add_special_tokens: bool) -> Encoding {
        let template = if second.is_some() {
            &self.pair
        } else {
            &self.single
        };
        let mut inputs = [Some(first), second];
        let mut parts = Vec::with_capacity(template.len());
        for piece in template {
            match piece {
                Piece::Sequence { id, type_id } => {
                    let slot = match id {
                        Sequence::A => 0,
                        Sequence::B => 1,
                    };
                    if let Some(mut encoding) = inputs[slot].take() {
                        encoding.set_type_ids(*type_id);
                        parts.push(encoding);
                    }
                }
                Piece::SpecialToken { id, type_id } => {
                    if !add_special_tokens {
                        continue;
                    }
                    if let Some(token) = self.special_tokens.get(id) {
                        parts.push(Encoding::from_special(&token.ids, &token.tokens, *type_id));
                    }
                }
            }
        }
        Encoding::merge(parts)
    }
}

/// Supported post-processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PostProcessor {
    /// `[CLS] A [SEP]` and `[CLS] A [SEP] B [SEP]`, B tokens with type id 1.
    #[serde(rename = "BertProcessing")]
    Bert { sep: (String, u32), cls: (String, u32) },
    /// Shrinks offsets so they exclude the spaces encoded inside tokens.
    ByteLevel {
        #[serde(default = "default_true")]
        trim_offsets: bool,
        #[serde(default = "default_true")]
        add_prefix_space: bool,
    },
    #[serde(rename = "TemplateProcessing")]
    Template(TemplateProcessing),
    Sequence { processors: Vec<PostProcessor> },
}

fn default_true() -> bool {
    true
}

impl PostProcessor {
    pub fn bert(cls: (impl Into<String>, u32), sep: (impl Into<String>, u32)) -> Self {
        PostProcessor::Bert {
            cls: (cls.0.into(), cls.1),
            sep: (sep.0.into(), sep.1),
        }
    }

    /// Number of special tokens inserted for a single input or a pair.
    pub fn added_tokens(&self, is_pair: bool) -> usize {
        match self {
            PostProcessor::Bert { .. } => {
                if is_pair {
                    3
                } else {
                    2
                }
            }
            PostProcessor::ByteLevel { .. } => 0,
            PostProcessor::Template(template) => template.added_tokens(is_pair),
            PostProcessor::Sequence { processors } => {
                processors.iter().map(|p| p.added_tokens(is_pair)).sum()
            }
        }
    }

    /// Ids this processor inserts.
    pub(crate) fn special_ids(&self) -> FxHashSet<u32> {
        match self {
            PostProcessor::Bert { sep, cls } => [sep.1, cls.1].into_iter().collect(),
            PostProcessor::ByteLevel { .. } => FxHashSet::default(),
            PostProcessor::Template(template) => template
                .special_tokens
                .values()
                .flat_map(|t| t.ids.iter().copied())
                .collect(),
            PostProcessor::Sequence { processors } => {
                processors.iter().flat_map(|p| p.special_ids()).collect()
            }
        }
    }

    /// Produce the final encoding from one or two (truncated) sequences.
    /// Overflowing windows are processed the same way as the main encoding.
    pub fn process(
        &self,
        first: Encoding,
        second: Option<Encoding>,
        add_special_tokens: bool,
    ) -> Encoding {
        let mut encodings = vec![first];
        encodings.extend(second);
        let encodings = self.process_encodings(encodings, add_special_tokens);
        join(encodings)
    }

    fn process_encodings(&self, mut encodings: Vec<Encoding>, add_special_tokens: bool) -> Vec<Encoding> {
        match self {
            PostProcessor::ByteLevel {
                trim_offsets,
                add_prefix_space,
            } => {
                if *trim_offsets {
                    for encoding in &mut encodings {
                        trim_byte_level_offsets(encoding, *add_prefix_space);
                    }
                }
                encodings
            }
            PostProcessor::Bert { sep, cls } => {
                let (first, second) = split_pair(encodings);
                let render = |a: Encoding, b: Option<Encoding>| {
                    render_bert(cls, sep, a, b, add_special_tokens)
                };
                vec![combine(first, second, render)]
            }
            PostProcessor::Template(template) => {
                let (first, second) = split_pair(encodings);
                let render = |a, b| template.render(a, b, add_special_tokens);
                vec![combine(first, second, render)]
            }
            PostProcessor::Sequence { processors } => processors
                .iter()
                .fold(encodings, |acc, p| p.process_encodings(acc, add_special_tokens)),
        }
    }
}

fn split_pair(encodings: Vec<Encoding>) -> (Encoding, Option<Encoding>) {
    let mut iter = encodings.into_iter();
    let first = iter.next().unwrap_or_default();
    (first, iter.next())
}

/// Concatenate a pair without inserting anything. The second sequence
/// keeps the type id it was encoded with.
pub(crate) fn join(encodings: Vec<Encoding>) -> Encoding {
    let (first, second) = split_pair(encodings);
    if second.is_none() && first.get_overflowing().is_empty() {
        return first;
    }
    combine(first, second, |mut a, b| {
        if let Some(b) = b {
            a.merge_with(b);
        }
        a
    })
}

fn render_bert(
    cls: &(String, u32),
    sep: &(String, u32),
    mut first: Encoding,
    second: Option<Encoding>,
    add_special_tokens: bool,
) -> Encoding {
    first.set_type_ids(0);
    if !add_special_tokens {
        if let Some(mut second) = second {
            second.set_type_ids(1);
            first.merge_with(second);
        }
        return first;
    }
    let special = |(token, id): &(String, u32), type_id| {
        Encoding::from_special(&[*id], std::slice::from_ref(token), type_id)
    };
    let mut parts = vec![special(cls, 0), first, special(sep, 0)];
    if let Some(mut second) = second {
        second.set_type_ids(1);
        parts.push(second);
        parts.push(special(sep, 1));
    }
    Encoding::merge(parts)
}

/// Move token offsets past leading and before trailing encoded spaces.
fn trim_byte_level_offsets(encoding: &mut Encoding, add_prefix_space: bool) {
    let space = byte_to_char(b' ');
    let is_space = |c: char| c == space || c.is_whitespace();
    let (tokens, offsets) = encoding.tokens_and_offsets_mut();
    for (i, (token, offsets)) in tokens.iter().zip(offsets.iter_mut()).enumerate() {
        let mut leading = token.chars().take_while(|&c| is_space(c)).count();
        let trailing = token.chars().rev().take_while(|&c| is_space(c)).count();
        // A prefix space added by the pre-tokenizer is not in the input.
        let is_first = i == 0 || offsets.0 == 0;
        if is_first && add_prefix_space && leading == 1 {
            leading = 0;
        }
        if leading > 0 {
            offsets.0 = (offsets.0 + leading).min(offsets.1);
        }
        if trailing > 0 && offsets.1 >= trailing {
            offsets.1 = (offsets.1 - trailing).max(offsets.0);
        }
    }
    for overflow in encoding.overflowing_mut() {
        trim_byte_level_offsets(overflow, add_prefix_space);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::Token;
    use crate::core::truncation::TruncationDirection;

    fn seq(tokens: &[&str], first_id: u32) -> Encoding {
        let mut start = 0;
        let tokens = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let offsets = (start, start + t.len());
                start += t.len();
                Token::new(first_id + i as u32, t.to_string(), offsets)
            })
            .collect();
        Encoding::from_tokens(tokens)
    }

    fn bert() -> PostProcessor {
        PostProcessor::bert(("[CLS]", 101), ("[SEP]", 102))
    }

    #[test]
    fn test_bert_pair() {
        let out = bert().process(seq(&["a", "b"], 1), Some(seq(&["c"], 3)), true);
        assert_eq!(out.get_ids(), &[101, 1, 2, 102, 3, 102]);
        assert_eq!(out.get_type_ids(), &[0, 0, 0, 0, 1, 1]);
        assert_eq!(out.get_special_tokens_mask(), &[1, 0, 0, 1, 0, 1]);
        assert_eq!(out.get_offsets()[0], (0, 0));
        assert_eq!(bert().added_tokens(true), 3);
        assert_eq!(bert().added_tokens(false), 2);
    }

    #[test]
    fn test_bert_without_special_tokens() {
        let out = bert().process(seq(&["a"], 1), Some(seq(&["c"], 3)), false);
        assert_eq!(out.get_ids(), &[1, 3]);
        assert_eq!(out.get_type_ids(), &[0, 1]);
    }

    #[test]
    fn test_template_matches_bert() {
        let template = TemplateProcessing::new(
            "[CLS] $A [SEP]",
            "[CLS] $A [SEP] $B:1 [SEP]:1",
            [SpecialToken::new("[CLS]", 101), SpecialToken::new("[SEP]", 102)],
        )
        .unwrap();
        let template = PostProcessor::Template(template);
        assert_eq!(template.added_tokens(true), 3);

        let a = seq(&["a", "b"], 1);
        let b = seq(&["c"], 3);
        assert_eq!(
            template.process(a.clone(), Some(b.clone()), true),
            bert().process(a, Some(b), true)
        );
    }

    #[test]
    fn test_template_validation() {
        let missing = TemplateProcessing::new("[CLS] $A", "$A $B", []);
        assert!(matches!(missing, Err(TokenizerError::Configuration(_))));

        let no_b = TemplateProcessing::new("$A", "$A", []);
        assert!(matches!(no_b, Err(TokenizerError::Configuration(_))));

        assert!(matches!(
            Piece::parse("$C"),
            Err(TokenizerError::Configuration(_))
        ));
        assert_eq!(
            Piece::parse("<s>:1").unwrap(),
            Piece::SpecialToken {
                id: "<s>".into(),
                type_id: 1
            }
        );
    }

    #[test]
    fn test_overflowing_windows_get_special_tokens() {
        let mut a = seq(&["a", "b", "c"], 1);
        a.truncate(2, 0, TruncationDirection::Right).unwrap();
        let out = bert().process(a, None, true);
        assert_eq!(out.get_ids(), &[101, 1, 2, 102]);
        assert_eq!(out.get_overflowing()[0].get_ids(), &[101, 3, 102]);
    }

    #[test]
    fn test_byte_level_trim_offsets() {
        // "hi there" with a prefix space: Ġhi spans (0, 2), Ġthere (2, 8).
        let tokens = vec![
            Token::new(0, "Ġhi".into(), (0, 2)),
            Token::new(1, "Ġthere".into(), (2, 8)),
        ];
        let processor = PostProcessor::ByteLevel {
            trim_offsets: true,
            add_prefix_space: true,
        };
        let out = processor.process(Encoding::from_tokens(tokens), None, true);
        assert_eq!(out.get_offsets(), &[(0, 2), (3, 8)]);
    }

    #[test]
    fn test_deserialize_template() {
        let json = r#"{
            "type": "TemplateProcessing",
            "single": [{"SpecialToken": {"id": "<s>", "type_id": 0}}, {"Sequence": {"id": "A", "type_id": 0}}],
            "pair": [{"Sequence": {"id": "A", "type_id": 0}}, {"Sequence": {"id": "B", "type_id": 1}}],
            "special_tokens": {"<s>": {"id": "<s>", "ids": [1], "tokens": ["<s>"]}}
        }"#;
        let processor: PostProcessor = serde_json::from_str(json).unwrap();
        assert_eq!(processor.added_tokens(false), 1);
        assert_eq!(processor.added_tokens(true), 0);

        let bad = json.replace(r#""ids": [1]"#, r#""ids": [1, 2]"#);
        assert!(serde_json::from_str::<PostProcessor>(&bad).is_err());
    }
}
