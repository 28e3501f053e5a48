//! Tokens matched verbatim in the raw input, before normalization.

use std::ops::Range;

use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tokenizer::TokenizerError;
use super::vocab::Vocabulary;

/// A token the model never has to produce: its content is cut out of the
/// input and mapped straight to `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedToken {
    pub id: u32,
    pub content: String,
    /// Special tokens are dropped by `decode(.., skip_special_tokens = true)`.
    #[serde(default)]
    pub special: bool,
}

impl AddedToken {
    pub fn new(content: impl Into<String>, id: u32, special: bool) -> Self {
        Self {
            id,
            content: content.into(),
            special,
        }
    }

    pub fn special(content: impl Into<String>, id: u32) -> Self {
        Self::new(content, id, true)
    }
}

/// A piece of the raw input: either plain text or an added token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(Range<usize>),
    Added { id: u32, range: Range<usize> },
}

#[derive(Debug, Clone, Default)]
pub struct AddedVocabulary {
    tokens: Vec<AddedToken>,
    by_content: FxHashMap<String, u32>,
    by_id: FxHashMap<u32, usize>,
    special_ids: FxHashSet<u32>,
    matcher: Option<AhoCorasick>,
}

impl AddedVocabulary {
    /// Register `tokens` against the model vocabulary.
    ///
    /// A token whose content is already in the vocabulary must reuse that
    /// id, and an id already used by the vocabulary must carry the same
    /// content.
    pub fn new(tokens: Vec<AddedToken>, vocab: &Vocabulary) -> Result<Self, TokenizerError> {
        let mut this = Self::default();
        for token in tokens {
            if token.content.is_empty() {
                return Err(TokenizerError::Configuration(format!(
                    "added token {} has empty content",
                    token.id
                )));
            }
            if let Some(model_id) = vocab.token_to_id(&token.content) {
                if model_id != token.id {
                    return Err(TokenizerError::Configuration(format!(
                        "added token {:?} has id {} but the vocabulary maps it to {}",
                        token.content, token.id, model_id
                    )));
                }
            } else if let Some(model_token) = vocab.id_to_token(token.id) {
                return Err(TokenizerError::Configuration(format!(
                    "added token {:?} reuses id {} of {:?}",
                    token.content, token.id, model_token
                )));
            }
            match this.by_content.get(&token.content) {
                Some(&id) if id == token.id => continue,
                Some(&id) => {
                    return Err(TokenizerError::Configuration(format!(
                        "added token {:?} registered with ids {} and {}",
                        token.content, id, token.id
                    )))
                }
                None => {}
            }
            if this.by_id.contains_key(&token.id) {
                return Err(TokenizerError::Configuration(format!(
                    "id {} is used by more than one added token",
                    token.id
                )));
            }

            this.by_content.insert(token.content.clone(), token.id);
            this.by_id.insert(token.id, this.tokens.len());
            if token.special {
                this.special_ids.insert(token.id);
            }
            this.tokens.push(token);
        }

        if !this.tokens.is_empty() {
            let patterns: Vec<&str> = this.tokens.iter().map(|t| t.content.as_str()).collect();
            this.matcher = Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&patterns)?,
            );
        }
        debug!(
            added = this.tokens.len(),
            special = this.special_ids.len(),
            "built added vocabulary"
        );
        Ok(this)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[AddedToken] {
        &self.tokens
    }

    pub fn token_to_id(&self, content: &str) -> Option<u32> {
        self.by_content.get(content).copied()
    }

    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.by_id
            .get(&id)
            .map(|&i| self.tokens[i].content.as_str())
    }

    /// Ids of the added tokens flagged special.
    pub fn special_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.special_ids.iter().copied()
    }

    /// Cut `text` into plain-text and added-token segments, in order.
    /// With `encode_special_tokens`, special tokens stay plain text.
    pub(crate) fn split(&self, text: &str, encode_special_tokens: bool) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut last = 0;
        if let Some(matcher) = &self.matcher {
            for m in matcher.find_iter(text) {
                let token = &self.tokens[m.pattern().as_usize()];
                if encode_special_tokens && token.special {
                    continue;
                }
                if m.start() > last {
                    segments.push(Segment::Text(last..m.start()));
                }
                segments.push(Segment::Added {
                    id: token.id,
                    range: m.range(),
                });
                last = m.end();
            }
        }
        if last < text.len() {
            segments.push(Segment::Text(last..text.len()));
        }
        segments
    }
}
