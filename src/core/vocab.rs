//! Immutable vocabulary: token string ↔ id plus the ordered merge table.
//!
//! Ids are dense: `id_to_token[id]` is the token for `id`, and
//! `token_to_id` is its exact inverse. A merge's rank is its position in
//! the merge list, lower ranks apply first.
//!
//! Two sources are supported in-process:
//! - explicit maps (`Vocabulary::new`), which is what the `tokenizer.json`
//!   loader produces
//! - tiktoken files (`base64_token rank` per line), for which the merge
//!   table is derived from the ranks and tokens are mapped into the
//!   byte-level alphabet

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use super::byte_level::bytes_to_chars;

/// Errors raised while building or loading a vocabulary.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("Invalid base64 encoding: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Invalid line format: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Token {0:?} appears more than once")]
    DuplicateToken(String),
    #[error("Id {id} is assigned to both {first:?} and {second:?}")]
    DuplicateId {
        id: u32,
        first: String,
        second: String,
    },
    #[error("Vocabulary ids must be dense, id {0} is missing")]
    MissingId(u32),
    #[error("Merge ({0:?}, {1:?}) refers to a token outside the vocabulary")]
    MergeOutOfVocabulary(String, String),
}

/// Token ↔ id maps and merge rules. Shared read-only by every encode call.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token_to_id: FxHashMap<String, u32>,
    id_to_token: Vec<String>,
    merges: Vec<(String, String)>,
}

impl Vocabulary {
    /// Build from a token → id map and an ordered merge list.
    ///
    /// Fails when two tokens share an id or when ids leave a gap.
    pub fn new(
        token_to_id: FxHashMap<String, u32>,
        merges: Vec<(String, String)>,
    ) -> Result<Self, VocabError> {
        // Ids past the end imply a gap below them; it is reported below.
        let mut slots: Vec<Option<String>> = vec![None; token_to_id.len()];
        for (token, &id) in &token_to_id {
            let Some(slot) = slots.get_mut(id as usize) else {
                continue;
            };
            if let Some(first) = slot {
                let (first, second) = if *first < *token {
                    (first.clone(), token.clone())
                } else {
                    (token.clone(), first.clone())
                };
                return Err(VocabError::DuplicateId { id, first, second });
            }
            *slot = Some(token.clone());
        }
        let id_to_token = slots
            .into_iter()
            .enumerate()
            .map(|(id, token)| token.ok_or(VocabError::MissingId(id as u32)))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            tokens = id_to_token.len(),
            merges = merges.len(),
            "built vocabulary"
        );

        Ok(Self {
            token_to_id,
            id_to_token,
            merges,
        })
    }

    /// Build from tokens listed in id order.
    pub fn from_tokens<I, S>(tokens: I, merges: Vec<(String, String)>) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut token_to_id = FxHashMap::default();
        for (id, token) in tokens.into_iter().enumerate() {
            let token = token.into();
            if token_to_id.insert(token.clone(), id as u32).is_some() {
                return Err(VocabError::DuplicateToken(token));
            }
        }
        Self::new(token_to_id, merges)
    }

    /// Build a byte-level vocabulary from tiktoken data, deriving the merge
    /// table from the ranks.
    ///
    /// For each token, every split into two tokens of the vocabulary becomes
    /// a merge; merges are ordered by the rank of the merged token, then by
    /// the ranks of the two halves.
    pub fn from_tiktoken(data: &[u8]) -> Result<Self, VocabError> {
        let ranks = load_tiktoken_bpe(data)?;

        let mut by_rank: Vec<(&Vec<u8>, u32)> = ranks.iter().map(|(k, &v)| (k, v)).collect();
        by_rank.sort_unstable_by_key(|&(_, rank)| rank);

        let mut merges = Vec::new();
        let mut local: Vec<(u32, u32, usize)> = Vec::new();
        for &(bytes, _) in &by_rank {
            if bytes.len() < 2 {
                continue;
            }
            local.clear();
            for split in 1..bytes.len() {
                if let (Some(&left), Some(&right)) =
                    (ranks.get(&bytes[..split]), ranks.get(&bytes[split..]))
                {
                    local.push((left, right, split));
                }
            }
            local.sort_unstable();
            for &(_, _, split) in &local {
                merges.push((
                    bytes_to_chars(&bytes[..split]),
                    bytes_to_chars(&bytes[split..]),
                ));
            }
        }

        let token_to_id = by_rank
            .into_iter()
            .map(|(bytes, rank)| (bytes_to_chars(bytes), rank))
            .collect();
        Self::new(token_to_id, merges)
    }

    #[inline]
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    #[inline]
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// Merge rules in rank order.
    pub fn merges(&self) -> &[(String, String)] {
        &self.merges
    }

    /// The token → id map.
    pub fn get_vocab(&self) -> &FxHashMap<String, u32> {
        &self.token_to_id
    }
}

/// Load a tiktoken BPE vocabulary (`base64_token rank` per line) from raw
/// bytes. Blank lines are skipped; `\r\n` line endings are accepted.
pub fn load_tiktoken_bpe(data: &[u8]) -> Result<FxHashMap<Vec<u8>, u32>, VocabError> {
    let mut ranks = FxHashMap::default();

    for (lineno, line) in data.split(|&b| b == b'\n').enumerate() {
        let line = line.trim_ascii_end();
        if line.is_empty() {
            continue;
        }

        let space = line.iter().rposition(|&b| b == b' ').ok_or_else(|| {
            VocabError::ParseError(format!("line {}: missing space separator", lineno + 1))
        })?;

        let token = STANDARD.decode(&line[..space])?;
        let rank = std::str::from_utf8(&line[space + 1..])
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .ok_or_else(|| VocabError::ParseError(format!("line {}: invalid rank", lineno + 1)))?;

        ranks.insert(token, rank);
    }

    Ok(ranks)
}

/// Load a tiktoken BPE vocabulary from a file path.
pub fn load_tiktoken_bpe_file(path: &str) -> Result<FxHashMap<Vec<u8>, u32>, VocabError> {
    let data = std::fs::read(path)?;
    load_tiktoken_bpe(&data)
}
