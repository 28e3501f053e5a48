//! Loading a tokenizer from a HuggingFace `tokenizer.json` file.
//!
//! Only the BPE model is supported. Components are deserialized straight
//! into the pipeline types; unknown fields are ignored so files written by
//! newer versions still load.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use super::added_vocabulary::AddedToken;
use super::bpe::Bpe;
use super::decoder::Decoder;
use super::normalizer::Normalizer;
use super::padding::PaddingParams;
use super::post_processor::PostProcessor;
use super::pre_tokenizer::PreTokenizer;
use super::tokenizer::{Tokenizer, TokenizerError};
use super::truncation::TruncationParams;
use super::vocab::Vocabulary;

#[derive(Deserialize)]
struct TokenizerFile {
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
    #[serde(default)]
    normalizer: Option<Normalizer>,
    #[serde(default)]
    pre_tokenizer: Option<PreTokenizer>,
    model: ModelConfig,
    #[serde(default)]
    post_processor: Option<PostProcessor>,
    #[serde(default)]
    decoder: Option<Decoder>,
    #[serde(default)]
    truncation: Option<TruncationParams>,
    #[serde(default)]
    padding: Option<PaddingParams>,
}

#[derive(Deserialize)]
struct ModelConfig {
    /// Absent in some older files, which were always BPE.
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    dropout: Option<f32>,
    #[serde(default)]
    unk_token: Option<String>,
    #[serde(default)]
    continuing_subword_prefix: Option<String>,
    #[serde(default)]
    end_of_word_suffix: Option<String>,
    #[serde(default)]
    fuse_unk: bool,
    #[serde(default)]
    byte_fallback: bool,
    #[serde(default)]
    ignore_merges: bool,
    vocab: FxHashMap<String, u32>,
    #[serde(default)]
    merges: Vec<Merge>,
}

/// Merges are written either as `"a b"` or as `["a", "b"]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Merge {
    Joined(String),
    Pair(String, String),
}

impl Merge {
    fn into_pair(self) -> Result<(String, String), TokenizerError> {
        match self {
            Merge::Pair(left, right) => Ok((left, right)),
            Merge::Joined(line) => match line.split_once(' ') {
                Some((left, right)) if !left.is_empty() && !right.is_empty() && !right.contains(' ') => {
                    Ok((left.to_owned(), right.to_owned()))
                }
                _ => Err(TokenizerError::Configuration(format!(
                    "merge {line:?} is not two space-separated tokens"
                ))),
            },
        }
    }
}

impl ModelConfig {
    fn build(self) -> Result<Bpe, TokenizerError> {
        match self.kind.as_deref() {
            None | Some("BPE") => {}
            Some(other) => {
                return Err(TokenizerError::Configuration(format!(
                    "unsupported model type {other:?}, only BPE is available"
                )))
            }
        }
        if let Some(dropout) = self.dropout.filter(|&p| p > 0.0) {
            warn!(dropout, "BPE dropout is not supported, encoding deterministically");
        }

        let merges = self
            .merges
            .into_iter()
            .map(Merge::into_pair)
            .collect::<Result<Vec<_>, _>>()?;
        let vocab = Vocabulary::new(self.vocab, merges)?;

        let mut builder = Bpe::builder(Arc::new(vocab))
            .fuse_unk(self.fuse_unk)
            .byte_fallback(self.byte_fallback)
            .ignore_merges(self.ignore_merges);
        if let Some(unk) = self.unk_token {
            builder = builder.unk_token(unk);
        }
        if let Some(prefix) = self.continuing_subword_prefix {
            builder = builder.continuing_subword_prefix(prefix);
        }
        if let Some(suffix) = self.end_of_word_suffix {
            builder = builder.end_of_word_suffix(suffix);
        }
        builder.build()
    }
}

impl TokenizerFile {
    fn build(self) -> Result<Tokenizer, TokenizerError> {
        let mut tokenizer = Tokenizer::new(self.model.build()?).with_added_tokens(self.added_tokens)?;
        if let Some(normalizer) = self.normalizer {
            tokenizer = tokenizer.with_normalizer(normalizer);
        }
        if let Some(pre_tokenizer) = self.pre_tokenizer {
            tokenizer = tokenizer.with_pre_tokenizer(pre_tokenizer);
        }
        if let Some(post_processor) = self.post_processor {
            tokenizer = tokenizer.with_post_processor(post_processor);
        }
        if let Some(decoder) = self.decoder {
            tokenizer = tokenizer.with_decoder(decoder);
        }
        if let Some(truncation) = self.truncation {
            tokenizer = tokenizer.with_truncation(truncation);
        }
        if let Some(padding) = self.padding {
            tokenizer = tokenizer.with_padding(padding)?;
        }
        debug!(
            vocab = tokenizer.get_vocab_size(false),
            merges = tokenizer.model().vocab().merges().len(),
            added = tokenizer.added_vocabulary().len(),
            "loaded tokenizer definition"
        );
        Ok(tokenizer)
    }
}

impl FromStr for Tokenizer {
    type Err = TokenizerError;

    /// Parse a `tokenizer.json` document.
    fn from_str(json: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<TokenizerFile>(json)?.build()
    }
}

impl Tokenizer {
    /// Parse a `tokenizer.json` document from bytes.
    pub fn from_bytes(json: impl AsRef<[u8]>) -> Result<Self, TokenizerError> {
        serde_json::from_slice::<TokenizerFile>(json.as_ref())?.build()
    }

    /// Load a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let data = fs::read(path)?;
        Self::from_bytes(data)
    }
}
