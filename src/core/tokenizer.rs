use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use super::added_vocabulary::{AddedToken, AddedVocabulary, Segment};
use super::bpe::Bpe;
use super::decoder::Decoder;
use super::encoding::Encoding;
use super::normalized::{NormalizedString, Offsets};
use super::normalizer::Normalizer;
use super::padding::{pad_encodings, PaddingParams};
use super::post_processor::{join, PostProcessor};
use super::pre_tokenizer::{single_word, PreTokenizer, Word};
use super::truncation::{truncate_encodings, TruncationError, TruncationParams};
use super::vocab::VocabError;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Invalid input: not UTF-8 after byte {valid_up_to}")]
    InvalidInput { valid_up_to: usize },
    #[error("Unknown token id: {0}")]
    UnknownId(u32),
    #[error("No token for {0:?} and no unknown token configured")]
    UnknownToken(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Truncation(#[from] TruncationError),
    #[error("Vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("Regex compilation error (regexr): {0}")]
    RegexrError(#[from] regexr::Error),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasickError(#[from] aho_corasick::BuildError),
    #[error("Invalid tokenizer definition: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single sequence or a pair of sequences to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeInput<'s> {
    pub first: &'s str,
    pub second: Option<&'s str>,
}

impl<'s> From<&'s str> for EncodeInput<'s> {
    fn from(first: &'s str) -> Self {
        Self {
            first,
            second: None,
        }
    }
}

impl<'s> From<&'s String> for EncodeInput<'s> {
    fn from(first: &'s String) -> Self {
        first.as_str().into()
    }
}

impl<'s> From<(&'s str, &'s str)> for EncodeInput<'s> {
    fn from((first, second): (&'s str, &'s str)) -> Self {
        Self {
            first,
            second: Some(second),
        }
    }
}

impl<'s> From<(&'s str, Option<&'s str>)> for EncodeInput<'s> {
    fn from((first, second): (&'s str, Option<&'s str>)) -> Self {
        Self { first, second }
    }
}

/// Which attributes [`Tokenizer::encode_with_options`] returns besides ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub add_special_tokens: bool,
    pub return_type_ids: bool,
    pub return_tokens: bool,
    pub return_special_tokens_mask: bool,
    pub return_attention_mask: bool,
    pub return_offsets: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            add_special_tokens: true,
            return_type_ids: false,
            return_tokens: false,
            return_special_tokens_mask: false,
            return_attention_mask: false,
            return_offsets: false,
        }
    }
}

impl EncodeOptions {
    /// Every attribute requested.
    pub fn all() -> Self {
        Self {
            add_special_tokens: true,
            return_type_ids: true,
            return_tokens: true,
            return_special_tokens_mask: true,
            return_attention_mask: true,
            return_offsets: true,
        }
    }
}

/// Ids plus whichever attributes were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeResult {
    pub ids: Vec<u32>,
    pub type_ids: Option<Vec<u32>>,
    pub tokens: Option<Vec<String>>,
    pub special_tokens_mask: Option<Vec<u32>>,
    pub attention_mask: Option<Vec<u32>>,
    pub offsets: Option<Vec<Offsets>>,
}

impl EncodeResult {
    fn new(encoding: &Encoding, options: &EncodeOptions) -> Self {
        let pick = |wanted: bool, values: &[u32]| wanted.then(|| values.to_vec());
        Self {
            ids: encoding.get_ids().to_vec(),
            type_ids: pick(options.return_type_ids, encoding.get_type_ids()),
            tokens: options
                .return_tokens
                .then(|| encoding.get_tokens().to_vec()),
            special_tokens_mask: pick(
                options.return_special_tokens_mask,
                encoding.get_special_tokens_mask(),
            ),
            attention_mask: pick(options.return_attention_mask, encoding.get_attention_mask()),
            offsets: options
                .return_offsets
                .then(|| encoding.get_offsets().to_vec()),
        }
    }
}

/// The tokenization pipeline.
///
/// Encoding runs, per input sequence: added-token split, normalizer,
/// pre-tokenizer, BPE model; then truncation, post-processor and padding
/// over the sequence (or pair). All configuration is read-only once built,
/// so one tokenizer can serve concurrent callers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tokenizers_core::{Bpe, PreTokenizer, Tokenizer, Vocabulary};
///
/// let vocab = Vocabulary::from_tokens(["a", "b", "ab"], vec![("a".into(), "b".into())]).unwrap();
/// let tokenizer = Tokenizer::new(Bpe::new(Arc::new(vocab)).unwrap())
///     .with_pre_tokenizer(PreTokenizer::WhitespaceSplit);
///
/// let encoding = tokenizer.encode("ab ba", None, false).unwrap();
/// assert_eq!(encoding.get_ids(), &[2, 1, 0]);
/// assert_eq!(encoding.get_offsets(), &[(0, 2), (3, 4), (4, 5)]);
/// ```
#[derive(Debug, Clone)]
pub struct Tokenizer {
    model: Bpe,
    normalizer: Option<Normalizer>,
    pre_tokenizer: Option<PreTokenizer>,
    post_processor: Option<PostProcessor>,
    decoder: Option<Decoder>,
    added_vocabulary: AddedVocabulary,
    truncation: Option<TruncationParams>,
    padding: Option<PaddingParams>,
    encode_special_tokens: bool,
    /// Ids dropped by `decode(.., skip_special_tokens = true)`.
    special_ids: FxHashSet<u32>,
}

impl Tokenizer {
    /// Tokenizer with only a model: no normalization, the whole input is
    /// one word, nothing is inserted.
    pub fn new(model: Bpe) -> Self {
        debug!(vocab = model.vocab().len(), "created tokenizer");
        Self {
            model,
            normalizer: None,
            pre_tokenizer: None,
            post_processor: None,
            decoder: None,
            added_vocabulary: AddedVocabulary::default(),
            truncation: None,
            padding: None,
            encode_special_tokens: false,
            special_ids: FxHashSet::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_pre_tokenizer(mut self, pre_tokenizer: PreTokenizer) -> Self {
        self.pre_tokenizer = Some(pre_tokenizer);
        self
    }

    pub fn with_post_processor(mut self, post_processor: PostProcessor) -> Self {
        self.post_processor = Some(post_processor);
        self.refresh_special_ids();
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_truncation(mut self, truncation: TruncationParams) -> Self {
        self.truncation = Some(truncation);
        self
    }

    /// Enable padding. The pad id must be a known token.
    pub fn with_padding(mut self, padding: PaddingParams) -> Result<Self, TokenizerError> {
        if padding.pad_to_multiple_of == Some(0) {
            return Err(TokenizerError::Configuration(
                "pad_to_multiple_of must be greater than zero".into(),
            ));
        }
        if self.id_to_token(padding.pad_id).is_none() {
            return Err(TokenizerError::Configuration(format!(
                "pad id {} is not in the vocabulary",
                padding.pad_id
            )));
        }
        self.padding = Some(padding);
        Ok(self)
    }

    pub fn with_added_tokens(mut self, tokens: Vec<AddedToken>) -> Result<Self, TokenizerError> {
        self.added_vocabulary = AddedVocabulary::new(tokens, self.model.vocab())?;
        self.refresh_special_ids();
        Ok(self)
    }

    /// Treat special tokens found in the input as plain text.
    pub fn with_encode_special_tokens(mut self, encode_special_tokens: bool) -> Self {
        self.encode_special_tokens = encode_special_tokens;
        self
    }

    fn refresh_special_ids(&mut self) {
        let mut ids: FxHashSet<u32> = self.added_vocabulary.special_ids().collect();
        if let Some(processor) = &self.post_processor {
            ids.extend(processor.special_ids());
        }
        self.special_ids = ids;
    }

    pub fn model(&self) -> &Bpe {
        &self.model
    }

    pub fn normalizer(&self) -> Option<&Normalizer> {
        self.normalizer.as_ref()
    }

    pub fn pre_tokenizer(&self) -> Option<&PreTokenizer> {
        self.pre_tokenizer.as_ref()
    }

    pub fn post_processor(&self) -> Option<&PostProcessor> {
        self.post_processor.as_ref()
    }

    pub fn decoder(&self) -> Option<&Decoder> {
        self.decoder.as_ref()
    }

    pub fn truncation(&self) -> Option<&TruncationParams> {
        self.truncation.as_ref()
    }

    pub fn padding(&self) -> Option<&PaddingParams> {
        self.padding.as_ref()
    }

    pub fn added_vocabulary(&self) -> &AddedVocabulary {
        &self.added_vocabulary
    }

    /// Encode `text` (and the optional `pair`) into one encoding.
    ///
    /// Truncation reserves room for the special tokens the post-processor
    /// adds; with `Fixed` padding the result is padded too.
    pub fn encode(
        &self,
        text: &str,
        pair: Option<&str>,
        add_special_tokens: bool,
    ) -> Result<Encoding, TokenizerError> {
        let input = EncodeInput {
            first: text,
            second: pair,
        };
        let mut encoding = self.encode_unpadded(input, add_special_tokens)?;
        if let Some(padding) = &self.padding {
            pad_encodings(std::slice::from_mut(&mut encoding), padding)?;
        }
        Ok(encoding)
    }

    /// Encode raw bytes, rejecting invalid UTF-8.
    pub fn encode_bytes(
        &self,
        bytes: &[u8],
        add_special_tokens: bool,
    ) -> Result<Encoding, TokenizerError> {
        let text = std::str::from_utf8(bytes).map_err(|e| TokenizerError::InvalidInput {
            valid_up_to: e.valid_up_to(),
        })?;
        self.encode(text, None, add_special_tokens)
    }

    /// Encode and keep only the attributes `options` asks for.
    pub fn encode_with_options(
        &self,
        text: &str,
        pair: Option<&str>,
        options: &EncodeOptions,
    ) -> Result<EncodeResult, TokenizerError> {
        let encoding = self.encode(text, pair, options.add_special_tokens)?;
        Ok(EncodeResult::new(&encoding, options))
    }

    /// Encode many inputs in parallel, then pad them together. The first
    /// failing input fails the batch.
    pub fn encode_batch<'s, I>(
        &self,
        inputs: Vec<I>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>, TokenizerError>
    where
        I: Into<EncodeInput<'s>> + Send,
    {
        let mut encodings = inputs
            .into_par_iter()
            .map(|input| self.encode_unpadded(input.into(), add_special_tokens))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(padding) = &self.padding {
            pad_encodings(&mut encodings, padding)?;
        }
        Ok(encodings)
    }

    /// Like [`encode_batch`](Self::encode_batch) but with one result per
    /// input. Padding only considers the inputs that encoded.
    pub fn encode_batch_isolated<'s, I>(
        &self,
        inputs: Vec<I>,
        add_special_tokens: bool,
    ) -> Result<Vec<Result<Encoding, TokenizerError>>, TokenizerError>
    where
        I: Into<EncodeInput<'s>> + Send,
    {
        let mut results: Vec<Result<Encoding, TokenizerError>> = inputs
            .into_par_iter()
            .map(|input| self.encode_unpadded(input.into(), add_special_tokens))
            .collect();
        if let Some(padding) = &self.padding {
            let mut encoded: Vec<Encoding> = results
                .iter_mut()
                .filter_map(|r| r.as_mut().ok().map(std::mem::take))
                .collect();
            pad_encodings(&mut encoded, padding)?;
            let mut padded = encoded.into_iter();
            for slot in results.iter_mut().filter_map(|r| r.as_mut().ok()) {
                if let Some(encoding) = padded.next() {
                    *slot = encoding;
                }
            }
        }
        Ok(results)
    }

    fn encode_unpadded(
        &self,
        input: EncodeInput<'_>,
        add_special_tokens: bool,
    ) -> Result<Encoding, TokenizerError> {
        let mut first = self.encode_sequence(input.first, 0)?;
        let mut second = input
            .second
            .map(|text| self.encode_sequence(text, 1))
            .transpose()?;

        if let Some(params) = &self.truncation {
            let reserved = match &self.post_processor {
                Some(processor) if add_special_tokens => processor.added_tokens(second.is_some()),
                _ => 0,
            };
            let max_length =
                params
                    .max_length
                    .checked_sub(reserved)
                    .ok_or(TruncationError::CannotFit {
                        max_length: params.max_length,
                        required: reserved,
                    })?;
            let budget = TruncationParams {
                max_length,
                ..params.clone()
            };
            truncate_encodings(&mut first, second.as_mut(), &budget)?;
        }

        Ok(match &self.post_processor {
            Some(processor) => processor.process(first, second, add_special_tokens),
            None => join(std::iter::once(first).chain(second).collect()),
        })
    }

    /// Tokens of one input sequence, all tagged with `type_id`. Offsets
    /// point into `text`.
    fn encode_sequence(&self, text: &str, type_id: u32) -> Result<Encoding, TokenizerError> {
        let mut encoding = Encoding::with_capacity(text.len() / 4);
        let mut word_index = 0u32;
        for segment in self.added_vocabulary.split(text, self.encode_special_tokens) {
            match segment {
                Segment::Added { id, range } => {
                    let offsets = (range.start, range.end);
                    let content = text[range].to_owned();
                    encoding.push(id, content, offsets, type_id, Some(word_index), false);
                    word_index += 1;
                }
                Segment::Text(range) => {
                    let first_segment = range.start == 0;
                    let mut normalized = NormalizedString::with_base(&text[range.clone()], range.start);
                    if let Some(normalizer) = &self.normalizer {
                        normalizer.normalize(&mut normalized);
                    }
                    let words = match &self.pre_tokenizer {
                        Some(pre_tokenizer) => {
                            pre_tokenizer.pre_tokenize_segment(normalized.get(), first_segment)
                        }
                        None => single_word(normalized.get()),
                    };
                    for word in words {
                        for token in self.model.tokenize(word.text())? {
                            let token = token.with_type_id(type_id);
                            let offsets = original_offsets(&normalized, &word, token.offsets);
                            encoding.push(
                                token.id,
                                token.value,
                                offsets,
                                token.type_id,
                                Some(word_index),
                                false,
                            );
                        }
                        word_index += 1;
                    }
                }
            }
        }
        Ok(encoding)
    }

    /// Decode ids back to text. Ids outside the vocabulary are an error,
    /// even when they would be skipped.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        let mut tokens = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = self.id_to_token(id).ok_or(TokenizerError::UnknownId(id))?;
            if skip_special_tokens && self.special_ids.contains(&id) {
                continue;
            }
            tokens.push(token.to_owned());
        }
        Ok(match &self.decoder {
            Some(decoder) => decoder.decode(tokens),
            None => tokens.join(" "),
        })
    }

    /// Decode several id sequences in parallel.
    pub fn decode_batch(
        &self,
        sequences: &[Vec<u32>],
        skip_special_tokens: bool,
    ) -> Result<Vec<String>, TokenizerError> {
        sequences
            .par_iter()
            .map(|ids| self.decode(ids, skip_special_tokens))
            .collect()
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.added_vocabulary
            .token_to_id(token)
            .or_else(|| self.model.vocab().token_to_id(token))
    }

    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.model
            .vocab()
            .id_to_token(id)
            .or_else(|| self.added_vocabulary.id_to_token(id))
    }

    /// Token → id map, optionally including added tokens.
    pub fn get_vocab(&self, with_added_tokens: bool) -> FxHashMap<String, u32> {
        let mut vocab = self.model.vocab().get_vocab().clone();
        if with_added_tokens {
            for token in self.added_vocabulary.tokens() {
                vocab.insert(token.content.clone(), token.id);
            }
        }
        vocab
    }

    /// Number of distinct tokens, optionally including added tokens.
    pub fn get_vocab_size(&self, with_added_tokens: bool) -> usize {
        let model = self.model.vocab();
        if !with_added_tokens {
            return model.len();
        }
        let extra = self
            .added_vocabulary
            .tokens()
            .iter()
            .filter(|t| model.token_to_id(&t.content).is_none())
            .count();
        model.len() + extra
    }

    /// Number of tokens, added tokens included.
    pub fn vocab_size(&self) -> usize {
        self.get_vocab_size(true)
    }

    /// Clear the model's word cache.
    pub fn clear_cache(&self) {
        self.model.clear_cache();
    }

    /// Number of words in the model's cache.
    pub fn cache_len(&self) -> usize {
        self.model.cache_len()
    }
}

/// Map a token's offsets inside `word` back to the original input.
fn original_offsets(normalized: &NormalizedString, word: &Word, (start, end): Offsets) -> Offsets {
    let in_normalized = word
        .normalized()
        .source_range(start..end)
        .unwrap_or_else(|| word.span());
    normalized
        .source_range(in_normalized.0..in_normalized.1)
        .unwrap_or_else(|| normalized.bounds())
}
