//! Core tokenization engine.
//!
//! A [`Tokenizer`] runs each input through a fixed pipeline:
//!
//! - [`AddedVocabulary`]: cuts added and special tokens out of the raw text
//!   (Aho-Corasick, leftmost-longest)
//! - [`Normalizer`]: rewrites text while a [`NormalizedString`] keeps the
//!   alignment back to the input
//! - [`PreTokenizer`]: splits normalized text into words
//! - [`Bpe`]: merges each word into sub-word tokens, with an LRU word cache
//! - truncation, [`PostProcessor`] and padding over the whole sequence or pair
//!
//! [`Decoder`]s turn ids back into text. [`config`] loads the whole pipeline
//! from a `tokenizer.json` file.
//!
//! Everything configured is read-only after construction, so batches are
//! encoded and decoded in parallel with Rayon.

mod added_vocabulary;
mod bpe;
pub mod byte_level;
pub mod config;
mod decoder;
mod encoding;
mod normalized;
mod normalizer;
mod padding;
mod post_processor;
mod pre_tokenizer;
mod tokenizer;
mod truncation;
mod vocab;

pub use added_vocabulary::{AddedToken, AddedVocabulary};
pub use bpe::{Bpe, BpeBuilder, DEFAULT_CACHE_SIZE};
pub use decoder::Decoder;
pub use encoding::{Encoding, Token};
pub use normalized::{NormalizationForm, NormalizedString, Offsets};
pub use normalizer::{Normalizer, ReplacePattern};
pub use padding::{pad_encodings, PaddingDirection, PaddingParams, PaddingStrategy};
pub use post_processor::{Piece, PostProcessor, Sequence, SpecialToken, TemplateProcessing};
pub use pre_tokenizer::{
    ByteLevel, Metaspace, PreTokenizer, PrependScheme, SharedRegex, Split, SplitBehavior,
    SplitPattern, Word, GPT2_PATTERN, METASPACE,
};
pub use tokenizer::{EncodeInput, EncodeOptions, EncodeResult, Tokenizer, TokenizerError};
pub use truncation::{
    truncate, truncate_encodings, truncate_pair, TruncationDirection, TruncationError,
    TruncationParams, TruncationStrategy,
};
pub use vocab::{load_tiktoken_bpe, load_tiktoken_bpe_file, VocabError, Vocabulary};
