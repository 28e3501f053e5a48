//! BPE tokenization engine.
//!
//! Text goes through normalization, pre-tokenization, byte-pair merging,
//! truncation, special-token insertion and padding, and comes out as an
//! [`Encoding`]: ids, tokens, type ids, masks and offsets that map every
//! token back to the bytes of the input it came from.
//!
//! - Linked-list BPE with a min-heap of candidate merges (no O(N²) rescans)
//! - FxHashMap vocabulary and merge lookups, LRU cache of merged words
//! - Aho-Corasick matching of added and special tokens
//! - Rayon parallelism for batch encode and decode
//! - HuggingFace `tokenizer.json` loading (BPE models)

pub mod core;

pub use core::{
    AddedToken, Bpe, Decoder, EncodeInput, EncodeOptions, EncodeResult, Encoding, Normalizer,
    Offsets, PaddingDirection, PaddingParams, PaddingStrategy, PostProcessor, PreTokenizer,
    Tokenizer, TokenizerError, TruncationDirection, TruncationParams, TruncationStrategy,
    Vocabulary,
};
