//! Byte-pair encoding merge engine.
//!
//! A word starts as one symbol per character. Candidate merges of adjacent
//! symbols sit in a min-heap keyed by `(rank, position)`; symbols form a
//! doubly linked list over an index arena, so applying a merge is O(1) and
//! the whole word is O(k log k) for k initial symbols.
//!
//! Heap entries are never removed eagerly. When an entry is popped it is
//! checked against the current list: the left symbol must still be alive,
//! still have a right neighbour, and the pair of ids must still be the one
//! the entry was queued for. Anything else is a stale entry and is skipped.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::encoding::Token;
use super::tokenizer::TokenizerError;
use super::vocab::{VocabError, Vocabulary};

/// Default number of words kept in the merge cache.
pub const DEFAULT_CACHE_SIZE: usize = 4096;

/// Words longer than this (in bytes) bypass the cache.
const MAX_CACHED_WORD_LEN: usize = 256;

type Pair = (u32, u32);

#[derive(Debug, Clone, Copy)]
struct Symbol {
    id: u32,
    start: usize,
    end: usize,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
}

/// `(rank, left position, pair, merged id)`, smallest first.
type Candidate = Reverse<(u32, usize, Pair, u32)>;

/// The BPE model: vocabulary, merge table and unknown-character policy.
pub struct Bpe {
    vocab: Arc<Vocabulary>,
    merges: FxHashMap<Pair, (u32, u32)>,
    unk_token: Option<String>,
    unk_id: Option<u32>,
    continuing_subword_prefix: Option<String>,
    end_of_word_suffix: Option<String>,
    fuse_unk: bool,
    byte_fallback: bool,
    ignore_merges: bool,
    cache: Option<Mutex<LruCache<String, Vec<Token>>>>,
    cache_capacity: usize,
}

/// Builder for [`Bpe`].
#[derive(Debug, Clone)]
pub struct BpeBuilder {
    vocab: Arc<Vocabulary>,
    unk_token: Option<String>,
    continuing_subword_prefix: Option<String>,
    end_of_word_suffix: Option<String>,
    fuse_unk: bool,
    byte_fallback: bool,
    ignore_merges: bool,
    cache_capacity: usize,
}

impl BpeBuilder {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self {
            vocab,
            unk_token: None,
            continuing_subword_prefix: None,
            end_of_word_suffix: None,
            fuse_unk: false,
            byte_fallback: false,
            ignore_merges: false,
            cache_capacity: DEFAULT_CACHE_SIZE,
        }
    }

    pub fn unk_token(mut self, unk_token: impl Into<String>) -> Self {
        self.unk_token = Some(unk_token.into());
        self
    }

    pub fn continuing_subword_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.continuing_subword_prefix = Some(prefix.into());
        self
    }

    pub fn end_of_word_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.end_of_word_suffix = Some(suffix.into());
        self
    }

    /// Collapse consecutive unknown characters into one unknown token.
    pub fn fuse_unk(mut self, fuse_unk: bool) -> Self {
        self.fuse_unk = fuse_unk;
        self
    }

    /// Emit `<0xNN>` tokens for characters missing from the vocabulary.
    pub fn byte_fallback(mut self, byte_fallback: bool) -> Self {
        self.byte_fallback = byte_fallback;
        self
    }

    /// Return a word that is itself in the vocabulary without merging.
    pub fn ignore_merges(mut self, ignore_merges: bool) -> Self {
        self.ignore_merges = ignore_merges;
        self
    }

    /// Number of cached words; 0 disables the cache.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<Bpe, TokenizerError> {
        let unk_id = match &self.unk_token {
            Some(unk) => Some(self.vocab.token_to_id(unk).ok_or_else(|| {
                TokenizerError::Configuration(format!("unk_token {unk:?} is not in the vocabulary"))
            })?),
            None => None,
        };

        let prefix = self.continuing_subword_prefix.as_deref();
        let mut merges = FxHashMap::default();
        merges.reserve(self.vocab.merges().len());
        for (rank, (left, right)) in self.vocab.merges().iter().enumerate() {
            let missing = || VocabError::MergeOutOfVocabulary(left.clone(), right.clone());
            let left_id = self.vocab.token_to_id(left).ok_or_else(missing)?;
            let right_id = self.vocab.token_to_id(right).ok_or_else(missing)?;
            let tail = prefix
                .and_then(|p| right.strip_prefix(p))
                .unwrap_or(right);
            let merged_id = self
                .vocab
                .token_to_id(&format!("{left}{tail}"))
                .ok_or_else(missing)?;
            // A repeated pair keeps its first (best) rank.
            merges
                .entry((left_id, right_id))
                .or_insert((rank as u32, merged_id));
        }

        debug!(
            vocab = self.vocab.len(),
            merges = merges.len(),
            byte_fallback = self.byte_fallback,
            "built BPE model"
        );

        Ok(Bpe {
            vocab: self.vocab,
            merges,
            unk_token: self.unk_token,
            unk_id,
            continuing_subword_prefix: self.continuing_subword_prefix,
            end_of_word_suffix: self.end_of_word_suffix,
            fuse_unk: self.fuse_unk,
            byte_fallback: self.byte_fallback,
            ignore_merges: self.ignore_merges,
            cache: new_cache(self.cache_capacity),
            cache_capacity: self.cache_capacity,
        })
    }
}

fn new_cache(capacity: usize) -> Option<Mutex<LruCache<String, Vec<Token>>>> {
    NonZeroUsize::new(capacity).map(|n| Mutex::new(LruCache::new(n)))
}

impl Bpe {
    /// Model with default options over `vocab`.
    pub fn new(vocab: Arc<Vocabulary>) -> Result<Self, TokenizerError> {
        BpeBuilder::new(vocab).build()
    }

    pub fn builder(vocab: Arc<Vocabulary>) -> BpeBuilder {
        BpeBuilder::new(vocab)
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn unk_token(&self) -> Option<&str> {
        self.unk_token.as_deref()
    }

    pub fn continuing_subword_prefix(&self) -> Option<&str> {
        self.continuing_subword_prefix.as_deref()
    }

    pub fn end_of_word_suffix(&self) -> Option<&str> {
        self.end_of_word_suffix.as_deref()
    }

    /// Split one pre-tokenized word into tokens. Offsets are byte ranges
    /// into `word`, contiguous and covering it.
    pub fn tokenize(&self, word: &str) -> Result<Vec<Token>, TokenizerError> {
        if word.is_empty() {
            return Ok(Vec::new());
        }
        if self.ignore_merges {
            if let Some(id) = self.vocab.token_to_id(word) {
                return Ok(vec![Token::new(id, word.to_owned(), (0, word.len()))]);
            }
        }

        let cacheable = word.len() <= MAX_CACHED_WORD_LEN;
        if cacheable {
            if let Some(cache) = &self.cache {
                if let Ok(mut cache) = cache.lock() {
                    if let Some(hit) = cache.get(word) {
                        return Ok(hit.clone());
                    }
                }
            }
        }

        let symbols = self.merge_word(word)?;
        let tokens = self.collect_tokens(&symbols);

        if cacheable {
            if let Some(cache) = &self.cache {
                if let Ok(mut cache) = cache.lock() {
                    cache.put(word.to_owned(), tokens.clone());
                }
            }
        }
        Ok(tokens)
    }

    /// Drop all cached words.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.clear();
            }
        }
    }

    /// Number of cached words.
    pub fn cache_len(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }

    fn merge_word(&self, word: &str) -> Result<Vec<Symbol>, TokenizerError> {
        let mut symbols = self.initial_symbols(word)?;
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(symbols.len());
        for left in 0..symbols.len().saturating_sub(1) {
            self.queue(&mut heap, &symbols, left, left + 1);
        }

        while let Some(Reverse((_, pos, pair, merged_id))) = heap.pop() {
            let left = symbols[pos];
            let Some(right_pos) = left.next else {
                continue;
            };
            let right = symbols[right_pos];
            if !left.alive || (left.id, right.id) != pair {
                continue;
            }

            symbols[pos].id = merged_id;
            symbols[pos].end = right.end;
            symbols[pos].next = right.next;
            symbols[right_pos].alive = false;

            if let Some(next) = right.next {
                symbols[next].prev = Some(pos);
                self.queue(&mut heap, &symbols, pos, next);
            }
            if let Some(prev) = left.prev {
                self.queue(&mut heap, &symbols, prev, pos);
            }
        }
        Ok(symbols)
    }

    fn queue(&self, heap: &mut BinaryHeap<Candidate>, symbols: &[Symbol], left: usize, right: usize) {
        let pair = (symbols[left].id, symbols[right].id);
        if let Some(&(rank, merged_id)) = self.merges.get(&pair) {
            heap.push(Reverse((rank, left, pair, merged_id)));
        }
    }

    /// One symbol per character, with the unknown-character policy applied.
    fn initial_symbols(&self, word: &str) -> Result<Vec<Symbol>, TokenizerError> {
        let mut symbols: Vec<Symbol> = Vec::with_capacity(word.len());
        let push = |symbols: &mut Vec<Symbol>, id: u32, start: usize, end: usize| {
            let prev = symbols.len().checked_sub(1);
            symbols.push(Symbol {
                id,
                start,
                end,
                prev,
                next: None,
                alive: true,
            });
        };

        let mut unit = String::new();
        for (start, c) in word.char_indices() {
            let end = start + c.len_utf8();
            unit.clear();
            if start > 0 {
                if let Some(prefix) = &self.continuing_subword_prefix {
                    unit.push_str(prefix);
                }
            }
            unit.push(c);
            if end == word.len() {
                if let Some(suffix) = &self.end_of_word_suffix {
                    unit.push_str(suffix);
                }
            }

            if let Some(id) = self.vocab.token_to_id(&unit) {
                push(&mut symbols, id, start, end);
                continue;
            }

            if self.byte_fallback {
                let mut buf = [0u8; 4];
                let ids: Option<Vec<u32>> = c
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| self.vocab.token_to_id(&format!("<0x{b:02X}>")))
                    .collect();
                if let Some(ids) = ids {
                    for id in ids {
                        push(&mut symbols, id, start, end);
                    }
                    continue;
                }
            }

            let Some(unk_id) = self.unk_id else {
                return Err(TokenizerError::UnknownToken(c.to_string()));
            };
            trace!(character = %c, "no token for character, using unknown token");
            if self.fuse_unk {
                if let Some(last) = symbols.last_mut() {
                    if last.id == unk_id && last.end == start {
                        last.end = end;
                        continue;
                    }
                }
            }
            push(&mut symbols, unk_id, start, end);
        }

        let n = symbols.len();
        for (i, symbol) in symbols.iter_mut().enumerate() {
            symbol.next = (i + 1 < n).then_some(i + 1);
        }
        Ok(symbols)
    }

    fn collect_tokens(&self, symbols: &[Symbol]) -> Vec<Token> {
        let mut tokens = Vec::new();
        // The first symbol only ever absorbs its neighbours, so it heads the list.
        let mut cursor = if symbols.is_empty() { None } else { Some(0) };
        while let Some(i) = cursor {
            let s = &symbols[i];
            let value = self.vocab.id_to_token(s.id).unwrap_or_default().to_owned();
            tokens.push(Token::new(s.id, value, (s.start, s.end)));
            cursor = s.next;
        }
        tokens
    }
}

impl Clone for Bpe {
    /// Clones share the vocabulary; each clone gets an empty cache.
    fn clone(&self) -> Self {
        Self {
            vocab: Arc::clone(&self.vocab),
            merges: self.merges.clone(),
            unk_token: self.unk_token.clone(),
            unk_id: self.unk_id,
            continuing_subword_prefix: self.continuing_subword_prefix.clone(),
            end_of_word_suffix: self.end_of_word_suffix.clone(),
            fuse_unk: self.fuse_unk,
            byte_fallback: self.byte_fallback,
            ignore_merges: self.ignore_merges,
            cache: new_cache(self.cache_capacity),
            cache_capacity: self.cache_capacity,
        }
    }
}

impl fmt::Debug for Bpe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bpe")
            .field("vocab_size", &self.vocab.len())
            .field("merges", &self.merges.len())
            .field("unk_token", &self.unk_token)
            .field("continuing_subword_prefix", &self.continuing_subword_prefix)
            .field("end_of_word_suffix", &self.end_of_word_suffix)
            .field("fuse_unk", &self.fuse_unk)
            .field("byte_fallback", &self.byte_fallback)
            .field("ignore_merges", &self.ignore_merges)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}
