//! The encoding result and the per-token record the model emits.
//!
//! An [`Encoding`] keeps its per-token sequences (`ids`, `type_ids`,
//! `tokens`, `offsets`, `special_tokens_mask`, `attention_mask`,
//! `word_ids`) the same length at all times; every mutation below edits
//! them in lock-step.

use std::ops::Range;

use super::normalized::Offsets;
use super::padding::PaddingDirection;
use super::truncation::{TruncationDirection, TruncationError};

/// A token produced by the model. Offsets are relative to the text the
/// token was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: u32,
    pub value: String,
    pub offsets: Offsets,
    pub type_id: u32,
}

impl Token {
    pub fn new(id: u32, value: String, offsets: Offsets) -> Self {
        Self {
            id,
            value,
            offsets,
            type_id: 0,
        }
    }

    pub fn with_type_id(mut self, type_id: u32) -> Self {
        self.type_id = type_id;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    ids: Vec<u32>,
    type_ids: Vec<u32>,
    tokens: Vec<String>,
    offsets: Vec<Offsets>,
    special_tokens_mask: Vec<u32>,
    attention_mask: Vec<u32>,
    word_ids: Vec<Option<u32>>,
    overflowing: Vec<Encoding>,
}

impl Encoding {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            ids: Vec::with_capacity(len),
            type_ids: Vec::with_capacity(len),
            tokens: Vec::with_capacity(len),
            offsets: Vec::with_capacity(len),
            special_tokens_mask: Vec::with_capacity(len),
            attention_mask: Vec::with_capacity(len),
            word_ids: Vec::with_capacity(len),
            overflowing: Vec::new(),
        }
    }

    /// Build from model tokens, keeping each token's type id.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let mut encoding = Self::with_capacity(tokens.len());
        for token in tokens {
            encoding.push(token.id, token.value, token.offsets, token.type_id, None, false);
        }
        encoding
    }

    /// Encoding made only of special tokens, used by post-processors.
    pub(crate) fn from_special(ids: &[u32], tokens: &[String], type_id: u32) -> Self {
        let mut encoding = Self::with_capacity(ids.len());
        for (&id, token) in ids.iter().zip(tokens) {
            encoding.push(id, token.clone(), (0, 0), type_id, None, true);
        }
        encoding
    }

    pub(crate) fn push(
        &mut self,
        id: u32,
        token: String,
        offsets: Offsets,
        type_id: u32,
        word: Option<u32>,
        special: bool,
    ) {
        self.ids.push(id);
        self.type_ids.push(type_id);
        self.tokens.push(token);
        self.offsets.push(offsets);
        self.special_tokens_mask.push(special as u32);
        self.attention_mask.push(1);
        self.word_ids.push(word);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get_ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn get_type_ids(&self) -> &[u32] {
        &self.type_ids
    }

    pub fn get_tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Byte offsets into the original text; `(0, 0)` for inserted tokens.
    pub fn get_offsets(&self) -> &[Offsets] {
        &self.offsets
    }

    /// 1 for tokens inserted by the post-processor or by padding.
    pub fn get_special_tokens_mask(&self) -> &[u32] {
        &self.special_tokens_mask
    }

    /// 1 for real tokens, 0 for padding.
    pub fn get_attention_mask(&self) -> &[u32] {
        &self.attention_mask
    }

    /// Index of the word each token came from, per input sequence.
    pub fn get_word_ids(&self) -> &[Option<u32>] {
        &self.word_ids
    }

    pub fn get_overflowing(&self) -> &[Encoding] {
        &self.overflowing
    }

    pub fn take_overflowing(&mut self) -> Vec<Encoding> {
        std::mem::take(&mut self.overflowing)
    }

    pub(crate) fn overflowing_mut(&mut self) -> &mut [Encoding] {
        &mut self.overflowing
    }

    /// Token strings alongside mutable offsets.
    pub(crate) fn tokens_and_offsets_mut(&mut self) -> (&[String], &mut [Offsets]) {
        (&self.tokens, &mut self.offsets)
    }

    pub fn set_type_ids(&mut self, type_id: u32) {
        self.type_ids.iter_mut().for_each(|t| *t = type_id);
    }

    /// Copy of the tokens in `range`, without overflowing windows.
    fn slice(&self, range: Range<usize>) -> Self {
        Self {
            ids: self.ids[range.clone()].to_vec(),
            type_ids: self.type_ids[range.clone()].to_vec(),
            tokens: self.tokens[range.clone()].to_vec(),
            offsets: self.offsets[range.clone()].to_vec(),
            special_tokens_mask: self.special_tokens_mask[range.clone()].to_vec(),
            attention_mask: self.attention_mask[range.clone()].to_vec(),
            word_ids: self.word_ids[range].to_vec(),
            overflowing: Vec::new(),
        }
    }

    /// Append `other` after this encoding. Overflowing windows of `other`
    /// are dropped; use [`combine`] to keep them.
    pub fn merge_with(&mut self, other: Encoding) {
        self.ids.extend(other.ids);
        self.type_ids.extend(other.type_ids);
        self.tokens.extend(other.tokens);
        self.offsets.extend(other.offsets);
        self.special_tokens_mask.extend(other.special_tokens_mask);
        self.attention_mask.extend(other.attention_mask);
        self.word_ids.extend(other.word_ids);
    }

    /// Concatenate encodings in order.
    pub fn merge<I: IntoIterator<Item = Encoding>>(encodings: I) -> Self {
        encodings.into_iter().fold(Self::default(), |mut acc, e| {
            acc.merge_with(e);
            acc
        })
    }

    /// Keep at most `max_len` tokens, moving the rest into overflowing
    /// windows of `max_len` tokens that each repeat the last `stride`
    /// tokens of the previous window.
    ///
    /// With `Right` the kept tokens are the first ones and windows proceed
    /// to the end; with `Left` the kept tokens are the last ones and
    /// windows proceed to the start.
    pub fn truncate(
        &mut self,
        max_len: usize,
        stride: usize,
        direction: TruncationDirection,
    ) -> Result<(), TruncationError> {
        let len = self.len();
        if max_len >= len {
            return Ok(());
        }
        if max_len == 0 {
            let whole = std::mem::take(self);
            self.overflowing.push(whole);
            return Ok(());
        }
        if stride >= max_len {
            return Err(TruncationError::StrideTooLarge {
                stride,
                max_length: max_len,
            });
        }

        let step = max_len - stride;
        let mut windows = Vec::new();
        match direction {
            TruncationDirection::Right => {
                let mut start = 0;
                loop {
                    let stop = (start + max_len).min(len);
                    windows.push(start..stop);
                    if stop == len {
                        break;
                    }
                    start += step;
                }
            }
            TruncationDirection::Left => {
                let mut stop = len;
                loop {
                    let start = stop.saturating_sub(max_len);
                    windows.push(start..stop);
                    if start == 0 {
                        break;
                    }
                    stop -= step;
                }
            }
        }

        let mut windows = windows.into_iter();
        // `max_len < len` guarantees at least two windows.
        let Some(first) = windows.next() else {
            return Ok(());
        };
        let mut kept = self.slice(first);
        kept.overflowing = windows.map(|w| self.slice(w)).collect();
        *self = kept;
        Ok(())
    }

    /// Pad to `target_len` with the given pad token. Longer encodings are
    /// left unchanged; overflowing windows are padded too.
    pub fn pad(
        &mut self,
        target_len: usize,
        pad_id: u32,
        pad_type_id: u32,
        pad_token: &str,
        direction: PaddingDirection,
    ) {
        for o in &mut self.overflowing {
            o.pad(target_len, pad_id, pad_type_id, pad_token, direction);
        }
        let len = self.len();
        if len >= target_len {
            return;
        }
        let n = target_len - len;
        match direction {
            PaddingDirection::Right => {
                self.ids.extend(std::iter::repeat(pad_id).take(n));
                self.type_ids.extend(std::iter::repeat(pad_type_id).take(n));
                self.tokens
                    .extend(std::iter::repeat(pad_token.to_owned()).take(n));
                self.offsets.extend(std::iter::repeat((0, 0)).take(n));
                self.special_tokens_mask.extend(std::iter::repeat(1).take(n));
                self.attention_mask.extend(std::iter::repeat(0).take(n));
                self.word_ids.extend(std::iter::repeat(None).take(n));
            }
            PaddingDirection::Left => {
                prepend(&mut self.ids, pad_id, n);
                prepend(&mut self.type_ids, pad_type_id, n);
                prepend(&mut self.tokens, pad_token.to_owned(), n);
                prepend(&mut self.offsets, (0, 0), n);
                prepend(&mut self.special_tokens_mask, 1, n);
                prepend(&mut self.attention_mask, 0, n);
                prepend(&mut self.word_ids, None, n);
            }
        }
    }

    /// Whether all per-token sequences have the same length.
    pub fn is_consistent(&self) -> bool {
        let n = self.ids.len();
        self.type_ids.len() == n
            && self.tokens.len() == n
            && self.offsets.len() == n
            && self.special_tokens_mask.len() == n
            && self.attention_mask.len() == n
            && self.word_ids.len() == n
            && self.overflowing.iter().all(Encoding::is_consistent)
    }
}

fn prepend<T: Clone>(v: &mut Vec<T>, value: T, n: usize) {
    v.splice(0..0, std::iter::repeat(value).take(n));
}

/// Assemble the final encoding for one sequence (or a pair), carrying
/// overflowing windows through `render`.
///
/// For a pair, every window of the first sequence is rendered with the
/// second sequence and with each of its windows, and every window of the
/// second sequence is rendered with the first.
pub(crate) fn combine<F>(mut first: Encoding, second: Option<Encoding>, render: F) -> Encoding
where
    F: Fn(Encoding, Option<Encoding>) -> Encoding,
{
    let first_overflow = first.take_overflowing();
    match second {
        None => {
            let overflowing = first_overflow.into_iter().map(|o| render(o, None)).collect();
            let mut main = render(first, None);
            main.overflowing = overflowing;
            main
        }
        Some(mut second) => {
            let second_overflow = second.take_overflowing();
            let mut overflowing = Vec::new();
            for o in &first_overflow {
                overflowing.push(render(o.clone(), Some(second.clone())));
                for p in &second_overflow {
                    overflowing.push(render(o.clone(), Some(p.clone())));
                }
            }
            for p in second_overflow {
                overflowing.push(render(first.clone(), Some(p)));
            }
            let mut main = render(first, Some(second));
            main.overflowing = overflowing;
            main
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: u32) -> Encoding {
        let tokens = (0..n)
            .map(|i| Token::new(i, format!("t{i}"), (i as usize, i as usize + 1)))
            .collect();
        Encoding::from_tokens(tokens)
    }

    #[test]
    fn test_from_tokens_keeps_type_ids() {
        let tokens = vec![
            Token::new(5, "a".into(), (0, 1)),
            Token::new(6, "b".into(), (1, 2)).with_type_id(1),
        ];
        let e = Encoding::from_tokens(tokens);
        assert_eq!(e.get_ids(), &[5, 6]);
        assert_eq!(e.get_type_ids(), &[0, 1]);
        assert!(e.is_consistent());
    }

    #[test]
    fn test_truncate_right_with_stride() {
        let mut e = numbered(7);
        e.truncate(3, 1, TruncationDirection::Right).unwrap();
        assert_eq!(e.get_ids(), &[0, 1, 2]);
        let windows: Vec<&[u32]> = e.get_overflowing().iter().map(|o| o.get_ids()).collect();
        assert_eq!(windows, vec![&[2, 3, 4][..], &[4, 5, 6][..]]);
        assert!(e.is_consistent());
    }

    #[test]
    fn test_truncate_left() {
        let mut e = numbered(5);
        e.truncate(2, 0, TruncationDirection::Left).unwrap();
        assert_eq!(e.get_ids(), &[3, 4]);
        let windows: Vec<&[u32]> = e.get_overflowing().iter().map(|o| o.get_ids()).collect();
        assert_eq!(windows, vec![&[1, 2][..], &[0][..]]);
    }

    #[test]
    fn test_truncate_noop_and_zero() {
        let mut e = numbered(3);
        e.truncate(3, 0, TruncationDirection::Right).unwrap();
        assert_eq!(e.len(), 3);
        assert!(e.get_overflowing().is_empty());

        e.truncate(0, 0, TruncationDirection::Right).unwrap();
        assert!(e.is_empty());
        assert_eq!(e.get_overflowing()[0].len(), 3);
    }

    #[test]
    fn test_truncate_rejects_large_stride() {
        let mut e = numbered(5);
        let err = e.truncate(2, 2, TruncationDirection::Right).unwrap_err();
        assert!(matches!(err, TruncationError::StrideTooLarge { .. }));
        assert_eq!(e.len(), 5);
    }

    #[test]
    fn test_pad_right_and_left() {
        let mut right = numbered(2);
        right.pad(4, 9, 1, "[PAD]", PaddingDirection::Right);
        assert_eq!(right.get_ids(), &[0, 1, 9, 9]);
        assert_eq!(right.get_attention_mask(), &[1, 1, 0, 0]);
        assert_eq!(right.get_type_ids(), &[0, 0, 1, 1]);
        assert_eq!(right.get_offsets()[3], (0, 0));

        let mut left = numbered(2);
        left.pad(3, 9, 0, "[PAD]", PaddingDirection::Left);
        assert_eq!(left.get_ids(), &[9, 0, 1]);
        assert_eq!(left.get_tokens()[0], "[PAD]");
        assert_eq!(left.get_special_tokens_mask(), &[1, 0, 0]);
        assert!(left.is_consistent());
    }

    #[test]
    fn test_pad_never_truncates() {
        let mut e = numbered(4);
        e.pad(2, 0, 0, "[PAD]", PaddingDirection::Right);
        assert_eq!(e.len(), 4);
    }

    #[test]
    fn test_combine_pair_cross_product() {
        let mut a = numbered(3);
        a.truncate(2, 0, TruncationDirection::Right).unwrap();
        let mut b = numbered(2);
        b.truncate(1, 0, TruncationDirection::Right).unwrap();

        let out = combine(a, Some(b), |x, y| {
            let mut x = x;
            if let Some(y) = y {
                x.merge_with(y);
            }
            x
        });
        assert_eq!(out.get_ids(), &[0, 1, 0]);
        let windows: Vec<&[u32]> = out.get_overflowing().iter().map(|o| o.get_ids()).collect();
        assert_eq!(windows, vec![&[2, 0][..], &[2, 1][..], &[0, 1, 1][..]]);
    }
}
