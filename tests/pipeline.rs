//! End-to-end tests of the encode/decode pipeline.
//!
//! Tokenizers are built in memory (a GPT-2 style byte-level one and a
//! character-level BERT style one) or loaded from an inline
//! `tokenizer.json` in the Llama layout.

use std::sync::Arc;

use tokenizers_core::core::byte_level::alphabet;
use tokenizers_core::{
    Bpe, Decoder, EncodeOptions, PaddingDirection, PaddingParams, PostProcessor, PreTokenizer,
    Tokenizer, TokenizerError, TruncationDirection, TruncationParams, TruncationStrategy,
    Vocabulary,
};

const GPT2_MERGES: [(&str, &str); 6] = [
    ("h", "e"),
    ("l", "l"),
    ("Ġ", "t"),
    ("Ġt", "he"),
    ("he", "ll"),
    ("hell", "o"),
];

fn create_byte_level_tokenizer() -> Tokenizer {
    let mut tokens: Vec<String> = alphabet().map(String::from).collect();
    tokens.extend(["he", "ll", "Ġt", "Ġthe", "hell", "hello"].map(String::from));
    let merges = GPT2_MERGES
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
    let vocab = Vocabulary::from_tokens(tokens, merges).unwrap();
    Tokenizer::new(Bpe::new(Arc::new(vocab)).unwrap())
        .with_pre_tokenizer(PreTokenizer::byte_level(false, true).unwrap())
        .with_decoder(Decoder::ByteLevel)
}

fn create_char_tokenizer() -> Tokenizer {
    let mut tokens = vec!["[UNK]", "[CLS]", "[SEP]", "[PAD]"];
    let letters: Vec<String> = ('a'..='z').map(String::from).collect();
    tokens.extend(letters.iter().map(String::as_str));
    let vocab = Vocabulary::from_tokens(tokens, Vec::new()).unwrap();
    let model = Bpe::builder(Arc::new(vocab))
        .unk_token("[UNK]")
        .build()
        .unwrap();
    Tokenizer::new(model)
        .with_pre_tokenizer(PreTokenizer::WhitespaceSplit)
        .with_post_processor(PostProcessor::bert(("[CLS]", 1), ("[SEP]", 2)))
}

/// Id of a lowercase letter in the character tokenizer.
fn letter(c: char) -> u32 {
    4 + (c as u32 - 'a' as u32)
}

const LLAMA_LIKE: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        {"id": 0, "content": "<unk>", "special": true},
        {"id": 1, "content": "<s>", "special": true},
        {"id": 2, "content": "</s>", "special": true}
    ],
    "normalizer": {"type": "Sequence", "normalizers": [
        {"type": "Prepend", "prepend": "▁"},
        {"type": "Replace", "pattern": {"String": " "}, "content": "▁"}
    ]},
    "pre_tokenizer": null,
    "post_processor": {
        "type": "TemplateProcessing",
        "single": [{"SpecialToken": {"id": "<s>", "type_id": 0}},
                   {"Sequence": {"id": "A", "type_id": 0}}],
        "pair": [{"SpecialToken": {"id": "<s>", "type_id": 0}},
                 {"Sequence": {"id": "A", "type_id": 0}},
                 {"SpecialToken": {"id": "<s>", "type_id": 1}},
                 {"Sequence": {"id": "B", "type_id": 1}}],
        "special_tokens": {"<s>": {"id": "<s>", "ids": [1], "tokens": ["<s>"]}}
    },
    "decoder": {"type": "Sequence", "decoders": [
        {"type": "Replace", "pattern": {"String": "▁"}, "content": " "},
        {"type": "ByteFallback"},
        {"type": "Fuse"},
        {"type": "Strip", "content": " ", "start": 1, "stop": 0}
    ]},
    "model": {
        "type": "BPE",
        "dropout": null,
        "unk_token": "<unk>",
        "fuse_unk": true,
        "byte_fallback": true,
        "vocab": {"<unk>": 0, "<s>": 1, "</s>": 2, "<0xC3>": 3, "<0xA9>": 4, "▁": 5,
                  "h": 6, "i": 7, "▁h": 8, "▁hi": 9, "c": 10, "a": 11, "f": 12,
                  "▁c": 13, "af": 14, "▁caf": 15},
        "merges": ["▁ h", "▁h i", "▁ c", "a f", "▁c af"]
    }
}"#;

#[test]
fn test_byte_level_encode_decode_roundtrip() {
    let tokenizer = create_byte_level_tokenizer();

    let test_cases = [
        "hello the world",
        "Hello, world!",
        "Multi-line\ntext\nwith\nnewlines",
        "Unicode: こんにちは 世界 🦀",
        "  leading and trailing  ",
    ];

    for text in test_cases {
        let encoding = tokenizer.encode(text, None, true).unwrap();
        let decoded = tokenizer.decode(encoding.get_ids(), false).unwrap();
        assert_eq!(decoded, text, "Roundtrip failed for: {:?}", text);
    }
}

#[test]
fn test_byte_level_merges_and_offsets() {
    let tokenizer = create_byte_level_tokenizer();
    let encoding = tokenizer.encode("hello the", None, false).unwrap();
    assert_eq!(encoding.get_tokens(), &["hello", "Ġthe"]);
    assert_eq!(encoding.get_offsets(), &[(0, 5), (5, 9)]);
    assert_eq!(encoding.get_word_ids(), &[Some(0), Some(1)]);
}

#[test]
fn test_byte_level_multibyte_offsets() {
    let tokenizer = create_byte_level_tokenizer();
    let text = "é";
    let encoding = tokenizer.encode(text, None, false).unwrap();
    // Two byte tokens, both pointing at the whole character.
    assert_eq!(encoding.get_tokens(), &["Ã", "©"]);
    assert_eq!(encoding.get_offsets(), &[(0, 2), (0, 2)]);
}

#[test]
fn test_llama_like_definition() {
    let tokenizer: Tokenizer = LLAMA_LIKE.parse().unwrap();
    let encoding = tokenizer.encode("hi café", None, true).unwrap();
    assert_eq!(
        encoding.get_tokens(),
        &["<s>", "▁hi", "▁caf", "<0xC3>", "<0xA9>"]
    );
    assert_eq!(encoding.get_ids(), &[1, 9, 15, 3, 4]);
    assert_eq!(
        encoding.get_offsets(),
        &[(0, 0), (0, 2), (2, 6), (6, 8), (6, 8)]
    );
    assert_eq!(encoding.get_special_tokens_mask(), &[1, 0, 0, 0, 0]);

    assert_eq!(tokenizer.decode(encoding.get_ids(), true).unwrap(), "hi café");
    assert_eq!(tokenizer.decode(encoding.get_ids(), false).unwrap(), "<s> hi café");
}

#[test]
fn test_llama_like_unknown_characters_fuse() {
    let tokenizer: Tokenizer = LLAMA_LIKE.parse().unwrap();
    let encoding = tokenizer.encode("xyz", None, false).unwrap();
    // "▁" then one fused unknown for the three missing characters.
    assert_eq!(encoding.get_ids(), &[5, 0]);
    assert_eq!(encoding.get_offsets(), &[(0, 0), (0, 3)]);
}

#[test]
fn test_llama_like_special_token_in_input() {
    let tokenizer: Tokenizer = LLAMA_LIKE.parse().unwrap();
    let encoding = tokenizer.encode("hi</s>", None, false).unwrap();
    assert_eq!(encoding.get_ids(), &[9, 2]);
    assert_eq!(encoding.get_offsets(), &[(0, 2), (2, 6)]);
    assert_eq!(tokenizer.decode(encoding.get_ids(), true).unwrap(), "hi");
}

#[test]
fn test_pair_truncation_longest_first() {
    let tokenizer = create_char_tokenizer().with_truncation(TruncationParams::new(6));
    let encoding = tokenizer.encode("abcd", Some("xy"), true).unwrap();
    // Budget of three after [CLS] [SEP] [SEP]: two from A, one from B.
    assert_eq!(
        encoding.get_ids(),
        &[1, letter('a'), letter('b'), 2, letter('x'), 2]
    );
    assert_eq!(encoding.get_type_ids(), &[0, 0, 0, 0, 1, 1]);

    let overflowing = encoding.get_overflowing();
    assert!(!overflowing.is_empty());
    for window in overflowing {
        assert_eq!(window.get_ids()[0], 1);
        assert_eq!(window.get_special_tokens_mask()[0], 1);
        assert!(window.is_consistent());
    }
}

#[test]
fn test_only_first_cannot_fit() {
    let tokenizer = create_char_tokenizer().with_truncation(
        TruncationParams::new(5).with_strategy(TruncationStrategy::OnlyFirst),
    );
    let err = tokenizer.encode("ab", Some("wxyz"), true).unwrap_err();
    assert!(matches!(err, TokenizerError::Truncation(_)));
}

#[test]
fn test_left_truncation_with_stride() {
    let tokenizer = create_char_tokenizer().with_truncation(
        TruncationParams::new(3)
            .with_direction(TruncationDirection::Left)
            .with_stride(1),
    );
    let encoding = tokenizer.encode("abcde", None, false).unwrap();
    assert_eq!(encoding.get_ids(), &[letter('c'), letter('d'), letter('e')]);
    let windows: Vec<&[u32]> = encoding
        .get_overflowing()
        .iter()
        .map(|o| o.get_ids())
        .collect();
    assert_eq!(windows, vec![&[letter('a'), letter('b'), letter('c')][..]]);
}

#[test]
fn test_stride_too_large() {
    let tokenizer =
        create_char_tokenizer().with_truncation(TruncationParams::new(5).with_stride(3));
    // Three special tokens leave a budget of two.
    let err = tokenizer.encode("abcdef", None, true).unwrap_err();
    assert!(matches!(err, TokenizerError::Truncation(_)));
}

#[test]
fn test_batch_left_padding_multiple_of() {
    let tokenizer = create_char_tokenizer()
        .with_padding(
            PaddingParams::default()
                .with_direction(PaddingDirection::Left)
                .with_pad_to_multiple_of(4)
                .with_pad_token("[PAD]", 3),
        )
        .unwrap();
    let texts = vec!["a".to_string(), "abc".to_string()];
    let encodings = tokenizer
        .encode_batch(texts.iter().collect::<Vec<_>>(), true)
        .unwrap();
    // Longest is 5 tokens, rounded up to 8.
    assert_eq!(encodings[0].len(), 8);
    assert_eq!(encodings[1].len(), 8);
    assert_eq!(&encodings[0].get_ids()[..5], &[3, 3, 3, 3, 3]);
    assert_eq!(encodings[0].get_attention_mask(), &[0, 0, 0, 0, 0, 1, 1, 1]);
    assert_eq!(encodings[0].get_offsets()[0], (0, 0));
}

#[test]
fn test_encode_with_options_pair() {
    let tokenizer = create_char_tokenizer();
    let options = EncodeOptions {
        return_type_ids: true,
        return_tokens: true,
        ..EncodeOptions::default()
    };
    let result = tokenizer
        .encode_with_options("ab", Some("c"), &options)
        .unwrap();
    assert_eq!(result.type_ids, Some(vec![0, 0, 0, 0, 1, 1]));
    assert_eq!(
        result.tokens,
        Some(
            ["[CLS]", "a", "b", "[SEP]", "c", "[SEP]"]
                .map(String::from)
                .to_vec()
        )
    );
    assert_eq!(result.attention_mask, None);
}

#[test]
fn test_decode_unknown_id_and_empty() {
    let tokenizer = create_char_tokenizer();
    assert_eq!(tokenizer.decode(&[], false).unwrap(), "");
    assert!(matches!(
        tokenizer.decode(&[letter('a'), 9999], false),
        Err(TokenizerError::UnknownId(9999))
    ));
    let decoded = tokenizer
        .decode_batch(&[vec![letter('a')], vec![]], false)
        .unwrap();
    assert_eq!(decoded, vec!["a".to_string(), String::new()]);
    assert!(tokenizer.decode_batch(&[vec![9999]], false).is_err());
}

#[test]
fn test_vocab_accessors() {
    let tokenizer = create_char_tokenizer();
    assert_eq!(tokenizer.vocab_size(), 30);
    assert_eq!(tokenizer.token_to_id("q"), Some(letter('q')));
    assert_eq!(tokenizer.id_to_token(letter('z')), Some("z"));
    assert_eq!(tokenizer.get_vocab(true).len(), 30);
}

#[test]
fn test_invalid_utf8() {
    let tokenizer = create_char_tokenizer();
    assert!(matches!(
        tokenizer.encode_bytes(&[b'a', 0xC3], false),
        Err(TokenizerError::InvalidInput { valid_up_to: 1 })
    ));
}

#[test]
fn test_concurrent_encoding() {
    let tokenizer = Arc::new(create_byte_level_tokenizer());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let tokenizer = Arc::clone(&tokenizer);
            std::thread::spawn(move || {
                let text = format!("hello the world {i}");
                tokenizer.encode(&text, None, false).unwrap()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let encoding = handle.join().unwrap();
        let expected = tokenizer
            .encode(&format!("hello the world {i}"), None, false)
            .unwrap();
        assert_eq!(encoding, expected);
    }
}
