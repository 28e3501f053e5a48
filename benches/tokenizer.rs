use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokenizers_core::core::byte_level::alphabet;
use tokenizers_core::{
    Bpe, Decoder, EncodeOptions, PaddingParams, PreTokenizer, Tokenizer, TruncationParams,
    Vocabulary,
};

const SENTENCE: &str = "the quick brown fox jumps over the lazy dog while the rest of the pack is sleeping";

fn create_tokenizer() -> Tokenizer {
    let pairs = [
        ("t", "h"),
        ("th", "e"),
        ("Ġ", "the"),
        ("i", "n"),
        ("in", "g"),
        ("o", "w"),
        ("Ġ", "o"),
        ("e", "r"),
        ("Ġo", "ver"),
        ("v", "er"),
        ("Ġ", "d"),
        ("Ġd", "o"),
        ("Ġdo", "g"),
    ];
    let mut tokens: Vec<String> = alphabet().map(String::from).collect();
    for (left, right) in pairs {
        let merged = format!("{left}{right}");
        if !tokens.contains(&merged) {
            tokens.push(merged);
        }
    }
    let merges = pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
    let vocab = Vocabulary::from_tokens(tokens, merges).unwrap();
    let pad_id = vocab.token_to_id("Ġ").unwrap();
    Tokenizer::new(Bpe::new(Arc::new(vocab)).unwrap())
        .with_pre_tokenizer(PreTokenizer::byte_level(false, true).unwrap())
        .with_decoder(Decoder::ByteLevel)
        .with_padding(PaddingParams::default().with_pad_token("Ġ", pad_id))
        .unwrap()
}

fn text_of(words: usize) -> String {
    SENTENCE
        .split(' ')
        .cycle()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_encode(c: &mut Criterion) {
    let tokenizer = create_tokenizer();
    let mut group = c.benchmark_group("encode");
    for words in [16, 256, 4096] {
        let text = text_of(words);
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
            b.iter(|| tokenizer.encode(black_box(text), None, true).unwrap());
        });
    }
    group.finish();
}

fn bench_encode_with_options(c: &mut Criterion) {
    let tokenizer = create_tokenizer();
    let text = text_of(256);
    let options = EncodeOptions::all();
    c.bench_function("encode_with_options", |b| {
        b.iter(|| {
            tokenizer
                .encode_with_options(black_box(&text), None, &options)
                .unwrap()
        });
    });
}

fn bench_encode_batch(c: &mut Criterion) {
    let tokenizer = create_tokenizer();
    let mut group = c.benchmark_group("encode_batch");
    for size in [8, 64, 512] {
        let texts: Vec<String> = (0..size).map(|i| text_of(8 + i % 32)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &texts, |b, texts| {
            b.iter(|| {
                tokenizer
                    .encode_batch(texts.iter().collect::<Vec<_>>(), true)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let tokenizer = create_tokenizer();
    let ids = tokenizer
        .encode(&text_of(1024), None, false)
        .unwrap()
        .get_ids()
        .to_vec();
    c.bench_function("decode", |b| {
        b.iter(|| tokenizer.decode(black_box(&ids), false).unwrap());
    });
}

fn bench_truncation(c: &mut Criterion) {
    let tokenizer =
        create_tokenizer().with_truncation(TruncationParams::new(128).with_stride(16));
    let text = text_of(2048);
    c.bench_function("truncation", |b| {
        b.iter(|| tokenizer.encode(black_box(&text), None, true).unwrap());
    });
}

fn bench_padding(c: &mut Criterion) {
    let tokenizer = create_tokenizer();
    let texts: Vec<String> = (0..256).map(|i| text_of(1 + i % 64)).collect();
    c.bench_function("padding", |b| {
        b.iter(|| {
            tokenizer
                .encode_batch(texts.iter().collect::<Vec<_>>(), false)
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_encode_with_options,
    bench_encode_batch,
    bench_decode,
    bench_truncation,
    bench_padding
);
criterion_main!(benches);
