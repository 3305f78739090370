use criterion::{black_box, criterion_group, criterion_main, Criterion};
use index_core::tokenizer::Analyzer;
use index_core::{AnalyzerConfig, SplayCache};

const TEXT: &str = "The forward index maps every document to the terms it contains, \
while the inverted index maps every term to the documents containing it. \
Running runners run through the indexes; caches keep the hottest rows close.";

fn bench_analyze(c: &mut Criterion) {
    let full = Analyzer::default();
    let plain = Analyzer::new(AnalyzerConfig::plain());
    c.bench_function("analyze_default", |b| b.iter(|| full.analyze(black_box(TEXT))));
    c.bench_function("analyze_plain", |b| b.iter(|| plain.analyze(black_box(TEXT))));
}

fn bench_splay_cache(c: &mut Criterion) {
    c.bench_function("splay_cache_skewed_lookups", |b| {
        b.iter(|| {
            let mut cache: SplayCache<u64, u64> = SplayCache::new(256);
            for i in 0..10_000u64 {
                let key = if i % 4 == 0 { i % 4096 } else { i % 64 };
                let _ = cache.get_or_load(key, |k| Ok::<_, ()>(k * 2));
            }
            cache.len()
        })
    });
}

criterion_group!(benches, bench_analyze, bench_splay_cache);
criterion_main!(benches);
