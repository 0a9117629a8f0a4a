use criterion::{black_box, criterion_group, criterion_main, Criterion};
use knowledge_graph::graph::clustering::cosine_similarity;
use knowledge_graph::{Chunker, EntityExtractor};

fn chunker_benchmark(c: &mut Criterion) {
    let chunker = Chunker::new(64, 8);
    let text = "Knowledge graph ingestion splits documents into overlapping windows ".repeat(64);

    c.bench_function("chunker_split_long_text", |b| {
        b.iter(|| {
            let chunks = chunker.chunk(black_box(text.as_str()));
            black_box(chunks.len());
        });
    });
}

fn extractor_benchmark(c: &mut Criterion) {
    let extractor = EntityExtractor::new();
    let text = "Grace Hopper met engineers from Google and Microsoft in London to discuss \
        Rust, Kubernetes and machine learning for the new vector database. "
        .repeat(16);

    c.bench_function("entity_extractor_dense_text", |b| {
        b.iter(|| {
            let (entities, relationships) = extractor.extract(black_box(&text));
            black_box((entities.len(), relationships.len()));
        });
    });
}

fn similarity_benchmark(c: &mut Criterion) {
    let a: Vec<f32> = (0..384).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..384).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_384", |bench| {
        bench.iter(|| black_box(cosine_similarity(black_box(&a), black_box(&b))));
    });
}

criterion_group!(
    benches,
    chunker_benchmark,
    extractor_benchmark,
    similarity_benchmark
);
criterion_main!(benches);
