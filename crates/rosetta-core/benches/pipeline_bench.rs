use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rosetta_core::text::TextNormalizer;
use rosetta_core::vocab::{OrderPolicy, SequenceEncoder, VocabularyIndex, max_length};

fn bench_normalize_and_encode(c: &mut Criterion) {
    let normalizer = TextNormalizer::new().unwrap().with_sentinels(true);

    let inputs = vec![
        "Je cherche de l'eau.",
        "Il fait très froid ici.",
        "Est-ce que tu es à la maison ?",
        "Nous avons mangé 3 pommes hier soir !",
        "Où est la gare, s'il vous plaît ?",
    ];
    let normalized: Vec<String> = inputs
        .iter()
        .map(|s| normalizer.normalize(s).unwrap())
        .collect();
    let vocab = VocabularyIndex::build(&normalized, OrderPolicy::Sorted);
    let encoder = SequenceEncoder::new(&vocab, max_length(&normalized));

    c.bench_function("normalize_single", |b| {
        b.iter(|| normalizer.normalize(black_box(inputs[0])).unwrap());
    });

    c.bench_function("normalize_encode_batch_5", |b| {
        b.iter(|| {
            for input in &inputs {
                let sentence = normalizer.normalize(black_box(input)).unwrap();
                let _ = encoder.encode(&sentence).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_normalize_and_encode);
criterion_main!(benches);
