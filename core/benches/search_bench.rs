use criterion::{criterion_group, criterion_main, Criterion};
use komodo_core::parser::parse_text;
use komodo_core::{Index, IndexConfig, SearchQuery};

const WORDS: &[&str] = &["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta"];

fn build_index(docs: usize) -> Index {
    let index = Index::temporary("bench", IndexConfig::default()).expect("temporary index");
    for i in 0..docs {
        let text: Vec<&str> = (0..12).map(|j| WORDS[(i * 7 + j * 3) % WORDS.len()]).collect();
        let doc = parse_text(&format!("doc{i}"), &text.join(" "), index.config());
        index.add_document(doc).expect("index document");
    }
    index
}

fn bench_search(c: &mut Criterion) {
    let index = build_index(2_000);
    let query = SearchQuery::new(["alpha"])
        .with_optional_terms(["beta", "gamma"])
        .with_exclude_terms(["theta"])
        .with_page(0, 50);
    c.bench_function("search_required_optional_exclude", |b| b.iter(|| index.search(&query).expect("search")));
}

fn bench_index(c: &mut Criterion) {
    let index = Index::temporary("bench-index", IndexConfig::default()).expect("temporary index");
    let mut n = 0u64;
    c.bench_function("add_text_document", |b| {
        b.iter(|| {
            n += 1;
            let doc = parse_text(&format!("doc{n}"), "alpha beta gamma delta alpha beta", index.config());
            index.add_document(doc).expect("index document")
        })
    });
}

criterion_group!(benches, bench_search, bench_index);
criterion_main!(benches);
