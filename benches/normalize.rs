use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailnorm::model::part::RawPart;
use mailnorm::normalize::Normalizer;
use mailnorm::parser::mime::flatten;
use mailnorm::store::eml::EmlStore;
use mailnorm::store::memory::{MemoryStore, StoredMessage};
use mailnorm::store::HeaderOverview;

fn bench_normalize_eml(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("bounce.eml");
    let mut store = EmlStore::open("INBOX", &fixture_path).unwrap();
    let normalizer = Normalizer::default();

    c.bench_function("normalize_bounce_eml", |b| {
        b.iter(|| normalizer.normalize(&mut store, "INBOX", 1, false).unwrap())
    });
}

fn bench_normalize_memory(c: &mut Criterion) {
    let structure = RawPart::from_codes(1, "mixed", 0).with_parts(
        (0..50)
            .map(|i| {
                RawPart::from_codes(3, "octet-stream", 3).with_param("name", format!("f{i}.bin"))
            })
            .collect(),
    );
    let mut message = StoredMessage::new(
        HeaderOverview {
            subject: "=?UTF-8?B?UmU6INCf0YDQuNCy0LXRgg==?=".into(),
            from: "Ann <ann@example.com>".into(),
            to: "bob@example.com, carol@example.org".into(),
            date: "Mon, 14 Oct 2024 09:15:00 +0000".into(),
            ..HeaderOverview::default()
        },
        "",
        structure,
    );
    for i in 1..=50 {
        message = message.with_body(&i.to_string(), "AAECAwQFBgcICQoL".repeat(64));
    }
    let mut store = MemoryStore::new();
    store.insert("INBOX", 1, message);
    let normalizer = Normalizer::default();

    c.bench_function("normalize_50_attachments", |b| {
        b.iter(|| {
            store.clear_log();
            normalizer.normalize(&mut store, "INBOX", 1, false).unwrap()
        })
    });
}

fn bench_flatten_deep(c: &mut Criterion) {
    let mut root = RawPart::from_codes(0, "plain", 0);
    for _ in 0..200 {
        root = RawPart::from_codes(1, "mixed", 0)
            .with_parts(vec![root, RawPart::from_codes(5, "png", 3)]);
    }

    c.bench_function("flatten_deep_200", |b| b.iter(|| flatten(&root).len()));
}

criterion_group!(
    benches,
    bench_normalize_eml,
    bench_normalize_memory,
    bench_flatten_deep
);
criterion_main!(benches);
