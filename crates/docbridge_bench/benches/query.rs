//! Query translation, matching and locking benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docbridge_bench::{generate_widgets, runtime};
use docbridge_core::translate::translate_query;
use docbridge_core::{record, KeyedMutex};
use docbridge_memory::matcher::Filter;
use docbridge_memory::MemoryDialect;

fn sample_query() -> docbridge_core::Document {
    record! {
        "id" => "7f1c2d3e-0000-4000-8000-000000000000",
        "$or" => vec![
            record! { "region" => "eu" },
            record! { "count" => record! { "$in" => vec![1, 2, 3] } },
        ],
        "tags" => record! { "$regex" => "^ev", "$options" => "i" },
    }
}

/// Benchmark portable-to-native query translation.
fn bench_translate(c: &mut Criterion) {
    let query = sample_query();
    c.bench_function("translate_query", |b| {
        b.iter(|| translate_query(&MemoryDialect, black_box(&query)).unwrap());
    });
}

/// Benchmark filter compilation and evaluation.
fn bench_matcher(c: &mut Criterion) {
    let native = translate_query(&MemoryDialect, &sample_query()).unwrap();
    c.bench_function("filter_compile", |b| {
        b.iter(|| Filter::compile(black_box(&native)).unwrap());
    });

    let filter = Filter::compile(&record! {
        "region" => "eu",
        "count" => record! { "$gte" => 10 },
    })
    .unwrap();
    let widgets = generate_widgets(1_000);
    c.bench_function("filter_scan_1000", |b| {
        b.iter(|| widgets.iter().filter(|w| filter.matches(black_box(w))).count());
    });
}

/// Benchmark uncontended keyed mutex acquisition.
fn bench_keyed_mutex(c: &mut Criterion) {
    let rt = runtime();
    let mutex = KeyedMutex::new();
    c.bench_function("keyed_mutex_uncontended", |b| {
        b.to_async(&rt).iter(|| {
            let mutex = &mutex;
            async move {
                let guard = mutex.lock(black_box("widgets")).await;
                drop(guard);
            }
        });
    });
}

criterion_group!(benches, bench_translate, bench_matcher, bench_keyed_mutex);
criterion_main!(benches);
