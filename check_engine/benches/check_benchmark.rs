//! Criterion benchmarks for the Piton check engine.
//!
//! Measures directive parsing on synthetic check files with many blocks, and
//! result merging and snapshot diffing on synthetic row sets (1k, 10k rows).

use std::path::Path;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use piton_check_engine::merge::{classify, merge_with_previous};
use piton_check_engine::parser::parse_file;
use piton_check_engine::snapshot::diff_rows;
use piton_check_engine::Row;

fn synthetic_file(checks: usize) -> String {
    let mut text = String::from(
        "-- pn-sqlDialect postgres\n-- pn-connectionString host=localhost user=bench\n\n-- pn-count\nSELECT * FROM orders\n",
    );
    for i in 0..checks {
        text.push_str(&format!(
            "\n-- pn-check\n-- pn-name check_{i}\n-- pn-tag bench\n-- pn-id-col id\nSELECT id, amount\nFROM orders -- filter\nWHERE amount < {i}\n"
        ));
    }
    text
}

fn synthetic_rows(n: usize, approved: &str) -> Vec<Row> {
    (0..n)
        .map(|i| {
            let mut row = Row::new();
            row.insert("id".to_owned(), i.to_string());
            row.insert("amount".to_owned(), (i * 7 % 1000).to_string());
            row.insert("approved".to_owned(), approved.to_owned());
            row
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for checks in [10, 100, 1000] {
        let text = synthetic_file(checks);
        group.bench_with_input(BenchmarkId::from_parameter(checks), &text, |b, text| {
            b.iter(|| parse_file(Path::new("/bench"), "bench.piton.sql", text));
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for n in [1_000, 10_000] {
        let previous = synthetic_rows(n, "1");
        let fresh: Vec<Row> = synthetic_rows(n, "")
            .into_iter()
            .map(|mut r| {
                r.shift_remove("approved");
                r
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let merged = merge_with_previous(fresh.clone(), "id", "approved", &previous);
                classify(&merged, "approved")
            });
        });
    }
    group.finish();
}

fn bench_snapshot_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_diff");
    for n in [1_000, 10_000] {
        let baseline = synthetic_rows(n, "");
        let pending: Vec<Row> = synthetic_rows(n + n / 10, "").into_iter().skip(n / 10).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| diff_rows(&baseline, &pending));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_merge, bench_snapshot_diff);
criterion_main!(benches);
