//! Benchmarks for row hashing and provenance columns.

use bioetl::hashing::{hash_row, sort_rows, TransformerChain};
use bioetl::record::{Record, Table, Value};
use bioetl::schema::entities;
use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn activity_table(rows: usize) -> Table {
    let schema = entities::activity();
    let records = (0..rows)
        .map(|i| {
            let id = i64::try_from(rows - i).unwrap_or_default();
            Record::from([
                ("activity_id".to_string(), Value::Int(id)),
                ("standard_type".to_string(), Value::from("IC50")),
                ("standard_value".to_string(), Value::Float(12.345 + id as f64)),
                ("standard_units".to_string(), Value::from("nM")),
            ])
        })
        .collect();
    Table::from_rows(schema.column_names(), records)
}

fn hashing_benchmark(c: &mut Criterion) {
    let columns = entities::activity().column_names();
    let table = activity_table(1);
    let row = &table.rows()[0];
    c.bench_function("hash_row", |b| b.iter(|| black_box(hash_row(black_box(row), &columns))));

    let extracted_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let table = activity_table(10_000);
    c.bench_function("provenance_10k", |b| {
        b.iter(|| {
            let mut t = table.clone();
            sort_rows(&mut t, &["activity_id".to_string()]);
            TransformerChain::provenance(vec!["activity_id".to_string()], Some("ChEMBL_34".into()), &extracted_at)
                .apply(&mut t);
            black_box(t.len())
        })
    });
}

criterion_group!(benches, hashing_benchmark);
criterion_main!(benches);
