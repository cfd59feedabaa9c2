use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use tally_core::business::Calculator;
use tally_core::event::{RowChange, TableEvent};
use tally_core::model::{Fringe, Group, TableResponse};
use tally_core::order::normalize_rows;
use tally_core::reducer::reduce;
use tally_core::rows::RowCollection;

const SIZES: [usize; 3] = [100, 1_000, 10_000];

/// A table with every tenth row in one of a handful of groups.
fn table(size: usize) -> RowCollection {
    let size = u64::try_from(size).unwrap_or(u64::MAX);
    let models: Vec<_> = (1..=size)
        .map(|id| json!({"id": id, "quantity": 1, "rate": id % 97, "fringes": [1]}))
        .collect();
    let groups: Vec<_> = (1..=5)
        .map(|g| {
            json!({
                "id": g,
                "name": format!("Group {g}"),
                "children": (1..=size).filter(|id| id % 10 == g).collect::<Vec<_>>(),
            })
        })
        .collect();
    let response: TableResponse =
        serde_json::from_value(json!({"models": models, "groups": groups})).expect("table");
    RowCollection::from_response(&response).expect("collection")
}

fn bench_data_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce.data_change");
    for size in SIZES {
        let rows = table(size);
        let event = TableEvent::data_change(vec![
            RowChange::new(7).with("rate", (), 12),
            RowChange::new(7).with("quantity", (), 3),
            RowChange::new(3).with("rate", (), 1),
        ]);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| black_box(reduce(rows, &event).expect("reduce")));
        });
    }
    group.finish();
}

fn bench_group_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce.group_add");
    for size in SIZES {
        let rows = table(size);
        let event = TableEvent::GroupAdd(Group {
            id: 99,
            name: "Moved".into(),
            color: None,
            children: (1..=50).map(|i| i * 2).collect(),
        });
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| black_box(reduce(rows, &event).expect("reduce")));
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("order.normalize");
    for size in SIZES {
        let rows = table(size).into_rows();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| black_box(normalize_rows(rows.clone())));
        });
    }
    group.finish();
}

fn bench_totals(c: &mut Criterion) {
    let fringes: Vec<Fringe> = serde_json::from_value(json!([
        {"id": 1, "unit": "PERCENT", "rate": 0.08, "cutoff": 60}
    ]))
    .expect("fringes");
    let calculator = Calculator::new(fringes);
    let mut group = c.benchmark_group("business.totals");
    for size in SIZES {
        let rows = table(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| black_box(calculator.totals(rows)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_data_change,
    bench_group_add,
    bench_normalize,
    bench_totals
);
criterion_main!(benches);
