use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use infinity::numbers::{Numbers, MAX};
use infinity::term::{AndTerm, BoxTerm, Hits, NumbersTerm};

fn sparse(step: u64, count: u64, offset: u64) -> Arc<Numbers> {
    let numbers = Numbers::new();
    for n in 0..count {
        numbers.add(offset + n * step).unwrap();
    }
    Arc::new(numbers)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("add 10k ascending", |b| {
        b.iter(|| {
            let numbers = Numbers::new();
            for n in 1..=10_000 {
                numbers.add(black_box(n)).unwrap();
            }
            numbers
        })
    });

    let scattered = sparse(7, 100_000, 3);
    c.bench_function("next 100k scattered", |b| {
        b.iter(|| {
            let mut cursor = MAX;
            let mut seen = 0u64;
            loop {
                cursor = scattered.next(cursor);
                if cursor == 0 {
                    break;
                }
                seen += 1;
            }
            black_box(seen)
        })
    });

    let universe = sparse(1, 700_000, 1);
    // disjoint sets, the lattices skip everything between them
    let high = sparse(3, 1_000, 500_000);
    let low = sparse(5, 1_000, 1);
    let both = sparse(2, 300_000, 1);
    for (name, left, right) in [("and disjoint", &high, &low), ("and dense", &both, &universe)] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let terms: Vec<BoxTerm> = vec![
                    Box::new(NumbersTerm::new("left", Arc::clone(left))),
                    Box::new(NumbersTerm::new("right", Arc::clone(right))),
                ];
                let and = AndTerm::new(&universe, terms).unwrap();
                black_box(Hits::new(Box::new(and)).count())
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
