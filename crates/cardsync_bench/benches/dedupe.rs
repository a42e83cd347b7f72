//! Duplicate detection benchmarks.

use cardsync_bench::named_entries;
use cardsync_dedupe::{levenshtein, DuplicateDetector};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_levenshtein(c: &mut Criterion) {
    let mut group = c.benchmark_group("levenshtein");
    group.bench_function("short", |b| {
        b.iter(|| black_box(levenshtein(black_box("carla dias"), black_box("karla diaz"))));
    });
    group.bench_function("accented", |b| {
        b.iter(|| {
            black_box(levenshtein(
                black_box("josé maría belluco de la rosa"),
                black_box("jose maria beluco de la rosa"),
            ))
        });
    });
    group.finish();
}

fn bench_find_duplicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_duplicates");
    let detector = DuplicateDetector::new();

    for count in [100, 1000, 5000] {
        let entries = named_entries(count);
        let target = entries[count / 2].clone();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter(|| black_box(detector.find_duplicates(&target, entries)));
        });
    }
    group.finish();
}

fn bench_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_all_duplicate_groups");
    group.sample_size(10);
    let detector = DuplicateDetector::new();

    for count in [100, 500, 1000] {
        let entries = named_entries(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter(|| black_box(detector.find_all_duplicate_groups(entries)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_levenshtein, bench_find_duplicates, bench_groups);
criterion_main!(benches);
