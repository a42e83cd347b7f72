//! vCard codec benchmarks.

use cardsync_bench::{contacts, full_contact};
use cardsync_vcard::{decode, decode_all, encode, encode_many, split_cards, Contact, EncodeOptions};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Benchmark encoding single contacts.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let options = EncodeOptions::default();

    group.bench_function("minimal", |b| {
        let contact = Contact::named("Ana", "Belluco");
        b.iter(|| black_box(encode(black_box(&contact), &options)));
    });

    group.bench_function("full", |b| {
        let contact = full_contact(7);
        b.iter(|| black_box(encode(black_box(&contact), &options)));
    });

    group.bench_function("full_plain_notes", |b| {
        let contact = full_contact(7);
        let options = EncodeOptions::new().strip_markdown(true);
        b.iter(|| black_box(encode(black_box(&contact), &options)));
    });

    group.finish();
}

/// Benchmark decoding single cards.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let options = EncodeOptions::default();

    let minimal = encode(&Contact::named("Ana", "Belluco"), &options);
    group.bench_function("minimal", |b| {
        b.iter(|| black_box(decode(black_box(&minimal)).unwrap()));
    });

    let full = encode(&full_contact(7), &options);
    group.bench_function("full", |b| {
        b.iter(|| black_box(decode(black_box(&full)).unwrap()));
    });

    group.finish();
}

/// Benchmark whole files.
fn bench_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("file");
    let options = EncodeOptions::default();

    for count in [10, 100, 1000] {
        let all = contacts(count);
        let body = encode_many(&all, &options);
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode_many", count), &all, |b, all| {
            b.iter(|| black_box(encode_many(all, &options)));
        });
        group.bench_with_input(BenchmarkId::new("decode_all", count), &body, |b, body| {
            b.iter(|| black_box(decode_all(black_box(body))));
        });
        group.bench_with_input(BenchmarkId::new("split_cards", count), &body, |b, body| {
            b.iter(|| black_box(split_cards(black_box(body))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_files);
criterion_main!(benches);
