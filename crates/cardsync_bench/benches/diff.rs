//! Remote change detection benchmarks.

use cardsync_bench::full_contact;
use cardsync_engine::{contact_hash, diff, ConnectionId, ContactId, Mapping, RemoteEntry};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// A synced collection where every tenth object changed remotely and
/// every twentieth is new.
fn collection(count: usize) -> (Vec<RemoteEntry>, Vec<Mapping>) {
    let connection = ConnectionId::new();
    let contact = full_contact(0);
    let mut listing = Vec::with_capacity(count);
    let mut mappings = Vec::with_capacity(count);
    for i in 0..count {
        let href = format!("/dav/contacts/{i:06}.vcf");
        let etag = if i % 10 == 0 { format!("\"{i}-b\"") } else { format!("\"{i}\"") };
        listing.push(RemoteEntry::new(href.clone(), Some(etag)));
        if i % 20 != 0 {
            mappings.push(Mapping::new(
                connection,
                ContactId::new(),
                format!("uid-{i}"),
                href,
                Some(format!("\"{i}\"")),
                &contact,
            ));
        }
    }
    (listing, mappings)
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for count in [100, 1000, 10_000] {
        let (listing, mappings) = collection(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &(listing, mappings),
            |b, (listing, mappings)| {
                b.iter(|| black_box(diff(black_box(listing), black_box(mappings))));
            },
        );
    }
    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let contact = full_contact(3);
    c.bench_function("contact_hash", |b| {
        b.iter(|| black_box(contact_hash(black_box(&contact))));
    });
}

criterion_group!(benches, bench_diff, bench_hash);
criterion_main!(benches);
