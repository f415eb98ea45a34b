#![allow(missing_docs)]
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use comb_primitives::{CHUNK_SIZE, Chunk, ChunkAddress, ChunkStore, MemoryChunkStore, StatsStore};

pub fn chunk_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk");

    for &size in &[64usize, 1024, CHUNK_SIZE] {
        let data = vec![0xabu8; size];
        group.bench_with_input(BenchmarkId::new("address", size), &data, |b, data| {
            b.iter(|| black_box(Chunk::new(data.clone()).unwrap().address()))
        });
    }

    group.bench_function("row_address", |b| {
        b.iter(|| black_box(ChunkAddress::sha256_of(&[b"owner", b"contacts", &[7u8; 32]])))
    });

    let store = StatsStore::new(MemoryChunkStore::new());
    let chunks: Vec<Chunk> = (0..256u32)
        .map(|i| Chunk::new(i.to_be_bytes().to_vec()).unwrap())
        .collect();
    let addresses: Vec<ChunkAddress> = chunks
        .iter()
        .map(|chunk| store.store(chunk.clone()).unwrap())
        .collect();

    group.bench_function("memory_store", |b| {
        b.iter(|| {
            for chunk in &chunks {
                black_box(store.store(chunk.clone()).unwrap());
            }
        })
    });

    group.bench_function("memory_retrieve", |b| {
        b.iter(|| {
            for address in &addresses {
                black_box(store.retrieve(address).unwrap());
            }
        })
    });

    group.finish();
}

criterion_group!(benches, chunk_benchmarks);
criterion_main!(benches);
