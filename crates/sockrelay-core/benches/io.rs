//! Benchmarks for sockrelay-core I/O utilities.

use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio_util::sync::CancellationToken;

use sockrelay_core::io::{DeadlineStream, NoOpMetrics, relay_bidirectional};

/// One echo round trip of `size` bytes through a relay using `buffer_size` chunks.
async fn round_trip(size: usize, buffer_size: usize, data: Vec<u8>) -> Vec<u8> {
    let (client, server_side) = duplex(size * 2);
    let (target_side, target) = duplex(size * 2);
    let shutdown = CancellationToken::new();

    let relay_handle = tokio::spawn(async move {
        let timeout = Duration::from_secs(5);
        let mut inbound = DeadlineStream::new(server_side, timeout, timeout);
        let mut outbound = DeadlineStream::new(target_side, timeout, timeout);
        relay_bidirectional(&mut inbound, &mut outbound, buffer_size, &shutdown, &NoOpMetrics)
            .await
    });

    let (mut client_r, mut client_w) = tokio::io::split(client);
    let (mut target_r, mut target_w) = tokio::io::split(target);

    // Client -> Target
    let send_handle = tokio::spawn(async move {
        client_w.write_all(&data).await.unwrap();
        client_w
    });

    // Target reads and responds
    let mut buf = vec![0u8; size];
    target_r.read_exact(&mut buf).await.unwrap();
    target_w.write_all(&buf).await.unwrap();

    // Client reads response
    client_r.read_exact(&mut buf).await.unwrap();

    // Dropping the client ends the pairing.
    drop(client_r.unsplit(send_handle.await.unwrap()));
    relay_handle.await.unwrap().unwrap();

    buf
}

fn bench_relay_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("relay_throughput");

    for data_size in [1, 100, 1500, 9000, 64000] {
        group.throughput(Throughput::Bytes(data_size as u64 * 2)); // bidirectional
        group.bench_with_input(
            BenchmarkId::from_parameter(data_size),
            &data_size,
            |b, &size| {
                let data = vec![b'x'; size];
                b.iter(|| black_box(rt.block_on(round_trip(size, 16384, data.clone()))))
            },
        );
    }

    group.finish();
}

fn bench_relay_buffer_sizes(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("relay_buffer_size");

    let data_size = 32768;

    for buffer_size in [1024, 4096, 16384, 65536] {
        group.bench_with_input(
            BenchmarkId::from_parameter(buffer_size),
            &buffer_size,
            |b, &buf_size| {
                let data = vec![b'x'; data_size];
                b.iter(|| black_box(rt.block_on(round_trip(data_size, buf_size, data.clone()))))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_relay_throughput, bench_relay_buffer_sizes);

criterion_main!(benches);
