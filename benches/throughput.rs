//! Throughput Benchmark for RedKV
//!
//! Measures the storage engine, the RESP decoder and the snapshot loader
//! under a few representative workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use redkv::commands::CommandHandler;
use redkv::config::ServerConfig;
use redkv::protocol::{Command, RespParser};
use redkv::snapshot::{load_snapshot_bytes, ClockAnchor};
use redkv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, Bytes::from_static(b"small_value"));
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, value.clone());
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            engine.set_with_ttl(key, Bytes::from_static(b"value"), Duration::from_secs(3600));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            engine.set(key.clone(), Bytes::from_static(b"value"));
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark KEYS * over a populated store
fn bench_keys(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..3_000 {
        let key = Bytes::from(format!("user:{}", i));
        engine.set(key, Bytes::from_static(b"data"));
    }

    c.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(engine.keys("*"));
        });
    });
}

/// Benchmark decoding and dispatching pipelined commands
fn bench_protocol(c: &mut Criterion) {
    let parser = RespParser::new();
    let handler = CommandHandler::new(
        Arc::new(StorageEngine::new()),
        Arc::new(ServerConfig::default()),
    );

    let mut pipeline = Vec::new();
    for i in 0..100 {
        let key = format!("key:{}", i);
        let command = format!(
            "*3\r\n$3\r\nSET\r\n${}\r\n{}\r\n$5\r\nvalue\r\n",
            key.len(),
            key
        );
        pipeline.extend_from_slice(command.as_bytes());
    }

    let mut group = c.benchmark_group("protocol");
    group.throughput(Throughput::Elements(100));

    group.bench_function("parse_pipeline", |b| {
        b.iter(|| {
            let mut offset = 0;
            while let Ok(Some((command, consumed))) = parser.parse(&pipeline[offset..]) {
                black_box(command);
                offset += consumed;
            }
        });
    });

    group.bench_function("execute_set", |b| {
        let command: Command = ["SET", "bench", "value"].into_iter().collect();
        b.iter(|| {
            black_box(handler.execute(&command).serialize());
        });
    });

    group.finish();
}

/// Benchmark loading a snapshot of 10k string entries
fn bench_snapshot_load(c: &mut Criterion) {
    let mut data = b"REDIS0011".to_vec();
    data.extend_from_slice(&[0xFE, 0x00]);
    for i in 0..10_000 {
        let key = format!("key:{}", i);
        data.push(0x00);
        data.push(key.len() as u8);
        data.extend_from_slice(key.as_bytes());
        data.extend_from_slice(b"\x05value");
    }
    data.push(0xFF);
    data.extend_from_slice(&[0u8; 8]);

    let mut group = c.benchmark_group("snapshot");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("load_10k", |b| {
        b.iter(|| {
            let engine = StorageEngine::new();
            black_box(load_snapshot_bytes(&data, &engine, ClockAnchor::now()));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_concurrent,
    bench_keys,
    bench_protocol,
    bench_snapshot_load,
);

criterion_main!(benches);
