use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crossbar::core::broker::{Broker, PoolConfig};
use crossbar::core::registry::Inbox;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(IntoBytes, FromBytes, Immutable, Clone, Copy)]
#[repr(C)]
struct Tick {
    sequence: u64,
    value: u64,
}

fn bench_publish_receive_small(c: &mut Criterion) {
    let broker = Broker::new(PoolConfig::default());
    let inbox = Inbox::new();
    assert!(broker.register(1, &inbox));

    c.bench_function("publish_receive_release_small", |b| {
        let mut sequence = 0u64;
        b.iter(|| {
            let tick = Tick {
                sequence,
                value: sequence.wrapping_mul(31),
            };
            sequence = sequence.wrapping_add(1);

            black_box(broker.publish_value(black_box(1), black_box(&tick))).unwrap();
            let mut msg = broker.receive(&inbox);
            black_box(msg.payload());
            broker.release(&mut msg);
        })
    });
}

fn bench_publish_receive_large(c: &mut Criterion) {
    let broker = Broker::new(PoolConfig::default());
    let inbox = Inbox::new();
    assert!(broker.register(2, &inbox));

    let payload = [0xA5u8; 1024];

    c.bench_function("publish_receive_release_large", |b| {
        b.iter(|| {
            black_box(broker.publish_bytes(black_box(2), black_box(&payload))).unwrap();
            let mut msg = broker.receive(&inbox);
            black_box(msg.payload());
            broker.release(&mut msg);
        })
    });
}

fn bench_signal_fanout(c: &mut Criterion) {
    let broker = Broker::new(PoolConfig::default());
    let boxes = [Inbox::new(), Inbox::new(), Inbox::new()];
    for inbox in &boxes {
        assert!(broker.register(3, inbox));
    }

    c.bench_function("signal_fanout_3", |b| {
        b.iter(|| {
            black_box(broker.publish_signal(black_box(3))).unwrap();
            for inbox in &boxes {
                let mut msg = broker.receive(inbox);
                broker.release(&mut msg);
            }
        })
    });
}

fn bench_pool_alloc_free(c: &mut Criterion) {
    let broker = Broker::new(PoolConfig::default());
    let pool = broker.small_pool();

    c.bench_function("pool_alloc_free", |b| {
        b.iter(|| {
            let index = pool.alloc().unwrap();
            black_box(index);
            pool.free(index);
        })
    });
}

criterion_group!(
    benches,
    bench_publish_receive_small,
    bench_publish_receive_large,
    bench_signal_fanout,
    bench_pool_alloc_free
);
criterion_main!(benches);
