//! End-to-end fan-out and delivery scenarios against isolated brokers.
//!
//! Each test builds its own `Broker` so pool accounting can be asserted
//! exactly, independent of anything else running in the process.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbar::core::broker::{Broker, PoolConfig, SendError};
use crossbar::core::registry::Inbox;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(IntoBytes, FromBytes, Immutable, Clone, Copy, PartialEq, Debug)]
#[repr(C)]
struct TestMessage {
    a: u32,
    b: u32,
    c: u32,
}

#[derive(IntoBytes, FromBytes, Immutable, Clone, Copy, PartialEq, Debug)]
#[repr(C)]
struct WideMessage {
    data: [u8; 1024],
}

#[derive(IntoBytes, FromBytes, Immutable, Clone, Copy, PartialEq, Debug)]
#[repr(C)]
struct SmallReading {
    sensor: u32,
    value: u32,
}

fn default_broker() -> Broker {
    Broker::new(PoolConfig::default())
}

#[test]
fn three_subscriber_fanout_restores_pool() {
    let broker = default_broker();
    let boxes = [Inbox::new(), Inbox::new(), Inbox::new()];
    for inbox in &boxes {
        assert!(broker.register(42, inbox));
    }

    let sent = TestMessage { a: 3, b: 2, c: 1 };
    assert!(broker.publish_value(42, &sent).is_ok());

    for inbox in &boxes {
        let mut msg = broker.receive(inbox);
        assert_eq!(msg.label(), 42);
        assert_eq!(msg.size() as usize, core::mem::size_of::<TestMessage>());
        assert_eq!(msg.decode::<TestMessage>(), Some(sent));
        broker.release(&mut msg);
    }

    assert_eq!(broker.small_pool().in_use(), 0);
    assert_eq!(
        broker.small_pool().available(),
        broker.small_pool().capacity()
    );

    for inbox in &boxes {
        assert!(broker.unregister(42, inbox));
    }
}

#[test]
fn mixed_payload_sizes_ordered_per_inbox() {
    const MSG1: u16 = 101;
    const MSG2: u16 = 102;
    const MSG3: u16 = 103;

    let broker = default_broker();
    let a = Inbox::new();
    let b = Inbox::new();
    assert!(broker.register(MSG1, &a));
    assert!(broker.register(MSG2, &a));
    assert!(broker.register(MSG2, &b));
    assert!(broker.register(MSG3, &b));

    // 20 bytes -> small class, 1024 -> large, 8 -> small.
    assert!(broker.publish_bytes(MSG1, &[1u8; 20]).is_ok());
    let wide = WideMessage { data: [7u8; 1024] };
    assert!(broker.publish_value(MSG2, &wide).is_ok());
    assert!(broker
        .publish_value(MSG3, &SmallReading { sensor: 1, value: 2 })
        .is_ok());

    let mut first_a = broker.receive(&a);
    assert_eq!(first_a.label(), MSG1);
    assert_eq!(first_a.size(), 20);
    let mut second_a = broker.receive(&a);
    assert_eq!(second_a.label(), MSG2);
    assert_eq!(second_a.decode::<WideMessage>(), Some(wide));

    let mut first_b = broker.receive(&b);
    assert_eq!(first_b.label(), MSG2);
    assert_eq!(first_b.size(), 1024);
    let mut second_b = broker.receive(&b);
    assert_eq!(second_b.label(), MSG3);
    assert_eq!(second_b.size(), 8);

    // A message in the large class decodes only at its exact size.
    assert_eq!(first_b.decode::<SmallReading>(), None);

    for msg in [&mut first_a, &mut second_a, &mut first_b, &mut second_b] {
        broker.release(msg);
    }
    assert_eq!(broker.small_pool().in_use(), 0);
    assert_eq!(broker.large_pool().in_use(), 0);

    broker.unregister(MSG1, &a);
    broker.unregister(MSG2, &a);
    broker.unregister(MSG2, &b);
    broker.unregister(MSG3, &b);
}

#[test]
fn oversized_payload_delivers_nothing() {
    let broker = default_broker();
    let inbox = Inbox::new();
    assert!(broker.register(200, &inbox));

    let huge = vec![0u8; 4096];
    assert_eq!(
        broker.publish_bytes(200, &huge),
        Err(SendError::PayloadTooLarge)
    );

    assert!(inbox.queue().is_empty());
    assert_eq!(broker.small_pool().in_use(), 0);
    assert_eq!(broker.large_pool().in_use(), 0);

    broker.unregister(200, &inbox);
}

#[test]
fn fourth_subscriber_rejected_three_delivered() {
    let broker = default_broker();
    let boxes: Vec<_> = (0..4).map(|_| Inbox::new()).collect();

    assert!(broker.register(300, &boxes[0]));
    assert!(broker.register(300, &boxes[1]));
    assert!(broker.register(300, &boxes[2]));
    assert!(!broker.register(300, &boxes[3]));

    assert!(broker.publish_bytes(300, &[1, 2, 3]).is_ok());

    for inbox in &boxes[..3] {
        let mut msg = broker.receive(inbox);
        assert_eq!(msg.label(), 300);
        broker.release(&mut msg);
    }
    assert!(boxes[3].queue().is_empty());

    for inbox in &boxes[..3] {
        assert!(broker.unregister(300, inbox));
    }
}

#[test]
fn payload_bytes_survive_cross_thread_delivery() {
    let broker = Arc::new(default_broker());
    let inbox = Inbox::new();
    assert!(broker.register(77, &inbox));

    let consumer_broker = broker.clone();
    let consumer_inbox = inbox.clone();
    let consumer = thread::spawn(move || {
        let mut msg = consumer_broker.receive(&consumer_inbox);
        let payload = msg.payload().to_vec();
        consumer_broker.release(&mut msg);
        payload
    });

    thread::sleep(Duration::from_millis(20));
    let sent = TestMessage { a: 9, b: 8, c: 7 };
    assert!(broker.publish_value(77, &sent).is_ok());

    let payload = consumer.join().unwrap();
    assert_eq!(payload, sent.as_bytes());
    assert_eq!(broker.small_pool().in_use(), 0);

    broker.unregister(77, &inbox);
}

#[test]
fn interleaved_publishers_keep_per_publisher_order() {
    let broker = Arc::new(default_broker());
    let inbox = Inbox::with_capacity(1024);
    assert!(broker.register(88, &inbox));

    let mut publishers = Vec::new();
    for publisher_id in 0..4u32 {
        let broker = broker.clone();
        publishers.push(thread::spawn(move || {
            for sequence in 0..50u32 {
                let reading = SmallReading {
                    sensor: publisher_id,
                    value: sequence,
                };
                assert!(broker.publish_value(88, &reading).is_ok());
            }
        }));
    }
    for publisher in publishers {
        publisher.join().unwrap();
    }

    let mut last_seen = [None::<u32>; 4];
    for _ in 0..200 {
        let mut msg = broker.receive(&inbox);
        let reading = msg.decode::<SmallReading>().unwrap();
        broker.release(&mut msg);

        let last = &mut last_seen[reading.sensor as usize];
        if let Some(previous) = *last {
            assert!(reading.value > previous);
        }
        *last = Some(reading.value);
    }

    assert_eq!(broker.small_pool().in_use(), 0);
    broker.unregister(88, &inbox);
}
