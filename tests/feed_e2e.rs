use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use aaji_core::{
    AajiError, ChannelConnection, ChannelStatus, ConnectionRegistry, EventId, ExecutionError, FeedConfig,
    LiveFeed, Severity, SubscriptionState,
};

fn registry_with(ids: &[(&str, &str)]) -> Arc<ConnectionRegistry> {
    let registry = Arc::new(ConnectionRegistry::default());
    for (id, path) in ids {
        registry
            .register(ChannelConnection::new(*id, *id, *path, ChannelStatus::Active).unwrap())
            .unwrap();
    }
    registry
}

fn make_feed(capacity: usize, subscriber_buffer: usize) -> (Arc<ConnectionRegistry>, Arc<LiveFeed>) {
    let registry = registry_with(&[("twilio/whatsapp", "/twilio/whatsapp"), ("meta/instagram", "/meta/instagram")]);
    let feed = LiveFeed::new(
        FeedConfig {
            capacity,
            subscriber_buffer,
            ..FeedConfig::default()
        },
        registry.clone(),
    );
    (registry, Arc::new(feed))
}

fn ids(events: &[aaji_core::FeedEvent]) -> Vec<u64> {
    events.iter().map(|e| e.id.get()).collect()
}

#[test]
fn whatsapp_kyc_scenario() {
    let (_registry, feed) = make_feed(16, 16);

    let event = feed.publish("twilio/whatsapp", Severity::Danger, "KYC request").unwrap();
    assert_eq!(event.id, EventId::new(1));

    let history = feed.history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, EventId::new(1));
    assert_eq!(history[0].channel_id.as_str(), "twilio/whatsapp");
    assert_eq!(history[0].severity, Severity::Danger);
    assert_eq!(history[0].message, "KYC request");
}

#[test]
fn unknown_channel_scenario_leaves_feed_unchanged() {
    let (_registry, feed) = make_feed(16, 16);
    feed.publish("twilio/whatsapp", Severity::Info, "seed").unwrap();

    let err = feed.publish("unknown/channel", Severity::Info, "x").unwrap_err();
    assert!(matches!(err, AajiError::Execution(ExecutionError::UnknownChannel { .. })));
    assert_eq!(feed.len().unwrap(), 1);

    // Counter did not advance.
    let next = feed.publish("twilio/whatsapp", Severity::Info, "next").unwrap();
    assert_eq!(next.id, EventId::new(2));
}

#[test]
fn eviction_keeps_last_n() {
    const N: usize = 10;
    let (_registry, feed) = make_feed(N, 16);
    for i in 0..(N + 5) {
        feed.publish("twilio/whatsapp", Severity::Info, format!("event {i}")).unwrap();
    }

    let history = feed.history(N).unwrap();
    assert_eq!(ids(&history), (6..=15).collect::<Vec<u64>>());
    assert_eq!(history[0].message, "event 5");
}

#[test]
fn concurrent_publishers_produce_total_order() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;
    let total = THREADS * PER_THREAD;

    let (_registry, feed) = make_feed(total, total);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let feed = Arc::clone(&feed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let channel = if t % 2 == 0 { "twilio/whatsapp" } else { "meta/instagram" };
                barrier.wait();
                for i in 0..PER_THREAD {
                    feed.publish(channel, Severity::Info, format!("{t}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let history = feed.history(total).unwrap();
    assert_eq!(history.len(), total);
    assert_eq!(ids(&history), (1..=total as u64).collect::<Vec<u64>>());
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // Per-publisher order is preserved inside the global order.
    for t in 0..THREADS {
        let prefix = format!("{t}-");
        let seq: Vec<usize> = history
            .iter()
            .filter_map(|e| e.message.strip_prefix(&prefix))
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..PER_THREAD).collect::<Vec<_>>());
    }
}

#[test]
fn subscribe_during_concurrent_publish_has_no_gap_or_duplicate() {
    const TOTAL: u64 = 2000;
    let (_registry, feed) = make_feed(TOTAL as usize, TOTAL as usize);

    let publisher = {
        let feed = Arc::clone(&feed);
        thread::spawn(move || {
            for i in 0..TOTAL {
                feed.publish("twilio/whatsapp", Severity::Info, format!("e{i}")).unwrap();
            }
        })
    };

    // Join mid-stream with a cursor a little behind the head.
    thread::sleep(Duration::from_millis(1));
    let cursor = feed
        .last_id()
        .unwrap()
        .map_or(EventId::ZERO, |id| EventId::new(id.get().saturating_sub(5)));
    let sub = feed.subscribe(Some(cursor)).unwrap();

    publisher.join().unwrap();

    let mut received = Vec::new();
    while received.last().copied() != Some(TOTAL) {
        let event = sub.recv_timeout(Duration::from_secs(2)).unwrap();
        received.push(event.id.get());
    }

    let expected: Vec<u64> = (cursor.get() + 1..=TOTAL).collect();
    assert_eq!(received, expected);
    assert_eq!(sub.state(), SubscriptionState::Live);
}

#[test]
fn replay_gap_forces_resync_via_history() {
    let (_registry, feed) = make_feed(5, 16);
    for _ in 0..12 {
        feed.publish("twilio/whatsapp", Severity::Info, "e").unwrap();
    }

    let err = feed.subscribe(Some(EventId::new(3))).unwrap_err();
    assert!(err.requires_resync());
    let AajiError::Execution(ExecutionError::ReplayGap { oldest_retained, .. }) = err else {
        panic!("expected ReplayGap, got {err:?}");
    };
    assert_eq!(oldest_retained, EventId::new(8));

    // Resync: take a fresh snapshot, resume from its newest id.
    let snapshot = feed.history(5).unwrap();
    let resume_from = snapshot.last().unwrap().id;
    let sub = feed.subscribe(Some(resume_from)).unwrap();
    feed.publish("twilio/whatsapp", Severity::Info, "fresh").unwrap();
    assert_eq!(sub.recv_timeout(Duration::from_secs(1)).unwrap().id, EventId::new(13));
}

#[test]
fn subscribers_notified_in_registration_order_and_independently() {
    let (_registry, feed) = make_feed(16, 1);
    let first = feed.subscribe(None).unwrap();
    let second = feed.subscribe(None).unwrap();

    feed.publish("twilio/whatsapp", Severity::Info, "a").unwrap();
    assert_eq!(first.try_recv().unwrap().unwrap().id, EventId::new(1));

    // `second` never read and overflows; `first` keeps going.
    feed.publish("twilio/whatsapp", Severity::Info, "b").unwrap();
    assert_eq!(first.try_recv().unwrap().unwrap().id, EventId::new(2));

    assert_eq!(second.try_recv().unwrap().unwrap().id, EventId::new(1));
    let err = second.try_recv().unwrap_err();
    assert!(matches!(err, AajiError::Execution(ExecutionError::SubscriberOverflow { .. })));
    assert!(err.requires_resync());
}

#[test]
fn deregistering_channel_keeps_history_and_blocks_new_publishes() {
    let (registry, feed) = make_feed(16, 16);
    feed.publish("meta/instagram", Severity::Danger, "You won iPhone 15 pro max!").unwrap();

    registry.deregister("meta/instagram").unwrap();

    let history = feed.history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].channel_id.as_str(), "meta/instagram");

    let err = feed.publish("meta/instagram", Severity::Danger, "again").unwrap_err();
    assert!(matches!(err, AajiError::Execution(ExecutionError::UnknownChannel { .. })));
}

#[test]
fn blocked_receiver_wakes_on_cancel_from_other_thread() {
    let (_registry, feed) = make_feed(16, 16);
    let sub = Arc::new(feed.subscribe(None).unwrap());

    let waiter = {
        let sub = Arc::clone(&sub);
        thread::spawn(move || sub.recv())
    };

    thread::sleep(Duration::from_millis(20));
    sub.cancel();

    let result = waiter.join().unwrap();
    assert!(result.is_err());
    assert_eq!(sub.state(), SubscriptionState::Cancelled);
    assert_eq!(feed.subscriber_count().unwrap(), 0);
}
