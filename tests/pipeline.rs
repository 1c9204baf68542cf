//! Pipeline integration tests: filters → decoder → bus.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use bounty_bridge::chain::LogSource;
use bounty_bridge::events::{EventKind, SchemaRegistry, WsMessage};
use bounty_bridge::filters::{ContractAddresses, FilterScheduler};
use bounty_bridge::ws::{ClientId, Interest, MessageBus};

use common::MockLogSource;

const WAIT: Duration = Duration::from_secs(5);

fn addresses() -> ContractAddresses {
    ContractAddresses {
        bounty_registry: "0x0000000000000000000000000000000000000000"
            .parse()
            .unwrap(),
        artifact_registry: "0x0000000000000000000000000000000000000000"
            .parse()
            .unwrap(),
    }
}

struct Pipeline {
    source: Arc<MockLogSource>,
    bus: Arc<MessageBus>,
    scheduler: Arc<FilterScheduler>,
}

fn pipeline(head: u64) -> Pipeline {
    let source = MockLogSource::new(1, head);
    let bus = Arc::new(MessageBus::new(64));
    let source_handle: Arc<dyn LogSource> = source.clone();
    let scheduler = Arc::new(FilterScheduler::new(
        source_handle,
        Arc::new(SchemaRegistry::standard()),
        bus.clone(),
        addresses(),
        common::test_filters_config(),
    ));
    Pipeline {
        source,
        bus,
        scheduler,
    }
}

async fn connect(
    pipeline: &Pipeline,
    interest: Interest,
) -> (ClientId, mpsc::Receiver<WsMessage>) {
    let (client, rx) = pipeline.bus.register(interest.clone(), false);
    pipeline
        .scheduler
        .subscribe(client, &interest.kinds())
        .await
        .unwrap();
    (client, rx)
}

/// Read messages until one matches, discarding the rest.
async fn next_matching<F>(rx: &mut mpsc::Receiver<WsMessage>, mut pred: F) -> WsMessage
where
    F: FnMut(&WsMessage) -> bool,
{
    timeout(WAIT, async {
        loop {
            let msg = rx.recv().await.expect("channel closed while waiting");
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("no matching message before timeout")
}

#[tokio::test]
async fn test_bounty_observed_before_assertion_in_same_block() {
    let p = pipeline(9);
    let (_client, mut rx) = connect(&p, Interest::All).await;

    // Same block, ascending log indices, visible to the poller at once.
    p.source.push_all(vec![
        common::bounty_entry(1, 10, 0),
        common::assertion_entry(1, 10, 1),
    ]);

    let first = next_matching(&mut rx, |m| {
        matches!(
            m.kind(),
            EventKind::BountyCreated | EventKind::AssertionPosted
        )
    })
    .await;
    assert_eq!(first.kind(), EventKind::BountyCreated, "bounty must precede assertion");

    let second = next_matching(&mut rx, |m| {
        matches!(
            m.kind(),
            EventKind::BountyCreated | EventKind::AssertionPosted
        )
    })
    .await;
    assert_eq!(second.kind(), EventKind::AssertionPosted);
}

#[tokio::test]
async fn test_decoded_payload_fields() {
    let p = pipeline(0);
    let (_client, mut rx) = connect(&p, Interest::All).await;

    p.source.push(common::bounty_entry(42, 5, 0));

    let msg = next_matching(&mut rx, |m| m.kind() == EventKind::BountyCreated).await;
    let WsMessage::BountyCreated(body) = msg else {
        unreachable!()
    };
    assert_eq!(body.block_number, 5);
    assert_eq!(
        body.data["guid"], "00000000-0000-0000-0000-00000000002a",
        "guid renders as uuid"
    );
    assert_eq!(body.data["artifact_type"], "file");
    assert_eq!(body.data["uri"], "QmcAVSsevP3TDSJYPJSNTsnvmQfTifGEkymTauQ3KvSdNR");
    assert!(body.data.get("artifactURI").is_none());
}

#[tokio::test]
async fn test_decode_failure_skips_entry_not_batch() {
    let p = pipeline(0);
    let (_client, mut rx) = connect(&p, Interest::All).await;

    p.source.push_all(vec![
        common::bad_bounty_entry(1, 3, 0),
        common::bounty_entry(2, 3, 1),
    ]);

    let msg = next_matching(&mut rx, |m| m.kind() == EventKind::BountyCreated).await;
    let WsMessage::BountyCreated(body) = msg else {
        unreachable!()
    };
    // Only the well-formed sibling arrives.
    assert_eq!(body.data["guid"], "00000000-0000-0000-0000-000000000002");

    // The bad entry is gone for good: no redelivery on later polls.
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(msg) = rx.try_recv() {
        assert_ne!(
            msg.kind(),
            EventKind::BountyCreated,
            "skipped entry must not reappear"
        );
    }
}

#[tokio::test]
async fn test_degraded_filter_notifies_subscribers_and_recovers() {
    let p = pipeline(0);
    let interest = Interest::parse("bounty-created").unwrap();
    let (_client, mut rx) = connect(&p, interest).await;

    p.source.inject_failures(3);
    let msg = next_matching(&mut rx, |m| m.kind() == EventKind::Error).await;
    let WsMessage::Error { reason } = msg else {
        unreachable!()
    };
    assert!(reason.contains("degraded"));

    // Still polling: entries flow once the endpoint recovers.
    p.source.push(common::bounty_entry(7, 2, 0));
    next_matching(&mut rx, |m| m.kind() == EventKind::BountyCreated).await;
}

#[tokio::test]
async fn test_exhausted_filter_stops_and_notifies() {
    let p = pipeline(0);
    let interest = Interest::parse("bounty-created").unwrap();
    let (_client, mut rx) = connect(&p, interest).await;
    p.source.advance_to(1);
    p.source.exhaust();

    let msg = next_matching(&mut rx, |m| m.kind() == EventKind::Error).await;
    let WsMessage::Error { reason } = msg else {
        unreachable!()
    };
    assert!(reason.contains("exhausted"));

    // The stopped filter is removed on its way out.
    timeout(WAIT, async {
        while !p.scheduler.active_filters().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("exhausted filter never removed");
}

#[tokio::test]
async fn test_sole_subscriber_disconnect_removes_filters() {
    let p = pipeline(0);
    let (client, _rx) = connect(&p, Interest::All).await;
    assert_eq!(p.scheduler.active_filters().len(), EventKind::FILTERABLE.len());

    p.bus.unregister(client);
    p.scheduler.unsubscribe_client(client);

    timeout(WAIT, async {
        while !p.scheduler.active_filters().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("orphaned filters never removed");
}

#[tokio::test]
async fn test_shared_filter_survives_one_subscriber_leaving() {
    let p = pipeline(0);
    let interest = Interest::parse("bounty-created").unwrap();
    let (first, _rx1) = connect(&p, interest.clone()).await;
    let (_second, mut rx2) = connect(&p, interest).await;
    assert_eq!(p.scheduler.active_filters().len(), 1);

    p.bus.unregister(first);
    p.scheduler.unsubscribe_client(first);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(p.scheduler.active_filters().len(), 1, "shared filter persists");

    p.source.push(common::bounty_entry(5, 4, 0));
    next_matching(&mut rx2, |m| m.kind() == EventKind::BountyCreated).await;
}

#[tokio::test]
async fn test_backlog_replay_for_late_subscriber() {
    let p = pipeline(0);
    let (_first, mut rx1) = connect(&p, Interest::All).await;

    p.source.push(common::bounty_entry(11, 2, 0));
    p.source.push(common::settled_entry(11, 3, 0));
    // First client consumes them live.
    next_matching(&mut rx1, |m| m.kind() == EventKind::VerdictSettled).await;

    // Late subscriber asks for history.
    let (late, mut rx2) = connect(&p, Interest::All).await;
    p.scheduler
        .replay_to(late, &Interest::All.kinds())
        .await
        .unwrap();

    let replayed = next_matching(&mut rx2, |m| m.kind() == EventKind::BountyCreated).await;
    let WsMessage::BountyCreated(body) = replayed else {
        unreachable!()
    };
    assert_eq!(body.block_number, 2);
    next_matching(&mut rx2, |m| m.kind() == EventKind::VerdictSettled).await;
}

#[tokio::test]
async fn test_shutdown_drains_poll_loops() {
    let p = pipeline(0);
    let (_client, _rx) = connect(&p, Interest::All).await;
    assert!(!p.scheduler.active_filters().is_empty());

    timeout(WAIT, p.scheduler.shutdown(Duration::from_secs(2)))
        .await
        .expect("shutdown exceeded its bound");
    assert!(p.scheduler.active_filters().is_empty());
}
