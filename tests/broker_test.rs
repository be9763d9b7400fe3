use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sqslite::broker::{Broker, BrokerConfig};
use sqslite::clock::Clock;
use sqslite::error::SqsError;
use sqslite::message::DEAD_LETTER_SOURCE_ATTR;
use sqslite::queue::RedrivePolicy;
use sqslite::types::{ReceiveOptions, SendBatchEntry, SendMessageParams};

fn broker() -> Arc<Broker> {
    Arc::new(Broker::new(BrokerConfig::default(), Clock::manual(0)))
}

fn create(broker: &Broker, name: &str) {
    broker
        .create_queue(name, &HashMap::new(), HashMap::new())
        .unwrap();
}

fn create_fifo(broker: &Broker, name: &str, content_dedup: bool) {
    let mut attrs = HashMap::new();
    attrs.insert("FifoQueue".to_string(), "true".to_string());
    if content_dedup {
        attrs.insert("ContentBasedDeduplication".to_string(), "true".to_string());
    }
    broker.create_queue(name, &attrs, HashMap::new()).unwrap();
}

fn send(broker: &Broker, queue: &str, body: &str) {
    broker
        .send_message(
            queue,
            SendMessageParams {
                body: body.into(),
                ..Default::default()
            },
        )
        .unwrap();
}

fn send_grouped(broker: &Broker, queue: &str, body: &str, group: &str) {
    broker
        .send_message(
            queue,
            SendMessageParams {
                body: body.into(),
                group_id: Some(group.into()),
                dedup_id: Some(format!("{group}-{body}")),
                ..Default::default()
            },
        )
        .unwrap();
}

fn immediate(max_count: usize) -> ReceiveOptions {
    ReceiveOptions {
        max_count,
        visibility_timeout: None,
        wait_time_seconds: Some(0),
    }
}

#[tokio::test]
async fn standard_send_receive_delete_round_trip() {
    let broker = broker();
    create(&broker, "q");
    send(&broker, "q", "hello");

    let got = broker.receive_message("q", &immediate(1)).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].body, "hello");
    assert_eq!(got[0].attributes["ApproximateReceiveCount"], "1");

    broker.delete_message("q", &got[0].receipt_handle).unwrap();
    let empty = broker.receive_message("q", &immediate(1)).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn visibility_timeout_redelivers_with_new_handle() {
    let broker = broker();
    create(&broker, "q");
    send(&broker, "q", "x");

    let options = ReceiveOptions {
        max_count: 1,
        visibility_timeout: Some(1),
        wait_time_seconds: Some(0),
    };
    let first = broker.receive_message("q", &options).await.unwrap().remove(0);
    assert_eq!(first.attributes["ApproximateReceiveCount"], "1");

    broker.clock().advance(1_200);
    let second = broker.receive_message("q", &options).await.unwrap().remove(0);
    assert_eq!(second.body, "x");
    assert_eq!(second.attributes["ApproximateReceiveCount"], "2");
    assert_ne!(first.receipt_handle, second.receipt_handle);

    assert!(matches!(
        broker.delete_message("q", &first.receipt_handle),
        Err(SqsError::ReceiptHandleIsInvalid(_))
    ));
    broker.delete_message("q", &second.receipt_handle).unwrap();
}

#[tokio::test]
async fn fifo_preserves_group_order_and_isolation() {
    let broker = broker();
    create_fifo(&broker, "q.fifo", false);
    // Interleaved sends across two groups.
    send_grouped(&broker, "q.fifo", "A1", "A");
    send_grouped(&broker, "q.fifo", "B1", "B");
    send_grouped(&broker, "q.fifo", "A2", "A");
    send_grouped(&broker, "q.fifo", "B2", "B");
    send_grouped(&broker, "q.fifo", "A3", "A");

    // Drain with delete; per-group relative order must match send order.
    let mut order_a = Vec::new();
    let mut order_b = Vec::new();
    loop {
        let got = broker.receive_message("q.fifo", &immediate(10)).await.unwrap();
        if got.is_empty() {
            break;
        }
        for m in got {
            match m.group_id.as_deref() {
                Some("A") => order_a.push(m.body.clone()),
                Some("B") => order_b.push(m.body.clone()),
                other => panic!("unexpected group {other:?}"),
            }
            broker.delete_message("q.fifo", &m.receipt_handle).unwrap();
        }
    }
    assert_eq!(order_a, ["A1", "A2", "A3"]);
    assert_eq!(order_b, ["B1", "B2"]);
}

#[tokio::test]
async fn fifo_holds_back_group_while_one_message_is_in_flight() {
    let broker = broker();
    create_fifo(&broker, "q.fifo", false);
    send_grouped(&broker, "q.fifo", "A1", "A");
    send_grouped(&broker, "q.fifo", "A2", "A");
    send_grouped(&broker, "q.fifo", "B1", "B");

    let first = broker.receive_message("q.fifo", &immediate(1)).await.unwrap();
    assert_eq!(first[0].body, "A1");

    // A1 is in flight and undeleted: nothing further from group A.
    let rest = broker.receive_message("q.fifo", &immediate(10)).await.unwrap();
    let bodies: Vec<&str> = rest.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["B1"]);
    assert!(broker
        .receive_message("q.fifo", &immediate(10))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn content_based_dedup_collapses_within_window() {
    let broker = broker();
    create_fifo(&broker, "q.fifo", true);

    let params = SendMessageParams {
        body: "dup".into(),
        group_id: Some("C".into()),
        ..Default::default()
    };
    let first = broker.send_message("q.fifo", params.clone()).unwrap();
    let second = broker.send_message("q.fifo", params).unwrap();
    assert_eq!(first.message_id, second.message_id);
    assert_eq!(first.sequence_number, second.sequence_number);

    let got = broker.receive_message("q.fifo", &immediate(10)).await.unwrap();
    assert_eq!(got.len(), 1);
}

#[tokio::test]
async fn batch_entries_dedup_in_input_order() {
    let broker = broker();
    create_fifo(&broker, "q.fifo", false);

    let entry = |id: &str, body: &str, dedup: &str| SendBatchEntry {
        id: id.into(),
        params: SendMessageParams {
            body: body.into(),
            group_id: Some("g".into()),
            dedup_id: Some(dedup.into()),
            ..Default::default()
        },
    };
    let (successful, failed) = broker
        .send_message_batch(
            "q.fifo",
            vec![
                entry("one", "first", "k1"),
                entry("two", "second", "k2"),
                entry("three", "first-again", "k1"),
            ],
        )
        .unwrap();
    assert!(failed.is_empty());
    assert_eq!(successful.len(), 3);
    // The in-batch duplicate collapsed to the first entry's identity.
    assert_eq!(successful[0].1.message_id, successful[2].1.message_id);
    assert_ne!(successful[0].1.message_id, successful[1].1.message_id);

    let got = broker.receive_message("q.fifo", &immediate(10)).await.unwrap();
    assert_eq!(got.len(), 1, "one in flight per group");
    assert_eq!(got[0].body, "first");
}

#[tokio::test]
async fn poison_message_moves_to_dlq_and_leaves_source() {
    let broker = broker();
    create(&broker, "dlq");
    let mut attrs = HashMap::new();
    attrs.insert(
        "RedrivePolicy".to_string(),
        RedrivePolicy {
            dead_letter_target_arn: broker.config().queue_arn("dlq"),
            max_receive_count: 3,
        }
        .to_json(),
    );
    broker.create_queue("main", &attrs, HashMap::new()).unwrap();
    send(&broker, "main", "poison");

    let options = ReceiveOptions {
        max_count: 1,
        visibility_timeout: Some(1),
        wait_time_seconds: Some(0),
    };
    for _ in 0..3 {
        assert_eq!(broker.receive_message("main", &options).await.unwrap().len(), 1);
        broker.clock().advance(1_100);
    }
    // Fourth attempt promotes instead of delivering.
    assert!(broker.receive_message("main", &options).await.unwrap().is_empty());

    let moved = broker.receive_message("dlq", &immediate(1)).await.unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].body, "poison");
    assert_eq!(moved[0].attributes["ApproximateReceiveCount"], "1");
    assert_eq!(
        moved[0].attributes[DEAD_LETTER_SOURCE_ATTR],
        broker.config().queue_arn("main")
    );
    assert!(broker.receive_message("main", &options).await.unwrap().is_empty());
}

#[tokio::test]
async fn purge_then_receive_returns_nothing() {
    let broker = broker();
    create(&broker, "q");
    for i in 0..5 {
        send(&broker, "q", &format!("m{i}"));
    }
    broker.purge_queue("q").unwrap();
    assert!(broker.receive_message("q", &immediate(10)).await.unwrap().is_empty());
}

#[tokio::test]
async fn every_sent_body_is_eventually_delivered() {
    let broker = broker();
    create(&broker, "q");
    let mut expected = HashSet::new();
    for i in 0..50 {
        let body = format!("msg-{i}");
        send(&broker, "q", &body);
        expected.insert(body);
    }

    let mut seen = HashSet::new();
    while !expected.is_subset(&seen) {
        let got = broker.receive_message("q", &immediate(10)).await.unwrap();
        assert!(!got.is_empty(), "queue ran dry before all bodies were seen");
        for m in got {
            seen.insert(m.body.clone());
            broker.delete_message("q", &m.receipt_handle).unwrap();
        }
    }
}

#[tokio::test]
async fn long_poll_wakes_on_send() {
    let broker = Arc::new(Broker::new(BrokerConfig::default(), Clock::system()));
    create(&broker, "q");

    let receiver = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let options = ReceiveOptions {
                max_count: 1,
                visibility_timeout: None,
                wait_time_seconds: Some(10),
            };
            broker.receive_message("q", &options).await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    send(&broker, "q", "wake up");

    let got = tokio::time::timeout(Duration::from_secs(5), receiver)
        .await
        .expect("long poll did not wake")
        .unwrap()
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].body, "wake up");
}

#[tokio::test]
async fn long_poll_returns_empty_at_deadline() {
    let broker = Arc::new(Broker::new(BrokerConfig::default(), Clock::system()));
    create(&broker, "q");

    let options = ReceiveOptions {
        max_count: 1,
        visibility_timeout: None,
        wait_time_seconds: Some(1),
    };
    let started = std::time::Instant::now();
    let got = broker.receive_message("q", &options).await.unwrap();
    assert!(got.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn move_task_drains_dlq_back_to_source() {
    let broker = Arc::new(Broker::new(BrokerConfig::default(), Clock::system()));
    create(&broker, "dlq");
    let mut attrs = HashMap::new();
    attrs.insert(
        "RedrivePolicy".to_string(),
        RedrivePolicy {
            dead_letter_target_arn: broker.config().queue_arn("dlq"),
            max_receive_count: 3,
        }
        .to_json(),
    );
    broker.create_queue("main", &attrs, HashMap::new()).unwrap();
    send(&broker, "dlq", "back");

    let handle = broker
        .start_message_move_task(&broker.config().queue_arn("dlq"), None, Some(10))
        .unwrap();

    let mut status = String::new();
    for _ in 0..100 {
        let tasks = broker.list_message_move_tasks(&broker.config().queue_arn("dlq"), 1);
        status = tasks[0].status.clone();
        if status == "COMPLETED" {
            assert_eq!(tasks[0].moved, 1);
            assert_eq!(tasks[0].task_handle, handle);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, "COMPLETED", "move task never completed");

    let got = broker.receive_message("main", &immediate(10)).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].body, "back");
    assert!(broker.receive_message("dlq", &immediate(10)).await.unwrap().is_empty());
}

#[tokio::test]
async fn move_task_honors_explicit_destination_and_cancel() {
    let broker = Arc::new(Broker::new(BrokerConfig::default(), Clock::system()));
    create(&broker, "src");
    create(&broker, "dst");
    for i in 0..3 {
        send(&broker, "src", &format!("m{i}"));
    }

    // A second active task on the same source is rejected.
    let handle = broker
        .start_message_move_task(
            &broker.config().queue_arn("src"),
            Some(broker.config().queue_arn("dst")),
            Some(100),
        )
        .unwrap();
    assert!(matches!(
        broker.start_message_move_task(&broker.config().queue_arn("src"), None, None),
        Err(SqsError::InvalidParameterValue(_))
    ));

    for _ in 0..100 {
        let tasks = broker.list_message_move_tasks(&broker.config().queue_arn("src"), 1);
        if tasks[0].status == "COMPLETED" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let tasks = broker.list_message_move_tasks(&broker.config().queue_arn("src"), 1);
    assert_eq!(tasks[0].status, "COMPLETED");
    assert_eq!(tasks[0].moved, 3);

    // Cancelling a finished task is an error.
    assert!(matches!(
        broker.cancel_message_move_task(&handle),
        Err(SqsError::ResourceNotFound(_))
    ));

    let mut bodies = Vec::new();
    loop {
        let got = broker.receive_message("dst", &immediate(10)).await.unwrap();
        if got.is_empty() {
            break;
        }
        for m in got {
            bodies.push(m.body.clone());
            broker.delete_message("dst", &m.receipt_handle).unwrap();
        }
    }
    bodies.sort();
    assert_eq!(bodies, ["m0", "m1", "m2"]);
}

#[tokio::test]
async fn sweeper_promotes_expired_messages_without_receives() {
    let broker = Arc::new(Broker::new(BrokerConfig::default(), Clock::system()));
    create(&broker, "dlq");
    let mut attrs = HashMap::new();
    attrs.insert(
        "RedrivePolicy".to_string(),
        RedrivePolicy {
            dead_letter_target_arn: broker.config().queue_arn("dlq"),
            max_receive_count: 1,
        }
        .to_json(),
    );
    broker.create_queue("main", &attrs, HashMap::new()).unwrap();
    send(&broker, "main", "poison");

    let options = ReceiveOptions {
        max_count: 1,
        visibility_timeout: Some(1),
        wait_time_seconds: Some(0),
    };
    assert_eq!(broker.receive_message("main", &options).await.unwrap().len(), 1);

    sqslite::sweeper::spawn(broker.clone(), Duration::from_millis(100));
    // After visibility expiry the sweeper alone must promote the message.
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let moved = broker.receive_message("dlq", &immediate(10)).await.unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].body, "poison");
}
