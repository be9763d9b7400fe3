use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use sqslite::broker::{Broker, BrokerConfig};
use sqslite::clock::Clock;
use sqslite::{admin, server};

fn app() -> Router {
    let broker = Arc::new(Broker::new(BrokerConfig::default(), Clock::manual(0)));
    server::router(broker.clone()).merge(admin::router(broker))
}

async fn sqs(app: &Router, params: &[(&str, &str)]) -> (StatusCode, String) {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    let request = Request::post("/")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(serializer.finish()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

fn extract(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

#[tokio::test]
async fn create_send_receive_delete_over_the_wire() {
    let app = app();

    let (status, body) = sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "wire")]).await;
    assert_eq!(status, StatusCode::OK);
    let queue_url = extract(&body, "QueueUrl").unwrap();
    assert_eq!(queue_url, "http://localhost:9324/wire");

    let (status, body) = sqs(
        &app,
        &[
            ("Action", "SendMessage"),
            ("QueueUrl", &queue_url),
            ("MessageBody", "hello"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(extract(&body, "MessageId").is_some());
    // MD5 of "hello".
    assert_eq!(
        extract(&body, "MD5OfMessageBody").unwrap(),
        "5d41402abc4b2a76b9719d911017c592"
    );

    let (status, body) = sqs(
        &app,
        &[
            ("Action", "ReceiveMessage"),
            ("QueueUrl", &queue_url),
            ("MaxNumberOfMessages", "10"),
            ("AttributeName.1", "All"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(extract(&body, "Body").unwrap(), "hello");
    assert!(body.contains("ApproximateReceiveCount"));
    let receipt = extract(&body, "ReceiptHandle").unwrap();

    let (status, _) = sqs(
        &app,
        &[
            ("Action", "DeleteMessage"),
            ("QueueUrl", &queue_url),
            ("ReceiptHandle", &receipt),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = sqs(
        &app,
        &[("Action", "ReceiveMessage"), ("QueueUrl", &queue_url)],
    )
    .await;
    assert!(!body.contains("<Message>"));
}

#[tokio::test]
async fn queue_can_be_addressed_by_path() {
    let app = app();
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "by-path")]).await;

    let request = Request::post("/by-path")
        .body(Body::from("Action=SendMessage&MessageBody=via-path"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, body) = sqs(
        &app,
        &[
            ("Action", "ReceiveMessage"),
            ("QueueUrl", "http://localhost:9324/by-path"),
        ],
    )
    .await;
    assert_eq!(extract(&body, "Body").unwrap(), "via-path");
}

#[tokio::test]
async fn unknown_queue_renders_the_error_envelope() {
    let app = app();
    let (status, body) = sqs(
        &app,
        &[
            ("Action", "SendMessage"),
            ("QueueUrl", "http://localhost:9324/nope"),
            ("MessageBody", "x"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        extract(&body, "Code").unwrap(),
        "AWS.SimpleQueueService.NonExistentQueue"
    );
    assert_eq!(extract(&body, "Type").unwrap(), "Sender");
    assert!(extract(&body, "RequestId").is_some());
}

#[tokio::test]
async fn list_queues_and_attributes() {
    let app = app();
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "list-a")]).await;
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "list-b")]).await;

    let (_, body) = sqs(&app, &[("Action", "ListQueues")]).await;
    assert_eq!(body.matches("<QueueUrl>").count(), 2);

    let (_, body) = sqs(
        &app,
        &[("Action", "ListQueues"), ("QueueNamePrefix", "list-a")],
    )
    .await;
    assert_eq!(body.matches("<QueueUrl>").count(), 1);

    let (_, body) = sqs(
        &app,
        &[
            ("Action", "GetQueueAttributes"),
            ("QueueUrl", "http://localhost:9324/list-a"),
            ("AttributeName.1", "All"),
        ],
    )
    .await;
    assert!(body.contains("ApproximateNumberOfMessages"));
    assert!(body.contains("QueueArn"));
    assert!(body.contains("arn:aws:sqs:us-east-1:000000000000:list-a"));

    let (_, body) = sqs(
        &app,
        &[("Action", "GetQueueUrl"), ("QueueName", "list-b")],
    )
    .await;
    assert_eq!(
        extract(&body, "QueueUrl").unwrap(),
        "http://localhost:9324/list-b"
    );
}

#[tokio::test]
async fn fifo_send_reports_sequence_numbers_and_dedups() {
    let app = app();
    let (status, _) = sqs(
        &app,
        &[
            ("Action", "CreateQueue"),
            ("QueueName", "w.fifo"),
            ("Attribute.1.Name", "FifoQueue"),
            ("Attribute.1.Value", "true"),
            ("Attribute.2.Name", "ContentBasedDeduplication"),
            ("Attribute.2.Value", "true"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let send = |body: &'static str| {
        let app = app.clone();
        async move {
            sqs(
                &app,
                &[
                    ("Action", "SendMessage"),
                    ("QueueUrl", "http://localhost:9324/w.fifo"),
                    ("MessageBody", body),
                    ("MessageGroupId", "g"),
                ],
            )
            .await
        }
    };
    let (_, first) = send("dup").await;
    let (_, second) = send("dup").await;
    assert_eq!(
        extract(&first, "MessageId").unwrap(),
        extract(&second, "MessageId").unwrap()
    );
    assert_eq!(
        extract(&first, "SequenceNumber").unwrap(),
        extract(&second, "SequenceNumber").unwrap()
    );
    assert_eq!(extract(&first, "SequenceNumber").unwrap().len(), 20);
}

#[tokio::test]
async fn send_message_batch_reports_per_entry_results() {
    let app = app();
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "batch")]).await;

    let oversize = "x".repeat(262_145);
    let (status, body) = sqs(
        &app,
        &[
            ("Action", "SendMessageBatch"),
            ("QueueUrl", "http://localhost:9324/batch"),
            ("SendMessageBatchRequestEntry.1.Id", "ok"),
            ("SendMessageBatchRequestEntry.1.MessageBody", "fine"),
            ("SendMessageBatchRequestEntry.2.Id", "broken"),
            ("SendMessageBatchRequestEntry.2.MessageBody", &oversize),
        ],
    )
    .await;
    // Oversize entry alone exceeds the whole-batch limit.
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        extract(&body, "Code").unwrap(),
        "AWS.SimpleQueueService.BatchRequestTooLong"
    );

    let (status, body) = sqs(
        &app,
        &[
            ("Action", "SendMessageBatch"),
            ("QueueUrl", "http://localhost:9324/batch"),
            ("SendMessageBatchRequestEntry.1.Id", "a"),
            ("SendMessageBatchRequestEntry.1.MessageBody", "one"),
            ("SendMessageBatchRequestEntry.2.Id", "b"),
            ("SendMessageBatchRequestEntry.2.MessageBody", "two"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("<SendMessageBatchResultEntry>").count(), 2);
}

#[tokio::test]
async fn message_attributes_round_trip() {
    let app = app();
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "attrs")]).await;

    let (status, body) = sqs(
        &app,
        &[
            ("Action", "SendMessage"),
            ("QueueUrl", "http://localhost:9324/attrs"),
            ("MessageBody", "payload"),
            ("MessageAttribute.1.Name", "trace"),
            ("MessageAttribute.1.Value.DataType", "String"),
            ("MessageAttribute.1.Value.StringValue", "abc-123"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(extract(&body, "MD5OfMessageAttributes").is_some());

    let (_, body) = sqs(
        &app,
        &[
            ("Action", "ReceiveMessage"),
            ("QueueUrl", "http://localhost:9324/attrs"),
            ("MessageAttributeName.1", "All"),
        ],
    )
    .await;
    assert!(body.contains("<MessageAttribute>"));
    assert_eq!(extract(&body, "Name").unwrap(), "trace");
    assert_eq!(extract(&body, "StringValue").unwrap(), "abc-123");
}

#[tokio::test]
async fn purge_is_rate_limited_over_the_wire() {
    let app = app();
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "purged")]).await;
    let queue = [("Action", "PurgeQueue"), ("QueueUrl", "http://localhost:9324/purged")];

    let (status, _) = sqs(&app, &queue).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = sqs(&app, &queue).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        extract(&body, "Code").unwrap(),
        "AWS.SimpleQueueService.PurgeQueueInProgress"
    );
}

#[tokio::test]
async fn queue_tags_round_trip() {
    let app = app();
    sqs(&app, &[("Action", "CreateQueue"), ("QueueName", "tagged")]).await;
    let url = "http://localhost:9324/tagged";

    sqs(
        &app,
        &[
            ("Action", "TagQueue"),
            ("QueueUrl", url),
            ("Tag.1.Key", "team"),
            ("Tag.1.Value", "platform"),
        ],
    )
    .await;
    let (_, body) = sqs(&app, &[("Action", "ListQueueTags"), ("QueueUrl", url)]).await;
    assert_eq!(extract(&body, "Key").unwrap(), "team");
    assert_eq!(extract(&body, "Value").unwrap(), "platform");

    sqs(
        &app,
        &[("Action", "UntagQueue"), ("QueueUrl", url), ("TagKey.1", "team")],
    )
    .await;
    let (_, body) = sqs(&app, &[("Action", "ListQueueTags"), ("QueueUrl", url)]).await;
    assert!(!body.contains("<Tag>"));
}

#[tokio::test]
async fn admin_ui_page_loads() {
    let app = app();
    let response = app
        .clone()
        .oneshot(Request::get("/admin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("sqslite Admin"));
    assert!(html.contains("/admin/api/queues"));
}

#[tokio::test]
async fn health_and_admin_surface() {
    let app = app();

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), br#"{"status":"healthy"}"#);

    // Create a queue and a message through the admin API.
    let response = app
        .clone()
        .oneshot(
            Request::post("/admin/api/queue")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"name":"admin-q","visibility_timeout":60}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["success"], true);
    assert_eq!(created["queue"]["name"], "admin-q");
    assert_eq!(created["queue"]["visibility_timeout"], 60);

    let response = app
        .clone()
        .oneshot(
            Request::post("/admin/api/message")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"queue_name":"admin-q","message_body":"from admin"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The snapshot shows the message without consuming it.
    let response = app
        .clone()
        .oneshot(Request::get("/admin/api/queues").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let queue = snapshot["queues"]
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["name"] == "admin-q")
        .unwrap();
    assert_eq!(queue["visible_count"], 1);
    assert_eq!(queue["messages"].as_array().unwrap().len(), 1);
    assert_eq!(queue["messages"][0]["body"], "from admin");

    // Config export carries the server and queue sections.
    let response = app
        .clone()
        .oneshot(
            Request::get("/admin/api/config/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-yaml"
    );
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("config.yaml"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let yaml = String::from_utf8_lossy(&body).into_owned();
    assert!(yaml.contains("server:"));
    assert!(yaml.contains("queues:"));
    assert!(yaml.contains("admin-q"));
    assert!(yaml.contains("visibility_timeout: 60"));

    // Delete through the admin API.
    let response = app
        .clone()
        .oneshot(
            Request::delete("/admin/api/queue?name=admin-q")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let deleted: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted["success"], true);
}

#[tokio::test]
async fn missing_action_and_unknown_action_are_rejected() {
    let app = app();

    let (status, body) = sqs(&app, &[("QueueName", "x")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(extract(&body, "Code").unwrap(), "MissingParameter");

    let (status, body) = sqs(&app, &[("Action", "Bogus")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(extract(&body, "Code").unwrap(), "InvalidAction");
}
