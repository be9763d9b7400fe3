use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::broker::Broker;
use crate::error::SqsError;
use crate::types::SendMessageParams;

/// Messages sampled per queue in the snapshot view.
const SNAPSHOT_SAMPLE: usize = 10;

/// The browser admin UI and its JSON endpoints, plus the health probe.
/// Everything here is read-only or a thin wrapper over the same engine
/// methods the query protocol uses.
pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin", get(admin_ui))
        .route("/admin/api/queues", get(list_queues))
        .route("/admin/api/queue", post(create_queue).delete(delete_queue))
        .route("/admin/api/message", post(send_message))
        .route("/admin/api/config/export", get(export_config))
        .with_state(broker)
}

fn bad_request(err: SqsError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": err.to_string() })),
    )
        .into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "healthy" })).into_response()
}

/// Self-contained admin page; renders the snapshot from
/// `/admin/api/queues` and refreshes it client-side.
async fn admin_ui() -> Html<&'static str> {
    Html(ADMIN_PAGE)
}

const ADMIN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>sqslite Admin</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem; color: #222; }
  h1 { font-size: 1.4rem; }
  table { border-collapse: collapse; margin-top: 1rem; }
  th, td { border: 1px solid #ccc; padding: 0.4rem 0.8rem; text-align: left; }
  th { background: #f4f4f4; }
  .empty { color: #888; margin-top: 1rem; }
</style>
</head>
<body>
<h1>sqslite Admin</h1>
<div id="queues" class="empty">Loading queues...</div>
<script>
async function refresh() {
  const response = await fetch('/admin/api/queues');
  const data = await response.json();
  const container = document.getElementById('queues');
  if (!data.queues.length) {
    container.className = 'empty';
    container.textContent = 'No queues.';
    return;
  }
  const rows = data.queues.map(q =>
    `<tr><td>${q.name}</td><td>${q.fifo ? 'FIFO' : 'standard'}</td>` +
    `<td>${q.visible_count}</td><td>${q.inflight_count}</td>` +
    `<td>${q.delayed_count}</td></tr>`).join('');
  container.className = '';
  container.innerHTML =
    '<table><tr><th>Queue</th><th>Type</th><th>Visible</th>' +
    '<th>In flight</th><th>Delayed</th></tr>' + rows + '</table>';
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;

async fn list_queues(State(broker): State<Arc<Broker>>) -> Response {
    Json(json!({ "queues": broker.snapshot_queues(SNAPSHOT_SAMPLE) })).into_response()
}

#[derive(Deserialize)]
struct CreateQueueBody {
    name: String,
    #[serde(default)]
    visibility_timeout: Option<u32>,
    #[serde(default)]
    message_retention_period: Option<u32>,
    #[serde(default)]
    delay_seconds: Option<u32>,
    #[serde(default)]
    max_message_size: Option<u32>,
    #[serde(default)]
    content_based_deduplication: Option<bool>,
}

async fn create_queue(
    State(broker): State<Arc<Broker>>,
    Json(body): Json<CreateQueueBody>,
) -> Response {
    let mut attributes = HashMap::new();
    if body.name.ends_with(".fifo") {
        attributes.insert("FifoQueue".to_string(), "true".to_string());
    }
    if let Some(v) = body.visibility_timeout {
        attributes.insert("VisibilityTimeout".to_string(), v.to_string());
    }
    if let Some(v) = body.message_retention_period {
        attributes.insert("MessageRetentionPeriod".to_string(), v.to_string());
    }
    if let Some(v) = body.delay_seconds {
        attributes.insert("DelaySeconds".to_string(), v.to_string());
    }
    if let Some(v) = body.max_message_size {
        attributes.insert("MaximumMessageSize".to_string(), v.to_string());
    }
    if let Some(v) = body.content_based_deduplication {
        attributes.insert("ContentBasedDeduplication".to_string(), v.to_string());
    }

    match broker.create_queue(&body.name, &attributes, HashMap::new()) {
        Ok(url) => {
            let queue = broker
                .snapshot_queues(0)
                .into_iter()
                .find(|q| q.name == body.name);
            Json(json!({
                "success": true,
                "queue": {
                    "name": body.name,
                    "url": url,
                    "visibility_timeout": body.visibility_timeout.unwrap_or(30),
                    "attributes": queue.map(|q| q.attributes),
                },
            }))
            .into_response()
        }
        Err(err) => bad_request(err),
    }
}

#[derive(Deserialize)]
struct DeleteQueueQuery {
    name: String,
}

async fn delete_queue(
    State(broker): State<Arc<Broker>>,
    Query(query): Query<DeleteQueueQuery>,
) -> Response {
    match broker.delete_queue(&query.name) {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Queue '{}' deleted successfully", query.name),
        }))
        .into_response(),
        Err(err) => bad_request(err),
    }
}

#[derive(Deserialize)]
struct SendMessageBody {
    queue_name: String,
    message_body: String,
    #[serde(default)]
    delay_seconds: Option<u32>,
    #[serde(default)]
    message_group_id: Option<String>,
    #[serde(default)]
    message_deduplication_id: Option<String>,
}

async fn send_message(
    State(broker): State<Arc<Broker>>,
    Json(body): Json<SendMessageBody>,
) -> Response {
    let params = SendMessageParams {
        body: body.message_body,
        delay_seconds: body.delay_seconds,
        dedup_id: body.message_deduplication_id,
        group_id: body.message_group_id,
        ..Default::default()
    };
    match broker.send_message(&body.queue_name, params) {
        Ok(outcome) => Json(json!({
            "success": true,
            "message_id": outcome.message_id,
        }))
        .into_response(),
        Err(err) => bad_request(err),
    }
}

async fn export_config(State(broker): State<Arc<Broker>>) -> Response {
    match broker.export_configuration().to_yaml() {
        Ok(yaml) => (
            StatusCode::OK,
            [
                ("content-type", "application/x-yaml"),
                ("content-disposition", "attachment; filename=\"config.yaml\""),
            ],
            yaml,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "config export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
