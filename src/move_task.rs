use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::ids;
use crate::message::DEAD_LETTER_SOURCE_ATTR;
use crate::types::{DeliveredMessage, MoveTaskView, ReceiveOptions, SendMessageParams};

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const MAX_SEND_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTaskStatus {
    Running,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl MoveTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveTaskStatus::Running => "RUNNING",
            MoveTaskStatus::Cancelling => "CANCELLING",
            MoveTaskStatus::Cancelled => "CANCELLED",
            MoveTaskStatus::Completed => "COMPLETED",
            MoveTaskStatus::Failed => "FAILED",
        }
    }
}

/// Shared state of one operator-initiated redrive: registry entries and the
/// worker task both hold this.
pub struct MoveTask {
    pub task_handle: String,
    pub source_arn: String,
    pub destination_arn: Option<String>,
    pub max_per_second: Option<u32>,
    pub to_move: u64,
    pub started_at: u64,
    moved: AtomicU64,
    cancel: AtomicBool,
    status: Mutex<MoveTaskStatus>,
    failure_reason: Mutex<Option<String>>,
}

impl MoveTask {
    pub fn new(
        source_arn: String,
        destination_arn: Option<String>,
        max_per_second: Option<u32>,
        to_move: u64,
        started_at: u64,
    ) -> Self {
        MoveTask {
            task_handle: ids::task_handle(),
            source_arn,
            destination_arn,
            max_per_second,
            to_move,
            started_at,
            moved: AtomicU64::new(0),
            cancel: AtomicBool::new(false),
            status: Mutex::new(MoveTaskStatus::Running),
            failure_reason: Mutex::new(None),
        }
    }

    pub fn status(&self) -> MoveTaskStatus {
        *self.status.lock()
    }

    pub fn moved(&self) -> u64 {
        self.moved.load(Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        *self.status.lock() = MoveTaskStatus::Cancelling;
    }

    pub fn view(&self) -> MoveTaskView {
        MoveTaskView {
            task_handle: self.task_handle.clone(),
            status: self.status().as_str().to_string(),
            source_arn: self.source_arn.clone(),
            destination_arn: self.destination_arn.clone(),
            max_per_second: self.max_per_second,
            moved: self.moved(),
            to_move: self.to_move,
            started_at: self.started_at,
            failure_reason: self.failure_reason.lock().clone(),
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn record_moved(&self) {
        self.moved.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, status: MoveTaskStatus) {
        *self.status.lock() = status;
    }

    fn fail(&self, reason: &str) {
        *self.failure_reason.lock() = Some(reason.to_string());
        *self.status.lock() = MoveTaskStatus::Failed;
    }
}

/// Rebuild the send for the destination queue. The dead-letter marker is
/// cleared, and a FIFO message gets a fresh dedup id: the original id may
/// still be live in the destination's dedup window, which would swallow the
/// move.
fn redrive_params(msg: &DeliveredMessage) -> SendMessageParams {
    let mut system_attributes = msg.system_attributes.clone();
    system_attributes.remove(DEAD_LETTER_SOURCE_ATTR);
    SendMessageParams {
        body: msg.body.clone(),
        delay_seconds: Some(0),
        message_attributes: msg.message_attributes.clone(),
        system_attributes,
        dedup_id: msg
            .dedup_id
            .as_ref()
            .map(|_| uuid::Uuid::new_v4().to_string()),
        group_id: msg.group_id.clone(),
    }
}

/// Drain the source queue one message at a time, pacing to the requested
/// rate. Runs until the source is empty (COMPLETED), the operator cancels
/// (CANCELLED), or a message cannot be delivered (FAILED).
pub(crate) async fn run(broker: Arc<Broker>, task: Arc<MoveTask>) {
    let pace = match task.max_per_second {
        Some(rate) if rate > 0 => Duration::from_millis(1000 / rate as u64),
        _ => Duration::from_millis(10),
    };
    let source_name = match Broker::queue_name_from_arn(&task.source_arn) {
        Ok(name) => name,
        Err(_) => {
            task.fail("invalid source ARN");
            return;
        }
    };
    let receive = ReceiveOptions {
        max_count: 1,
        visibility_timeout: None,
        wait_time_seconds: Some(0),
    };
    // Messages sent straight to a DLQ carry no dead-letter marker; when the
    // DLQ has exactly one configured source queue, that is where they go.
    let fallback_arn = broker
        .list_dead_letter_source_queues(&source_name)
        .ok()
        .filter(|urls| urls.len() == 1)
        .and_then(|urls| Broker::queue_name_from_url(&urls[0]).ok())
        .map(|name| broker.config().queue_arn(&name));

    loop {
        if task.cancel_requested() {
            info!(task = %task.task_handle, moved = task.moved(), "move task cancelled");
            task.finish(MoveTaskStatus::Cancelled);
            return;
        }

        let msg = match broker.receive_message(&source_name, &receive).await {
            Ok(mut messages) if !messages.is_empty() => messages.remove(0),
            Ok(_) => {
                info!(task = %task.task_handle, moved = task.moved(), "move task completed");
                task.finish(MoveTaskStatus::Completed);
                return;
            }
            Err(err) => {
                warn!(task = %task.task_handle, error = %err, "move task lost its source queue");
                task.fail("source queue is gone");
                return;
            }
        };

        let destination_arn = task
            .destination_arn
            .clone()
            .or_else(|| msg.attributes.get(DEAD_LETTER_SOURCE_ATTR).cloned())
            .or_else(|| fallback_arn.clone());
        let Some(destination_arn) = destination_arn else {
            release(&broker, &source_name, &msg);
            task.fail("message has no dead-letter source queue to return to");
            return;
        };
        let destination_name = match Broker::queue_name_from_arn(&destination_arn) {
            Ok(name) => name,
            Err(_) => {
                release(&broker, &source_name, &msg);
                task.fail("invalid destination ARN");
                return;
            }
        };

        let params = redrive_params(&msg);
        let mut sent = false;
        for attempt in 0..MAX_SEND_ATTEMPTS {
            match broker.send_message(&destination_name, params.clone()) {
                Ok(_) => {
                    sent = true;
                    break;
                }
                Err(err) => {
                    debug!(
                        task = %task.task_handle,
                        attempt,
                        error = %err,
                        "destination send failed"
                    );
                    tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt)).await;
                }
            }
        }
        if !sent {
            release(&broker, &source_name, &msg);
            warn!(task = %task.task_handle, destination = %destination_arn, "move task aborted");
            task.fail("destination queue rejected the message");
            return;
        }

        if let Err(err) = broker.delete_message(&source_name, &msg.receipt_handle) {
            // The handle expired while we were retrying; the message will be
            // picked up again, which is at-least-once behavior, not loss.
            warn!(task = %task.task_handle, error = %err, "source delete failed after move");
        }
        task.record_moved();
        tokio::time::sleep(pace).await;
    }
}

fn release(broker: &Broker, source_name: &str, msg: &DeliveredMessage) {
    if let Err(err) = broker.change_message_visibility(source_name, &msg.receipt_handle, 0) {
        warn!(error = %err, "failed to release message back to source");
    }
}
