use std::collections::{BTreeMap, HashMap, HashSet};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{Config, QueueSection, RedriveSection, ServerSection};
use crate::error::SqsError;
use crate::message::{Message, MessageAttributeValue, MessageState, DEAD_LETTER_SOURCE_ATTR};
use crate::move_task::{self, MoveTask, MoveTaskStatus};
use crate::queue::{Queue, QueueAttributes, RedrivePolicy};
use crate::types::{
    BatchError, ChangeVisibilityBatchEntry, DeleteBatchEntry, DeliveredMessage, MoveTaskView,
    ReceiveOptions, SendBatchEntry, SendMessageParams, SendOutcome,
};

/// How long a deleted queue's name stays reserved.
pub const QUEUE_GRACE_MS: u64 = 60 * 1000;
/// Redrive chains longer than this are rejected outright.
pub const MAX_REDRIVE_DEPTH: usize = 10;
const MAX_BATCH_ENTRIES: usize = 10;
const MAX_BATCH_PAYLOAD: usize = 262_144;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
    pub account_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            host: "localhost".into(),
            port: 9324,
            region: "us-east-1".into(),
            account_id: "000000000000".into(),
        }
    }
}

impl BrokerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn queue_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url(), name)
    }

    pub fn queue_arn(&self, name: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{}", self.region, self.account_id, name)
    }
}

/// One directory slot: the queue behind its own lock, plus the wakeup channel
/// long-poll receivers park on. Kept alive by `Arc` for operations already in
/// flight when the queue is deleted.
pub struct QueueEntry {
    pub name: String,
    pub arn: String,
    pub url: String,
    pub queue: Mutex<Queue>,
    pub notify: Notify,
}

#[derive(Default)]
pub struct SweepSummary {
    pub redriven: usize,
    pub dropped: usize,
}

#[derive(Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub url: String,
    pub arn: String,
    pub fifo: bool,
    pub visible_count: usize,
    pub inflight_count: usize,
    pub delayed_count: usize,
    pub attributes: BTreeMap<String, String>,
    pub messages: Vec<MessageSnapshot>,
}

#[derive(Serialize)]
pub struct MessageSnapshot {
    pub id: String,
    pub body: String,
    pub state: MessageState,
    pub receive_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub enqueued_at: u64,
}

/// The process-wide store: queue directory, move-task registry, and the
/// operations that span queues. The directory lock is taken before any queue
/// lock; at most one queue lock is held at a time.
pub struct Broker {
    config: BrokerConfig,
    clock: Clock,
    queues: RwLock<HashMap<String, Arc<QueueEntry>>>,
    move_tasks: Mutex<Vec<Arc<MoveTask>>>,
    recently_deleted: Mutex<HashMap<String, u64>>,
}

impl Broker {
    pub fn new(config: BrokerConfig, clock: Clock) -> Self {
        Broker {
            config,
            clock,
            queues: RwLock::new(HashMap::new()),
            move_tasks: Mutex::new(Vec::new()),
            recently_deleted: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Queue name from a queue URL: the last path segment.
    pub fn queue_name_from_url(url: &str) -> Result<String, SqsError> {
        url.split('/')
            .next_back()
            .filter(|s| !s.is_empty())
            .map(|s| {
                percent_encoding::percent_decode_str(s)
                    .decode_utf8_lossy()
                    .to_string()
            })
            .ok_or_else(|| SqsError::QueueDoesNotExist("Invalid queue URL".into()))
    }

    /// Queue name from an ARN: the last `:`-separated component.
    pub fn queue_name_from_arn(arn: &str) -> Result<String, SqsError> {
        arn.split(':')
            .next_back()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| SqsError::ResourceNotFound("Invalid ARN".into()))
    }

    pub fn entry(&self, name: &str) -> Result<Arc<QueueEntry>, SqsError> {
        self.queues.read().get(name).cloned().ok_or_else(|| {
            SqsError::QueueDoesNotExist("The specified queue does not exist".into())
        })
    }

    fn validate_queue_name(name: &str, is_fifo: bool) -> Result<(), SqsError> {
        if name.is_empty() || name.len() > 80 {
            return Err(SqsError::InvalidParameterValue(
                "Queue name must be 1-80 characters".into(),
            ));
        }
        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(SqsError::InvalidParameterValue(
                "Queue name can only contain alphanumeric characters, hyphens, underscores, and periods"
                    .into(),
            ));
        }
        if is_fifo && !name.ends_with(".fifo") {
            return Err(SqsError::InvalidParameterValue(
                "FIFO queue name must end with .fifo".into(),
            ));
        }
        if !is_fifo && name.ends_with(".fifo") {
            return Err(SqsError::InvalidParameterValue(
                "Non-FIFO queue name must not end with .fifo".into(),
            ));
        }
        Ok(())
    }

    /// Walk the redrive chain the new policy would create and reject missing
    /// targets, flavor mismatches, cycles, and chains deeper than
    /// [`MAX_REDRIVE_DEPTH`].
    fn validate_redrive(
        queues: &HashMap<String, Arc<QueueEntry>>,
        source_name: &str,
        source_fifo: bool,
        policy: &RedrivePolicy,
    ) -> Result<(), SqsError> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(source_name.to_string());
        let mut target_arn = policy.dead_letter_target_arn.clone();
        let mut fifo = source_fifo;

        for _ in 0..MAX_REDRIVE_DEPTH {
            let name = Self::queue_name_from_arn(&target_arn)?;
            let entry = queues.get(&name).ok_or_else(|| {
                SqsError::InvalidParameterValue(format!(
                    "Dead-letter target {target_arn} does not exist"
                ))
            })?;
            if !seen.insert(name.clone()) {
                return Err(SqsError::InvalidParameterValue(
                    "Redrive configuration contains a cycle".into(),
                ));
            }
            let queue = entry.queue.lock();
            if queue.attributes.fifo_queue != fifo {
                return Err(SqsError::InvalidParameterValue(
                    "Dead-letter queue must be of the same type as the source queue".into(),
                ));
            }
            fifo = queue.attributes.fifo_queue;
            match queue.attributes.redrive_policy {
                Some(ref next) => target_arn = next.dead_letter_target_arn.clone(),
                None => return Ok(()),
            }
        }
        Err(SqsError::InvalidParameterValue(format!(
            "Redrive chain exceeds the maximum depth of {MAX_REDRIVE_DEPTH}"
        )))
    }

    pub fn create_queue(
        &self,
        name: &str,
        attributes: &HashMap<String, String>,
        tags: HashMap<String, String>,
    ) -> Result<String, SqsError> {
        let is_fifo = attributes
            .get("FifoQueue")
            .map(|v| v == "true")
            .unwrap_or_else(|| name.ends_with(".fifo"));
        Self::validate_queue_name(name, is_fifo)?;

        let mut queues = self.queues.write();

        if let Some(entry) = queues.get(name) {
            // Idempotent only when the supplied attributes match exactly.
            let existing = entry.queue.lock().attributes.to_map();
            for (key, value) in attributes {
                if existing.get(key).is_some_and(|v| v != value) {
                    return Err(SqsError::QueueAlreadyExists(format!(
                        "A queue named {name} already exists with different attributes"
                    )));
                }
            }
            return Ok(entry.url.clone());
        }

        {
            let now = self.clock.now_ms();
            let recently = self.recently_deleted.lock();
            if recently
                .get(name)
                .is_some_and(|&deleted_at| now.saturating_sub(deleted_at) < QUEUE_GRACE_MS)
            {
                return Err(SqsError::QueueDeletedRecently(format!(
                    "Queue {name} was deleted recently; wait 60 seconds before reusing the name"
                )));
            }
        }

        let mut queue_attributes = QueueAttributes {
            fifo_queue: is_fifo,
            ..QueueAttributes::default()
        };
        let mut attrs = attributes.clone();
        attrs.remove("FifoQueue");
        queue_attributes.apply(&attrs)?;

        if let Some(ref policy) = queue_attributes.redrive_policy {
            Self::validate_redrive(&queues, name, is_fifo, policy)?;
        }

        let url = self.config.queue_url(name);
        let arn = self.config.queue_arn(name);
        let mut queue = Queue::new(
            name.to_string(),
            arn.clone(),
            url.clone(),
            queue_attributes,
            self.clock.clone(),
        );
        queue.tags = tags;

        queues.insert(
            name.to_string(),
            Arc::new(QueueEntry {
                name: name.to_string(),
                arn,
                url: url.clone(),
                queue: Mutex::new(queue),
                notify: Notify::new(),
            }),
        );
        debug!(queue = name, fifo = is_fifo, "queue created");

        Ok(url)
    }

    pub fn delete_queue(&self, name: &str) -> Result<(), SqsError> {
        let entry = self.queues.write().remove(name).ok_or_else(|| {
            SqsError::QueueDoesNotExist("The specified queue does not exist".into())
        })?;
        self.recently_deleted
            .lock()
            .insert(name.to_string(), self.clock.now_ms());
        // Wake long-poll waiters so they observe the deletion.
        entry.notify.notify_waiters();
        debug!(queue = name, "queue deleted");
        Ok(())
    }

    pub fn get_queue_url(&self, name: &str) -> Result<String, SqsError> {
        Ok(self.entry(name)?.url.clone())
    }

    pub fn list_queues(&self, prefix: Option<&str>, max_results: usize) -> Vec<String> {
        let queues = self.queues.read();
        let mut names: Vec<&String> = queues.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter(|n| prefix.map_or(true, |p| n.starts_with(p)))
            .take(max_results)
            .map(|n| queues[n].url.clone())
            .collect()
    }

    pub fn get_queue_attributes(
        &self,
        name: &str,
        attribute_names: &Option<Vec<String>>,
    ) -> Result<Vec<(String, String)>, SqsError> {
        let entry = self.entry(name)?;
        let map = entry.queue.lock().get_attributes(attribute_names);
        let mut pairs: Vec<(String, String)> = map.into_iter().collect();
        pairs.sort();
        Ok(pairs)
    }

    pub fn set_queue_attributes(
        &self,
        name: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), SqsError> {
        if let Some(raw) = attributes.get("RedrivePolicy").filter(|v| !v.is_empty()) {
            let policy = RedrivePolicy::from_json(raw)?;
            let queues = self.queues.read();
            let entry = queues.get(name).ok_or_else(|| {
                SqsError::QueueDoesNotExist("The specified queue does not exist".into())
            })?;
            let fifo = entry.queue.lock().attributes.fifo_queue;
            Self::validate_redrive(&queues, name, fifo, &policy)?;
        }
        let entry = self.entry(name)?;
        let result = entry.queue.lock().set_attributes(attributes);
        result
    }

    pub fn purge_queue(&self, name: &str) -> Result<(), SqsError> {
        let entry = self.entry(name)?;
        let result = entry.queue.lock().purge();
        result
    }

    pub fn send_message(
        &self,
        name: &str,
        params: SendMessageParams,
    ) -> Result<SendOutcome, SqsError> {
        let entry = self.entry(name)?;
        let (outcome, immediately_visible) = {
            let mut queue = entry.queue.lock();
            let delay = params.delay_seconds.unwrap_or(queue.attributes.delay_seconds);
            (queue.send(params)?, delay == 0)
        };
        if immediately_visible {
            entry.notify.notify_one();
        }
        Ok(outcome)
    }

    pub fn send_message_batch(
        &self,
        name: &str,
        entries: Vec<SendBatchEntry>,
    ) -> Result<(Vec<(String, SendOutcome)>, Vec<BatchError>), SqsError> {
        Self::validate_batch_ids(entries.iter().map(|e| e.id.as_str()))?;
        let payload: usize = entries.iter().map(|e| e.params.body.len()).sum();
        if payload > MAX_BATCH_PAYLOAD {
            return Err(SqsError::BatchRequestTooLong(format!(
                "Batch requests cannot be longer than {MAX_BATCH_PAYLOAD} bytes"
            )));
        }

        let entry = self.entry(name)?;
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut any_visible = false;
        {
            let mut queue = entry.queue.lock();
            for e in entries {
                let delay = e.params.delay_seconds.unwrap_or(queue.attributes.delay_seconds);
                match queue.send(e.params) {
                    Ok(outcome) => {
                        any_visible |= delay == 0;
                        successful.push((e.id, outcome));
                    }
                    Err(err) => failed.push(BatchError {
                        id: e.id,
                        code: err.code(),
                        message: err.to_string(),
                    }),
                }
            }
        }
        if any_visible {
            entry.notify.notify_one();
        }
        Ok((successful, failed))
    }

    /// Receive with optional long polling. The queue is re-resolved on every
    /// round so deletion surfaces as `QueueDoesNotExist`; each wakeup
    /// re-checks for messages, and the deadline bounds the wait regardless
    /// of lost races.
    pub async fn receive_message(
        &self,
        name: &str,
        options: &ReceiveOptions,
    ) -> Result<Vec<DeliveredMessage>, SqsError> {
        let wait_secs = match options.wait_time_seconds {
            Some(w) => w,
            None => {
                let entry = self.entry(name)?;
                let wait = entry.queue.lock().attributes.receive_message_wait_time_seconds;
                wait
            }
        };
        let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_secs as u64);

        loop {
            let entry = self.entry(name)?;
            let mut notified = pin!(entry.notify.notified());
            notified.as_mut().enable();

            let (outcome, dlq_target) = {
                let mut queue = entry.queue.lock();
                let outcome = queue.receive(options.max_count, options.visibility_timeout)?;
                let target = queue
                    .attributes
                    .redrive_policy
                    .as_ref()
                    .map(|p| p.dead_letter_target_arn.clone());
                (outcome, target)
            };
            if !outcome.redrives.is_empty() {
                if let Some(ref target) = dlq_target {
                    self.route_redrives(&entry.arn, target, outcome.redrives);
                }
            }
            if !outcome.messages.is_empty() {
                return Ok(outcome.messages);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    pub fn delete_message(&self, name: &str, receipt_handle: &str) -> Result<(), SqsError> {
        let entry = self.entry(name)?;
        let result = entry.queue.lock().delete(receipt_handle);
        result
    }

    pub fn delete_message_batch(
        &self,
        name: &str,
        entries: Vec<DeleteBatchEntry>,
    ) -> Result<(Vec<String>, Vec<BatchError>), SqsError> {
        Self::validate_batch_ids(entries.iter().map(|e| e.id.as_str()))?;
        let entry = self.entry(name)?;
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut queue = entry.queue.lock();
        for e in entries {
            match queue.delete(&e.receipt_handle) {
                Ok(()) => successful.push(e.id),
                Err(err) => failed.push(BatchError {
                    id: e.id,
                    code: err.code(),
                    message: err.to_string(),
                }),
            }
        }
        Ok((successful, failed))
    }

    pub fn change_message_visibility(
        &self,
        name: &str,
        receipt_handle: &str,
        visibility_timeout: u32,
    ) -> Result<(), SqsError> {
        let entry = self.entry(name)?;
        let made_visible = {
            let mut queue = entry.queue.lock();
            queue.change_visibility(receipt_handle, visibility_timeout)?;
            visibility_timeout == 0
        };
        if made_visible {
            entry.notify.notify_one();
        }
        Ok(())
    }

    pub fn change_message_visibility_batch(
        &self,
        name: &str,
        entries: Vec<ChangeVisibilityBatchEntry>,
    ) -> Result<(Vec<String>, Vec<BatchError>), SqsError> {
        Self::validate_batch_ids(entries.iter().map(|e| e.id.as_str()))?;
        let entry = self.entry(name)?;
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut any_visible = false;
        {
            let mut queue = entry.queue.lock();
            for e in entries {
                match queue.change_visibility(&e.receipt_handle, e.visibility_timeout) {
                    Ok(()) => {
                        any_visible |= e.visibility_timeout == 0;
                        successful.push(e.id);
                    }
                    Err(err) => failed.push(BatchError {
                        id: e.id,
                        code: err.code(),
                        message: err.to_string(),
                    }),
                }
            }
        }
        if any_visible {
            entry.notify.notify_one();
        }
        Ok((successful, failed))
    }

    pub fn tag_queue(&self, name: &str, tags: HashMap<String, String>) -> Result<(), SqsError> {
        let entry = self.entry(name)?;
        let mut queue = entry.queue.lock();
        if queue.tags.len() + tags.len() > 50 {
            return Err(SqsError::InvalidParameterValue(
                "Maximum 50 tags per queue".into(),
            ));
        }
        queue.tags.extend(tags);
        Ok(())
    }

    pub fn untag_queue(&self, name: &str, keys: &[String]) -> Result<(), SqsError> {
        let entry = self.entry(name)?;
        let mut queue = entry.queue.lock();
        for key in keys {
            queue.tags.remove(key);
        }
        Ok(())
    }

    pub fn list_queue_tags(&self, name: &str) -> Result<Vec<(String, String)>, SqsError> {
        let entry = self.entry(name)?;
        let mut tags: Vec<(String, String)> = {
            let queue = entry.queue.lock();
            queue.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        tags.sort();
        Ok(tags)
    }

    pub fn list_dead_letter_source_queues(&self, name: &str) -> Result<Vec<String>, SqsError> {
        let target_arn = self.entry(name)?.arn.clone();
        let queues = self.queues.read();
        let mut urls: Vec<String> = queues
            .values()
            .filter(|e| {
                e.queue
                    .lock()
                    .attributes
                    .redrive_policy
                    .as_ref()
                    .is_some_and(|p| p.dead_letter_target_arn == target_arn)
            })
            .map(|e| e.url.clone())
            .collect();
        urls.sort();
        Ok(urls)
    }

    /// Deliver over-retried messages to their dead-letter queue through the
    /// target's normal send path: fresh id and sequence number, receive
    /// count reset, `DeadLetterQueueSourceArn` stamped. Called with no queue
    /// lock held.
    pub(crate) fn route_redrives(
        &self,
        source_arn: &str,
        target_arn: &str,
        redrives: Vec<Message>,
    ) {
        let target_name = match Self::queue_name_from_arn(target_arn) {
            Ok(name) => name,
            Err(_) => {
                warn!(target = target_arn, "invalid dead-letter target ARN");
                return;
            }
        };
        for msg in redrives {
            let Ok(entry) = self.entry(&target_name) else {
                // Same as the cloud service when the DLQ was deleted: the
                // message is dropped.
                warn!(
                    target = target_arn,
                    message_id = %msg.message_id,
                    "dead-letter target missing; message dropped"
                );
                continue;
            };
            let mut params = SendMessageParams {
                body: msg.body,
                delay_seconds: Some(0),
                message_attributes: msg.message_attributes,
                system_attributes: msg.system_attributes,
                dedup_id: msg.dedup_id,
                group_id: msg.group_id,
            };
            params.system_attributes.insert(
                DEAD_LETTER_SOURCE_ATTR.to_string(),
                MessageAttributeValue {
                    data_type: "String".into(),
                    string_value: Some(source_arn.to_string()),
                    binary_value: None,
                },
            );
            let sent = entry.queue.lock().send(params);
            match sent {
                Ok(_) => {
                    debug!(
                        source = source_arn,
                        target = target_arn,
                        message_id = %msg.message_id,
                        "message moved to dead-letter queue"
                    );
                    entry.notify.notify_one();
                }
                Err(err) => warn!(
                    target = target_arn,
                    error = %err,
                    "dead-letter delivery failed; message dropped"
                ),
            }
        }
    }

    // --- Message move tasks ---

    pub fn start_message_move_task(
        self: &Arc<Self>,
        source_arn: &str,
        destination_arn: Option<String>,
        max_per_second: Option<u32>,
    ) -> Result<String, SqsError> {
        let source_name = Self::queue_name_from_arn(source_arn)?;
        let source_entry = self.queues.read().get(&source_name).cloned().ok_or_else(|| {
            SqsError::ResourceNotFound("Source queue does not exist".into())
        })?;
        if let Some(ref dest) = destination_arn {
            let dest_name = Self::queue_name_from_arn(dest)?;
            if !self.queues.read().contains_key(&dest_name) {
                return Err(SqsError::ResourceNotFound(
                    "Destination queue does not exist".into(),
                ));
            }
        }

        let mut tasks = self.move_tasks.lock();
        if tasks.iter().any(|t| {
            t.source_arn == source_arn
                && matches!(
                    t.status(),
                    MoveTaskStatus::Running | MoveTaskStatus::Cancelling
                )
        }) {
            return Err(SqsError::InvalidParameterValue(
                "An active message move task already exists for this source queue".into(),
            ));
        }

        let to_move = {
            let queue = source_entry.queue.lock();
            let (visible, delayed) = queue.stored_counts(self.clock.now_ms());
            (visible + delayed) as u64
        };
        let task = Arc::new(MoveTask::new(
            source_arn.to_string(),
            destination_arn,
            max_per_second,
            to_move,
            self.clock.now_ms(),
        ));
        tasks.push(task.clone());
        drop(tasks);

        tokio::spawn(move_task::run(self.clone(), task.clone()));
        Ok(task.task_handle.clone())
    }

    pub fn cancel_message_move_task(&self, task_handle: &str) -> Result<u64, SqsError> {
        let tasks = self.move_tasks.lock();
        let task = tasks
            .iter()
            .find(|t| t.task_handle == task_handle)
            .ok_or_else(|| SqsError::ResourceNotFound("Task not found".into()))?;
        if task.status() != MoveTaskStatus::Running {
            return Err(SqsError::ResourceNotFound("Task is not running".into()));
        }
        task.request_cancel();
        Ok(task.moved())
    }

    pub fn list_message_move_tasks(
        &self,
        source_arn: &str,
        max_results: usize,
    ) -> Vec<MoveTaskView> {
        let tasks = self.move_tasks.lock();
        tasks
            .iter()
            .rev()
            .filter(|t| t.source_arn == source_arn)
            .take(max_results)
            .map(|t| t.view())
            .collect()
    }

    // --- Maintenance ---

    /// One sweeper tick over every queue; see `Queue::sweep`.
    pub fn sweep(&self) -> SweepSummary {
        let entries: Vec<Arc<QueueEntry>> = self.queues.read().values().cloned().collect();
        let mut summary = SweepSummary::default();
        for entry in entries {
            let (report, dlq_target) = {
                let mut queue = entry.queue.lock();
                let report = queue.sweep();
                let target = queue
                    .attributes
                    .redrive_policy
                    .as_ref()
                    .map(|p| p.dead_letter_target_arn.clone());
                (report, target)
            };
            if report.has_visible {
                entry.notify.notify_waiters();
            }
            summary.dropped += report.dropped;
            if !report.redrives.is_empty() {
                summary.redriven += report.redrives.len();
                if let Some(ref target) = dlq_target {
                    self.route_redrives(&entry.arn, target, report.redrives);
                }
            }
        }

        let now = self.clock.now_ms();
        self.recently_deleted
            .lock()
            .retain(|_, deleted_at| now.saturating_sub(*deleted_at) < QUEUE_GRACE_MS);
        summary
    }

    // --- Admin surface ---

    /// Read-only view of every queue with a bounded message sample.
    pub fn snapshot_queues(&self, sample_limit: usize) -> Vec<QueueSnapshot> {
        let entries: Vec<Arc<QueueEntry>> = self.queues.read().values().cloned().collect();
        let now = self.clock.now_ms();
        let mut snapshots: Vec<QueueSnapshot> = entries
            .iter()
            .map(|entry| {
                let queue = entry.queue.lock();
                let (visible, delayed) = queue.stored_counts(now);
                QueueSnapshot {
                    name: queue.name.clone(),
                    url: queue.url.clone(),
                    arn: queue.arn.clone(),
                    fifo: queue.attributes.fifo_queue,
                    visible_count: visible,
                    inflight_count: queue.inflight_count(),
                    delayed_count: delayed,
                    attributes: queue.get_attributes(&None).into_iter().collect(),
                    messages: queue
                        .sample(sample_limit)
                        .into_iter()
                        .map(|m| MessageSnapshot {
                            id: m.message_id.clone(),
                            body: m.body.clone(),
                            state: m.state(now),
                            receive_count: m.receive_count,
                            group_id: m.group_id.clone(),
                            enqueued_at: m.sent_timestamp,
                        })
                        .collect(),
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn export_configuration(&self) -> Config {
        let mut queues: Vec<QueueSection> = self
            .queues
            .read()
            .values()
            .map(|entry| {
                let queue = entry.queue.lock();
                let attrs = &queue.attributes;
                QueueSection {
                    name: queue.name.clone(),
                    visibility_timeout: Some(attrs.visibility_timeout),
                    message_retention_period: Some(attrs.message_retention_period),
                    delay_seconds: Some(attrs.delay_seconds),
                    maximum_message_size: Some(attrs.maximum_message_size),
                    receive_message_wait_time_seconds: Some(
                        attrs.receive_message_wait_time_seconds,
                    ),
                    content_based_deduplication: attrs
                        .fifo_queue
                        .then_some(attrs.content_based_deduplication),
                    redrive_policy: attrs.redrive_policy.as_ref().map(|p| RedriveSection {
                        dead_letter_target_arn: p.dead_letter_target_arn.clone(),
                        max_receive_count: p.max_receive_count,
                    }),
                }
            })
            .collect();
        queues.sort_by(|a, b| a.name.cmp(&b.name));

        Config {
            server: ServerSection {
                host: Some(self.config.host.clone()),
                port: Some(self.config.port),
                region: Some(self.config.region.clone()),
                account_id: Some(self.config.account_id.clone()),
            },
            queues,
        }
    }

    /// Create the queues a config file describes. Redrive policies are
    /// applied in a second pass so targets may appear in any order.
    pub fn import_configuration(&self, config: &Config) -> Result<(), SqsError> {
        for section in &config.queues {
            let mut attrs = section.attribute_map();
            attrs.remove("RedrivePolicy");
            self.create_queue(&section.name, &attrs, HashMap::new())?;
        }
        for section in &config.queues {
            if let Some(ref redrive) = section.redrive_policy {
                let mut attrs = HashMap::new();
                attrs.insert(
                    "RedrivePolicy".to_string(),
                    RedrivePolicy {
                        dead_letter_target_arn: redrive.dead_letter_target_arn.clone(),
                        max_receive_count: redrive.max_receive_count,
                    }
                    .to_json(),
                );
                self.set_queue_attributes(&section.name, &attrs)?;
            }
        }
        Ok(())
    }

    fn validate_batch_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), SqsError> {
        let ids: Vec<&str> = ids.collect();
        if ids.is_empty() {
            return Err(SqsError::EmptyBatchRequest(
                "Batch request must contain at least one entry".into(),
            ));
        }
        if ids.len() > MAX_BATCH_ENTRIES {
            return Err(SqsError::TooManyEntriesInBatchRequest(
                "Batch request must contain at most 10 entries".into(),
            ));
        }
        let mut seen = HashSet::new();
        for id in ids {
            if id.is_empty()
                || id.len() > 80
                || !id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(SqsError::InvalidBatchEntryId(format!(
                    "Invalid batch entry Id: {id}"
                )));
            }
            if !seen.insert(id) {
                return Err(SqsError::BatchEntryIdsNotDistinct(
                    "Batch entry IDs must be distinct".into(),
                ));
            }
        }
        Ok(())
    }
}
