use std::collections::{BTreeMap, HashMap, HashSet};

use crate::clock::Clock;
use crate::error::SqsError;
use crate::ids;
use crate::message::{compute_md5_of_attributes, md5_hex, sha256_hex, Message};
use crate::types::{format_sequence_number, DeliveredMessage, SendMessageParams, SendOutcome};

pub const DEDUP_WINDOW_MS: u64 = 5 * 60 * 1000;
pub const TOMBSTONE_TTL_MS: u64 = 60 * 1000;
pub const PURGE_COOLDOWN_MS: u64 = 60 * 1000;
pub const MAX_INFLIGHT_STANDARD: usize = 120_000;
pub const MAX_INFLIGHT_FIFO: usize = 20_000;

#[derive(Debug, Clone)]
pub struct RedrivePolicy {
    pub dead_letter_target_arn: String,
    pub max_receive_count: u32,
}

impl RedrivePolicy {
    pub fn from_json(s: &str) -> Result<Self, SqsError> {
        let v: serde_json::Value = serde_json::from_str(s).map_err(|e| {
            SqsError::InvalidAttributeValue(format!("Invalid RedrivePolicy JSON: {e}"))
        })?;
        let arn = v
            .get("deadLetterTargetArn")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SqsError::InvalidAttributeValue(
                    "RedrivePolicy must contain deadLetterTargetArn".into(),
                )
            })?
            .to_string();
        let max_count = v
            .get("maxReceiveCount")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| {
                SqsError::InvalidAttributeValue("RedrivePolicy must contain maxReceiveCount".into())
            })? as u32;
        if max_count < 1 {
            return Err(SqsError::InvalidAttributeValue(
                "maxReceiveCount must be at least 1".into(),
            ));
        }
        Ok(RedrivePolicy {
            dead_letter_target_arn: arn,
            max_receive_count: max_count,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "deadLetterTargetArn": self.dead_letter_target_arn,
            "maxReceiveCount": self.max_receive_count,
        })
        .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct QueueAttributes {
    pub visibility_timeout: u32,
    pub message_retention_period: u32,
    pub delay_seconds: u32,
    pub maximum_message_size: u32,
    pub receive_message_wait_time_seconds: u32,
    pub redrive_policy: Option<RedrivePolicy>,
    pub fifo_queue: bool,
    pub content_based_deduplication: bool,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        QueueAttributes {
            visibility_timeout: 30,
            message_retention_period: 345_600,
            delay_seconds: 0,
            maximum_message_size: 262_144,
            receive_message_wait_time_seconds: 0,
            redrive_policy: None,
            fifo_queue: false,
            content_based_deduplication: false,
        }
    }
}

impl QueueAttributes {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("VisibilityTimeout".into(), self.visibility_timeout.to_string());
        m.insert(
            "MessageRetentionPeriod".into(),
            self.message_retention_period.to_string(),
        );
        m.insert("DelaySeconds".into(), self.delay_seconds.to_string());
        m.insert(
            "MaximumMessageSize".into(),
            self.maximum_message_size.to_string(),
        );
        m.insert(
            "ReceiveMessageWaitTimeSeconds".into(),
            self.receive_message_wait_time_seconds.to_string(),
        );
        if let Some(ref rp) = self.redrive_policy {
            m.insert("RedrivePolicy".into(), rp.to_json());
        }
        m.insert("FifoQueue".into(), self.fifo_queue.to_string());
        if self.fifo_queue {
            m.insert(
                "ContentBasedDeduplication".into(),
                self.content_based_deduplication.to_string(),
            );
        }
        m
    }

    pub fn apply(&mut self, attrs: &HashMap<String, String>) -> Result<(), SqsError> {
        for (key, value) in attrs {
            match key.as_str() {
                "VisibilityTimeout" => {
                    let v: u32 = value.parse().map_err(|_| {
                        SqsError::InvalidAttributeValue(format!("Invalid VisibilityTimeout: {value}"))
                    })?;
                    if v > 43_200 {
                        return Err(SqsError::InvalidAttributeValue(
                            "VisibilityTimeout must be between 0 and 43200".into(),
                        ));
                    }
                    self.visibility_timeout = v;
                }
                "MessageRetentionPeriod" => {
                    let v: u32 = value.parse().map_err(|_| {
                        SqsError::InvalidAttributeValue(format!(
                            "Invalid MessageRetentionPeriod: {value}"
                        ))
                    })?;
                    if !(60..=1_209_600).contains(&v) {
                        return Err(SqsError::InvalidAttributeValue(
                            "MessageRetentionPeriod must be between 60 and 1209600".into(),
                        ));
                    }
                    self.message_retention_period = v;
                }
                "DelaySeconds" => {
                    let v: u32 = value.parse().map_err(|_| {
                        SqsError::InvalidAttributeValue(format!("Invalid DelaySeconds: {value}"))
                    })?;
                    if v > 900 {
                        return Err(SqsError::InvalidAttributeValue(
                            "DelaySeconds must be between 0 and 900".into(),
                        ));
                    }
                    self.delay_seconds = v;
                }
                "MaximumMessageSize" => {
                    let v: u32 = value.parse().map_err(|_| {
                        SqsError::InvalidAttributeValue(format!("Invalid MaximumMessageSize: {value}"))
                    })?;
                    if !(1_024..=262_144).contains(&v) {
                        return Err(SqsError::InvalidAttributeValue(
                            "MaximumMessageSize must be between 1024 and 262144".into(),
                        ));
                    }
                    self.maximum_message_size = v;
                }
                "ReceiveMessageWaitTimeSeconds" => {
                    let v: u32 = value.parse().map_err(|_| {
                        SqsError::InvalidAttributeValue(format!(
                            "Invalid ReceiveMessageWaitTimeSeconds: {value}"
                        ))
                    })?;
                    if v > 20 {
                        return Err(SqsError::InvalidAttributeValue(
                            "ReceiveMessageWaitTimeSeconds must be between 0 and 20".into(),
                        ));
                    }
                    self.receive_message_wait_time_seconds = v;
                }
                "RedrivePolicy" => {
                    if value.is_empty() {
                        self.redrive_policy = None;
                    } else {
                        self.redrive_policy = Some(RedrivePolicy::from_json(value)?);
                    }
                }
                "FifoQueue" => {
                    // Only honored at creation; SetQueueAttributes rejects it
                    // before reaching here.
                    self.fifo_queue = value == "true";
                }
                "ContentBasedDeduplication" => {
                    self.content_based_deduplication = value == "true";
                }
                _ => {
                    return Err(SqsError::InvalidAttributeName(format!(
                        "Unknown attribute: {key}"
                    )));
                }
            }
        }
        Ok(())
    }
}

struct DedupEntry {
    outcome: SendOutcome,
    recorded_at: u64,
}

/// What a receive produced: delivered messages, plus any over-retried
/// messages pulled out for dead-letter promotion. The broker routes the
/// latter; the queue itself never touches another queue.
pub struct ReceiveOutcome {
    pub messages: Vec<DeliveredMessage>,
    pub redrives: Vec<Message>,
}

pub struct SweepReport {
    pub redrives: Vec<Message>,
    pub dropped: usize,
    pub has_visible: bool,
}

pub struct Queue {
    pub name: String,
    pub arn: String,
    pub url: String,
    pub attributes: QueueAttributes,
    pub tags: HashMap<String, String>,
    pub created_at: u64,
    pub last_modified: u64,
    clock: Clock,
    /// Pending and visible messages, ordered by insertion key. FIFO messages
    /// reclaimed from in-flight reenter at their original key, which keeps
    /// group order intact.
    messages: BTreeMap<u64, Message>,
    inflight: HashMap<String, Message>,
    /// Receipt handles of recently deleted messages, so a retried delete is
    /// a silent success while a stale handle is an error.
    tombstones: HashMap<String, u64>,
    dedup_cache: HashMap<String, DedupEntry>,
    locked_groups: HashSet<String>,
    last_served_group: Option<String>,
    seq_counter: u64,
    last_purge: Option<u64>,
}

impl Queue {
    pub fn new(name: String, arn: String, url: String, attributes: QueueAttributes, clock: Clock) -> Self {
        let now = clock.now_ms();
        Queue {
            name,
            arn,
            url,
            attributes,
            tags: HashMap::new(),
            created_at: now,
            last_modified: now,
            clock,
            messages: BTreeMap::new(),
            inflight: HashMap::new(),
            tombstones: HashMap::new(),
            dedup_cache: HashMap::new(),
            locked_groups: HashSet::new(),
            last_served_group: None,
            seq_counter: 0,
            last_purge: None,
        }
    }

    pub fn send(&mut self, params: SendMessageParams) -> Result<SendOutcome, SqsError> {
        let now = self.clock.now_ms();

        if params.body.is_empty() {
            return Err(SqsError::InvalidParameterValue(
                "The message body must not be empty".into(),
            ));
        }
        if params.body.len() > self.attributes.maximum_message_size as usize {
            return Err(SqsError::InvalidParameterValue(format!(
                "Message body must be shorter than {} bytes",
                self.attributes.maximum_message_size
            )));
        }
        if self.attributes.fifo_queue && params.group_id.is_none() {
            return Err(SqsError::MissingParameter(
                "MessageGroupId is required for FIFO queues".into(),
            ));
        }

        let dedup_key = if self.attributes.fifo_queue {
            match params.dedup_id.clone() {
                Some(id) => Some(id),
                None if self.attributes.content_based_deduplication => {
                    Some(sha256_hex(params.body.as_bytes()))
                }
                None => {
                    return Err(SqsError::InvalidParameterValue(
                        "MessageDeduplicationId is required for FIFO queues without ContentBasedDeduplication"
                            .into(),
                    ))
                }
            }
        } else {
            params.dedup_id.clone()
        };

        self.evict_dedup(now);
        if let Some(ref key) = dedup_key {
            if let Some(entry) = self.dedup_cache.get(key) {
                if now.saturating_sub(entry.recorded_at) < DEDUP_WINDOW_MS {
                    return Ok(entry.outcome.clone());
                }
            }
        }

        let delay_ms =
            params.delay_seconds.unwrap_or(self.attributes.delay_seconds) as u64 * 1000;
        let md5_of_body = md5_hex(params.body.as_bytes());
        let md5_of_message_attributes = compute_md5_of_attributes(&params.message_attributes);
        let md5_of_system_attributes = compute_md5_of_attributes(&params.system_attributes);

        self.seq_counter += 1;
        let seq_key = self.seq_counter;
        let sequence_number = self.attributes.fifo_queue.then_some(seq_key);

        let msg = Message {
            message_id: ids::message_id(),
            body: params.body,
            md5_of_body: md5_of_body.clone(),
            message_attributes: params.message_attributes,
            md5_of_message_attributes: md5_of_message_attributes.clone(),
            system_attributes: params.system_attributes,
            md5_of_system_attributes: md5_of_system_attributes.clone(),
            sent_timestamp: now,
            visible_at: now + delay_ms,
            receive_count: 0,
            first_receive_timestamp: None,
            receipt_handle: None,
            group_id: params.group_id,
            dedup_id: dedup_key.clone(),
            sequence_number,
            seq_key,
        };

        let outcome = SendOutcome {
            message_id: msg.message_id.clone(),
            md5_of_message_body: md5_of_body,
            md5_of_message_attributes,
            md5_of_message_system_attributes: md5_of_system_attributes,
            sequence_number,
        };

        if let Some(key) = dedup_key {
            self.dedup_cache.insert(
                key,
                DedupEntry {
                    outcome: outcome.clone(),
                    recorded_at: now,
                },
            );
        }
        self.messages.insert(seq_key, msg);

        Ok(outcome)
    }

    pub fn receive(
        &mut self,
        max_count: usize,
        visibility_override: Option<u32>,
    ) -> Result<ReceiveOutcome, SqsError> {
        let now = self.clock.now_ms();
        let mut redrives = self.reclaim_expired(now);
        self.drop_expired_retention(now);

        let cap = if self.attributes.fifo_queue {
            MAX_INFLIGHT_FIFO
        } else {
            MAX_INFLIGHT_STANDARD
        };
        if self.inflight.len() >= cap {
            return Err(SqsError::OverLimit(
                "Too many messages in flight for this queue".into(),
            ));
        }

        let visibility_ms =
            visibility_override.unwrap_or(self.attributes.visibility_timeout) as u64 * 1000;
        let max_receive_count = self
            .attributes
            .redrive_policy
            .as_ref()
            .map(|p| p.max_receive_count);
        let over_retried =
            |msg: &Message| matches!(max_receive_count, Some(n) if msg.receive_count >= n);

        let mut picked: Vec<u64> = Vec::new();
        let mut poisoned: Vec<u64> = Vec::new();

        if self.attributes.fifo_queue {
            // First eligible message per unlocked group, in sequence order; an
            // over-retried group head is pulled for the DLQ so the next
            // message in the group can be considered.
            let mut candidates: Vec<(String, u64)> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for (&key, msg) in &self.messages {
                if msg.visible_at > now {
                    continue;
                }
                let gid = msg.group_id.clone().unwrap_or_default();
                if self.locked_groups.contains(&gid) || seen.contains(&gid) {
                    continue;
                }
                if over_retried(msg) {
                    poisoned.push(key);
                    continue;
                }
                seen.insert(gid.clone());
                candidates.push((gid, key));
            }
            // Round-robin fairness: groups after the last-served one go first.
            if let Some(ref last) = self.last_served_group {
                if let Some(pos) = candidates.iter().position(|(g, _)| g == last) {
                    candidates.rotate_left(pos + 1);
                }
            }
            candidates.truncate(max_count);
            if let Some((group, _)) = candidates.last() {
                self.last_served_group = Some(group.clone());
            }
            picked.extend(candidates.into_iter().map(|(_, key)| key));
        } else {
            for (&key, msg) in &self.messages {
                if picked.len() >= max_count {
                    break;
                }
                if msg.visible_at > now {
                    continue;
                }
                if over_retried(msg) {
                    poisoned.push(key);
                    continue;
                }
                picked.push(key);
            }
        }

        for key in poisoned {
            if let Some(mut msg) = self.messages.remove(&key) {
                msg.receipt_handle = None;
                redrives.push(msg);
            }
        }

        let mut delivered = Vec::with_capacity(picked.len());
        for key in picked {
            if let Some(mut msg) = self.messages.remove(&key) {
                msg.receive_count += 1;
                if msg.first_receive_timestamp.is_none() {
                    msg.first_receive_timestamp = Some(now);
                }
                let handle = ids::receipt_handle();
                msg.receipt_handle = Some(handle.clone());
                msg.visible_at = now + visibility_ms;
                if let Some(ref gid) = msg.group_id {
                    self.locked_groups.insert(gid.clone());
                }
                delivered.push(Self::delivered_view(&msg, handle.clone()));
                self.inflight.insert(handle, msg);
            }
        }

        Ok(ReceiveOutcome {
            messages: delivered,
            redrives,
        })
    }

    pub fn delete(&mut self, receipt_handle: &str) -> Result<(), SqsError> {
        let now = self.clock.now_ms();
        if let Some(msg) = self.inflight.remove(receipt_handle) {
            if let Some(ref gid) = msg.group_id {
                self.locked_groups.remove(gid);
            }
            self.tombstones.insert(receipt_handle.to_string(), now);
            return Ok(());
        }
        // A retried delete of an already-deleted handle is fine; anything
        // else is a stale or forged handle.
        if self.tombstones.contains_key(receipt_handle) {
            return Ok(());
        }
        Err(SqsError::ReceiptHandleIsInvalid(
            "The specified receipt handle is not valid".into(),
        ))
    }

    pub fn change_visibility(
        &mut self,
        receipt_handle: &str,
        timeout_secs: u32,
    ) -> Result<(), SqsError> {
        if timeout_secs > 43_200 {
            return Err(SqsError::InvalidParameterValue(
                "VisibilityTimeout must be between 0 and 43200".into(),
            ));
        }
        let now = self.clock.now_ms();
        if timeout_secs == 0 {
            if let Some(mut msg) = self.inflight.remove(receipt_handle) {
                if let Some(ref gid) = msg.group_id {
                    self.locked_groups.remove(gid);
                }
                msg.receipt_handle = None;
                msg.visible_at = now;
                self.messages.insert(msg.seq_key, msg);
                return Ok(());
            }
        } else if let Some(msg) = self.inflight.get_mut(receipt_handle) {
            msg.visible_at = now + timeout_secs as u64 * 1000;
            return Ok(());
        }
        Err(SqsError::ReceiptHandleIsInvalid(
            "The specified receipt handle is not valid".into(),
        ))
    }

    pub fn purge(&mut self) -> Result<(), SqsError> {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_purge {
            if now.saturating_sub(last) < PURGE_COOLDOWN_MS {
                return Err(SqsError::PurgeQueueInProgress(
                    "A purge was already initiated within the last 60 seconds".into(),
                ));
            }
        }
        self.messages.clear();
        self.inflight.clear();
        self.tombstones.clear();
        self.dedup_cache.clear();
        self.locked_groups.clear();
        self.last_served_group = None;
        self.last_purge = Some(now);
        Ok(())
    }

    /// Periodic maintenance: reclaim expired in-flight messages (returning
    /// the over-retried ones for DLQ promotion), drop retention-expired
    /// messages, and evict aged dedup entries and tombstones. The receive
    /// path performs the same reclaim and retention checks itself, so a slow
    /// sweeper only delays counters, never correctness.
    pub fn sweep(&mut self) -> SweepReport {
        let now = self.clock.now_ms();
        let redrives = self.reclaim_expired(now);
        let dropped = self.drop_expired_retention(now);
        self.evict_dedup(now);
        self.tombstones
            .retain(|_, deleted_at| now.saturating_sub(*deleted_at) < TOMBSTONE_TTL_MS);
        let has_visible = self.messages.values().any(|m| m.visible_at <= now);
        SweepReport {
            redrives,
            dropped,
            has_visible,
        }
    }

    pub fn set_attributes(&mut self, attrs: &HashMap<String, String>) -> Result<(), SqsError> {
        if attrs.contains_key("FifoQueue") {
            return Err(SqsError::InvalidAttributeName(
                "FifoQueue cannot be changed after creation".into(),
            ));
        }
        self.attributes.apply(attrs)?;
        self.last_modified = self.clock.now_ms();
        Ok(())
    }

    pub fn get_attributes(&self, names: &Option<Vec<String>>) -> HashMap<String, String> {
        let all = match names {
            None => true,
            Some(names) => names.is_empty() || names.iter().any(|n| n == "All"),
        };
        let attr_map = self.attributes.to_map();

        let mut result = HashMap::new();
        if all {
            result = attr_map;
        } else if let Some(names) = names {
            for name in names {
                if let Some(v) = attr_map.get(name) {
                    result.insert(name.clone(), v.clone());
                }
            }
        }

        let include = |attr_name: &str| -> bool {
            all || names
                .as_ref()
                .map(|n| n.iter().any(|x| x == attr_name))
                .unwrap_or(false)
        };

        let now = self.clock.now_ms();
        let (visible, delayed) = self.stored_counts(now);
        if include("QueueArn") {
            result.insert("QueueArn".into(), self.arn.clone());
        }
        if include("CreatedTimestamp") {
            result.insert("CreatedTimestamp".into(), (self.created_at / 1000).to_string());
        }
        if include("LastModifiedTimestamp") {
            result.insert(
                "LastModifiedTimestamp".into(),
                (self.last_modified / 1000).to_string(),
            );
        }
        if include("ApproximateNumberOfMessages") {
            result.insert("ApproximateNumberOfMessages".into(), visible.to_string());
        }
        if include("ApproximateNumberOfMessagesNotVisible") {
            result.insert(
                "ApproximateNumberOfMessagesNotVisible".into(),
                self.inflight.len().to_string(),
            );
        }
        if include("ApproximateNumberOfMessagesDelayed") {
            result.insert(
                "ApproximateNumberOfMessagesDelayed".into(),
                delayed.to_string(),
            );
        }

        result
    }

    /// (visible, delayed) counts over stored messages; snapshots under the
    /// queue lock, allowed to lag by contract.
    pub fn stored_counts(&self, now: u64) -> (usize, usize) {
        let visible = self.messages.values().filter(|m| m.visible_at <= now).count();
        (visible, self.messages.len() - visible)
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Read-only sample for the admin snapshot: stored messages first, then
    /// in-flight, up to `limit`.
    pub fn sample(&self, limit: usize) -> Vec<&Message> {
        self.messages
            .values()
            .chain(self.inflight.values())
            .take(limit)
            .collect()
    }

    fn reclaim_expired(&mut self, now: u64) -> Vec<Message> {
        let expired: Vec<String> = self
            .inflight
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(h, _)| h.clone())
            .collect();

        let mut redrives = Vec::new();
        for handle in expired {
            if let Some(mut msg) = self.inflight.remove(&handle) {
                if let Some(ref gid) = msg.group_id {
                    self.locked_groups.remove(gid);
                }
                msg.receipt_handle = None;
                if let Some(ref policy) = self.attributes.redrive_policy {
                    if msg.receive_count >= policy.max_receive_count {
                        redrives.push(msg);
                        continue;
                    }
                }
                self.messages.insert(msg.seq_key, msg);
            }
        }
        redrives
    }

    fn drop_expired_retention(&mut self, now: u64) -> usize {
        let retention_ms = self.attributes.message_retention_period as u64 * 1000;
        let before = self.messages.len();
        self.messages
            .retain(|_, m| m.sent_timestamp + retention_ms > now);
        before - self.messages.len()
    }

    fn evict_dedup(&mut self, now: u64) {
        self.dedup_cache
            .retain(|_, e| now.saturating_sub(e.recorded_at) < DEDUP_WINDOW_MS);
    }

    fn delivered_view(msg: &Message, receipt_handle: String) -> DeliveredMessage {
        let mut attributes = HashMap::new();
        attributes.insert("SentTimestamp".into(), msg.sent_timestamp.to_string());
        attributes.insert(
            "ApproximateReceiveCount".into(),
            msg.receive_count.to_string(),
        );
        if let Some(first) = msg.first_receive_timestamp {
            attributes.insert("ApproximateFirstReceiveTimestamp".into(), first.to_string());
        }
        if let Some(ref gid) = msg.group_id {
            attributes.insert("MessageGroupId".into(), gid.clone());
        }
        if let Some(ref did) = msg.dedup_id {
            attributes.insert("MessageDeduplicationId".into(), did.clone());
        }
        if let Some(seq) = msg.sequence_number {
            attributes.insert("SequenceNumber".into(), format_sequence_number(seq));
        }
        for (name, value) in &msg.system_attributes {
            if let Some(ref sv) = value.string_value {
                attributes.insert(name.clone(), sv.clone());
            }
        }

        DeliveredMessage {
            message_id: msg.message_id.clone(),
            receipt_handle,
            body: msg.body.clone(),
            md5_of_body: msg.md5_of_body.clone(),
            md5_of_message_attributes: msg.md5_of_message_attributes.clone(),
            attributes,
            message_attributes: msg.message_attributes.clone(),
            system_attributes: msg.system_attributes.clone(),
            group_id: msg.group_id.clone(),
            dedup_id: msg.dedup_id.clone(),
        }
    }
}
