use std::collections::HashMap;

use md5::{Digest as Md5Digest, Md5};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// System attribute stamped on a message when it is moved to a dead-letter
/// queue; a move task without an explicit destination returns the message to
/// the queue this names.
pub const DEAD_LETTER_SOURCE_ATTR: &str = "DeadLetterQueueSourceArn";

pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Typed attribute value as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttributeValue {
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    /// Base64-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<String>,
}

/// MD5 over the attribute map in the AWS length-prefixed encoding:
/// for each name in sorted order, the name, the data type, a transport
/// marker (1 = string, 2 = binary) and the value, each length-prefixed
/// with a big-endian u32.
pub fn compute_md5_of_attributes(
    attrs: &HashMap<String, MessageAttributeValue>,
) -> Option<String> {
    if attrs.is_empty() {
        return None;
    }
    let mut keys: Vec<&String> = attrs.keys().collect();
    keys.sort();

    let mut buf: Vec<u8> = Vec::new();
    for key in keys {
        let attr = &attrs[key];
        let name_bytes = key.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(name_bytes);

        let dt_bytes = attr.data_type.as_bytes();
        buf.extend_from_slice(&(dt_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(dt_bytes);

        if attr.data_type.starts_with("Binary") {
            buf.push(2);
            if let Some(ref bv) = attr.binary_value {
                let decoded =
                    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, bv)
                        .unwrap_or_default();
                buf.extend_from_slice(&(decoded.len() as u32).to_be_bytes());
                buf.extend_from_slice(&decoded);
            }
        } else {
            buf.push(1);
            if let Some(ref sv) = attr.string_value {
                let sv_bytes = sv.as_bytes();
                buf.extend_from_slice(&(sv_bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(sv_bytes);
            }
        }
    }

    Some(md5_hex(&buf))
}

/// Delivery state, derived from where the message currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Pending,
    Visible,
    InFlight,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: String,
    pub body: String,
    pub md5_of_body: String,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    pub md5_of_message_attributes: Option<String>,
    pub system_attributes: HashMap<String, MessageAttributeValue>,
    pub md5_of_system_attributes: Option<String>,
    /// Epoch millis of the accepted send; also the retention anchor.
    pub sent_timestamp: u64,
    /// When the message next becomes eligible for delivery. Doubles as the
    /// in-flight deadline while a receipt handle is outstanding.
    pub visible_at: u64,
    pub receive_count: u32,
    pub first_receive_timestamp: Option<u64>,
    pub receipt_handle: Option<String>,
    pub group_id: Option<String>,
    pub dedup_id: Option<String>,
    /// FIFO only; strictly increasing per queue.
    pub sequence_number: Option<u64>,
    /// Ordering key in queue storage. Equals `sequence_number` on FIFO
    /// queues; a message reclaimed from in-flight reenters at this key.
    pub seq_key: u64,
}

impl Message {
    pub fn state(&self, now_ms: u64) -> MessageState {
        if self.receipt_handle.is_some() {
            MessageState::InFlight
        } else if self.visible_at <= now_ms {
            MessageState::Visible
        } else {
            MessageState::Pending
        }
    }

    pub fn dead_letter_source_arn(&self) -> Option<&str> {
        self.system_attributes
            .get(DEAD_LETTER_SOURCE_ATTR)
            .and_then(|v| v.string_value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_body_matches_known_digest() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn attribute_digest_is_order_independent_and_empty_is_none() {
        assert_eq!(compute_md5_of_attributes(&HashMap::new()), None);

        let mut a = HashMap::new();
        a.insert(
            "alpha".to_string(),
            MessageAttributeValue {
                data_type: "String".into(),
                string_value: Some("1".into()),
                binary_value: None,
            },
        );
        a.insert(
            "beta".to_string(),
            MessageAttributeValue {
                data_type: "Number".into(),
                string_value: Some("2".into()),
                binary_value: None,
            },
        );
        let mut b = HashMap::new();
        b.insert(
            "beta".to_string(),
            MessageAttributeValue {
                data_type: "Number".into(),
                string_value: Some("2".into()),
                binary_value: None,
            },
        );
        b.insert(
            "alpha".to_string(),
            MessageAttributeValue {
                data_type: "String".into(),
                string_value: Some("1".into()),
                binary_value: None,
            },
        );
        assert_eq!(compute_md5_of_attributes(&a), compute_md5_of_attributes(&b));
    }

    #[test]
    fn state_follows_visibility_and_handle() {
        let mut msg = Message {
            message_id: "m-1".into(),
            body: "x".into(),
            md5_of_body: md5_hex(b"x"),
            message_attributes: HashMap::new(),
            md5_of_message_attributes: None,
            system_attributes: HashMap::new(),
            md5_of_system_attributes: None,
            sent_timestamp: 1_000,
            visible_at: 2_000,
            receive_count: 0,
            first_receive_timestamp: None,
            receipt_handle: None,
            group_id: None,
            dedup_id: None,
            sequence_number: None,
            seq_key: 1,
        };
        assert_eq!(msg.state(1_500), MessageState::Pending);
        assert_eq!(msg.state(2_000), MessageState::Visible);
        msg.receipt_handle = Some("h".into());
        assert_eq!(msg.state(2_000), MessageState::InFlight);
    }
}
