use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// YAML configuration document: server settings plus the queues to create at
/// startup. The same shape is produced by the admin config export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub queues: Vec<QueueSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_retention_period: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_message_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_message_wait_time_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_based_deduplication: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redrive_policy: Option<RedriveSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedriveSection {
    pub dead_letter_target_arn: String,
    pub max_receive_count: u32,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("serializing configuration")
    }
}

impl QueueSection {
    /// Wire-attribute map for `CreateQueue`, redrive included.
    pub fn attribute_map(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        if self.name.ends_with(".fifo") {
            attrs.insert("FifoQueue".to_string(), "true".to_string());
        }
        if let Some(v) = self.visibility_timeout {
            attrs.insert("VisibilityTimeout".to_string(), v.to_string());
        }
        if let Some(v) = self.message_retention_period {
            attrs.insert("MessageRetentionPeriod".to_string(), v.to_string());
        }
        if let Some(v) = self.delay_seconds {
            attrs.insert("DelaySeconds".to_string(), v.to_string());
        }
        if let Some(v) = self.maximum_message_size {
            attrs.insert("MaximumMessageSize".to_string(), v.to_string());
        }
        if let Some(v) = self.receive_message_wait_time_seconds {
            attrs.insert("ReceiveMessageWaitTimeSeconds".to_string(), v.to_string());
        }
        if let Some(v) = self.content_based_deduplication {
            attrs.insert("ContentBasedDeduplication".to_string(), v.to_string());
        }
        if let Some(ref redrive) = self.redrive_policy {
            attrs.insert(
                "RedrivePolicy".to_string(),
                serde_json::json!({
                    "deadLetterTargetArn": redrive.dead_letter_target_arn,
                    "maxReceiveCount": redrive.max_receive_count,
                })
                .to_string(),
            );
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_document() {
        let yaml = "\
server:
  port: 9324
queues:
  - name: work
    visibility_timeout: 60
  - name: work-dlq
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, Some(9324));
        assert_eq!(config.queues.len(), 2);
        assert_eq!(config.queues[0].visibility_timeout, Some(60));

        let attrs = config.queues[0].attribute_map();
        assert_eq!(attrs["VisibilityTimeout"], "60");
        assert!(!attrs.contains_key("FifoQueue"));
    }

    #[test]
    fn fifo_suffix_sets_the_fifo_attribute() {
        let section = QueueSection {
            name: "events.fifo".into(),
            content_based_deduplication: Some(true),
            ..Default::default()
        };
        let attrs = section.attribute_map();
        assert_eq!(attrs["FifoQueue"], "true");
        assert_eq!(attrs["ContentBasedDeduplication"], "true");
    }
}
