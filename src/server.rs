use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::broker::Broker;
use crate::error::SqsError;
use crate::message::MessageAttributeValue;
use crate::types::*;

/// Query-protocol front end: one POST route, `Action=<Name>` selects the
/// operation, responses are XML. The queue may be addressed by `QueueUrl`
/// parameter or by posting to `/<queue_name>`.
pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/", post(handle_root))
        .route("/{queue}", post(handle_queue))
        .with_state(broker)
}

async fn handle_root(
    State(broker): State<Arc<Broker>>,
    body: Bytes,
) -> Result<Response, SqsError> {
    dispatch(broker, None, &body).await
}

async fn handle_queue(
    State(broker): State<Arc<Broker>>,
    Path(queue): Path<String>,
    body: Bytes,
) -> Result<Response, SqsError> {
    dispatch(broker, Some(queue), &body).await
}

fn xml_response<T: Serialize>(value: &T) -> Response {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    if let Ok(s) = quick_xml::se::to_string(value) {
        xml.push_str(&s);
    }
    (StatusCode::OK, [("content-type", "application/xml")], xml).into_response()
}

fn metadata() -> ResponseMetadata {
    ResponseMetadata {
        request_id: Uuid::new_v4().to_string(),
    }
}

/// Form-encoded request parameters, including the indexed
/// `Prefix.N.Member` dialect.
struct Params(HashMap<String, String>);

impl Params {
    fn parse(body: &[u8]) -> Self {
        Params(form_urlencoded::parse(body).into_owned().collect())
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, SqsError> {
        self.get(key)
            .ok_or_else(|| SqsError::MissingParameter(format!("{key} is required")))
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, SqsError> {
        self.get(key)
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    SqsError::InvalidParameterValue(format!("Invalid value for {key}: {v}"))
                })
            })
            .transpose()
    }

    /// `Prefix.1`, `Prefix.2`, ... until the first gap.
    fn indexed(&self, prefix: &str) -> Vec<String> {
        let mut values = Vec::new();
        for i in 1.. {
            match self.get(&format!("{prefix}.{i}")) {
                Some(v) => values.push(v.to_string()),
                None => break,
            }
        }
        values
    }

    /// `Prefix.1.Name` / `Prefix.1.Value` pairs.
    fn name_values(&self, prefix: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for i in 1.. {
            match self.get(&format!("{prefix}.{i}.Name")) {
                Some(name) => {
                    let value = self
                        .get(&format!("{prefix}.{i}.Value"))
                        .unwrap_or_default()
                        .to_string();
                    map.insert(name.to_string(), value);
                }
                None => break,
            }
        }
        map
    }

    /// `Prefix.1.Key` / `Prefix.1.Value` pairs (queue tags).
    fn key_values(&self, prefix: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for i in 1.. {
            match self.get(&format!("{prefix}.{i}.Key")) {
                Some(key) => {
                    let value = self
                        .get(&format!("{prefix}.{i}.Value"))
                        .unwrap_or_default()
                        .to_string();
                    map.insert(key.to_string(), value);
                }
                None => break,
            }
        }
        map
    }

    /// Typed message attributes:
    /// `Prefix.1.Name`, `Prefix.1.Value.DataType`, `.StringValue`, `.BinaryValue`.
    fn message_attributes(
        &self,
        prefix: &str,
    ) -> Result<HashMap<String, MessageAttributeValue>, SqsError> {
        let mut map = HashMap::new();
        for i in 1.. {
            match self.get(&format!("{prefix}.{i}.Name")) {
                Some(name) => {
                    let data_type = self
                        .get(&format!("{prefix}.{i}.Value.DataType"))
                        .ok_or_else(|| {
                            SqsError::InvalidParameterValue(format!(
                                "Message attribute {name} is missing its DataType"
                            ))
                        })?
                        .to_string();
                    map.insert(
                        name.to_string(),
                        MessageAttributeValue {
                            data_type,
                            string_value: self
                                .get(&format!("{prefix}.{i}.Value.StringValue"))
                                .map(String::from),
                            binary_value: self
                                .get(&format!("{prefix}.{i}.Value.BinaryValue"))
                                .map(String::from),
                        },
                    );
                }
                None => break,
            }
        }
        Ok(map)
    }
}

fn resolve_queue_name(params: &Params, path_queue: Option<&str>) -> Result<String, SqsError> {
    if let Some(url) = params.get("QueueUrl") {
        Broker::queue_name_from_url(url)
    } else if let Some(name) = path_queue {
        Ok(name.to_string())
    } else {
        Err(SqsError::MissingParameter("QueueUrl is required".into()))
    }
}

fn send_params(params: &Params, prefix: Option<&str>) -> Result<SendMessageParams, SqsError> {
    let key = |name: &str| match prefix {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
    };
    let body = params.require(&key("MessageBody"))?.to_string();
    let delay_seconds = params.get_u32(&key("DelaySeconds"))?;
    if delay_seconds.is_some_and(|d| d > 900) {
        return Err(SqsError::InvalidParameterValue(
            "DelaySeconds must be between 0 and 900".into(),
        ));
    }
    Ok(SendMessageParams {
        body,
        delay_seconds,
        message_attributes: params.message_attributes(&key("MessageAttribute"))?,
        system_attributes: params.message_attributes(&key("MessageSystemAttribute"))?,
        dedup_id: params.get(&key("MessageDeduplicationId")).map(String::from),
        group_id: params.get(&key("MessageGroupId")).map(String::from),
    })
}

fn validate_visibility(timeout: Option<u32>) -> Result<(), SqsError> {
    if timeout.is_some_and(|t| t > 43_200) {
        return Err(SqsError::InvalidParameterValue(
            "VisibilityTimeout must be between 0 and 43200".into(),
        ));
    }
    Ok(())
}

/// Project the delivered messages onto the requested attribute names, the
/// way the cloud service does: nothing unless asked, everything for `All`,
/// and `Name.*` globs for message attributes.
fn to_message_xml(
    messages: Vec<DeliveredMessage>,
    attribute_names: &[String],
    message_attribute_names: &[String],
) -> Vec<MessageXml> {
    let all_attrs = attribute_names.iter().any(|n| n == "All");
    let all_message_attrs = message_attribute_names.iter().any(|n| n == "All");

    messages
        .into_iter()
        .map(|m| {
            let mut attributes: Vec<NameValue> = m
                .attributes
                .into_iter()
                .filter(|(name, _)| all_attrs || attribute_names.contains(name))
                .map(|(name, value)| NameValue { name, value })
                .collect();
            attributes.sort_by(|a, b| a.name.cmp(&b.name));

            let mut message_attributes: Vec<MessageAttributeXml> = m
                .message_attributes
                .into_iter()
                .filter(|(name, _)| {
                    all_message_attrs
                        || message_attribute_names.iter().any(|pattern| {
                            pattern == name
                                || pattern
                                    .strip_suffix(".*")
                                    .is_some_and(|p| name.starts_with(p))
                        })
                })
                .map(MessageAttributeXml::from)
                .collect();
            message_attributes.sort_by(|a, b| a.name.cmp(&b.name));

            let md5_of_message_attributes = if message_attributes.is_empty() {
                None
            } else {
                m.md5_of_message_attributes
            };

            MessageXml {
                message_id: m.message_id,
                receipt_handle: m.receipt_handle,
                md5_of_body: m.md5_of_body,
                body: m.body,
                attributes,
                md5_of_message_attributes,
                message_attributes,
            }
        })
        .collect()
}

async fn dispatch(
    broker: Arc<Broker>,
    path_queue: Option<String>,
    body: &[u8],
) -> Result<Response, SqsError> {
    let params = Params::parse(body);
    let action = params.require("Action")?.to_string();
    let path_queue = path_queue.as_deref();

    match action.as_str() {
        "CreateQueue" => {
            let name = params.require("QueueName")?;
            let attributes = params.name_values("Attribute");
            let tags = params.key_values("Tag");
            let queue_url = broker.create_queue(name, &attributes, tags)?;
            Ok(xml_response(&CreateQueueResponse {
                result: CreateQueueResult { queue_url },
                metadata: metadata(),
            }))
        }
        "DeleteQueue" => {
            let name = resolve_queue_name(&params, path_queue)?;
            broker.delete_queue(&name)?;
            Ok(xml_response(&DeleteQueueResponse {
                metadata: metadata(),
            }))
        }
        "GetQueueUrl" => {
            let name = params.require("QueueName")?;
            let queue_url = broker.get_queue_url(name)?;
            Ok(xml_response(&GetQueueUrlResponse {
                result: GetQueueUrlResult { queue_url },
                metadata: metadata(),
            }))
        }
        "ListQueues" => {
            let max_results = params.get_u32("MaxResults")?.unwrap_or(1_000).min(1_000);
            let queue_urls =
                broker.list_queues(params.get("QueueNamePrefix"), max_results as usize);
            Ok(xml_response(&ListQueuesResponse {
                result: ListQueuesResult { queue_urls },
                metadata: metadata(),
            }))
        }
        "GetQueueAttributes" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let requested = params.indexed("AttributeName");
            let requested = if requested.is_empty() {
                None
            } else {
                Some(requested)
            };
            let attributes = broker
                .get_queue_attributes(&name, &requested)?
                .into_iter()
                .map(|(name, value)| NameValue { name, value })
                .collect();
            Ok(xml_response(&GetQueueAttributesResponse {
                result: GetQueueAttributesResult { attributes },
                metadata: metadata(),
            }))
        }
        "SetQueueAttributes" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let attributes = params.name_values("Attribute");
            broker.set_queue_attributes(&name, &attributes)?;
            Ok(xml_response(&SetQueueAttributesResponse {
                metadata: metadata(),
            }))
        }
        "PurgeQueue" => {
            let name = resolve_queue_name(&params, path_queue)?;
            broker.purge_queue(&name)?;
            Ok(xml_response(&PurgeQueueResponse {
                metadata: metadata(),
            }))
        }
        "SendMessage" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let outcome = broker.send_message(&name, send_params(&params, None)?)?;
            Ok(xml_response(&SendMessageResponse {
                result: outcome.into(),
                metadata: metadata(),
            }))
        }
        "SendMessageBatch" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let mut entries = Vec::new();
            for i in 1.. {
                let prefix = format!("SendMessageBatchRequestEntry.{i}");
                match params.get(&format!("{prefix}.Id")) {
                    Some(id) => entries.push(SendBatchEntry {
                        id: id.to_string(),
                        params: send_params(&params, Some(&prefix))?,
                    }),
                    None => break,
                }
            }
            let (successful, failed) = broker.send_message_batch(&name, entries)?;
            Ok(xml_response(&SendMessageBatchResponse {
                result: SendMessageBatchResult {
                    successful: successful
                        .into_iter()
                        .map(|(id, outcome)| SendMessageBatchResultEntry {
                            id,
                            message_id: outcome.message_id,
                            md5_of_message_body: outcome.md5_of_message_body,
                            md5_of_message_attributes: outcome.md5_of_message_attributes,
                            md5_of_message_system_attributes: outcome
                                .md5_of_message_system_attributes,
                            sequence_number: outcome
                                .sequence_number
                                .map(format_sequence_number),
                        })
                        .collect(),
                    failed: failed.into_iter().map(Into::into).collect(),
                },
                metadata: metadata(),
            }))
        }
        "ReceiveMessage" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let max_count = params
                .get_u32("MaxNumberOfMessages")?
                .unwrap_or(1)
                .clamp(1, 10) as usize;
            let visibility_timeout = params.get_u32("VisibilityTimeout")?;
            validate_visibility(visibility_timeout)?;
            let wait_time_seconds = params.get_u32("WaitTimeSeconds")?;
            if wait_time_seconds.is_some_and(|w| w > 20) {
                return Err(SqsError::InvalidParameterValue(
                    "WaitTimeSeconds must be between 0 and 20".into(),
                ));
            }
            let options = ReceiveOptions {
                max_count,
                visibility_timeout,
                wait_time_seconds,
            };
            let messages = broker.receive_message(&name, &options).await?;
            let attribute_names = params.indexed("AttributeName");
            let message_attribute_names = params.indexed("MessageAttributeName");
            Ok(xml_response(&ReceiveMessageResponse {
                result: ReceiveMessageResult {
                    messages: to_message_xml(messages, &attribute_names, &message_attribute_names),
                },
                metadata: metadata(),
            }))
        }
        "DeleteMessage" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let receipt_handle = params.require("ReceiptHandle")?;
            broker.delete_message(&name, receipt_handle)?;
            Ok(xml_response(&DeleteMessageResponse {
                metadata: metadata(),
            }))
        }
        "DeleteMessageBatch" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let mut entries = Vec::new();
            for i in 1.. {
                let prefix = format!("DeleteMessageBatchRequestEntry.{i}");
                match params.get(&format!("{prefix}.Id")) {
                    Some(id) => entries.push(DeleteBatchEntry {
                        id: id.to_string(),
                        receipt_handle: params
                            .require(&format!("{prefix}.ReceiptHandle"))?
                            .to_string(),
                    }),
                    None => break,
                }
            }
            let (successful, failed) = broker.delete_message_batch(&name, entries)?;
            Ok(xml_response(&DeleteMessageBatchResponse {
                result: DeleteMessageBatchResult {
                    successful: successful.into_iter().map(|id| IdEntry { id }).collect(),
                    failed: failed.into_iter().map(Into::into).collect(),
                },
                metadata: metadata(),
            }))
        }
        "ChangeMessageVisibility" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let receipt_handle = params.require("ReceiptHandle")?;
            let timeout = params
                .get_u32("VisibilityTimeout")?
                .ok_or_else(|| {
                    SqsError::MissingParameter("VisibilityTimeout is required".into())
                })?;
            validate_visibility(Some(timeout))?;
            broker.change_message_visibility(&name, receipt_handle, timeout)?;
            Ok(xml_response(&ChangeMessageVisibilityResponse {
                metadata: metadata(),
            }))
        }
        "ChangeMessageVisibilityBatch" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let mut entries = Vec::new();
            for i in 1.. {
                let prefix = format!("ChangeMessageVisibilityBatchRequestEntry.{i}");
                match params.get(&format!("{prefix}.Id")) {
                    Some(id) => {
                        let timeout = params
                            .get_u32(&format!("{prefix}.VisibilityTimeout"))?
                            .unwrap_or(0);
                        entries.push(ChangeVisibilityBatchEntry {
                            id: id.to_string(),
                            receipt_handle: params
                                .require(&format!("{prefix}.ReceiptHandle"))?
                                .to_string(),
                            visibility_timeout: timeout,
                        });
                    }
                    None => break,
                }
            }
            let (successful, failed) = broker.change_message_visibility_batch(&name, entries)?;
            Ok(xml_response(&ChangeMessageVisibilityBatchResponse {
                result: ChangeMessageVisibilityBatchResult {
                    successful: successful.into_iter().map(|id| IdEntry { id }).collect(),
                    failed: failed.into_iter().map(Into::into).collect(),
                },
                metadata: metadata(),
            }))
        }
        "ListDeadLetterSourceQueues" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let queue_urls = broker.list_dead_letter_source_queues(&name)?;
            Ok(xml_response(&ListDeadLetterSourceQueuesResponse {
                result: ListDeadLetterSourceQueuesResult { queue_urls },
                metadata: metadata(),
            }))
        }
        "TagQueue" => {
            let name = resolve_queue_name(&params, path_queue)?;
            broker.tag_queue(&name, params.key_values("Tag"))?;
            Ok(xml_response(&TagQueueResponse {
                metadata: metadata(),
            }))
        }
        "UntagQueue" => {
            let name = resolve_queue_name(&params, path_queue)?;
            broker.untag_queue(&name, &params.indexed("TagKey"))?;
            Ok(xml_response(&UntagQueueResponse {
                metadata: metadata(),
            }))
        }
        "ListQueueTags" => {
            let name = resolve_queue_name(&params, path_queue)?;
            let tags = broker
                .list_queue_tags(&name)?
                .into_iter()
                .map(|(key, value)| KeyValue { key, value })
                .collect();
            Ok(xml_response(&ListQueueTagsResponse {
                result: ListQueueTagsResult { tags },
                metadata: metadata(),
            }))
        }
        "StartMessageMoveTask" => {
            let source_arn = params.require("SourceArn")?;
            let destination_arn = params.get("DestinationArn").map(String::from);
            let max_per_second = params.get_u32("MaxNumberOfMessagesPerSecond")?;
            if max_per_second.is_some_and(|r| r == 0 || r > 500) {
                return Err(SqsError::InvalidParameterValue(
                    "MaxNumberOfMessagesPerSecond must be between 1 and 500".into(),
                ));
            }
            let task_handle =
                broker.start_message_move_task(source_arn, destination_arn, max_per_second)?;
            Ok(xml_response(&StartMessageMoveTaskResponse {
                result: StartMessageMoveTaskResult { task_handle },
                metadata: metadata(),
            }))
        }
        "CancelMessageMoveTask" => {
            let task_handle = params.require("TaskHandle")?;
            let moved = broker.cancel_message_move_task(task_handle)?;
            Ok(xml_response(&CancelMessageMoveTaskResponse {
                result: CancelMessageMoveTaskResult {
                    approximate_number_of_messages_moved: moved,
                },
                metadata: metadata(),
            }))
        }
        "ListMessageMoveTasks" => {
            let source_arn = params.require("SourceArn")?;
            let max_results = params.get_u32("MaxResults")?.unwrap_or(1).clamp(1, 10);
            let results = broker
                .list_message_move_tasks(source_arn, max_results as usize)
                .into_iter()
                .map(Into::into)
                .collect();
            Ok(xml_response(&ListMessageMoveTasksResponse {
                result: ListMessageMoveTasksResult { results },
                metadata: metadata(),
            }))
        }
        other => Err(SqsError::InvalidAction(format!("Unknown action: {other}"))),
    }
}
