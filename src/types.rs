use std::collections::HashMap;

use serde::Serialize;

use crate::message::MessageAttributeValue;

// --- Engine-facing request/response records ---

/// Parameters of one send, whether it arrives as `SendMessage`, a batch
/// entry, an admin-API post, or a DLQ/move-task re-enqueue.
#[derive(Debug, Clone, Default)]
pub struct SendMessageParams {
    pub body: String,
    pub delay_seconds: Option<u32>,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    pub system_attributes: HashMap<String, MessageAttributeValue>,
    pub dedup_id: Option<String>,
    pub group_id: Option<String>,
}

/// What a successful send reports back. Cached per dedup key so a duplicate
/// send inside the dedup window replays the original outcome.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
    pub md5_of_message_body: String,
    pub md5_of_message_attributes: Option<String>,
    pub md5_of_message_system_attributes: Option<String>,
    pub sequence_number: Option<u64>,
}

/// One message handed to a receiver, under a freshly minted receipt handle.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub md5_of_body: String,
    pub md5_of_message_attributes: Option<String>,
    /// System attributes as wire strings (SentTimestamp,
    /// ApproximateReceiveCount, MessageGroupId, ...).
    pub attributes: HashMap<String, String>,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    /// The typed system attributes of the stored message, kept so a move
    /// task can rebuild the send.
    pub system_attributes: HashMap<String, MessageAttributeValue>,
    pub group_id: Option<String>,
    pub dedup_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    pub max_count: usize,
    pub visibility_timeout: Option<u32>,
    pub wait_time_seconds: Option<u32>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        ReceiveOptions {
            max_count: 1,
            visibility_timeout: None,
            wait_time_seconds: Some(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendBatchEntry {
    pub id: String,
    pub params: SendMessageParams,
}

#[derive(Debug, Clone)]
pub struct DeleteBatchEntry {
    pub id: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone)]
pub struct ChangeVisibilityBatchEntry {
    pub id: String,
    pub receipt_handle: String,
    pub visibility_timeout: u32,
}

/// Per-entry failure inside a batch response.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub id: String,
    pub code: &'static str,
    pub message: String,
}

/// Registry view of one message-move task.
#[derive(Debug, Clone)]
pub struct MoveTaskView {
    pub task_handle: String,
    pub status: String,
    pub source_arn: String,
    pub destination_arn: Option<String>,
    pub max_per_second: Option<u32>,
    pub moved: u64,
    pub to_move: u64,
    pub started_at: u64,
    pub failure_reason: Option<String>,
}

pub fn format_sequence_number(seq: u64) -> String {
    format!("{seq:020}")
}

// --- XML response envelopes ---
//
// quick-xml uses the struct ident as the root tag, so each action response
// is a struct named exactly like its wire element.

#[derive(Serialize)]
pub struct ResponseMetadata {
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Serialize)]
pub struct NameValue {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Serialize)]
pub struct KeyValue {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Serialize)]
pub struct CreateQueueResponse {
    #[serde(rename = "CreateQueueResult")]
    pub result: CreateQueueResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct CreateQueueResult {
    #[serde(rename = "QueueUrl")]
    pub queue_url: String,
}

#[derive(Serialize)]
pub struct DeleteQueueResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct GetQueueUrlResponse {
    #[serde(rename = "GetQueueUrlResult")]
    pub result: GetQueueUrlResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct GetQueueUrlResult {
    #[serde(rename = "QueueUrl")]
    pub queue_url: String,
}

#[derive(Serialize)]
pub struct ListQueuesResponse {
    #[serde(rename = "ListQueuesResult")]
    pub result: ListQueuesResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ListQueuesResult {
    #[serde(rename = "QueueUrl", skip_serializing_if = "Vec::is_empty")]
    pub queue_urls: Vec<String>,
}

#[derive(Serialize)]
pub struct GetQueueAttributesResponse {
    #[serde(rename = "GetQueueAttributesResult")]
    pub result: GetQueueAttributesResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct GetQueueAttributesResult {
    #[serde(rename = "Attribute", skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<NameValue>,
}

#[derive(Serialize)]
pub struct SetQueueAttributesResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct PurgeQueueResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    #[serde(rename = "SendMessageResult")]
    pub result: SendMessageResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct SendMessageResult {
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "MD5OfMessageBody")]
    pub md5_of_message_body: String,
    #[serde(rename = "MD5OfMessageAttributes", skip_serializing_if = "Option::is_none")]
    pub md5_of_message_attributes: Option<String>,
    #[serde(
        rename = "MD5OfMessageSystemAttributes",
        skip_serializing_if = "Option::is_none"
    )]
    pub md5_of_message_system_attributes: Option<String>,
    #[serde(rename = "SequenceNumber", skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

impl From<SendOutcome> for SendMessageResult {
    fn from(outcome: SendOutcome) -> Self {
        SendMessageResult {
            message_id: outcome.message_id,
            md5_of_message_body: outcome.md5_of_message_body,
            md5_of_message_attributes: outcome.md5_of_message_attributes,
            md5_of_message_system_attributes: outcome.md5_of_message_system_attributes,
            sequence_number: outcome.sequence_number.map(format_sequence_number),
        }
    }
}

#[derive(Serialize)]
pub struct SendMessageBatchResponse {
    #[serde(rename = "SendMessageBatchResult")]
    pub result: SendMessageBatchResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct SendMessageBatchResult {
    #[serde(
        rename = "SendMessageBatchResultEntry",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub successful: Vec<SendMessageBatchResultEntry>,
    #[serde(rename = "BatchResultErrorEntry", skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Serialize)]
pub struct SendMessageBatchResultEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "MD5OfMessageBody")]
    pub md5_of_message_body: String,
    #[serde(rename = "MD5OfMessageAttributes", skip_serializing_if = "Option::is_none")]
    pub md5_of_message_attributes: Option<String>,
    #[serde(
        rename = "MD5OfMessageSystemAttributes",
        skip_serializing_if = "Option::is_none"
    )]
    pub md5_of_message_system_attributes: Option<String>,
    #[serde(rename = "SequenceNumber", skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

#[derive(Serialize)]
pub struct BatchResultErrorEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "SenderFault")]
    pub sender_fault: bool,
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl From<BatchError> for BatchResultErrorEntry {
    fn from(err: BatchError) -> Self {
        BatchResultErrorEntry {
            id: err.id,
            sender_fault: true,
            code: err.code.to_string(),
            message: err.message,
        }
    }
}

#[derive(Serialize)]
pub struct ReceiveMessageResponse {
    #[serde(rename = "ReceiveMessageResult")]
    pub result: ReceiveMessageResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ReceiveMessageResult {
    #[serde(rename = "Message", skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageXml>,
}

#[derive(Serialize)]
pub struct MessageXml {
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "ReceiptHandle")]
    pub receipt_handle: String,
    #[serde(rename = "MD5OfBody")]
    pub md5_of_body: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "Attribute", skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<NameValue>,
    #[serde(rename = "MD5OfMessageAttributes", skip_serializing_if = "Option::is_none")]
    pub md5_of_message_attributes: Option<String>,
    #[serde(rename = "MessageAttribute", skip_serializing_if = "Vec::is_empty")]
    pub message_attributes: Vec<MessageAttributeXml>,
}

#[derive(Serialize)]
pub struct MessageAttributeXml {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: MessageAttributeValueXml,
}

#[derive(Serialize)]
pub struct MessageAttributeValueXml {
    #[serde(rename = "DataType")]
    pub data_type: String,
    #[serde(rename = "StringValue", skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(rename = "BinaryValue", skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<String>,
}

impl From<(String, MessageAttributeValue)> for MessageAttributeXml {
    fn from((name, value): (String, MessageAttributeValue)) -> Self {
        MessageAttributeXml {
            name,
            value: MessageAttributeValueXml {
                data_type: value.data_type,
                string_value: value.string_value,
                binary_value: value.binary_value,
            },
        }
    }
}

#[derive(Serialize)]
pub struct DeleteMessageResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct DeleteMessageBatchResponse {
    #[serde(rename = "DeleteMessageBatchResult")]
    pub result: DeleteMessageBatchResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct DeleteMessageBatchResult {
    #[serde(
        rename = "DeleteMessageBatchResultEntry",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub successful: Vec<IdEntry>,
    #[serde(rename = "BatchResultErrorEntry", skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Serialize)]
pub struct IdEntry {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Serialize)]
pub struct ChangeMessageVisibilityResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ChangeMessageVisibilityBatchResponse {
    #[serde(rename = "ChangeMessageVisibilityBatchResult")]
    pub result: ChangeMessageVisibilityBatchResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ChangeMessageVisibilityBatchResult {
    #[serde(
        rename = "ChangeMessageVisibilityBatchResultEntry",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub successful: Vec<IdEntry>,
    #[serde(rename = "BatchResultErrorEntry", skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<BatchResultErrorEntry>,
}

#[derive(Serialize)]
pub struct ListDeadLetterSourceQueuesResponse {
    #[serde(rename = "ListDeadLetterSourceQueuesResult")]
    pub result: ListDeadLetterSourceQueuesResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ListDeadLetterSourceQueuesResult {
    #[serde(rename = "QueueUrl", skip_serializing_if = "Vec::is_empty")]
    pub queue_urls: Vec<String>,
}

#[derive(Serialize)]
pub struct TagQueueResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct UntagQueueResponse {
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ListQueueTagsResponse {
    #[serde(rename = "ListQueueTagsResult")]
    pub result: ListQueueTagsResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ListQueueTagsResult {
    #[serde(rename = "Tag", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<KeyValue>,
}

#[derive(Serialize)]
pub struct StartMessageMoveTaskResponse {
    #[serde(rename = "StartMessageMoveTaskResult")]
    pub result: StartMessageMoveTaskResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct StartMessageMoveTaskResult {
    #[serde(rename = "TaskHandle")]
    pub task_handle: String,
}

#[derive(Serialize)]
pub struct CancelMessageMoveTaskResponse {
    #[serde(rename = "CancelMessageMoveTaskResult")]
    pub result: CancelMessageMoveTaskResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct CancelMessageMoveTaskResult {
    #[serde(rename = "ApproximateNumberOfMessagesMoved")]
    pub approximate_number_of_messages_moved: u64,
}

#[derive(Serialize)]
pub struct ListMessageMoveTasksResponse {
    #[serde(rename = "ListMessageMoveTasksResult")]
    pub result: ListMessageMoveTasksResult,
    #[serde(rename = "ResponseMetadata")]
    pub metadata: ResponseMetadata,
}

#[derive(Serialize)]
pub struct ListMessageMoveTasksResult {
    #[serde(
        rename = "ListMessageMoveTasksResultEntry",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub results: Vec<MoveTaskXml>,
}

#[derive(Serialize)]
pub struct MoveTaskXml {
    #[serde(rename = "TaskHandle")]
    pub task_handle: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "SourceArn")]
    pub source_arn: String,
    #[serde(rename = "DestinationArn", skip_serializing_if = "Option::is_none")]
    pub destination_arn: Option<String>,
    #[serde(rename = "ApproximateNumberOfMessagesMoved")]
    pub approximate_number_of_messages_moved: u64,
    #[serde(rename = "ApproximateNumberOfMessagesToMove")]
    pub approximate_number_of_messages_to_move: u64,
    #[serde(
        rename = "MaxNumberOfMessagesPerSecond",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_number_of_messages_per_second: Option<u32>,
    #[serde(rename = "StartedTimestamp")]
    pub started_timestamp: u64,
    #[serde(rename = "FailureReason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<MoveTaskView> for MoveTaskXml {
    fn from(view: MoveTaskView) -> Self {
        MoveTaskXml {
            task_handle: view.task_handle,
            status: view.status,
            source_arn: view.source_arn,
            destination_arn: view.destination_arn,
            approximate_number_of_messages_moved: view.moved,
            approximate_number_of_messages_to_move: view.to_move,
            max_number_of_messages_per_second: view.max_per_second,
            started_timestamp: view.started_at,
            failure_reason: view.failure_reason,
        }
    }
}
