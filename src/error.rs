use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Engine error taxonomy. Every variant maps to a wire code; the HTTP layer
/// renders the query-protocol error envelope.
#[derive(Debug, Clone, Error)]
pub enum SqsError {
    #[error("{0}")]
    QueueAlreadyExists(String),
    #[error("{0}")]
    QueueDoesNotExist(String),
    #[error("{0}")]
    QueueDeletedRecently(String),
    #[error("{0}")]
    InvalidAttributeName(String),
    #[error("{0}")]
    InvalidAttributeValue(String),
    #[error("{0}")]
    InvalidParameterValue(String),
    #[error("{0}")]
    MissingParameter(String),
    #[error("{0}")]
    ReceiptHandleIsInvalid(String),
    #[error("{0}")]
    PurgeQueueInProgress(String),
    #[error("{0}")]
    OverLimit(String),
    #[error("{0}")]
    EmptyBatchRequest(String),
    #[error("{0}")]
    TooManyEntriesInBatchRequest(String),
    #[error("{0}")]
    BatchEntryIdsNotDistinct(String),
    #[error("{0}")]
    InvalidBatchEntryId(String),
    #[error("{0}")]
    BatchRequestTooLong(String),
    #[error("{0}")]
    ResourceNotFound(String),
    #[error("{0}")]
    InvalidAction(String),
    #[error("{0}")]
    Internal(String),
}

impl SqsError {
    pub fn code(&self) -> &'static str {
        match self {
            SqsError::QueueAlreadyExists(_) => "QueueAlreadyExists",
            SqsError::QueueDoesNotExist(_) => "AWS.SimpleQueueService.NonExistentQueue",
            SqsError::QueueDeletedRecently(_) => "AWS.SimpleQueueService.QueueDeletedRecently",
            SqsError::InvalidAttributeName(_) => "InvalidAttributeName",
            SqsError::InvalidAttributeValue(_) => "InvalidAttributeValue",
            SqsError::InvalidParameterValue(_) => "InvalidParameterValue",
            SqsError::MissingParameter(_) => "MissingParameter",
            SqsError::ReceiptHandleIsInvalid(_) => "ReceiptHandleIsInvalid",
            SqsError::PurgeQueueInProgress(_) => "AWS.SimpleQueueService.PurgeQueueInProgress",
            SqsError::OverLimit(_) => "OverLimit",
            SqsError::EmptyBatchRequest(_) => "AWS.SimpleQueueService.EmptyBatchRequest",
            SqsError::TooManyEntriesInBatchRequest(_) => {
                "AWS.SimpleQueueService.TooManyEntriesInBatchRequest"
            }
            SqsError::BatchEntryIdsNotDistinct(_) => {
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct"
            }
            SqsError::InvalidBatchEntryId(_) => "AWS.SimpleQueueService.InvalidBatchEntryId",
            SqsError::BatchRequestTooLong(_) => "AWS.SimpleQueueService.BatchRequestTooLong",
            SqsError::ResourceNotFound(_) => "ResourceNotFoundException",
            SqsError::InvalidAction(_) => "InvalidAction",
            SqsError::Internal(_) => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            SqsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            SqsError::Internal(_) => "Receiver",
            _ => "Sender",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorBody,
    #[serde(rename = "RequestId")]
    request_id: String,
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "Code")]
    code: &'static str,
    #[serde(rename = "Message")]
    message: String,
}

impl IntoResponse for SqsError {
    fn into_response(self) -> Response {
        let envelope = ErrorResponse {
            error: ErrorBody {
                kind: self.error_type(),
                code: self.code(),
                message: self.to_string(),
            },
            request_id: uuid::Uuid::new_v4().to_string(),
        };
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        if let Ok(s) = quick_xml::se::to_string(&envelope) {
            xml.push_str(&s);
        }
        (
            self.status_code(),
            [("content-type", "application/xml")],
            xml,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_wire_dialect() {
        assert_eq!(
            SqsError::QueueDoesNotExist("x".into()).code(),
            "AWS.SimpleQueueService.NonExistentQueue"
        );
        assert_eq!(
            SqsError::ReceiptHandleIsInvalid("x".into()).code(),
            "ReceiptHandleIsInvalid"
        );
        assert_eq!(
            SqsError::PurgeQueueInProgress("x".into()).code(),
            "AWS.SimpleQueueService.PurgeQueueInProgress"
        );
    }
}
