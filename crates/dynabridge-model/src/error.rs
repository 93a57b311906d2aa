//! Wire-visible adapter errors.
//!
//! Errors serialize in the DynamoDB JSON error format: a `__type` field
//! carrying the fully-qualified error name plus a human-readable `Message`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;

/// Error codes the adapter emits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum AdapterErrorCode {
    /// Malformed expression, unknown attribute, type mismatch, numeric
    /// overflow, missing required key.
    #[default]
    ValidationException,
    /// Unknown table, or unknown column for the resolved table.
    ResourceNotFoundException,
    /// A condition expression evaluated false inside the transaction.
    ConditionalCheckFailedException,
    /// A `TransactWriteItems` sub-request failed; carries per-item reasons.
    TransactionCanceledException,
    /// Backend RPC failure, retry exhaustion, unexpected codec failure.
    InternalServerError,
    /// Request body could not be deserialized.
    SerializationException,
    /// The `X-Amz-Target` header is missing.
    MissingAction,
    /// The `X-Amz-Target` header names an unsupported operation.
    UnrecognizedClientException,
}

impl AdapterErrorCode {
    /// Fully-qualified `__type` string for the JSON error body.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ValidationException => "com.amazon.coral.validate#ValidationException",
            Self::ResourceNotFoundException => {
                "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException"
            }
            Self::ConditionalCheckFailedException => {
                "com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException"
            }
            Self::TransactionCanceledException => {
                "com.amazonaws.dynamodb.v20120810#TransactionCanceledException"
            }
            Self::InternalServerError => "com.amazonaws.dynamodb.v20120810#InternalServerError",
            Self::SerializationException => {
                "com.amazonaws.dynamodb.v20120810#SerializationException"
            }
            Self::MissingAction => "com.amazonaws.dynamodb.v20120810#MissingAction",
            Self::UnrecognizedClientException => {
                "com.amazonaws.dynamodb.v20120810#UnrecognizedClientException"
            }
        }
    }

    /// Short code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationException => "ValidationException",
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ConditionalCheckFailedException => "ConditionalCheckFailedException",
            Self::TransactionCanceledException => "TransactionCanceledException",
            Self::InternalServerError => "InternalServerError",
            Self::SerializationException => "SerializationException",
            Self::MissingAction => "MissingAction",
            Self::UnrecognizedClientException => "UnrecognizedClientException",
        }
    }

    /// Default HTTP status for the code.
    #[must_use]
    pub fn default_status_code(&self) -> http::StatusCode {
        match self {
            Self::InternalServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for AdapterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item outcome reported inside `TransactionCanceledException`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancellationReason {
    /// Reason code, e.g. `ConditionalCheckFailed` or `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Human-readable message for failed items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The item image, when requested on condition-check failure.
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub item: std::collections::HashMap<String, AttributeValue>,
}

impl CancellationReason {
    /// A reason entry for a sub-request that did not fail.
    #[must_use]
    pub fn none() -> Self {
        Self {
            code: Some("None".to_owned()),
            message: None,
            item: std::collections::HashMap::new(),
        }
    }

    /// A reason entry for a failed condition check.
    #[must_use]
    pub fn conditional_check_failed(message: impl Into<String>) -> Self {
        Self {
            code: Some("ConditionalCheckFailed".to_owned()),
            message: Some(message.into()),
            item: std::collections::HashMap::new(),
        }
    }
}

/// A wire-level adapter error.
#[derive(Debug)]
pub struct AdapterError {
    /// The error code.
    pub code: AdapterErrorCode,
    /// Human-readable message.
    pub message: String,
    /// HTTP status to respond with.
    pub status_code: http::StatusCode,
    /// Per-item reasons, populated only for transaction cancellation.
    pub cancellation_reasons: Vec<CancellationReason>,
    /// Underlying cause, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl AdapterError {
    /// Create an error with the code's default message and status.
    #[must_use]
    pub fn new(code: AdapterErrorCode) -> Self {
        Self {
            status_code: code.default_status_code(),
            message: code.as_str().to_owned(),
            code,
            cancellation_reasons: Vec::new(),
            source: None,
        }
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: AdapterErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: code.default_status_code(),
            message: message.into(),
            code,
            cancellation_reasons: Vec::new(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The `__type` string for the JSON error body.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        self.code.error_type()
    }

    // -- Convenience constructors --

    /// Validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(AdapterErrorCode::ValidationException, message)
    }

    /// Unknown table or column.
    #[must_use]
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::with_message(AdapterErrorCode::ResourceNotFoundException, message)
    }

    /// Condition evaluated false at transaction time.
    #[must_use]
    pub fn conditional_check_failed(message: impl Into<String>) -> Self {
        Self::with_message(AdapterErrorCode::ConditionalCheckFailedException, message)
    }

    /// A transaction batch was canceled; `reasons` has one entry per item.
    #[must_use]
    pub fn transaction_canceled(reasons: Vec<CancellationReason>) -> Self {
        let mut err = Self::with_message(
            AdapterErrorCode::TransactionCanceledException,
            "Transaction cancelled, please refer cancellation reasons for specific reasons",
        );
        err.cancellation_reasons = reasons;
        err
    }

    /// Backend or codec failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(AdapterErrorCode::InternalServerError, message)
    }

    /// Body deserialization failure.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::with_message(AdapterErrorCode::SerializationException, message)
    }

    /// Missing `X-Amz-Target` header.
    #[must_use]
    pub fn missing_action() -> Self {
        Self::with_message(
            AdapterErrorCode::MissingAction,
            "Missing required header: X-Amz-Target",
        )
    }

    /// Unsupported operation name.
    #[must_use]
    pub fn unknown_operation(target: &str) -> Self {
        Self::with_message(
            AdapterErrorCode::UnrecognizedClientException,
            format!("Unrecognized operation: {target}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_default_status_by_code() {
        assert_eq!(
            AdapterError::internal("boom").status_code,
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AdapterError::validation("bad").status_code,
            http::StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_should_carry_cancellation_reasons() {
        let err = AdapterError::transaction_canceled(vec![
            CancellationReason::none(),
            CancellationReason::conditional_check_failed("The conditional request failed"),
        ]);
        assert_eq!(err.code, AdapterErrorCode::TransactionCanceledException);
        assert_eq!(err.cancellation_reasons.len(), 2);
        assert_eq!(
            err.cancellation_reasons[1].code.as_deref(),
            Some("ConditionalCheckFailed")
        );
    }

    #[test]
    fn test_should_expose_fully_qualified_type() {
        let err = AdapterError::conditional_check_failed("nope");
        assert_eq!(
            err.error_type(),
            "com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException"
        );
    }
}
