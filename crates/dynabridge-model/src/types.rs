//! Supporting wire types shared by inputs and outputs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;
use crate::Item;

/// The `ReturnValues` request parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnValue {
    /// Return nothing (default).
    #[default]
    None,
    /// Return the whole pre-image.
    AllOld,
    /// Return the whole post-image.
    AllNew,
    /// Accepted for compatibility; the adapter returns the `ALL_OLD` shape.
    UpdatedOld,
    /// Accepted for compatibility; the adapter returns the `ALL_NEW` shape.
    UpdatedNew,
}

impl ReturnValue {
    /// Whether the pre-image is needed to honor this setting.
    #[must_use]
    pub fn wants_old(&self) -> bool {
        matches!(self, Self::AllOld | Self::UpdatedOld)
    }

    /// Whether the post-image is needed to honor this setting.
    #[must_use]
    pub fn wants_new(&self) -> bool {
        matches!(self, Self::AllNew | Self::UpdatedNew)
    }
}

/// Per-table request block for `BatchGetItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeysAndAttributes {
    /// Primary keys to fetch.
    pub keys: Vec<Item>,

    /// Attributes to project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,

    /// `#name` substitutions for the projection.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,

    /// Strong-read flag; the backend is always strongly consistent, the
    /// field is accepted and ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}

/// One element of a `BatchWriteItem` request vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteRequest {
    /// Put sub-request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_request: Option<PutRequest>,

    /// Delete sub-request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_request: Option<DeleteRequest>,
}

/// The put half of a [`WriteRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRequest {
    /// The item to write.
    pub item: Item,
}

/// The delete half of a [`WriteRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRequest {
    /// The primary key to delete.
    pub key: Item,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// One element of a `TransactGetItems` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactGetItem {
    /// The wrapped Get.
    pub get: TransactGet,
}

/// The Get payload inside [`TransactGetItem`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactGet {
    /// Table to read from.
    pub table_name: String,

    /// Primary key of the item.
    pub key: Item,

    /// Attributes to project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,

    /// `#name` substitutions for the projection.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
}

/// One element of a `TransactWriteItems` request. Exactly one of the four
/// sub-requests is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactWriteItem {
    /// Conditional put.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<TransactPut>,

    /// Conditional update-expression write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<TransactUpdate>,

    /// Conditional delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<TransactDelete>,

    /// Pure condition check (no mutation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_check: Option<TransactConditionCheck>,
}

/// Put sub-request of a transaction batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactPut {
    pub table_name: String,
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// Update sub-request of a transaction batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactUpdate {
    pub table_name: String,
    pub key: Item,
    pub update_expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// Delete sub-request of a transaction batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactDelete {
    pub table_name: String,
    pub key: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// Condition-check sub-request of a transaction batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactConditionCheck {
    pub table_name: String,
    pub key: Item,
    pub condition_expression: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// One response element of `TransactGetItems`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemResponse {
    /// The table the item was read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    /// The item, absent when the key does not exist.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub item: Item,
}
