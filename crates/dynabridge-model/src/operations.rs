//! The data-plane operation set.
//!
//! Table management (CreateTable and friends) is intentionally absent:
//! backend tables are pre-provisioned and described by the schema registry.

use std::fmt;

/// All operations the adapter serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read one item by primary key.
    GetItem,
    /// Insert or replace one item.
    PutItem,
    /// Delete one item by primary key.
    DeleteItem,
    /// Apply an update expression to one item.
    UpdateItem,
    /// Query by key condition, optionally through a secondary index.
    Query,
    /// Scan a table.
    Scan,
    /// Multi-table point reads.
    BatchGetItem,
    /// Multi-table put/delete mutations.
    BatchWriteItem,
    /// Consistent multi-table snapshot reads.
    TransactGetItems,
    /// Atomic multi-item write batch.
    TransactWriteItems,
    /// PartiQL statement execution.
    ExecuteStatement,
}

impl Operation {
    /// The AWS operation name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetItem => "GetItem",
            Self::PutItem => "PutItem",
            Self::DeleteItem => "DeleteItem",
            Self::UpdateItem => "UpdateItem",
            Self::Query => "Query",
            Self::Scan => "Scan",
            Self::BatchGetItem => "BatchGetItem",
            Self::BatchWriteItem => "BatchWriteItem",
            Self::TransactGetItems => "TransactGetItems",
            Self::TransactWriteItems => "TransactWriteItems",
            Self::ExecuteStatement => "ExecuteStatement",
        }
    }

    /// Parse an operation name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "GetItem" => Some(Self::GetItem),
            "PutItem" => Some(Self::PutItem),
            "DeleteItem" => Some(Self::DeleteItem),
            "UpdateItem" => Some(Self::UpdateItem),
            "Query" => Some(Self::Query),
            "Scan" => Some(Self::Scan),
            "BatchGetItem" => Some(Self::BatchGetItem),
            "BatchWriteItem" => Some(Self::BatchWriteItem),
            "TransactGetItems" => Some(Self::TransactGetItems),
            "TransactWriteItems" => Some(Self::TransactWriteItems),
            "ExecuteStatement" => Some(Self::ExecuteStatement),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
