//! The backend abstraction: a transactional, SQL-queryable key/range
//! store.
//!
//! The engine only uses the capabilities on [`Backend`] and
//! [`BackendTransaction`]: single-row reads, key-set reads, parameterised
//! query execution, read/write transactions with buffered mutations, an
//! atomic mutation-vector apply, and a consistent multi-table snapshot
//! read. A driver for a real SQL backend renders [`Statement`]s; the
//! in-memory implementation in [`memory`] interprets the structured plan
//! instead.

pub mod memory;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{ColumnValue, Row};
use crate::query::QueryPlan;

/// How many times the engine re-runs a transaction after a retriable
/// abort before surfacing `InternalServerError`.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Backend failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The addressed table or row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The transaction collided and may be retried.
    #[error("transaction aborted, retry")]
    Aborted,
    /// The request was malformed for the backend.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Transport or server failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Anything else.
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Whether the enclosing transaction should be re-run.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// One component of a primary key. Numeric keys order by total ordering
/// so the in-memory backend can keep rows sorted.
#[derive(Debug, Clone)]
pub enum KeyValue {
    /// String key component.
    S(String),
    /// Numeric key component.
    N(f64),
    /// Binary key component.
    B(Bytes),
}

impl KeyValue {
    /// Build a key component from a column value, if the type qualifies.
    #[must_use]
    pub fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::String(s) => Some(Self::S(s.clone())),
            ColumnValue::Double(d) => Some(Self::N(*d)),
            ColumnValue::Bytes(b) => Some(Self::B(b.clone())),
            _ => None,
        }
    }

    /// The column value this key component stores as.
    #[must_use]
    pub fn to_column(&self) -> ColumnValue {
        match self {
            Self::S(s) => ColumnValue::String(s.clone()),
            Self::N(d) => ColumnValue::Double(*d),
            Self::B(b) => ColumnValue::Bytes(b.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::S(_) => 0,
            Self::N(_) => 1,
            Self::B(_) => 2,
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::S(a), Self::S(b)) => a.cmp(b),
            (Self::N(a), Self::N(b)) => a.total_cmp(b),
            (Self::B(a), Self::B(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{s}"),
            Self::N(n) => write!(f, "{n}"),
            Self::B(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// The primary key of one row: partition component plus optional sort
/// component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrimaryKey {
    /// Partition-key value.
    pub partition: KeyValue,
    /// Sort-key value, when the table declares a sort key.
    pub sort: Option<KeyValue>,
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "({}, {sort})", self.partition),
            None => write!(f, "({})", self.partition),
        }
    }
}

/// A buffered write.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Upsert the given columns of one row, leaving others untouched.
    InsertOrUpdate {
        /// Backend table.
        table: String,
        /// Columns to write; must include the key columns.
        row: Row,
    },
    /// Delete one row by primary key.
    Delete {
        /// Backend table.
        table: String,
        /// Key of the row to delete.
        key: PrimaryKey,
    },
}

/// A parameterised SQL statement in the backend dialect.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    /// SQL text with `@name` parameter references.
    pub sql: String,
    /// Parameter bindings, ordered by name for stable rendering.
    pub params: BTreeMap<String, ColumnValue>,
}

/// One element of a consistent multi-table snapshot read.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Backend table.
    pub table: String,
    /// Key to read.
    pub key: PrimaryKey,
    /// Columns to fetch; empty means every declared column.
    pub columns: Vec<String>,
}

/// The store the engine runs against.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Read one row. `columns` empty means all columns.
    async fn read_row(
        &self,
        table: &str,
        key: &PrimaryKey,
        columns: &[String],
    ) -> Result<Option<Row>, BackendError>;

    /// Multi-point read; missing keys are simply absent from the result.
    async fn batch_read(
        &self,
        table: &str,
        keys: &[PrimaryKey],
        columns: &[String],
    ) -> Result<Vec<Row>, BackendError>;

    /// Read several keys (possibly across tables) from one consistent
    /// snapshot. One entry per request, in request order.
    async fn transact_read(
        &self,
        requests: &[ReadRequest],
    ) -> Result<Vec<Option<Row>>, BackendError>;

    /// Execute a planned query.
    async fn execute_query(&self, plan: &QueryPlan) -> Result<Vec<Row>, BackendError>;

    /// Open a read/write transaction.
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>, BackendError>;

    /// Apply a mutation vector atomically, outside any open transaction.
    async fn apply(&self, mutations: Vec<Mutation>) -> Result<(), BackendError>;
}

/// A read/write transaction: transactional reads plus buffered writes,
/// applied atomically on commit.
#[async_trait]
pub trait BackendTransaction: Send {
    /// Read one row inside the transaction. `columns` empty means all.
    async fn read_row(
        &mut self,
        table: &str,
        key: &PrimaryKey,
        columns: &[String],
    ) -> Result<Option<Row>, BackendError>;

    /// Buffer a mutation for commit.
    fn buffer(&mut self, mutation: Mutation);

    /// Commit all buffered mutations.
    async fn commit(self: Box<Self>) -> Result<(), BackendError>;

    /// Discard all buffered mutations.
    async fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}
