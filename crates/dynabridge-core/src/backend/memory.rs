//! In-memory implementation of the backend traits.
//!
//! Used by the test suite and for local runs without a real backend.
//! Rows live in per-table `BTreeMap`s keyed by [`PrimaryKey`], so range
//! order matches the sort key. Query plans are interpreted structurally:
//! the parsed key-condition and filter evaluate through the expression
//! evaluator instead of parsing SQL text.
//!
//! Commit applies all buffered mutations atomically under the table
//! locks; concurrent-transaction snapshot isolation is not simulated.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::codec::{self, ColumnValue, Row};
use crate::expression::EvalContext;
use crate::query::QueryPlan;

use super::{Backend, BackendError, BackendTransaction, KeyValue, Mutation, PrimaryKey, ReadRequest};

/// Key columns of one stored table.
#[derive(Debug, Clone)]
struct KeyColumns {
    partition: String,
    sort: Option<String>,
}

#[derive(Debug)]
struct MemoryTable {
    keys: KeyColumns,
    rows: RwLock<BTreeMap<PrimaryKey, Row>>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: DashMap<String, MemoryTable>,
}

/// An in-memory transactional store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table and its key columns. Backend tables are
    /// pre-provisioned in production; this is the local equivalent.
    pub fn register_table(
        &self,
        name: impl Into<String>,
        partition_column: impl Into<String>,
        sort_column: Option<String>,
    ) {
        self.inner.tables.insert(
            name.into(),
            MemoryTable {
                keys: KeyColumns {
                    partition: partition_column.into(),
                    sort: sort_column,
                },
                rows: RwLock::new(BTreeMap::new()),
            },
        );
    }

    /// Number of rows currently stored in a table (test helper).
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.inner
            .tables
            .get(table)
            .map_or(0, |t| t.rows.read().len())
    }

    fn key_of(table: &MemoryTable, row: &Row) -> Result<PrimaryKey, BackendError> {
        let partition = row
            .get(&table.keys.partition)
            .and_then(KeyValue::from_column)
            .ok_or_else(|| {
                BackendError::InvalidArgument(format!(
                    "row is missing key column {}",
                    table.keys.partition
                ))
            })?;
        let sort = match &table.keys.sort {
            Some(column) => Some(
                row.get(column)
                    .and_then(KeyValue::from_column)
                    .ok_or_else(|| {
                        BackendError::InvalidArgument(format!(
                            "row is missing key column {column}"
                        ))
                    })?,
            ),
            None => None,
        };
        Ok(PrimaryKey { partition, sort })
    }

    fn read_from(
        &self,
        table: &str,
        key: &PrimaryKey,
        columns: &[String],
    ) -> Result<Option<Row>, BackendError> {
        let table = self
            .inner
            .tables
            .get(table)
            .ok_or_else(|| BackendError::NotFound(format!("table {table}")))?;
        let rows = table.rows.read();
        Ok(rows.get(key).map(|row| project(row, columns)))
    }

    fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<(), BackendError> {
        for mutation in mutations {
            match mutation {
                Mutation::InsertOrUpdate { table, row } => {
                    let entry = self
                        .inner
                        .tables
                        .get(&table)
                        .ok_or_else(|| BackendError::NotFound(format!("table {table}")))?;
                    let key = Self::key_of(&entry, &row)?;
                    let mut rows = entry.rows.write();
                    match rows.get_mut(&key) {
                        Some(existing) => {
                            for (column, value) in row {
                                existing.insert(column, value);
                            }
                        }
                        None => {
                            rows.insert(key, row);
                        }
                    }
                }
                Mutation::Delete { table, key } => {
                    let entry = self
                        .inner
                        .tables
                        .get(&table)
                        .ok_or_else(|| BackendError::NotFound(format!("table {table}")))?;
                    entry.rows.write().remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Restrict a row to the selected columns; an empty list keeps all.
fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
        .collect()
}

/// Evaluate the plan's parsed conditions against one row.
fn row_matches(plan: &QueryPlan, row: &Row) -> Result<bool, BackendError> {
    if plan.key_condition.is_none() && plan.filter.is_none() {
        return Ok(true);
    }
    let item: dynabridge_model::Item = row
        .iter()
        .map(|(k, v)| (k.clone(), codec::column_to_attribute(v)))
        .collect();
    let ctx = EvalContext {
        item: &item,
        names: &plan.names,
        values: &plan.values,
    };
    for condition in [plan.key_condition.as_ref(), plan.filter.as_ref()]
        .into_iter()
        .flatten()
    {
        let matched = ctx
            .evaluate(condition)
            .map_err(|e| BackendError::InvalidArgument(e.to_string()))?;
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read_row(
        &self,
        table: &str,
        key: &PrimaryKey,
        columns: &[String],
    ) -> Result<Option<Row>, BackendError> {
        self.read_from(table, key, columns)
    }

    async fn batch_read(
        &self,
        table: &str,
        keys: &[PrimaryKey],
        columns: &[String],
    ) -> Result<Vec<Row>, BackendError> {
        let mut rows = Vec::new();
        for key in keys {
            if let Some(row) = self.read_from(table, key, columns)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    async fn transact_read(
        &self,
        requests: &[ReadRequest],
    ) -> Result<Vec<Option<Row>>, BackendError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.read_from(&request.table, &request.key, &request.columns)?);
        }
        Ok(results)
    }

    async fn execute_query(&self, plan: &QueryPlan) -> Result<Vec<Row>, BackendError> {
        let table = self
            .inner
            .tables
            .get(&plan.table)
            .ok_or_else(|| BackendError::NotFound(format!("table {}", plan.table)))?;

        let snapshot: Vec<Row> = {
            let rows = table.rows.read();
            if plan.ascending {
                rows.values().cloned().collect()
            } else {
                rows.values().rev().cloned().collect()
            }
        };

        let mut matched = Vec::new();
        for row in &snapshot {
            if row_matches(plan, row)? {
                matched.push(row.clone());
            }
        }

        if plan.is_count {
            #[allow(clippy::cast_precision_loss)]
            let count = matched.len() as f64;
            return Ok(vec![Row::from([(
                "count".to_owned(),
                ColumnValue::Double(count),
            )])]);
        }

        let mut page: Vec<Row> = matched
            .into_iter()
            .skip(usize::try_from(plan.offset).unwrap_or(0))
            .collect();
        if plan.limit > 0 {
            page.truncate(usize::try_from(plan.limit).unwrap_or(usize::MAX));
        }

        Ok(page
            .iter()
            .map(|row| project(row, &plan.columns))
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn BackendTransaction>, BackendError> {
        Ok(Box::new(MemoryTransaction {
            backend: self.clone(),
            buffered: Vec::new(),
        }))
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> Result<(), BackendError> {
        self.apply_mutations(mutations)
    }
}

/// A transaction over the in-memory store.
#[derive(Debug)]
pub struct MemoryTransaction {
    backend: MemoryBackend,
    buffered: Vec<Mutation>,
}

#[async_trait]
impl BackendTransaction for MemoryTransaction {
    async fn read_row(
        &mut self,
        table: &str,
        key: &PrimaryKey,
        columns: &[String],
    ) -> Result<Option<Row>, BackendError> {
        self.backend.read_from(table, key, columns)
    }

    fn buffer(&mut self, mutation: Mutation) {
        self.buffered.push(mutation);
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        self.backend.apply_mutations(self.buffered)
    }

    async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}
