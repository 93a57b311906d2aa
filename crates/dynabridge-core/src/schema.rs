//! Table configuration and the schema registry.
//!
//! One registry row per (table, column) in `dynabridge_table_ddl` describes
//! the declared DynamoDB type of every backend column, the partition/sort
//! keys, and secondary-index mappings. The registry is loaded once at
//! startup and is immutable afterwards; the optional config refresher swaps
//! whole snapshots behind a read-write lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use dynabridge_model::AdapterError;

use crate::backend::{Backend, BackendError};
use crate::codec::ColumnValue;
use crate::query::QueryPlan;

/// Name of the registry table describing all adapted tables.
pub const TABLE_DDL_REGISTRY: &str = "dynabridge_table_ddl";

/// Name of the config-manager cron table (bootstrap-seeded DDL only).
pub const CONFIG_MANAGER_TABLE: &str = "dynabridge_config_manager";

/// Declared DynamoDB type of a backend column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    S,
    N,
    B,
    Bool,
    Null,
    Ss,
    Ns,
    Bs,
    L,
    M,
}

impl TypeCode {
    /// Parse a registry type string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S" => Some(Self::S),
            "N" => Some(Self::N),
            "B" => Some(Self::B),
            "BOOL" => Some(Self::Bool),
            "NULL" => Some(Self::Null),
            "SS" => Some(Self::Ss),
            "NS" => Some(Self::Ns),
            "BS" => Some(Self::Bs),
            "L" => Some(Self::L),
            "M" => Some(Self::M),
            _ => None,
        }
    }

    /// The registry string for this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S => "S",
            Self::N => "N",
            Self::B => "B",
            Self::Bool => "BOOL",
            Self::Null => "NULL",
            Self::Ss => "SS",
            Self::Ns => "NS",
            Self::Bs => "BS",
            Self::L => "L",
            Self::M => "M",
        }
    }
}

/// Key pair of a secondary index.
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Partition-key column of the index.
    pub partition_key: String,
    /// Sort-key column of the index, if any.
    pub sort_key: Option<String>,
    /// Backend index name, when it differs from the DynamoDB index name.
    pub backend_index_name: Option<String>,
}

/// Per-logical-table configuration.
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    /// Partition-key column.
    pub partition_key: String,
    /// Sort-key column, if the table declares one.
    pub sort_key: Option<String>,
    /// Backend table name; may differ from the logical name.
    pub actual_table: String,
    /// Secondary indexes keyed by their DynamoDB index name.
    pub indices: HashMap<String, IndexConfig>,
    /// Key values are zero-padded in the backend.
    pub is_padded: bool,
    /// Numeric keys are stored complemented for descending layouts.
    pub is_complement: bool,
}

/// The per-table DDL map: column name to declared type.
pub type DdlMap = HashMap<String, TypeCode>;

/// Immutable schema snapshot: table configs, DDL maps, and column lists.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableConfig>,
    ddl: HashMap<String, DdlMap>,
    columns: HashMap<String, Vec<String>>,
}

impl SchemaRegistry {
    /// An empty registry pre-seeded with the registry tables' own schema.
    #[must_use]
    pub fn seeded() -> Self {
        let mut registry = Self::default();
        registry.set_ddl(
            TABLE_DDL_REGISTRY,
            &[
                ("tableName", TypeCode::S),
                ("column", TypeCode::S),
                ("dynamoDataType", TypeCode::S),
                ("originalColumn", TypeCode::S),
                ("partitionKey", TypeCode::S),
                ("sortKey", TypeCode::S),
                ("ddbIndexName", TypeCode::S),
                ("backendIndexName", TypeCode::S),
                ("actualTable", TypeCode::S),
            ],
        );
        registry.set_ddl(
            CONFIG_MANAGER_TABLE,
            &[
                ("tableName", TypeCode::S),
                ("config", TypeCode::S),
                ("cronTime", TypeCode::S),
                ("uniqueValue", TypeCode::S),
                ("enabledStream", TypeCode::S),
            ],
        );
        registry
    }

    /// Register a table configuration under its logical name.
    pub fn add_table(&mut self, logical_name: impl Into<String>, config: TableConfig) {
        self.tables.insert(logical_name.into(), config);
    }

    /// Set the DDL map and ordered column list of a backend table.
    pub fn set_ddl(&mut self, backend_table: &str, columns: &[(&str, TypeCode)]) {
        let mut ddl = DdlMap::new();
        let mut order = Vec::with_capacity(columns.len());
        for (name, code) in columns {
            ddl.insert((*name).to_owned(), *code);
            order.push((*name).to_owned());
        }
        self.ddl.insert(backend_table.to_owned(), ddl);
        self.columns.insert(backend_table.to_owned(), order);
    }

    /// Look up a table config, or fail with `ResourceNotFoundException`.
    pub fn require_table(&self, logical_name: &str) -> Result<&TableConfig, AdapterError> {
        self.tables.get(logical_name).ok_or_else(|| {
            AdapterError::resource_not_found(format!(
                "Requested resource not found: Table: {logical_name} not found"
            ))
        })
    }

    /// The DDL map of a backend table.
    pub fn require_ddl(&self, backend_table: &str) -> Result<&DdlMap, AdapterError> {
        self.ddl.get(backend_table).ok_or_else(|| {
            AdapterError::resource_not_found(format!(
                "Requested resource not found: Table: {backend_table} not found"
            ))
        })
    }

    /// The ordered column list of a backend table.
    pub fn require_columns(&self, backend_table: &str) -> Result<&[String], AdapterError> {
        self.columns
            .get(backend_table)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                AdapterError::resource_not_found(format!(
                    "Requested resource not found: Table: {backend_table} not found"
                ))
            })
    }

    /// Names of all registered logical tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

/// Process-wide schema handle: readable everywhere, swappable by the
/// out-of-scope config refresher.
#[derive(Debug, Clone)]
pub struct SharedSchema {
    inner: Arc<RwLock<Arc<SchemaRegistry>>>,
}

impl SharedSchema {
    /// Wrap a freshly bootstrapped registry.
    #[must_use]
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The current snapshot. Cheap; callers hold it for one request.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.inner.read())
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, registry: SchemaRegistry) {
        *self.inner.write() = Arc::new(registry);
    }
}

/// Load the full schema registry from `dynabridge_table_ddl`.
///
/// Each row describes one column of one adapted table. Rows with a
/// non-empty `ddbIndexName` describe a secondary index of the table
/// instead of a column.
pub async fn bootstrap(backend: &dyn Backend) -> Result<SchemaRegistry, AdapterError> {
    let mut registry = SchemaRegistry::seeded();
    let plan = QueryPlan::full_scan(
        TABLE_DDL_REGISTRY,
        registry.require_columns(TABLE_DDL_REGISTRY)?,
    );

    let rows = backend
        .execute_query(&plan)
        .await
        .map_err(bootstrap_error)?;

    let mut order: HashMap<String, Vec<(String, TypeCode)>> = HashMap::new();
    for row in rows {
        let table = string_field(&row, "tableName");
        if table.is_empty() {
            continue;
        }
        let actual = {
            let actual = string_field(&row, "actualTable");
            if actual.is_empty() {
                table.clone()
            } else {
                actual
            }
        };

        let entry = registry.tables.entry(table.clone()).or_insert_with(|| {
            TableConfig {
                actual_table: actual.clone(),
                ..TableConfig::default()
            }
        });

        let index_name = string_field(&row, "ddbIndexName");
        if index_name.is_empty() {
            // Column row: contributes the DDL entry and the key columns.
            let column = string_field(&row, "column");
            let code = TypeCode::parse(&string_field(&row, "dynamoDataType"))
                .ok_or_else(|| {
                    AdapterError::validation(format!(
                        "unknown dynamoDataType for {table}.{column}"
                    ))
                })?;
            let partition = string_field(&row, "partitionKey");
            if !partition.is_empty() {
                entry.partition_key = partition;
            }
            let sort = string_field(&row, "sortKey");
            if !sort.is_empty() {
                entry.sort_key = Some(sort);
            }
            order.entry(actual).or_default().push((column, code));
        } else {
            // Index row: partitionKey/sortKey name the index keys.
            let backend_index = string_field(&row, "backendIndexName");
            entry.indices.insert(
                index_name,
                IndexConfig {
                    partition_key: string_field(&row, "partitionKey"),
                    sort_key: {
                        let s = string_field(&row, "sortKey");
                        if s.is_empty() { None } else { Some(s) }
                    },
                    backend_index_name: if backend_index.is_empty() {
                        None
                    } else {
                        Some(backend_index)
                    },
                },
            );
        }
    }

    for (backend_table, cols) in order {
        let refs: Vec<(&str, TypeCode)> = cols
            .iter()
            .map(|(name, code)| (name.as_str(), *code))
            .collect();
        registry.set_ddl(&backend_table, &refs);
    }

    tracing::info!(
        tables = registry.tables.len(),
        "schema registry bootstrapped"
    );
    Ok(registry)
}

fn bootstrap_error(e: BackendError) -> AdapterError {
    AdapterError::internal(format!("schema bootstrap failed: {e}"))
}

fn string_field(row: &HashMap<String, ColumnValue>, name: &str) -> String {
    match row.get(name) {
        Some(ColumnValue::String(s)) => s.clone(),
        _ => String::new(),
    }
}
