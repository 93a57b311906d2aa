//! The query planner: a DynamoDB `Query`/`Scan` request becomes one
//! parameterised SELECT against the backend.
//!
//! The emitted dialect: `SELECT t.`col`, … FROM t[@{FORCE_INDEX=idx}]
//! WHERE sk IS NOT NULL AND … ORDER BY sk ASC|DESC LIMIT n OFFSET m`,
//! with `begins_with` rewritten to `STARTS_WITH`, dotted paths rewritten
//! to `JSON_VALUE`, and placeholders bound as `@rangeExpN`/`@filterExpN`.
//! The plan also carries the parsed condition trees so a backend that
//! interprets rather than parses SQL (the in-memory store) can execute it.

use std::collections::HashMap;

use dynabridge_model::{AdapterError, AttributeValue};

use crate::codec::{self, ColumnValue};
use crate::expression::{parse_condition, Expr};
use crate::schema::{SchemaRegistry, TableConfig};
use crate::backend::Statement;

/// Columns never returned to clients.
const RESERVED_COLUMNS: &[&str] = &["commit_timestamp"];

/// A normalized read request, shared by `Query`, `Scan`, and the PartiQL
/// SELECT path.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Logical table name.
    pub table: String,
    /// Secondary index to force, if any.
    pub index_name: Option<String>,
    /// Key-condition expression text.
    pub key_condition: Option<String>,
    /// Filter expression text.
    pub filter: Option<String>,
    /// Projection expression text.
    pub projection: Option<String>,
    /// `#name` substitutions.
    pub names: HashMap<String, String>,
    /// `:value` bindings.
    pub values: HashMap<String, AttributeValue>,
    /// Sort direction on the sort key.
    pub ascending: bool,
    /// Page size; the caller resolves defaults before planning.
    pub limit: i64,
    /// Continuation offset from the start key.
    pub offset: i64,
    /// Count-only query (`Select: COUNT`).
    pub only_count: bool,
}

/// The planned query: SQL for real backends, structure for interpreting
/// ones, and the bookkeeping the engine needs to shape the response.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    /// Backend table name.
    pub table: String,
    /// Backend index forced via `FORCE_INDEX`, if any.
    pub force_index: Option<String>,
    /// Columns selected, in order. Empty means every declared column.
    pub columns: Vec<String>,
    /// The parameterised SQL statement.
    pub statement: Statement,
    /// True for `SELECT COUNT(pk)` plans.
    pub is_count: bool,
    /// Emitted LIMIT (original limit plus the has-more sentinel row);
    /// zero means uncapped.
    pub limit: i64,
    /// Emitted OFFSET.
    pub offset: i64,
    /// Sort direction.
    pub ascending: bool,
    /// Sort-key column ordered by, if any.
    pub sort_key: Option<String>,
    /// Partition-key column of the (index-resolved) key pair.
    pub partition_key: String,
    /// FNV-1a 64 hash of the SQL text, for client-side correlation.
    pub fingerprint: u64,
    /// Parsed key condition, for interpreting backends.
    pub key_condition: Option<Expr>,
    /// Parsed filter, for interpreting backends.
    pub filter: Option<Expr>,
    /// `#name` substitutions for evaluating the parsed conditions.
    pub names: HashMap<String, String>,
    /// `:value` bindings for evaluating the parsed conditions.
    pub values: HashMap<String, AttributeValue>,
}

impl QueryPlan {
    /// A plan selecting every row of a table, used by the schema
    /// bootstrap before any table config exists.
    #[must_use]
    pub fn full_scan(table: &str, columns: &[String]) -> Self {
        let column_list = render_column_list(table, columns);
        let sql = format!("SELECT {column_list} FROM {table}");
        let fingerprint = fnv1a64(sql.as_bytes());
        Self {
            table: table.to_owned(),
            columns: columns.to_vec(),
            statement: Statement {
                sql,
                params: std::collections::BTreeMap::new(),
            },
            ascending: true,
            fingerprint,
            ..Self::default()
        }
    }
}

/// Plan a query against the schema snapshot.
pub fn plan_query(
    request: &QueryRequest,
    schema: &SchemaRegistry,
) -> Result<QueryPlan, AdapterError> {
    let config = schema.require_table(&request.table)?;
    let backend_table = config.actual_table.clone();

    // Key pair: from the index config when an index is requested, with
    // the base table's keys as fallback.
    let table_partition = config.partition_key.clone();
    let (partition_key, sort_key, force_index) = resolve_keys(config, request.index_name.as_deref());

    let columns = if request.only_count {
        Vec::new()
    } else {
        select_columns(
            request,
            schema,
            &backend_table,
            &partition_key,
            sort_key.as_deref(),
            &table_partition,
        )?
    };

    let column_list = if request.only_count {
        format!("COUNT({partition_key}) AS count")
    } else {
        render_column_list(&backend_table, &columns)
    };

    let from_clause = match &force_index {
        Some(index) => format!("{backend_table}@{{FORCE_INDEX={index}}}"),
        None => backend_table.clone(),
    };

    let mut statement = Statement::default();
    let where_clause = build_where_clause(request, sort_key.as_deref(), &mut statement)?;

    let order_clause = if request.only_count {
        String::new()
    } else if let Some(sk) = &sort_key {
        let direction = if request.ascending { "ASC" } else { "DESC" };
        format!(" ORDER BY {sk} {direction}")
    } else {
        String::new()
    };

    // LIMIT carries one sentinel row past the requested page so the
    // engine can decide whether to emit a continuation token.
    let limit = if request.only_count {
        0
    } else {
        request.limit + 1
    };
    let limit_clause = if limit > 0 {
        format!(" LIMIT {limit}")
    } else {
        String::new()
    };
    let offset_clause = if request.offset > 0 && !request.only_count {
        format!(" OFFSET {offset}", offset = request.offset)
    } else {
        String::new()
    };

    statement.sql = format!(
        "SELECT {column_list} FROM {from_clause}{where_clause}{order_clause}{limit_clause}{offset_clause}"
    );
    let fingerprint = fnv1a64(statement.sql.as_bytes());

    let key_condition = request
        .key_condition
        .as_deref()
        .map(parse_condition)
        .transpose()
        .map_err(|e| AdapterError::validation(e.to_string()))?;
    let filter = request
        .filter
        .as_deref()
        .map(parse_condition)
        .transpose()
        .map_err(|e| AdapterError::validation(e.to_string()))?;

    Ok(QueryPlan {
        table: backend_table,
        force_index,
        columns,
        statement,
        is_count: request.only_count,
        limit,
        offset: request.offset,
        ascending: request.ascending,
        sort_key,
        partition_key,
        fingerprint,
        key_condition,
        filter,
        names: request.names.clone(),
        values: request.values.clone(),
    })
}

/// Resolve the effective key pair and forced backend index.
fn resolve_keys(
    config: &TableConfig,
    index_name: Option<&str>,
) -> (String, Option<String>, Option<String>) {
    if let Some(name) = index_name {
        if let Some(index) = config.indices.get(name) {
            // Index names translate `-` to `_` in the backend.
            let backend_index = index
                .backend_index_name
                .clone()
                .unwrap_or_else(|| name.replace('-', "_"));
            let partition = if index.partition_key.is_empty() {
                config.partition_key.clone()
            } else {
                index.partition_key.clone()
            };
            let sort = index.sort_key.clone().or_else(|| config.sort_key.clone());
            return (partition, sort, Some(backend_index));
        }
        // Unknown index: fall back to the base keys but still force it.
        return (
            config.partition_key.clone(),
            config.sort_key.clone(),
            Some(name.replace('-', "_")),
        );
    }
    (config.partition_key.clone(), config.sort_key.clone(), None)
}

/// Choose the projected columns: the declared list when no projection is
/// given, else the projection intersected with the declared list, always
/// extended with the key columns needed to form `LastEvaluatedKey`.
fn select_columns(
    request: &QueryRequest,
    schema: &SchemaRegistry,
    backend_table: &str,
    partition_key: &str,
    sort_key: Option<&str>,
    table_partition: &str,
) -> Result<Vec<String>, AdapterError> {
    let declared = schema.require_columns(backend_table)?;

    let mut columns: Vec<String> = match &request.projection {
        Some(projection) if !projection.trim().is_empty() => {
            let mut picked = Vec::new();
            for raw in projection.split(',') {
                let token = raw.trim();
                let resolved = request
                    .names
                    .get(token)
                    .map_or(token, String::as_str);
                // Unknown columns are silently dropped by the
                // intersection with the declared list.
                if declared.iter().any(|c| c == resolved) && !picked.iter().any(|c| c == resolved) {
                    picked.push(resolved.to_owned());
                }
            }
            picked
        }
        _ => declared.to_vec(),
    };

    for forced in [Some(partition_key), sort_key, Some(table_partition)].into_iter().flatten() {
        if !columns.iter().any(|c| c == forced) {
            columns.push(forced.to_owned());
        }
    }
    columns.retain(|c| !RESERVED_COLUMNS.contains(&c.as_str()));
    Ok(columns)
}

fn render_column_list(table: &str, columns: &[String]) -> String {
    let rendered: Vec<String> = columns
        .iter()
        .filter(|c| !RESERVED_COLUMNS.contains(&c.as_str()))
        .map(|c| format!("{table}.`{c}`"))
        .collect();
    rendered.join(", ")
}

/// Assemble the WHERE clause from the sort-key guard, the key condition,
/// and the filter, binding every referenced `:value` to a positional
/// parameter.
fn build_where_clause(
    request: &QueryRequest,
    sort_key: Option<&str>,
    statement: &mut Statement,
) -> Result<String, AdapterError> {
    let mut fragments: Vec<String> = Vec::new();

    // Forces index-friendly ordering on interleaved layouts.
    if let Some(sk) = sort_key {
        fragments.push(format!("{sk} IS NOT NULL"));
    }

    if let Some(expr) = request.key_condition.as_deref() {
        fragments.push(render_condition_sql(
            expr, "rangeExp", request, statement,
        )?);
    }
    if let Some(expr) = request.filter.as_deref() {
        fragments.push(render_condition_sql(
            expr, "filterExp", request, statement,
        )?);
    }

    let fragments: Vec<String> = fragments.into_iter().filter(|f| !f.is_empty()).collect();
    if fragments.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" WHERE {}", fragments.join(" AND ")))
    }
}

/// Lower one expression string into its SQL form: `#name` substitution,
/// `:value` → `@param` binding, `begins_with` → `STARTS_WITH`, and the
/// dotted-path `JSON_VALUE` rewrite.
fn render_condition_sql(
    expression: &str,
    param_prefix: &str,
    request: &QueryRequest,
    statement: &mut Statement,
) -> Result<String, AdapterError> {
    let mut sql = expression.to_owned();

    // Longest-first so `#ab` never partially matches `#a`.
    let mut names: Vec<(&String, &String)> = request.names.iter().collect();
    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
    for (token, column) in names {
        sql = sql.replace(token.as_str(), column);
    }

    let mut tokens: Vec<&String> = request.values.keys().collect();
    tokens.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let mut count = statement.params.len();
    for token in tokens {
        if !sql.contains(token.as_str()) {
            continue;
        }
        count += 1;
        let param = format!("{param_prefix}{count}");
        sql = sql.replace(token.as_str(), &format!("@{param}"));
        let value = &request.values[token];
        statement
            .params
            .insert(param, attribute_to_param(value)?);
    }

    sql = sql.replace("begins_with", "STARTS_WITH");
    Ok(rewrite_json_path(&sql))
}

/// Rewrite a whole-expression dotted path equality (`a.b.c = @p`) into
/// the backend's JSON extraction form (`JSON_VALUE(a, '$.b.c') = @p`).
fn rewrite_json_path(sql: &str) -> String {
    let trimmed = sql.trim();
    let Some((lhs, rhs)) = trimmed.split_once('=') else {
        return sql.to_owned();
    };
    let (lhs, rhs) = (lhs.trim(), rhs.trim());
    if !rhs.starts_with('@') || !rhs[1..].bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return sql.to_owned();
    }
    let segments: Vec<&str> = lhs.split('.').collect();
    if segments.len() < 2 || !segments.iter().all(|s| is_identifier(s)) {
        return sql.to_owned();
    }
    format!(
        "JSON_VALUE({col}, '$.{path}') = {rhs}",
        col = segments[0],
        path = segments[1..].join(".")
    )
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Bind an attribute value as a statement parameter.
fn attribute_to_param(value: &AttributeValue) -> Result<ColumnValue, AdapterError> {
    Ok(match value {
        AttributeValue::S(s) => ColumnValue::String(s.clone()),
        AttributeValue::N(n) => ColumnValue::Double(
            codec::parse_number(n).map_err(|e| AdapterError::validation(e.to_string()))?,
        ),
        AttributeValue::B(b) => ColumnValue::Bytes(b.clone()),
        AttributeValue::Bool(b) => ColumnValue::Bool(*b),
        AttributeValue::Null(_) => ColumnValue::Null,
        AttributeValue::Ss(v) => ColumnValue::StringArray(v.clone()),
        AttributeValue::Ns(v) => {
            let parsed = v
                .iter()
                .map(|n| codec::parse_number(n))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AdapterError::validation(e.to_string()))?;
            ColumnValue::DoubleArray(parsed)
        }
        AttributeValue::Bs(v) => ColumnValue::BytesArray(v.clone()),
        AttributeValue::L(_) | AttributeValue::M(_) => ColumnValue::Json(
            codec::attribute_to_json(value)
                .map_err(|e| AdapterError::validation(e.to_string()))?,
        ),
    })
}

/// FNV-1a, 64-bit. The fingerprint only needs to be stable, not strong.
fn fnv1a64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexConfig, TableConfig, TypeCode};

    fn employee_schema() -> SchemaRegistry {
        let mut registry = SchemaRegistry::seeded();
        registry.add_table(
            "employee",
            TableConfig {
                partition_key: "emp_id".to_owned(),
                sort_key: Some("start_date".to_owned()),
                actual_table: "employee".to_owned(),
                indices: HashMap::from([(
                    "status-index".to_owned(),
                    IndexConfig {
                        partition_key: "status".to_owned(),
                        sort_key: Some("age".to_owned()),
                        backend_index_name: None,
                    },
                )]),
                ..TableConfig::default()
            },
        );
        registry.set_ddl(
            "employee",
            &[
                ("emp_id", TypeCode::N),
                ("start_date", TypeCode::S),
                ("status", TypeCode::S),
                ("age", TypeCode::N),
                ("name", TypeCode::S),
                ("profile", TypeCode::M),
                ("commit_timestamp", TypeCode::S),
            ],
        );
        registry
    }

    fn base_request() -> QueryRequest {
        QueryRequest {
            table: "employee".to_owned(),
            ascending: true,
            limit: 5,
            ..QueryRequest::default()
        }
    }

    #[test]
    fn test_should_plan_key_condition_query() {
        let schema = employee_schema();
        let mut request = base_request();
        request.key_condition = Some("emp_id = :id".to_owned());
        request
            .values
            .insert(":id".to_owned(), AttributeValue::N("3".to_owned()));

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan.statement.sql.starts_with("SELECT employee.`emp_id`"));
        assert!(plan.statement.sql.contains("WHERE start_date IS NOT NULL"));
        assert!(plan.statement.sql.contains("emp_id = @rangeExp1"));
        assert!(plan.statement.sql.contains("ORDER BY start_date ASC"));
        assert!(plan.statement.sql.ends_with("LIMIT 6"));
        assert_eq!(
            plan.statement.params.get("rangeExp1"),
            Some(&ColumnValue::Double(3.0))
        );
        assert_eq!(plan.limit, 6);
        assert!(plan.key_condition.is_some());
    }

    #[test]
    fn test_should_rewrite_begins_with_to_starts_with() {
        let schema = employee_schema();
        let mut request = base_request();
        request.key_condition = Some("emp_id = :id".to_owned());
        request.filter = Some("begins_with(name, :prefix)".to_owned());
        request
            .values
            .insert(":id".to_owned(), AttributeValue::N("3".to_owned()));
        request
            .values
            .insert(":prefix".to_owned(), AttributeValue::S("Al".to_owned()));

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan.statement.sql.contains("STARTS_WITH(name, @filterExp2)"));
        assert!(!plan.statement.sql.contains("begins_with"));
    }

    #[test]
    fn test_should_rewrite_dotted_path_to_json_value() {
        let schema = employee_schema();
        let mut request = base_request();
        request.filter = Some("profile.city = :c".to_owned());
        request
            .values
            .insert(":c".to_owned(), AttributeValue::S("Pune".to_owned()));

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan
            .statement
            .sql
            .contains("JSON_VALUE(profile, '$.city') = @filterExp1"));
    }

    #[test]
    fn test_should_substitute_name_placeholders() {
        let schema = employee_schema();
        let mut request = base_request();
        request.key_condition = Some("#e = :id".to_owned());
        request.names.insert("#e".to_owned(), "emp_id".to_owned());
        request
            .values
            .insert(":id".to_owned(), AttributeValue::N("1".to_owned()));

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan.statement.sql.contains("emp_id = @rangeExp1"));
        assert!(!plan.statement.sql.contains('#'));
    }

    #[test]
    fn test_should_intersect_projection_and_force_key_columns() {
        let schema = employee_schema();
        let mut request = base_request();
        request.projection = Some("name, ghost".to_owned());

        let plan = plan_query(&request, &schema).unwrap();
        assert_eq!(plan.columns, vec!["name", "emp_id", "start_date"]);
        assert!(!plan.statement.sql.contains("ghost"));
    }

    #[test]
    fn test_should_drop_reserved_columns() {
        let schema = employee_schema();
        let request = base_request();
        let plan = plan_query(&request, &schema).unwrap();
        assert!(!plan.columns.iter().any(|c| c == "commit_timestamp"));
        assert!(!plan.statement.sql.contains("commit_timestamp"));
    }

    #[test]
    fn test_should_force_index_and_pull_table_partition() {
        let schema = employee_schema();
        let mut request = base_request();
        request.index_name = Some("status-index".to_owned());
        request.projection = Some("status".to_owned());

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan
            .statement
            .sql
            .contains("FROM employee@{FORCE_INDEX=status_index}"));
        assert_eq!(plan.partition_key, "status");
        assert_eq!(plan.sort_key.as_deref(), Some("age"));
        // Index-rooted plans also carry the table's real partition key.
        assert!(plan.columns.contains(&"emp_id".to_owned()));
        assert!(plan.statement.sql.contains("ORDER BY age ASC"));
    }

    #[test]
    fn test_should_plan_count_query() {
        let schema = employee_schema();
        let mut request = base_request();
        request.only_count = true;

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan.statement.sql.starts_with("SELECT COUNT(emp_id) AS count"));
        assert!(!plan.statement.sql.contains("ORDER BY"));
        assert!(!plan.statement.sql.contains("LIMIT"));
        assert!(plan.is_count);
    }

    #[test]
    fn test_should_emit_offset_and_descending_order() {
        let schema = employee_schema();
        let mut request = base_request();
        request.ascending = false;
        request.offset = 10;

        let plan = plan_query(&request, &schema).unwrap();
        assert!(plan.statement.sql.contains("ORDER BY start_date DESC"));
        assert!(plan.statement.sql.ends_with("OFFSET 10"));
    }

    #[test]
    fn test_should_fingerprint_sql_stably() {
        let schema = employee_schema();
        let request = base_request();
        let a = plan_query(&request, &schema).unwrap();
        let b = plan_query(&request, &schema).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, 0);
    }

    #[test]
    fn test_should_fail_on_unknown_table() {
        let schema = employee_schema();
        let mut request = base_request();
        request.table = "ghost".to_owned();
        assert!(plan_query(&request, &schema).is_err());
    }

    #[test]
    fn test_should_fail_on_malformed_filter() {
        let schema = employee_schema();
        let mut request = base_request();
        request.filter = Some("age >".to_owned());
        request
            .values
            .insert(":v".to_owned(), AttributeValue::N("1".to_owned()));
        assert!(plan_query(&request, &schema).is_err());
    }
}
