//! The update/transaction engine.
//!
//! Every write follows the same shape: resolve the table, validate and
//! compile expressions before any backend I/O, open a read/write
//! transaction, read the pre-image, evaluate the condition against that
//! transactional snapshot, compose the new row, buffer the mutation, and
//! commit. Retriable backend aborts re-run the whole transaction a
//! bounded number of times.

use std::collections::HashMap;
use std::sync::Arc;

use dynabridge_model::error::CancellationReason;
use dynabridge_model::input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, PutItemInput,
    QueryInput, ScanInput, TransactGetItemsInput, TransactWriteItemsInput, UpdateItemInput,
};
use dynabridge_model::output::{
    BatchGetItemOutput, BatchWriteItemOutput, DeleteItemOutput, GetItemOutput, PutItemOutput,
    QueryOutput, TransactGetItemsOutput, TransactWriteItemsOutput, UpdateItemOutput,
};
use dynabridge_model::types::{ItemResponse, ReturnValue, TransactWriteItem};
use dynabridge_model::{AdapterError, AttributeValue, Item};

use crate::backend::{
    Backend, BackendError, BackendTransaction, KeyValue, Mutation, PrimaryKey, ReadRequest,
    RETRY_ATTEMPTS,
};
use crate::codec::{self, CodecError, RawJsonMap, Row};
use crate::config::AdapterConfig;
use crate::expression::{
    parse_projection, parse_update, CompiledCondition, EvalContext, ExpressionError,
};
use crate::query::{plan_query, QueryRequest};
use crate::schema::{DdlMap, SchemaRegistry, SharedSchema, TableConfig};

/// The engine: all data-plane verbs against one backend.
#[derive(Debug, Clone)]
pub struct Engine {
    backend: Arc<dyn Backend>,
    schema: SharedSchema,
    config: Arc<AdapterConfig>,
}

impl Engine {
    /// Create an engine over a backend and a bootstrapped schema.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, schema: SharedSchema, config: AdapterConfig) -> Self {
        Self {
            backend,
            schema,
            config: Arc::new(config),
        }
    }

    /// The schema handle (used by the config refresher and tests).
    #[must_use]
    pub fn schema(&self) -> &SharedSchema {
        &self.schema
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn expr_error(e: ExpressionError) -> AdapterError {
    AdapterError::validation(e.to_string())
}

/// Encode-side codec failures: the caller sent something invalid.
fn encode_error(e: CodecError) -> AdapterError {
    AdapterError::validation(e.to_string())
}

/// Decode-side codec failures: the stored row references schema the
/// registry does not know, which reads as a missing resource.
fn decode_error(e: CodecError) -> AdapterError {
    match e {
        CodecError::UnknownColumn { .. } => AdapterError::resource_not_found(e.to_string()),
        other => AdapterError::internal(other.to_string()),
    }
}

fn backend_error(e: BackendError) -> AdapterError {
    match e {
        BackendError::NotFound(what) => {
            AdapterError::resource_not_found(format!("Requested resource not found: {what}"))
        }
        BackendError::InvalidArgument(msg) => AdapterError::validation(msg),
        other => AdapterError::internal(other.to_string()),
    }
}

/// Failure inside a transactional attempt; backend aborts are retriable.
enum WriteError {
    Backend(BackendError),
    Adapter(AdapterError),
}

impl From<BackendError> for WriteError {
    fn from(e: BackendError) -> Self {
        Self::Backend(e)
    }
}

impl From<AdapterError> for WriteError {
    fn from(e: AdapterError) -> Self {
        Self::Adapter(e)
    }
}

// ---------------------------------------------------------------------------
// Key handling
// ---------------------------------------------------------------------------

fn key_value(name: &str, value: &AttributeValue) -> Result<KeyValue, AdapterError> {
    match value {
        AttributeValue::S(s) => Ok(KeyValue::S(s.clone())),
        AttributeValue::N(n) => codec::parse_number(n)
            .map(KeyValue::N)
            .map_err(|e| AdapterError::validation(e.to_string())),
        AttributeValue::B(b) => Ok(KeyValue::B(b.clone())),
        other => Err(AdapterError::validation(format!(
            "key attribute {name} has unsupported type {}",
            other.type_code()
        ))),
    }
}

/// Extract the primary key from an item, enforcing the non-null key
/// invariants.
fn primary_key(config: &TableConfig, item: &Item) -> Result<PrimaryKey, AdapterError> {
    let partition = item.get(&config.partition_key).ok_or_else(|| {
        AdapterError::validation(format!(
            "missing required key attribute {}",
            config.partition_key
        ))
    })?;
    let partition = key_value(&config.partition_key, partition)?;

    let sort = match &config.sort_key {
        Some(sort_key) => {
            let value = item.get(sort_key).ok_or_else(|| {
                AdapterError::validation(format!("missing required key attribute {sort_key}"))
            })?;
            Some(key_value(sort_key, value)?)
        }
        None => None,
    };

    Ok(PrimaryKey { partition, sort })
}

/// Columns a conditional read must cover: the condition's columns
/// restricted to declared ones. Empty means "read everything".
fn condition_read_columns(
    condition: Option<&CompiledCondition>,
    schema: &SchemaRegistry,
    backend_table: &str,
) -> Result<Vec<String>, AdapterError> {
    let Some(condition) = condition else {
        return Ok(Vec::new());
    };
    let declared = schema.require_columns(backend_table)?;
    Ok(condition
        .columns
        .iter()
        .filter(|c| declared.iter().any(|d| d == *c))
        .cloned()
        .collect())
}

/// Read and decode the pre-image inside a transaction.
async fn read_pre_image(
    txn: &mut Box<dyn BackendTransaction>,
    backend_table: &str,
    key: &PrimaryKey,
    columns: &[String],
    ddl: &DdlMap,
) -> Result<(Item, RawJsonMap), WriteError> {
    let row = txn.read_row(backend_table, key, columns).await?;
    match row {
        Some(row) => decode_row_or(&row, ddl),
        None => Ok((Item::new(), RawJsonMap::new())),
    }
}

fn decode_row_or(row: &Row, ddl: &DdlMap) -> Result<(Item, RawJsonMap), WriteError> {
    codec::decode_row(row, ddl).map_err(|e| WriteError::Adapter(decode_error(e)))
}

fn check_condition(
    condition: Option<&CompiledCondition>,
    pre_image: &Item,
) -> Result<(), WriteError> {
    if let Some(condition) = condition {
        let holds = condition
            .evaluate(pre_image)
            .map_err(|e| WriteError::Adapter(expr_error(e)))?;
        if !holds {
            return Err(WriteError::Adapter(AdapterError::conditional_check_failed(
                "The conditional request failed",
            )));
        }
    }
    Ok(())
}

/// Encode the post-image, reusing the stored JSON of `M` columns the
/// update did not touch so their payloads are written back byte-stable
/// instead of being re-encoded through the tag model.
fn encode_post_row(
    post: &Item,
    pre: &Item,
    raw: &RawJsonMap,
    ddl: &DdlMap,
) -> Result<Row, AdapterError> {
    let mut row = codec::encode_item(post, ddl).map_err(encode_error)?;
    for (column, raw_json) in raw {
        if post.get(column) == pre.get(column) {
            row.insert(column.clone(), codec::ColumnValue::Json(raw_json.clone()));
        }
    }
    Ok(row)
}

fn return_attributes(
    requested: Option<ReturnValue>,
    pre_image: &Item,
    post_image: &Item,
) -> Item {
    match requested.unwrap_or_default() {
        ReturnValue::None => Item::new(),
        // UPDATED_* return the ALL_* shapes.
        ReturnValue::AllOld | ReturnValue::UpdatedOld => pre_image.clone(),
        ReturnValue::AllNew | ReturnValue::UpdatedNew => post_image.clone(),
    }
}

// ---------------------------------------------------------------------------
// Point reads
// ---------------------------------------------------------------------------

impl Engine {
    /// `GetItem`: one strongly consistent point read.
    pub async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let config = schema.require_table(&input.table_name)?;
        let key = primary_key(config, &input.key)?;
        let ddl = schema.require_ddl(&config.actual_table)?;

        let read_columns = projection_read_columns(
            input.projection_expression.as_deref(),
            &input.expression_attribute_names,
            &schema,
            &config.actual_table,
        )?;

        let row = self
            .backend
            .read_row(&config.actual_table, &key, &read_columns)
            .await
            .map_err(backend_error)?;

        let Some(row) = row else {
            return Ok(GetItemOutput { item: None });
        };
        let (item, _) = codec::decode_row(&row, ddl).map_err(decode_error)?;
        let item = apply_nested_projection(
            item,
            input.projection_expression.as_deref(),
            &input.expression_attribute_names,
        )?;

        Ok(GetItemOutput {
            item: if item.is_empty() { None } else { Some(item) },
        })
    }

    /// `BatchGetItem`: one multi-point read per table.
    pub async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let mut responses: HashMap<String, Vec<Item>> = HashMap::new();

        for (table_name, block) in &input.request_items {
            let config = schema.require_table(table_name)?;
            let ddl = schema.require_ddl(&config.actual_table)?;
            let keys = block
                .keys
                .iter()
                .map(|k| primary_key(config, k))
                .collect::<Result<Vec<_>, _>>()?;

            let read_columns = projection_read_columns(
                block.projection_expression.as_deref(),
                &block.expression_attribute_names,
                &schema,
                &config.actual_table,
            )?;

            let rows = self
                .backend
                .batch_read(&config.actual_table, &keys, &read_columns)
                .await
                .map_err(backend_error)?;

            let mut items = Vec::with_capacity(rows.len());
            for row in &rows {
                let (item, _) = codec::decode_row(row, ddl).map_err(decode_error)?;
                let item = apply_nested_projection(
                    item,
                    block.projection_expression.as_deref(),
                    &block.expression_attribute_names,
                )?;
                if !item.is_empty() {
                    items.push(item);
                }
            }
            if !items.is_empty() {
                responses.insert(table_name.clone(), items);
            }
        }

        Ok(BatchGetItemOutput {
            responses,
            unprocessed_keys: HashMap::new(),
        })
    }

    /// `TransactGetItems`: every key answered from one consistent
    /// snapshot.
    pub async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let mut requests = Vec::with_capacity(input.transact_items.len());
        let mut tables = Vec::with_capacity(input.transact_items.len());

        for item in &input.transact_items {
            let get = &item.get;
            let config = schema.require_table(&get.table_name)?;
            let key = primary_key(config, &get.key)?;
            let columns = projection_read_columns(
                get.projection_expression.as_deref(),
                &get.expression_attribute_names,
                &schema,
                &config.actual_table,
            )?;
            tables.push((get.table_name.clone(), config.actual_table.clone()));
            requests.push(ReadRequest {
                table: config.actual_table.clone(),
                key,
                columns,
            });
        }

        let rows = self
            .backend
            .transact_read(&requests)
            .await
            .map_err(backend_error)?;

        let mut responses = Vec::with_capacity(rows.len());
        for (row, (logical, backend_table)) in rows.into_iter().zip(tables) {
            let ddl = schema.require_ddl(&backend_table)?;
            let item = match row {
                Some(row) => codec::decode_row(&row, ddl).map_err(decode_error)?.0,
                None => Item::new(),
            };
            responses.push(ItemResponse {
                table_name: Some(logical),
                item,
            });
        }

        Ok(TransactGetItemsOutput { responses })
    }
}

// ---------------------------------------------------------------------------
// Single-item writes
// ---------------------------------------------------------------------------

impl Engine {
    /// `PutItem`: conditional full-row replace.
    pub async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let config = schema.require_table(&input.table_name)?;
        let ddl = schema.require_ddl(&config.actual_table)?;
        let key = primary_key(config, &input.item)?;

        // Validate and encode before any backend I/O.
        let row = codec::encode_item(&input.item, ddl).map_err(encode_error)?;

        let condition = input
            .condition_expression
            .as_deref()
            .map(|expr| {
                CompiledCondition::compile(
                    expr,
                    &input.expression_attribute_names,
                    &input.expression_attribute_values,
                )
            })
            .transpose()
            .map_err(expr_error)?;

        let wants_pre_image = input.return_values.unwrap_or_default() != ReturnValue::None;
        let read_columns = if wants_pre_image {
            Vec::new()
        } else {
            condition_read_columns(condition.as_ref(), &schema, &config.actual_table)?
        };
        let needs_read = condition.is_some() || wants_pre_image;

        let backend_table = config.actual_table.clone();
        let pre_image = self
            .run_write(|| {
                let row = row.clone();
                let key = key.clone();
                let backend_table = backend_table.clone();
                let condition = condition.clone();
                let read_columns = read_columns.clone();
                async move {
                    let mut txn = self.backend.begin().await?;
                    let pre_image = if needs_read {
                        read_pre_image(&mut txn, &backend_table, &key, &read_columns, ddl)
                            .await?
                            .0
                    } else {
                        Item::new()
                    };
                    if let Err(e) = check_condition(condition.as_ref(), &pre_image) {
                        txn.rollback().await?;
                        return Err(e);
                    }
                    txn.buffer(Mutation::InsertOrUpdate {
                        table: backend_table,
                        row,
                    });
                    txn.commit().await?;
                    Ok(pre_image)
                }
            })
            .await?;

        // ALL_NEW merges the prior image under the written attributes.
        let mut post_image = pre_image.clone();
        post_image.extend(input.item.clone());

        Ok(PutItemOutput {
            attributes: return_attributes(input.return_values, &pre_image, &post_image),
        })
    }

    /// `UpdateItem`: read-modify-write under one transaction.
    pub async fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> Result<UpdateItemOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let config = schema.require_table(&input.table_name)?;
        let ddl = schema.require_ddl(&config.actual_table)?;
        let key = primary_key(config, &input.key)?;

        let update = input
            .update_expression
            .as_deref()
            .map(parse_update)
            .transpose()
            .map_err(expr_error)?;

        let condition = input
            .condition_expression
            .as_deref()
            .map(|expr| {
                CompiledCondition::compile(
                    expr,
                    &input.expression_attribute_names,
                    &input.expression_attribute_values,
                )
            })
            .transpose()
            .map_err(expr_error)?;

        let backend_table = config.actual_table.clone();
        let (pre_image, post_image) = self
            .run_write(|| {
                let key = key.clone();
                let backend_table = backend_table.clone();
                let condition = condition.clone();
                let update = update.clone();
                let input_key = input.key.clone();
                let names = input.expression_attribute_names.clone();
                let values = input.expression_attribute_values.clone();
                async move {
                    let mut txn = self.backend.begin().await?;
                    let (pre_image, raw) =
                        read_pre_image(&mut txn, &backend_table, &key, &[], ddl).await?;

                    if let Err(e) = check_condition(condition.as_ref(), &pre_image) {
                        txn.rollback().await?;
                        return Err(e);
                    }

                    // The row written is a function of the pre-image, the
                    // update expression, and the value map.
                    let base = if pre_image.is_empty() {
                        input_key.clone()
                    } else {
                        pre_image.clone()
                    };
                    let post_image = match &update {
                        Some(update) => {
                            let ctx = EvalContext {
                                item: &base,
                                names: &names,
                                values: &values,
                            };
                            ctx.apply_update(update)
                                .map_err(|e| WriteError::Adapter(expr_error(e)))?
                        }
                        None => base,
                    };

                    let row = encode_post_row(&post_image, &pre_image, &raw, ddl)
                        .map_err(WriteError::Adapter)?;
                    txn.buffer(Mutation::InsertOrUpdate {
                        table: backend_table,
                        row,
                    });
                    txn.commit().await?;
                    Ok((pre_image, post_image))
                }
            })
            .await?;

        Ok(UpdateItemOutput {
            attributes: return_attributes(input.return_values, &pre_image, &post_image),
        })
    }

    /// `DeleteItem`: conditional delete by primary key.
    pub async fn delete_item(
        &self,
        input: DeleteItemInput,
    ) -> Result<DeleteItemOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let config = schema.require_table(&input.table_name)?;
        let ddl = schema.require_ddl(&config.actual_table)?;
        let key = primary_key(config, &input.key)?;

        let condition = input
            .condition_expression
            .as_deref()
            .map(|expr| {
                CompiledCondition::compile(
                    expr,
                    &input.expression_attribute_names,
                    &input.expression_attribute_values,
                )
            })
            .transpose()
            .map_err(expr_error)?;

        let wants_pre_image = input.return_values.unwrap_or_default().wants_old();
        let read_columns = if wants_pre_image {
            Vec::new()
        } else {
            condition_read_columns(condition.as_ref(), &schema, &config.actual_table)?
        };
        let needs_read = condition.is_some() || wants_pre_image;

        let backend_table = config.actual_table.clone();
        let pre_image = self
            .run_write(|| {
                let key = key.clone();
                let backend_table = backend_table.clone();
                let condition = condition.clone();
                let read_columns = read_columns.clone();
                async move {
                    let mut txn = self.backend.begin().await?;
                    let pre_image = if needs_read {
                        read_pre_image(&mut txn, &backend_table, &key, &read_columns, ddl)
                            .await?
                            .0
                    } else {
                        Item::new()
                    };
                    if let Err(e) = check_condition(condition.as_ref(), &pre_image) {
                        txn.rollback().await?;
                        return Err(e);
                    }
                    txn.buffer(Mutation::Delete {
                        table: backend_table,
                        key,
                    });
                    txn.commit().await?;
                    Ok(pre_image)
                }
            })
            .await?;

        let attributes = if input.return_values.unwrap_or_default().wants_old() {
            pre_image
        } else {
            Item::new()
        };
        Ok(DeleteItemOutput { attributes })
    }

    /// Run one transactional write attempt, retrying on backend aborts.
    async fn run_write<T, F, Fut>(&self, attempt: F) -> Result<T, AdapterError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WriteError>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(WriteError::Backend(e)) if e.is_retriable() && tries < RETRY_ATTEMPTS => {
                    tracing::warn!(attempt = tries, "transaction aborted, retrying");
                }
                Err(WriteError::Backend(e)) => return Err(backend_error(e)),
                Err(WriteError::Adapter(e)) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Batch writes
// ---------------------------------------------------------------------------

impl Engine {
    /// `BatchWriteItem`: every sub-request becomes one mutation; the
    /// vector is applied in a single backend call. Sub-requests carry no
    /// conditions, so validation failures fail fast while apply failures
    /// report the whole batch as unprocessed.
    pub async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let mut mutations = Vec::new();

        for (table_name, requests) in &input.request_items {
            let config = schema.require_table(table_name)?;
            let ddl = schema.require_ddl(&config.actual_table)?;

            for request in requests {
                if let Some(put) = &request.put_request {
                    primary_key(config, &put.item)?;
                    let row = codec::encode_item(&put.item, ddl).map_err(encode_error)?;
                    mutations.push(Mutation::InsertOrUpdate {
                        table: config.actual_table.clone(),
                        row,
                    });
                } else if let Some(delete) = &request.delete_request {
                    let key = primary_key(config, &delete.key)?;
                    mutations.push(Mutation::Delete {
                        table: config.actual_table.clone(),
                        key,
                    });
                }
            }
        }

        match self.backend.apply(mutations).await {
            Ok(()) => Ok(BatchWriteItemOutput {
                unprocessed_items: HashMap::new(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "batch write failed, reporting items unprocessed");
                Ok(BatchWriteItemOutput {
                    unprocessed_items: input.request_items,
                })
            }
        }
    }

    /// `TransactWriteItems`: one read/write transaction over all
    /// sub-requests; any condition failure cancels the whole batch.
    pub async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, AdapterError> {
        let schema = self.schema.snapshot();

        self.run_write(|| {
            let schema = Arc::clone(&schema);
            let items = input.transact_items.clone();
            async move {
                let mut txn = self.backend.begin().await?;
                for (index, item) in items.iter().enumerate() {
                    if let Err(reason) = self
                        .stage_transact_item(&mut txn, &schema, item)
                        .await?
                    {
                        txn.rollback().await?;
                        let mut reasons: Vec<CancellationReason> =
                            items.iter().map(|_| CancellationReason::none()).collect();
                        reasons[index] = reason;
                        return Err(WriteError::Adapter(AdapterError::transaction_canceled(
                            reasons,
                        )));
                    }
                }
                txn.commit().await?;
                Ok(())
            }
        })
        .await?;

        Ok(TransactWriteItemsOutput {})
    }

    /// Stage one transact sub-request: run its condition against the
    /// transactional snapshot and buffer its mutation. A condition
    /// failure is reported as a cancellation reason, not an error.
    async fn stage_transact_item(
        &self,
        txn: &mut Box<dyn BackendTransaction>,
        schema: &SchemaRegistry,
        item: &TransactWriteItem,
    ) -> Result<Result<(), CancellationReason>, WriteError> {
        if let Some(put) = &item.put {
            let config = schema.require_table(&put.table_name).map_err(WriteError::Adapter)?;
            let ddl = schema
                .require_ddl(&config.actual_table)
                .map_err(WriteError::Adapter)?;
            let key = primary_key(config, &put.item).map_err(WriteError::Adapter)?;
            let row = codec::encode_item(&put.item, ddl)
                .map_err(|e| WriteError::Adapter(encode_error(e)))?;

            let condition = compile_optional(
                put.condition_expression.as_deref(),
                &put.expression_attribute_names,
                &put.expression_attribute_values,
            )?;
            if let Some(condition) = &condition {
                let columns = condition_read_columns(Some(condition), schema, &config.actual_table)
                    .map_err(WriteError::Adapter)?;
                let (pre_image, _) =
                    read_pre_image(txn, &config.actual_table, &key, &columns, ddl).await?;
                if !condition
                    .evaluate(&pre_image)
                    .map_err(|e| WriteError::Adapter(expr_error(e)))?
                {
                    return Ok(Err(CancellationReason::conditional_check_failed(
                        "The conditional request failed",
                    )));
                }
            }
            txn.buffer(Mutation::InsertOrUpdate {
                table: config.actual_table.clone(),
                row,
            });
            return Ok(Ok(()));
        }

        if let Some(update) = &item.update {
            let config = schema
                .require_table(&update.table_name)
                .map_err(WriteError::Adapter)?;
            let ddl = schema
                .require_ddl(&config.actual_table)
                .map_err(WriteError::Adapter)?;
            let key = primary_key(config, &update.key).map_err(WriteError::Adapter)?;
            let parsed = parse_update(&update.update_expression)
                .map_err(|e| WriteError::Adapter(expr_error(e)))?;
            let condition = compile_optional(
                update.condition_expression.as_deref(),
                &update.expression_attribute_names,
                &update.expression_attribute_values,
            )?;

            let (pre_image, raw) =
                read_pre_image(txn, &config.actual_table, &key, &[], ddl).await?;
            if let Some(condition) = &condition {
                if !condition
                    .evaluate(&pre_image)
                    .map_err(|e| WriteError::Adapter(expr_error(e)))?
                {
                    return Ok(Err(CancellationReason::conditional_check_failed(
                        "The conditional request failed",
                    )));
                }
            }

            let base = if pre_image.is_empty() {
                update.key.clone()
            } else {
                pre_image.clone()
            };
            let ctx = EvalContext {
                item: &base,
                names: &update.expression_attribute_names,
                values: &update.expression_attribute_values,
            };
            let post_image = ctx
                .apply_update(&parsed)
                .map_err(|e| WriteError::Adapter(expr_error(e)))?;
            let row = encode_post_row(&post_image, &pre_image, &raw, ddl)
                .map_err(WriteError::Adapter)?;
            txn.buffer(Mutation::InsertOrUpdate {
                table: config.actual_table.clone(),
                row,
            });
            return Ok(Ok(()));
        }

        if let Some(delete) = &item.delete {
            let config = schema
                .require_table(&delete.table_name)
                .map_err(WriteError::Adapter)?;
            let ddl = schema
                .require_ddl(&config.actual_table)
                .map_err(WriteError::Adapter)?;
            let key = primary_key(config, &delete.key).map_err(WriteError::Adapter)?;
            let condition = compile_optional(
                delete.condition_expression.as_deref(),
                &delete.expression_attribute_names,
                &delete.expression_attribute_values,
            )?;
            if let Some(condition) = &condition {
                let columns = condition_read_columns(Some(condition), schema, &config.actual_table)
                    .map_err(WriteError::Adapter)?;
                let (pre_image, _) =
                    read_pre_image(txn, &config.actual_table, &key, &columns, ddl).await?;
                if !condition
                    .evaluate(&pre_image)
                    .map_err(|e| WriteError::Adapter(expr_error(e)))?
                {
                    return Ok(Err(CancellationReason::conditional_check_failed(
                        "The conditional request failed",
                    )));
                }
            }
            txn.buffer(Mutation::Delete {
                table: config.actual_table.clone(),
                key,
            });
            return Ok(Ok(()));
        }

        if let Some(check) = &item.condition_check {
            let config = schema
                .require_table(&check.table_name)
                .map_err(WriteError::Adapter)?;
            let ddl = schema
                .require_ddl(&config.actual_table)
                .map_err(WriteError::Adapter)?;
            let key = primary_key(config, &check.key).map_err(WriteError::Adapter)?;
            let condition = CompiledCondition::compile(
                &check.condition_expression,
                &check.expression_attribute_names,
                &check.expression_attribute_values,
            )
            .map_err(|e| WriteError::Adapter(expr_error(e)))?;
            let columns = condition_read_columns(Some(&condition), schema, &config.actual_table)
                .map_err(WriteError::Adapter)?;
            let (pre_image, _) =
                read_pre_image(txn, &config.actual_table, &key, &columns, ddl).await?;
            if !condition
                .evaluate(&pre_image)
                .map_err(|e| WriteError::Adapter(expr_error(e)))?
            {
                return Ok(Err(CancellationReason::conditional_check_failed(
                    "The conditional request failed",
                )));
            }
            return Ok(Ok(()));
        }

        Err(WriteError::Adapter(AdapterError::validation(
            "a TransactWriteItems entry must contain Put, Update, Delete, or ConditionCheck",
        )))
    }
}

fn compile_optional(
    expression: Option<&str>,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> Result<Option<CompiledCondition>, WriteError> {
    expression
        .map(|expr| CompiledCondition::compile(expr, names, values))
        .transpose()
        .map_err(|e| WriteError::Adapter(expr_error(e)))
}

// ---------------------------------------------------------------------------
// Query & Scan
// ---------------------------------------------------------------------------

impl Engine {
    /// `Query`: key-condition-bounded read through the planner.
    pub async fn query(&self, input: QueryInput) -> Result<QueryOutput, AdapterError> {
        if input.key_condition_expression.is_none() {
            return Err(AdapterError::validation(
                "KeyConditionExpression is required for Query",
            ));
        }
        let request = QueryRequest {
            table: input.table_name,
            index_name: input.index_name,
            key_condition: input.key_condition_expression,
            filter: input.filter_expression,
            projection: input.projection_expression,
            names: input.expression_attribute_names,
            values: input.expression_attribute_values,
            ascending: input.scan_index_forward.unwrap_or(true),
            limit: self.effective_limit(input.limit, self.config.backend.dynamo_query_limit),
            offset: start_key_offset(&input.exclusive_start_key)?,
            only_count: is_count_select(input.select.as_deref()),
        };
        self.run_planned_query(request).await
    }

    /// `Scan`: the same pipeline without a key condition.
    pub async fn scan(&self, input: ScanInput) -> Result<QueryOutput, AdapterError> {
        let request = QueryRequest {
            table: input.table_name,
            index_name: input.index_name,
            key_condition: None,
            filter: input.filter_expression,
            projection: input.projection_expression,
            names: input.expression_attribute_names,
            values: input.expression_attribute_values,
            ascending: true,
            limit: self.effective_limit(input.limit, self.config.backend.query_limit),
            offset: start_key_offset(&input.exclusive_start_key)?,
            only_count: is_count_select(input.select.as_deref()),
        };
        self.run_planned_query(request).await
    }

    fn effective_limit(&self, requested: Option<i64>, default: i64) -> i64 {
        match requested {
            Some(limit) if limit > 0 => limit,
            _ => {
                if default > 0 {
                    default
                } else {
                    5000
                }
            }
        }
    }

    async fn run_planned_query(&self, request: QueryRequest) -> Result<QueryOutput, AdapterError> {
        let schema = self.schema.snapshot();
        let config = schema.require_table(&request.table)?;
        let table_partition = config.partition_key.clone();
        let table_sort = config.sort_key.clone();
        let original_limit = request.limit;
        let offset = request.offset;

        let plan = plan_query(&request, &schema)?;
        tracing::debug!(
            sql = %plan.statement.sql,
            fingerprint = plan.fingerprint,
            "executing planned query"
        );
        let ddl = schema.require_ddl(&plan.table)?;

        let rows = self
            .backend
            .execute_query(&plan)
            .await
            .map_err(backend_error)?;

        if plan.is_count {
            let count = rows
                .first()
                .and_then(|row| row.get("count"))
                .and_then(|v| match v {
                    codec::ColumnValue::Double(d) => Some(*d),
                    _ => None,
                })
                .unwrap_or(0.0);
            #[allow(clippy::cast_possible_truncation)]
            return Ok(QueryOutput {
                items: Vec::new(),
                count: count as i64,
                last_evaluated_key: Item::new(),
            });
        }

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let (item, _) = codec::decode_row(row, ddl).map_err(decode_error)?;
            items.push(item);
        }

        // One sentinel row past the page means more data exists.
        let page_size = usize::try_from(original_limit).unwrap_or(usize::MAX);
        let has_more = items.len() > page_size;
        let mut last_evaluated_key = Item::new();
        if has_more {
            items.truncate(page_size);
            if let Some(last) = items.last() {
                last_evaluated_key.insert(
                    "offset".to_owned(),
                    AttributeValue::N((offset + original_limit).to_string()),
                );
                for key_column in [
                    Some(plan.partition_key.as_str()),
                    plan.sort_key.as_deref(),
                    Some(table_partition.as_str()),
                    table_sort.as_deref(),
                ]
                .into_iter()
                .flatten()
                {
                    if let Some(value) = last.get(key_column) {
                        last_evaluated_key.insert(key_column.to_owned(), value.clone());
                    }
                }
            }
        }

        let count = i64::try_from(items.len()).unwrap_or(i64::MAX);
        Ok(QueryOutput {
            items,
            count,
            last_evaluated_key,
        })
    }
}

fn is_count_select(select: Option<&str>) -> bool {
    select.is_some_and(|s| s.eq_ignore_ascii_case("COUNT"))
}

/// Pull the continuation offset out of an `ExclusiveStartKey`.
fn start_key_offset(start_key: &Item) -> Result<i64, AdapterError> {
    match start_key.get("offset") {
        Some(AttributeValue::N(n)) => {
            let parsed = codec::parse_number(n)
                .map_err(|e| AdapterError::validation(e.to_string()))?;
            #[allow(clippy::cast_possible_truncation)]
            Ok(parsed as i64)
        }
        Some(other) => Err(AdapterError::validation(format!(
            "ExclusiveStartKey offset has unsupported type {}",
            other.type_code()
        ))),
        None => Ok(0),
    }
}

// ---------------------------------------------------------------------------
// Projection helpers
// ---------------------------------------------------------------------------

/// Top-level columns a projected read must fetch; empty means all.
fn projection_read_columns(
    projection: Option<&str>,
    names: &HashMap<String, String>,
    schema: &SchemaRegistry,
    backend_table: &str,
) -> Result<Vec<String>, AdapterError> {
    let Some(projection) = projection else {
        return Ok(Vec::new());
    };
    if projection.trim().is_empty() {
        return Ok(Vec::new());
    }
    let declared = schema.require_columns(backend_table)?;
    let mut columns = Vec::new();
    for raw in projection.split(',') {
        let token = raw.trim();
        // Dotted projections read the whole top-level column; the nested
        // cut happens after decode.
        let top = token.split('.').next().unwrap_or(token).trim();
        let resolved = names.get(top).map_or(top, String::as_str);
        if declared.iter().any(|c| c == resolved) && !columns.iter().any(|c| c == resolved) {
            columns.push(resolved.to_owned());
        }
    }
    Ok(columns)
}

/// Cut a decoded item down to nested projection paths, when any exist.
fn apply_nested_projection(
    item: Item,
    projection: Option<&str>,
    names: &HashMap<String, String>,
) -> Result<Item, AdapterError> {
    let Some(projection) = projection else {
        return Ok(item);
    };
    if projection.trim().is_empty() || !projection.contains('.') {
        return Ok(item);
    }
    let paths = parse_projection(projection).map_err(expr_error)?;
    let empty_values = HashMap::new();
    let ctx = EvalContext {
        item: &item,
        names,
        values: &empty_values,
    };
    Ok(ctx.apply_projection(&paths))
}
