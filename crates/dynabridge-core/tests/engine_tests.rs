//! End-to-end engine tests against the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use dynabridge_core::backend::memory::MemoryBackend;
use dynabridge_core::config::AdapterConfig;
use dynabridge_core::engine::Engine;
use dynabridge_core::partiql;
use dynabridge_core::schema::{IndexConfig, SchemaRegistry, SharedSchema, TableConfig, TypeCode};
use dynabridge_model::input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, ExecuteStatementInput, GetItemInput,
    PutItemInput, QueryInput, ScanInput, TransactGetItemsInput, TransactWriteItemsInput,
    UpdateItemInput,
};
use dynabridge_model::types::{
    DeleteRequest, KeysAndAttributes, PutRequest, ReturnValue, TransactConditionCheck, TransactGet,
    TransactGetItem, TransactPut, TransactUpdate, TransactWriteItem, WriteRequest,
};
use dynabridge_model::{AdapterErrorCode, AttributeValue, Item};

fn s(text: &str) -> AttributeValue {
    AttributeValue::S(text.to_owned())
}

fn n(text: &str) -> AttributeValue {
    AttributeValue::N(text.to_owned())
}

fn ss(values: &[&str]) -> AttributeValue {
    AttributeValue::Ss(values.iter().map(|v| (*v).to_owned()).collect())
}

fn list(values: &[AttributeValue]) -> AttributeValue {
    AttributeValue::L(values.to_vec())
}

fn item(pairs: &[(&str, AttributeValue)]) -> Item {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn values(pairs: &[(&str, AttributeValue)]) -> HashMap<String, AttributeValue> {
    item(pairs)
}

/// Engine over an in-memory backend with three tables:
/// `records` (id S), `employee` (emp_id N, start_date S, status index),
/// and `rank_data` (rank_list S).
fn test_engine() -> (Engine, MemoryBackend) {
    let backend = MemoryBackend::new();
    backend.register_table("records", "id", None);
    backend.register_table("employee", "emp_id", Some("start_date".to_owned()));
    backend.register_table("rank_data", "rank_list", None);

    let mut registry = SchemaRegistry::seeded();
    registry.add_table(
        "records",
        TableConfig {
            partition_key: "id".to_owned(),
            actual_table: "records".to_owned(),
            ..TableConfig::default()
        },
    );
    registry.set_ddl(
        "records",
        &[
            ("id", TypeCode::S),
            ("count", TypeCode::N),
            ("tags", TypeCode::Ss),
            ("list_type", TypeCode::L),
            ("name", TypeCode::S),
            ("profile", TypeCode::M),
        ],
    );

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
                    sort_key: Some("start_date".to_owned()),
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
            ("name", TypeCode::S),
            ("status", TypeCode::S),
            ("age", TypeCode::N),
        ],
    );

    registry.add_table(
        "rank_data",
        TableConfig {
            partition_key: "rank_list".to_owned(),
            actual_table: "rank_data".to_owned(),
            ..TableConfig::default()
        },
    );
    registry.set_ddl(
        "rank_data",
        &[("rank_list", TypeCode::S), ("list_type", TypeCode::L)],
    );

    let engine = Engine::new(
        Arc::new(backend.clone()),
        SharedSchema::new(registry),
        AdapterConfig::default(),
    );
    (engine, backend)
}

async fn put(engine: &Engine, table: &str, record: Item) {
    engine
        .put_item(PutItemInput {
            table_name: table.to_owned(),
            item: record,
            ..PutItemInput::default()
        })
        .await
        .expect("put");
}

async fn fetch(engine: &Engine, table: &str, key: Item) -> Option<Item> {
    engine
        .get_item(GetItemInput {
            table_name: table.to_owned(),
            key,
            ..GetItemInput::default()
        })
        .await
        .expect("get")
        .item
}

// ---------------------------------------------------------------------------
// Point reads and writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_put_then_get_item() {
    let (engine, _) = test_engine();
    put(
        &engine,
        "records",
        item(&[("id", s("1")), ("name", s("Alice")), ("count", n("10"))]),
    )
    .await;

    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("name"), Some(&s("Alice")));
    assert_eq!(got.get("count"), Some(&n("10")));
}

#[tokio::test]
async fn test_should_return_none_for_missing_item() {
    let (engine, _) = test_engine();
    assert!(fetch(&engine, "records", item(&[("id", s("ghost"))])).await.is_none());
}

#[tokio::test]
async fn test_should_fail_on_unknown_table() {
    let (engine, _) = test_engine();
    let err = engine
        .get_item(GetItemInput {
            table_name: "nope".to_owned(),
            key: item(&[("id", s("1"))]),
            ..GetItemInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ResourceNotFoundException);
}

#[tokio::test]
async fn test_should_reject_item_with_undeclared_attribute() {
    let (engine, _) = test_engine();
    let err = engine
        .put_item(PutItemInput {
            table_name: "records".to_owned(),
            item: item(&[("id", s("1")), ("ghost", s("x"))]),
            ..PutItemInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ValidationException);
}

#[tokio::test]
async fn test_should_reject_item_missing_partition_key() {
    let (engine, _) = test_engine();
    let err = engine
        .put_item(PutItemInput {
            table_name: "records".to_owned(),
            item: item(&[("name", s("x"))]),
            ..PutItemInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ValidationException);
}

#[tokio::test]
async fn test_should_project_with_name_substitution() {
    let (engine, _) = test_engine();
    put(
        &engine,
        "records",
        item(&[("id", s("1")), ("name", s("Alice")), ("count", n("3"))]),
    )
    .await;

    let got = engine
        .get_item(GetItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            projection_expression: Some("#n".to_owned()),
            expression_attribute_names: HashMap::from([("#n".to_owned(), "name".to_owned())]),
            ..GetItemInput::default()
        })
        .await
        .unwrap()
        .item
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got.get("name"), Some(&s("Alice")));
}

// ---------------------------------------------------------------------------
// Spec scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_set_with_numeric_increment() {
    // Scenario 1: SET count = count + :incr over {id: "1", count: 10}.
    let (engine, _) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("10"))])).await;

    let output = engine
        .update_item(UpdateItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            update_expression: Some("SET count = count + :incr".to_owned()),
            expression_attribute_values: values(&[(":incr", n("1"))]),
            return_values: Some(ReturnValue::AllNew),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();

    assert_eq!(output.attributes.get("count"), Some(&n("11")));
    assert_eq!(output.attributes.get("id"), Some(&s("1")));

    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("count"), Some(&n("11")));
}

#[tokio::test]
async fn test_should_add_to_string_set() {
    // Scenario 2: ADD tags :v unions into the stored set.
    let (engine, _) = test_engine();
    put(
        &engine,
        "records",
        item(&[("id", s("1")), ("tags", ss(&["oldTag"]))]),
    )
    .await;

    engine
        .update_item(UpdateItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            update_expression: Some("ADD tags :v".to_owned()),
            expression_attribute_values: values(&[(":v", ss(&["newTag"]))]),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();

    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    let AttributeValue::Ss(tags) = got.get("tags").unwrap() else {
        panic!("expected SS");
    };
    assert_eq!(tags.len(), 2);
    assert!(tags.contains(&"oldTag".to_owned()));
    assert!(tags.contains(&"newTag".to_owned()));
}

#[tokio::test]
async fn test_should_delete_from_string_set() {
    // Scenario 3: DELETE tags :v removes elements.
    let (engine, _) = test_engine();
    put(
        &engine,
        "records",
        item(&[("id", s("1")), ("tags", ss(&["oldTag", "newTag"]))]),
    )
    .await;

    engine
        .update_item(UpdateItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            update_expression: Some("DELETE tags :v".to_owned()),
            expression_attribute_values: values(&[(":v", ss(&["oldTag"]))]),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();

    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("tags"), Some(&ss(&["newTag"])));
}

#[tokio::test]
async fn test_should_list_append() {
    // Scenario 4: SET list_type = list_append(list_type, :v).
    let (engine, _) = test_engine();
    put(
        &engine,
        "rank_data",
        item(&[("rank_list", s("rank_list")), ("list_type", list(&[s("test")]))]),
    )
    .await;

    engine
        .update_item(UpdateItemInput {
            table_name: "rank_data".to_owned(),
            key: item(&[("rank_list", s("rank_list"))]),
            update_expression: Some("SET list_type = list_append(list_type, :v)".to_owned()),
            expression_attribute_values: values(&[(":v", list(&[s("John")]))]),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();

    let got = fetch(&engine, "rank_data", item(&[("rank_list", s("rank_list"))]))
        .await
        .unwrap();
    assert_eq!(got.get("list_type"), Some(&list(&[s("test"), s("John")])));
}

#[tokio::test]
async fn test_should_replace_and_append_indexed_list_element() {
    // Scenario 5: SET list_type[1] replaces; list_type[2] appends at length.
    let (engine, _) = test_engine();
    put(
        &engine,
        "records",
        item(&[("id", s("1")), ("list_type", list(&[s("John"), s("Doe")]))]),
    )
    .await;

    engine
        .update_item(UpdateItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            update_expression: Some("SET list_type[1] = :v".to_owned()),
            expression_attribute_values: values(&[(":v", s("Jacob"))]),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();
    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("list_type"), Some(&list(&[s("John"), s("Jacob")])));

    engine
        .update_item(UpdateItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            update_expression: Some("SET list_type[2] = :v".to_owned()),
            expression_attribute_values: values(&[(":v", s("newData"))]),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();
    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(
        got.get("list_type"),
        Some(&list(&[s("John"), s("Jacob"), s("newData")]))
    );
}

#[tokio::test]
async fn test_should_reject_conditional_put_and_keep_state() {
    // Scenario 6: condition false means no mutation at all.
    let (engine, _) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("10"))])).await;

    let err = engine
        .put_item(PutItemInput {
            table_name: "records".to_owned(),
            item: item(&[("id", s("1")), ("count", n("20"))]),
            condition_expression: Some("count < :c".to_owned()),
            expression_attribute_values: values(&[(":c", n("5"))]),
            ..PutItemInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ConditionalCheckFailedException);

    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("count"), Some(&n("10")));
}

// ---------------------------------------------------------------------------
// Conditions, ReturnValues, delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_honor_attribute_not_exists_on_empty_row() {
    let (engine, _) = test_engine();
    // No row yet: attribute_not_exists holds.
    engine
        .put_item(PutItemInput {
            table_name: "records".to_owned(),
            item: item(&[("id", s("1")), ("name", s("first"))]),
            condition_expression: Some("attribute_not_exists(id)".to_owned()),
            ..PutItemInput::default()
        })
        .await
        .unwrap();

    // Second insert with the same guard fails.
    let err = engine
        .put_item(PutItemInput {
            table_name: "records".to_owned(),
            item: item(&[("id", s("1")), ("name", s("second"))]),
            condition_expression: Some("attribute_not_exists(id)".to_owned()),
            ..PutItemInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ConditionalCheckFailedException);
}

#[tokio::test]
async fn test_should_return_old_and_new_images() {
    let (engine, _) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("1"))])).await;

    let output = engine
        .put_item(PutItemInput {
            table_name: "records".to_owned(),
            item: item(&[("id", s("1")), ("count", n("2"))]),
            return_values: Some(ReturnValue::AllOld),
            ..PutItemInput::default()
        })
        .await
        .unwrap();
    assert_eq!(output.attributes.get("count"), Some(&n("1")));

    let output = engine
        .update_item(UpdateItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            update_expression: Some("SET count = :c".to_owned()),
            expression_attribute_values: values(&[(":c", n("7"))]),
            return_values: Some(ReturnValue::UpdatedNew),
            ..UpdateItemInput::default()
        })
        .await
        .unwrap();
    // UPDATED_NEW returns the ALL_NEW shape.
    assert_eq!(output.attributes.get("count"), Some(&n("7")));
    assert_eq!(output.attributes.get("id"), Some(&s("1")));
}

#[tokio::test]
async fn test_should_delete_item_conditionally() {
    let (engine, backend) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("10"))])).await;

    let err = engine
        .delete_item(DeleteItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            condition_expression: Some("count > :c".to_owned()),
            expression_attribute_values: values(&[(":c", n("50"))]),
            ..DeleteItemInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ConditionalCheckFailedException);
    assert_eq!(backend.row_count("records"), 1);

    let output = engine
        .delete_item(DeleteItemInput {
            table_name: "records".to_owned(),
            key: item(&[("id", s("1"))]),
            condition_expression: Some("count > :c".to_owned()),
            expression_attribute_values: values(&[(":c", n("5"))]),
            return_values: Some(ReturnValue::AllOld),
            ..DeleteItemInput::default()
        })
        .await
        .unwrap();
    assert_eq!(output.attributes.get("count"), Some(&n("10")));
    assert_eq!(backend.row_count("records"), 0);
}

#[tokio::test]
async fn test_should_remove_twice_idempotently() {
    let (engine, _) = test_engine();
    put(
        &engine,
        "records",
        item(&[("id", s("1")), ("name", s("x")), ("count", n("1"))]),
    )
    .await;

    for _ in 0..2 {
        engine
            .update_item(UpdateItemInput {
                table_name: "records".to_owned(),
                key: item(&[("id", s("1"))]),
                update_expression: Some("REMOVE name".to_owned()),
                ..UpdateItemInput::default()
            })
            .await
            .unwrap();
    }
    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert!(!got.contains_key("name"));
    assert_eq!(got.get("count"), Some(&n("1")));
}

// ---------------------------------------------------------------------------
// Query & Scan
// ---------------------------------------------------------------------------

async fn seed_employees(engine: &Engine, count: usize) {
    for i in 1..=count {
        put(
            engine,
            "employee",
            item(&[
                ("emp_id", n("1")),
                ("start_date", s(&format!("2024-01-0{i}"))),
                ("name", s(&format!("emp-{i}"))),
                ("status", s(if i % 2 == 0 { "active" } else { "idle" })),
                ("age", n(&(20 + i).to_string())),
            ]),
        )
        .await;
    }
}

#[tokio::test]
async fn test_should_query_with_pagination_contract() {
    let (engine, _) = test_engine();
    seed_employees(&engine, 7).await;

    // Page 1: full page plus a continuation token.
    let page = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some("emp_id = :id".to_owned()),
            expression_attribute_values: values(&[(":id", n("1"))]),
            limit: Some(3),
            ..QueryInput::default()
        })
        .await
        .unwrap();
    assert_eq!(page.count, 3);
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.items[0].get("start_date"), Some(&s("2024-01-01")));
    assert_eq!(page.last_evaluated_key.get("offset"), Some(&n("3")));
    assert!(page.last_evaluated_key.contains_key("emp_id"));
    assert!(page.last_evaluated_key.contains_key("start_date"));

    // Page 2 continues from the echoed offset.
    let page = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some("emp_id = :id".to_owned()),
            expression_attribute_values: values(&[(":id", n("1"))]),
            limit: Some(3),
            exclusive_start_key: page.last_evaluated_key,
            ..QueryInput::default()
        })
        .await
        .unwrap();
    assert_eq!(page.count, 3);
    assert_eq!(page.items[0].get("start_date"), Some(&s("2024-01-04")));
    assert_eq!(page.last_evaluated_key.get("offset"), Some(&n("6")));

    // Final page: fewer than Limit rows, no continuation token.
    let page = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some("emp_id = :id".to_owned()),
            expression_attribute_values: values(&[(":id", n("1"))]),
            limit: Some(3),
            exclusive_start_key: page.last_evaluated_key,
            ..QueryInput::default()
        })
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert!(page.last_evaluated_key.is_empty());
}

#[tokio::test]
async fn test_should_query_descending() {
    let (engine, _) = test_engine();
    seed_employees(&engine, 3).await;

    let output = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some("emp_id = :id".to_owned()),
            expression_attribute_values: values(&[(":id", n("1"))]),
            scan_index_forward: Some(false),
            ..QueryInput::default()
        })
        .await
        .unwrap();
    assert_eq!(output.items[0].get("start_date"), Some(&s("2024-01-03")));
}

#[tokio::test]
async fn test_should_query_with_filter_and_begins_with() {
    let (engine, _) = test_engine();
    seed_employees(&engine, 4).await;

    let output = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some(
                "emp_id = :id AND begins_with(start_date, :prefix)".to_owned(),
            ),
            filter_expression: Some("status = :status".to_owned()),
            expression_attribute_values: values(&[
                (":id", n("1")),
                (":prefix", s("2024-01")),
                (":status", s("active")),
            ]),
            ..QueryInput::default()
        })
        .await
        .unwrap();
    assert_eq!(output.count, 2);
    assert!(output
        .items
        .iter()
        .all(|i| i.get("status") == Some(&s("active"))));
}

#[tokio::test]
async fn test_should_require_key_condition_for_query() {
    let (engine, _) = test_engine();
    let err = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            ..QueryInput::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ValidationException);
}

#[tokio::test]
async fn test_should_count_with_select() {
    let (engine, _) = test_engine();
    seed_employees(&engine, 5).await;

    let output = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some("emp_id = :id".to_owned()),
            expression_attribute_values: values(&[(":id", n("1"))]),
            select: Some("COUNT".to_owned()),
            ..QueryInput::default()
        })
        .await
        .unwrap();
    assert_eq!(output.count, 5);
    assert!(output.items.is_empty());
}

#[tokio::test]
async fn test_should_scan_with_filter() {
    let (engine, _) = test_engine();
    seed_employees(&engine, 4).await;

    let output = engine
        .scan(ScanInput {
            table_name: "employee".to_owned(),
            filter_expression: Some("age > :min".to_owned()),
            expression_attribute_values: values(&[(":min", n("22"))]),
            ..ScanInput::default()
        })
        .await
        .unwrap();
    assert_eq!(output.count, 2);
}

#[tokio::test]
async fn test_should_intersect_projection_with_declared_columns() {
    let (engine, _) = test_engine();
    seed_employees(&engine, 2).await;

    let output = engine
        .query(QueryInput {
            table_name: "employee".to_owned(),
            key_condition_expression: Some("emp_id = :id".to_owned()),
            expression_attribute_values: values(&[(":id", n("1"))]),
            projection_expression: Some("name, ghost".to_owned()),
            ..QueryInput::default()
        })
        .await
        .unwrap();
    // Unknown columns are dropped; the key columns ride along for the
    // continuation token.
    for row in &output.items {
        assert!(row.contains_key("name"));
        assert!(row.contains_key("emp_id"));
        assert!(row.contains_key("start_date"));
        assert!(!row.contains_key("ghost"));
        assert!(!row.contains_key("age"));
    }
}

// ---------------------------------------------------------------------------
// Batch operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_batch_write_and_batch_get() {
    let (engine, _) = test_engine();

    let writes = vec![
        WriteRequest {
            put_request: Some(PutRequest {
                item: item(&[("id", s("a")), ("count", n("1"))]),
            }),
            delete_request: None,
        },
        WriteRequest {
            put_request: Some(PutRequest {
                item: item(&[("id", s("b")), ("count", n("2"))]),
            }),
            delete_request: None,
        },
    ];
    let output = engine
        .batch_write_item(BatchWriteItemInput {
            request_items: HashMap::from([("records".to_owned(), writes)]),
        })
        .await
        .unwrap();
    assert!(output.unprocessed_items.is_empty());

    let output = engine
        .batch_get_item(BatchGetItemInput {
            request_items: HashMap::from([(
                "records".to_owned(),
                KeysAndAttributes {
                    keys: vec![
                        item(&[("id", s("a"))]),
                        item(&[("id", s("b"))]),
                        item(&[("id", s("missing"))]),
                    ],
                    ..KeysAndAttributes::default()
                },
            )]),
        })
        .await
        .unwrap();
    assert_eq!(output.responses["records"].len(), 2);

    // Batch delete removes both rows.
    let deletes = vec![
        WriteRequest {
            delete_request: Some(DeleteRequest {
                key: item(&[("id", s("a"))]),
            }),
            put_request: None,
        },
        WriteRequest {
            delete_request: Some(DeleteRequest {
                key: item(&[("id", s("b"))]),
            }),
            put_request: None,
        },
    ];
    engine
        .batch_write_item(BatchWriteItemInput {
            request_items: HashMap::from([("records".to_owned(), deletes)]),
        })
        .await
        .unwrap();
    assert!(fetch(&engine, "records", item(&[("id", s("a"))])).await.is_none());
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_transact_get_across_tables() {
    let (engine, _) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("5"))])).await;
    put(
        &engine,
        "rank_data",
        item(&[("rank_list", s("rank_list")), ("list_type", list(&[s("x")]))]),
    )
    .await;

    let output = engine
        .transact_get_items(TransactGetItemsInput {
            transact_items: vec![
                TransactGetItem {
                    get: TransactGet {
                        table_name: "records".to_owned(),
                        key: item(&[("id", s("1"))]),
                        ..TransactGet::default()
                    },
                },
                TransactGetItem {
                    get: TransactGet {
                        table_name: "rank_data".to_owned(),
                        key: item(&[("rank_list", s("rank_list"))]),
                        ..TransactGet::default()
                    },
                },
                TransactGetItem {
                    get: TransactGet {
                        table_name: "records".to_owned(),
                        key: item(&[("id", s("missing"))]),
                        ..TransactGet::default()
                    },
                },
            ],
        })
        .await
        .unwrap();

    assert_eq!(output.responses.len(), 3);
    assert_eq!(output.responses[0].table_name.as_deref(), Some("records"));
    assert_eq!(output.responses[0].item.get("count"), Some(&n("5")));
    assert_eq!(
        output.responses[1].item.get("list_type"),
        Some(&list(&[s("x")]))
    );
    assert!(output.responses[2].item.is_empty());
}

#[tokio::test]
async fn test_should_commit_transact_write_batch() {
    let (engine, _) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("10"))])).await;

    engine
        .transact_write_items(TransactWriteItemsInput {
            transact_items: vec![
                TransactWriteItem {
                    put: Some(TransactPut {
                        table_name: "records".to_owned(),
                        item: item(&[("id", s("2")), ("count", n("1"))]),
                        ..TransactPut::default()
                    }),
                    ..TransactWriteItem::default()
                },
                TransactWriteItem {
                    update: Some(TransactUpdate {
                        table_name: "records".to_owned(),
                        key: item(&[("id", s("1"))]),
                        update_expression: "SET count = count + :one".to_owned(),
                        expression_attribute_values: values(&[(":one", n("1"))]),
                        ..TransactUpdate::default()
                    }),
                    ..TransactWriteItem::default()
                },
                TransactWriteItem {
                    condition_check: Some(TransactConditionCheck {
                        table_name: "records".to_owned(),
                        key: item(&[("id", s("1"))]),
                        condition_expression: "count > :zero".to_owned(),
                        expression_attribute_values: values(&[(":zero", n("0"))]),
                        ..TransactConditionCheck::default()
                    }),
                    ..TransactWriteItem::default()
                },
            ],
        })
        .await
        .unwrap();

    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("count"), Some(&n("11")));
    assert!(fetch(&engine, "records", item(&[("id", s("2"))])).await.is_some());
}

#[tokio::test]
async fn test_should_cancel_whole_transaction_on_condition_failure() {
    let (engine, backend) = test_engine();
    put(&engine, "records", item(&[("id", s("1")), ("count", n("10"))])).await;

    let err = engine
        .transact_write_items(TransactWriteItemsInput {
            transact_items: vec![
                TransactWriteItem {
                    put: Some(TransactPut {
                        table_name: "records".to_owned(),
                        item: item(&[("id", s("2")), ("count", n("1"))]),
                        ..TransactPut::default()
                    }),
                    ..TransactWriteItem::default()
                },
                TransactWriteItem {
                    delete: Some(dynabridge_model::types::TransactDelete {
                        table_name: "records".to_owned(),
                        key: item(&[("id", s("1"))]),
                        condition_expression: Some("count > :c".to_owned()),
                        expression_attribute_values: values(&[(":c", n("100"))]),
                        ..dynabridge_model::types::TransactDelete::default()
                    }),
                    ..TransactWriteItem::default()
                },
            ],
        })
        .await
        .unwrap_err();

    assert_eq!(err.code, AdapterErrorCode::TransactionCanceledException);
    assert_eq!(err.cancellation_reasons.len(), 2);
    assert_eq!(err.cancellation_reasons[0].code.as_deref(), Some("None"));
    assert_eq!(
        err.cancellation_reasons[1].code.as_deref(),
        Some("ConditionalCheckFailed")
    );
    // Nothing committed: no new row, original untouched.
    assert_eq!(backend.row_count("records"), 1);
    let got = fetch(&engine, "records", item(&[("id", s("1"))])).await.unwrap();
    assert_eq!(got.get("count"), Some(&n("10")));
}

// ---------------------------------------------------------------------------
// PartiQL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_execute_partiql_round_trip() {
    let (engine, _) = test_engine();

    partiql::execute_statement(
        &engine,
        ExecuteStatementInput {
            statement: "INSERT INTO records VALUE {'id': ?, 'count': ?}".to_owned(),
            parameters: vec![s("p1"), n("5")],
            ..ExecuteStatementInput::default()
        },
    )
    .await
    .unwrap();

    // Duplicate insert is rejected.
    let err = partiql::execute_statement(
        &engine,
        ExecuteStatementInput {
            statement: "INSERT INTO records VALUE {'id': 'p1', 'count': 9}".to_owned(),
            ..ExecuteStatementInput::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, AdapterErrorCode::ConditionalCheckFailedException);

    partiql::execute_statement(
        &engine,
        ExecuteStatementInput {
            statement: "UPDATE records SET count = ? WHERE id = ?".to_owned(),
            parameters: vec![n("7"), s("p1")],
            ..ExecuteStatementInput::default()
        },
    )
    .await
    .unwrap();

    let output = partiql::execute_statement(
        &engine,
        ExecuteStatementInput {
            statement: "SELECT * FROM records WHERE count >= ?".to_owned(),
            parameters: vec![n("6")],
            ..ExecuteStatementInput::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(output.items.len(), 1);
    assert_eq!(output.items[0].get("count"), Some(&n("7")));

    partiql::execute_statement(
        &engine,
        ExecuteStatementInput {
            statement: "DELETE FROM records WHERE id = ?".to_owned(),
            parameters: vec![s("p1")],
            ..ExecuteStatementInput::default()
        },
    )
    .await
    .unwrap();
    assert!(fetch(&engine, "records", item(&[("id", s("p1"))])).await.is_none());
}
