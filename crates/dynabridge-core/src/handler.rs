//! Bridges the HTTP dispatch boundary to the engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use dynabridge_http::body::ResponseBody;
use dynabridge_http::dispatch::AdapterHandler;
use dynabridge_http::response::json_response;
use dynabridge_model::{AdapterError, Operation};

use crate::engine::Engine;
use crate::partiql;

/// The adapter's [`AdapterHandler`] implementation.
#[derive(Debug)]
pub struct EngineHandler {
    engine: Arc<Engine>,
}

impl EngineHandler {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl AdapterHandler for EngineHandler {
    fn handle_operation(
        &self,
        op: Operation,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<http::Response<ResponseBody>, AdapterError>> + Send>>
    {
        let engine = Arc::clone(&self.engine);
        Box::pin(async move { dispatch(&engine, op, &body).await })
    }
}

async fn dispatch(
    engine: &Engine,
    op: Operation,
    body: &[u8],
) -> Result<http::Response<ResponseBody>, AdapterError> {
    let request_id = uuid_for_response();

    match op {
        Operation::GetItem => {
            let output = engine.get_item(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::PutItem => {
            let output = engine.put_item(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::DeleteItem => {
            let output = engine.delete_item(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::UpdateItem => {
            let output = engine.update_item(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::Query => {
            let output = engine.query(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::Scan => {
            let output = engine.scan(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::BatchGetItem => {
            let output = engine.batch_get_item(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::BatchWriteItem => {
            let output = engine.batch_write_item(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::TransactGetItems => {
            let output = engine.transact_get_items(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::TransactWriteItems => {
            let output = engine.transact_write_items(deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
        Operation::ExecuteStatement => {
            let output = partiql::execute_statement(engine, deserialize(body)?).await?;
            serialize(&output, &request_id)
        }
    }
}

fn uuid_for_response() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn deserialize<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, AdapterError> {
    serde_json::from_slice(body)
        .map_err(|e| AdapterError::serialization(format!("failed to deserialize request: {e}")))
}

fn serialize<T: serde::Serialize>(
    output: &T,
    request_id: &str,
) -> Result<http::Response<ResponseBody>, AdapterError> {
    let json = serde_json::to_vec(output)
        .map_err(|e| AdapterError::internal(format!("failed to serialize response: {e}")))?;
    Ok(json_response(json, request_id))
}
