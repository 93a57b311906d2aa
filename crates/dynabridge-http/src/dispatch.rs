//! The handler boundary between transport and engine.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use dynabridge_model::{AdapterError, Operation};

use crate::body::ResponseBody;

/// Implemented by the adapter core: takes the routed operation and the raw
/// JSON body, returns a complete HTTP response.
pub trait AdapterHandler: Send + Sync + 'static {
    /// Handle one operation.
    fn handle_operation(
        &self,
        op: Operation,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<http::Response<ResponseBody>, AdapterError>> + Send>>;
}

/// Dispatch one operation to the handler.
pub async fn dispatch_operation<H: AdapterHandler>(
    handler: &H,
    op: Operation,
    body: Bytes,
) -> Result<http::Response<ResponseBody>, AdapterError> {
    tracing::debug!(operation = %op, "dispatching operation");
    handler.handle_operation(op, body).await
}
