//! Hyper `Service` wiring the router, body collection, and dispatch.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;

use dynabridge_model::AdapterError;

use crate::body::ResponseBody;
use crate::dispatch::{dispatch_operation, AdapterHandler};
use crate::response::{error_to_response, CONTENT_TYPE};
use crate::router::resolve_operation;

/// Hyper service for the adapter.
#[derive(Debug)]
pub struct AdapterHttpService<H: AdapterHandler> {
    handler: Arc<H>,
}

impl<H: AdapterHandler> AdapterHttpService<H> {
    /// Wrap a handler.
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H: AdapterHandler> Clone for AdapterHttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: AdapterHandler> hyper::service::Service<http::Request<Incoming>>
    for AdapterHttpService<H>
{
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let request_id = uuid::Uuid::new_v4().to_string();

        Box::pin(async move {
            let response = process_request(req, handler.as_ref(), &request_id).await;
            Ok(finalize(response, &request_id))
        })
    }
}

async fn process_request<H: AdapterHandler>(
    req: http::Request<Incoming>,
    handler: &H,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let (parts, incoming) = req.into_parts();

    if parts.method != http::Method::POST {
        let err = AdapterError::validation(format!(
            "the data API accepts only POST, got {}",
            parts.method
        ));
        return error_to_response(&err, request_id);
    }

    let op = match resolve_operation(&parts.headers) {
        Ok(op) => op,
        Err(err) => return error_to_response(&err, request_id),
    };

    let body = match collect_body(incoming).await {
        Ok(body) => body,
        Err(err) => return error_to_response(&err, request_id),
    };

    match dispatch_operation(handler, op, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(operation = %op, error = %err, "operation failed");
            error_to_response(&err, request_id)
        }
    }
}

async fn collect_body(incoming: Incoming) -> Result<Bytes, AdapterError> {
    incoming
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| AdapterError::internal(format!("failed to read request body: {e}")))
}

/// Stamp the headers every response carries.
fn finalize(
    mut response: http::Response<ResponseBody>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let headers = response.headers_mut();
    if let Ok(value) = http::HeaderValue::from_str(request_id) {
        headers.entry("x-amzn-requestid").or_insert(value);
    }
    headers
        .entry("content-type")
        .or_insert(http::HeaderValue::from_static(CONTENT_TYPE));
    headers.insert("server", http::HeaderValue::from_static("dynabridge"));
    response
}
