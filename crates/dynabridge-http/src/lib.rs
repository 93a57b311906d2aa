//! HTTP transport for the dynabridge adapter.
//!
//! The DynamoDB JSON protocol (`awsJson1_0`) is refreshingly simple: every
//! request is a `POST /` whose operation is named in the `X-Amz-Target`
//! header, and every body is JSON.
#![allow(missing_docs, clippy::doc_markdown)]

pub mod body;
pub mod dispatch;
pub mod response;
pub mod router;
pub mod service;

pub use body::ResponseBody;
pub use dispatch::AdapterHandler;
pub use service::AdapterHttpService;
