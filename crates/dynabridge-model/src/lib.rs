//! DynamoDB wire model for the dynabridge adapter.
//!
//! These are the request/response shapes of the DynamoDB JSON protocol
//! (`awsJson1_0`) as consumed and produced by the adapter core. They are
//! hand-written: the protocol is plain JSON and serde derives cover almost
//! everything except the tagged [`AttributeValue`] union.
// "DynamoDB" appears in most doc comments in this crate.
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod operations;
pub mod output;
pub mod types;

pub use attribute_value::AttributeValue;
pub use error::{AdapterError, AdapterErrorCode};
pub use operations::Operation;

/// An item (or key) on the wire: attribute name to tagged value.
pub type Item = std::collections::HashMap<String, AttributeValue>;
