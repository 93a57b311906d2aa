//! Operation routing from the `X-Amz-Target` header.
//!
//! Every request is `POST /` with a header of the form
//! `X-Amz-Target: DynamoDB_20120810.<Operation>`.

use dynabridge_model::{AdapterError, Operation};

/// Expected prefix of the `X-Amz-Target` value.
const TARGET_PREFIX: &str = "DynamoDB_20120810.";

/// Resolve the operation named by the request headers.
pub fn resolve_operation(headers: &http::HeaderMap) -> Result<Operation, AdapterError> {
    let target = headers
        .get("x-amz-target")
        .ok_or_else(AdapterError::missing_action)?;

    let target = target.to_str().map_err(|_| AdapterError::missing_action())?;

    let name = target
        .strip_prefix(TARGET_PREFIX)
        .ok_or_else(|| AdapterError::unknown_operation(target))?;

    Operation::from_name(name).ok_or_else(|| AdapterError::unknown_operation(target))
}
