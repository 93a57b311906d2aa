//! Response shaping: JSON success bodies and the DynamoDB error format.

use dynabridge_model::AdapterError;

use crate::body::ResponseBody;

/// Content type of every response.
pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Serialize an error into the wire JSON: `__type`, `Message`, and (for
/// transaction cancellation) the per-item `CancellationReasons` vector.
#[must_use]
pub fn error_to_json(error: &AdapterError) -> Vec<u8> {
    let mut body = serde_json::json!({
        "__type": error.error_type(),
        "Message": error.message,
    });
    if !error.cancellation_reasons.is_empty() {
        if let Ok(reasons) = serde_json::to_value(&error.cancellation_reasons) {
            body["CancellationReasons"] = reasons;
        }
    }
    serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec())
}

/// Build a complete error response.
#[must_use]
pub fn error_to_response(error: &AdapterError, request_id: &str) -> http::Response<ResponseBody> {
    let json = error_to_json(error);
    with_common_headers(error.status_code, json, request_id)
}

/// Build a 200 response from serialized JSON.
#[must_use]
pub fn json_response(json: Vec<u8>, request_id: &str) -> http::Response<ResponseBody> {
    with_common_headers(http::StatusCode::OK, json, request_id)
}

fn with_common_headers(
    status: http::StatusCode,
    json: Vec<u8>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let crc = crc32fast::hash(&json);
    let mut response = http::Response::builder()
        .status(status)
        .header("content-type", CONTENT_TYPE)
        .body(ResponseBody::from_json(json))
        .unwrap_or_else(|_| http::Response::new(ResponseBody::empty()));

    let headers = response.headers_mut();
    if let Ok(value) = http::HeaderValue::from_str(request_id) {
        headers.insert("x-amzn-requestid", value);
    }
    if let Ok(value) = http::HeaderValue::from_str(&crc.to_string()) {
        headers.insert("x-amz-crc32", value);
    }
    response
}
