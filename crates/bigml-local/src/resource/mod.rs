//! Resource identifiers, statuses and JSON envelopes

mod id;
mod status;

pub use id::{ResourceId, ResourceType};
pub use status::{Status, StatusCode};

use crate::error::LoadError;
use serde_json::Value;

/// Returns the resource body, unwrapping the `object` envelope returned by
/// the API when present.
pub fn resource_body(resource: &Value) -> &Value {
    match resource.get("object") {
        Some(object) if object.is_object() => object,
        _ => resource,
    }
}

/// True when the JSON is a resource whose status says it is finished
pub fn is_finished(resource: &Value) -> bool {
    Status::from_resource(resource)
        .map(|status| status.code == StatusCode::Finished)
        .unwrap_or(false)
}

/// Validates a resource JSON and returns its body.
///
/// Fails when the status is not finished or when `required_key` is absent
/// from the body.
pub fn finished_body<'a>(resource: &'a Value, required_key: &str) -> Result<&'a Value, LoadError> {
    if !resource.is_object() {
        return Err(LoadError::Malformed(
            "resource JSON must be an object".to_string(),
        ));
    }
    let body = resource_body(resource);
    let name = resource_name(resource);
    match Status::from_resource(resource) {
        Some(status) if status.code == StatusCode::Finished => {}
        Some(status) if status.code == StatusCode::Faulty => {
            return Err(LoadError::Faulty(name));
        }
        Some(status) => {
            return Err(LoadError::NotFinished {
                resource: name,
                code: status.code.as_i32(),
                message: status.message,
            });
        }
        None => {
            return Err(LoadError::MissingKey("status".to_string()));
        }
    }
    if body.get(required_key).map_or(true, Value::is_null) {
        return Err(LoadError::MissingKey(required_key.to_string()));
    }
    Ok(body)
}

/// Resource id of a resource JSON, or `"unknown"`
pub fn resource_name(resource: &Value) -> String {
    resource
        .get("resource")
        .or_else(|| resource_body(resource).get("resource"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}
