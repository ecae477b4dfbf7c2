//! JSON Schema validation for configuration documents.
//!
//! The config schema is embedded at compile time from
//! `schemas/config.schema.json` and checked before the document is
//! deserialised, so a bad config is reported as a list of schema errors
//! rather than the first serde failure.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use consolidator::validation::validate;
//!
//! let schema = json!({
//!     "type": "object",
//!     "required": ["name"],
//!     "properties": { "name": { "type": "string" } }
//! });
//!
//! assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
//! assert!(validate(&schema, &json!({ "age": 42 })).is_err());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static CONFIG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/config.schema.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a Draft 7 schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick true/false check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate a configuration document against the embedded config schema.
pub fn validate_config_document(data: &Value) -> Result<(), Vec<String>> {
    validate(&CONFIG_SCHEMA, data)
}

/// Quick check against the config schema.
pub fn is_valid_config_document(data: &Value) -> bool {
    is_valid(&CONFIG_SCHEMA, data)
}
