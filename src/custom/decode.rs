//! Shared decode-and-validate step for custom resource properties.
//!
//! Every handler declares a property struct deriving `Deserialize` and
//! `Validate`; this module turns the engine's untyped map into it. Unknown
//! properties are rejected: handler structs use `deny_unknown_fields`.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::ValidationError;

/// Keys the engine injects into every property map.
const ENGINE_KEYS: &[&str] = &["ServiceToken"];

/// Decodes and validates a property map.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the offending field when the map
/// does not decode or fails validation.
pub fn decode_properties<T>(type_tag: &str, properties: &Map<String, Value>) -> Result<T, ValidationError>
where
    T: DeserializeOwned + Validate,
{
    let mut map = properties.clone();
    for key in ENGINE_KEYS {
        map.remove(*key);
    }

    let decoded: T = serde_json::from_value(Value::Object(map)).map_err(|e| {
        let message = e.to_string();
        ValidationError::new(type_tag, field_in_message(&message), message)
    })?;

    decoded.validate().map_err(|errors| {
        let mut fields: Vec<String> = errors.field_errors().keys().map(ToString::to_string).collect();
        fields.sort();
        ValidationError::new(type_tag, fields.into_iter().next(), errors.to_string())
    })?;

    Ok(decoded)
}

/// Extracts the field name serde puts between backticks.
fn field_in_message(message: &str) -> Option<String> {
    let start = message.find('`')? + 1;
    let len = message[start..].find('`')?;
    Some(message[start..start + len].to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    Text(String),
}

fn parse_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match NumberOrString::<T>::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Accepts a `u32` written as a number or a numeric string.
///
/// # Errors
///
/// Fails if the value is neither.
pub fn u32_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    parse_number(deserializer)
}

/// Accepts an optional `u32` written as a number or a numeric string.
///
/// # Errors
///
/// Fails if the value is present and neither.
pub fn option_u32_lenient<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    parse_number(deserializer).map(Some)
}

/// Accepts an `f64` written as a number or a numeric string.
///
/// # Errors
///
/// Fails if the value is neither.
pub fn f64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    parse_number(deserializer)
}
