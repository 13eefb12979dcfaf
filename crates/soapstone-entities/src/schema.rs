//! Validation and normalization of server payloads.
//!
//! A [`Schema`] turns a raw JSON value into a typed entity or rejects it
//! with a [`ValidationError`]. Hooks treat a rejection exactly like a failed
//! request.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use url::Url;

use crate::{Entity, Group, ValidationError};

/// Placeholder avatar used when a group has none.
pub const MISSING_AVATAR: &str = "/images/avatar-missing.png";

/// Placeholder header used when a group has none.
pub const MISSING_HEADER: &str = "/images/header-missing.png";

/// Validates a raw payload into `T`.
pub trait Schema<T>: Send + Sync {
    fn validate(&self, raw: serde_json::Value) -> Result<T, ValidationError>;
}

/// Validate a payload that may be either one entity or an array of them.
pub fn validate_many<T: Entity>(
    schema: &dyn Schema<T>,
    raw: serde_json::Value,
) -> Result<Vec<T>, ValidationError> {
    match raw {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| schema.validate(item))
            .collect(),
        other => Ok(vec![schema.validate(other)?]),
    }
}

/// Validate a payload that must be an array of entities.
pub fn validate_list<T: Entity>(
    schema: &dyn Schema<T>,
    raw: serde_json::Value,
) -> Result<Vec<T>, ValidationError> {
    match raw {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| schema.validate(item))
            .collect(),
        other => Err(ValidationError::new(
            T::TYPE,
            format!("expected an array, got {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Plain deserialization with no normalization.
pub struct SerdeSchema<T>(PhantomData<fn() -> T>);

impl<T> SerdeSchema<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity + DeserializeOwned> Schema<T> for SerdeSchema<T> {
    fn validate(&self, raw: serde_json::Value) -> Result<T, ValidationError> {
        let entity: T =
            serde_json::from_value(raw).map_err(|e| ValidationError::new(T::TYPE, e.to_string()))?;
        if entity.id().is_empty() {
            return Err(ValidationError::new(T::TYPE, "empty id"));
        }
        Ok(entity)
    }
}

/// Unwraps a one-element array before validating with the inner schema.
///
/// Relationship endpoints answer with an array even when asked about a
/// single id.
pub struct FirstElement<S>(pub S);

impl<T: Entity, S: Schema<T>> Schema<T> for FirstElement<S> {
    fn validate(&self, raw: serde_json::Value) -> Result<T, ValidationError> {
        match raw {
            serde_json::Value::Array(items) => match items.into_iter().next() {
                Some(first) => self.0.validate(first),
                None => Err(ValidationError::new(T::TYPE, "empty array")),
            },
            other => self.0.validate(other),
        }
    }
}

/// Group schema: fills in missing images, strips an empty note and derives
/// `domain` from the group URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupSchema;

impl Schema<Group> for GroupSchema {
    fn validate(&self, raw: serde_json::Value) -> Result<Group, ValidationError> {
        let group = SerdeSchema::<Group>::new().validate(raw)?;
        Ok(normalize_group(group))
    }
}

/// Apply client-side defaults to a group as received from the server.
pub fn normalize_group(mut group: Group) -> Group {
    let avatar = first_non_empty(&[&group.avatar, &group.avatar_static], MISSING_AVATAR);
    let avatar_static = first_non_empty(&[&group.avatar_static, &group.avatar], MISSING_AVATAR);
    let header = first_non_empty(&[&group.header, &group.header_static], MISSING_HEADER);
    let header_static = first_non_empty(&[&group.header_static, &group.header], MISSING_HEADER);

    group.avatar = avatar;
    group.avatar_static = avatar_static;
    group.header = header;
    group.header_static = header_static;

    if group.note == "<p></p>" {
        group.note.clear();
    }

    group.domain = Url::parse(&group.url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default();

    group
}

fn first_non_empty(candidates: &[&String], fallback: &str) -> String {
    candidates
        .iter()
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| fallback.to_string())
}
