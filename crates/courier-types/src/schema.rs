//! # Schema Validation
//!
//! The validation capability consumed by every receiving side: a [`Schema`]
//! turns an untrusted `serde_json::Value` into a typed value or a
//! [`ValidationError`]. [`TypedSchema`] covers the common serde-shaped case;
//! [`SchemaFn`] wraps an arbitrary refinement closure.
//!
//! Event-keyed dispatch is expressed as a closed [`EventSet`] enum per
//! service: the set maps event names to payload shapes, and an unknown name
//! decodes to [`DecodeOutcome::UnknownEvent`] rather than disappearing in a
//! map lookup.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{SerializationError, ValidationError};

/// A validator for one message payload shape.
pub trait Schema: Send + Sync + 'static {
    /// The validated output type.
    type Value: Send + 'static;

    /// Validate a raw JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the value does not match the schema.
    fn validate(&self, raw: &Value) -> Result<Self::Value, ValidationError>;
}

/// Serde-backed schema: a value is valid iff it deserializes into `T`.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    /// Create the schema for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedSchema<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TypedSchema")
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn validate(&self, raw: &Value) -> Result<T, ValidationError> {
        serde_json::from_value(raw.clone()).map_err(|e| ValidationError::new(e.to_string()))
    }
}

/// Closure-backed schema for refinements serde alone cannot express
/// (ranges, cross-field checks, ...).
#[derive(Clone)]
pub struct SchemaFn<T> {
    check: Arc<dyn Fn(&Value) -> Result<T, ValidationError> + Send + Sync>,
}

impl<T> SchemaFn<T> {
    /// Wrap a validation closure.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Value) -> Result<T, ValidationError> + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
        }
    }
}

impl<T: Send + 'static> Schema for SchemaFn<T> {
    type Value = T;

    fn validate(&self, raw: &Value) -> Result<T, ValidationError> {
        (self.check)(raw)
    }
}

/// Result of decoding an event name + payload against an [`EventSet`].
#[derive(Debug, Clone)]
pub enum DecodeOutcome<E> {
    /// The name was known and the payload validated.
    Event(E),
    /// The name is not part of this set; the message is dropped silently.
    UnknownEvent,
    /// The name was known but the payload failed validation; the message is
    /// logged and dropped.
    Invalid(ValidationError),
}

/// A closed set of events a listening service understands.
///
/// Implementations are typically an enum with one variant per event name,
/// each carrying that event's payload type.
pub trait EventSet: Sized + Send + Clone + 'static {
    /// Every event name in the set.
    fn event_names() -> &'static [&'static str];

    /// The wire name of this event value.
    fn event_name(&self) -> &'static str;

    /// Decode an inbound event name and payload.
    fn decode(event: &str, data: &Value) -> DecodeOutcome<Self>;

    /// Encode this event into its wire name and payload, for outbound
    /// emission.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the payload cannot be serialized.
    fn encode(&self) -> Result<(&'static str, Value), SerializationError>;
}
