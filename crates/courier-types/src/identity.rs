//! # Instance Identity
//!
//! A running process is identified by a logical [`InstanceName`] (shared by
//! every replica of the same deployment) plus a [`ClientId`] that is unique
//! per process and immutable for its lifetime.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A name contained a `:`, which is reserved as the channel separator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("name {0:?} must not contain a ':' character")]
pub struct InvalidName(pub String);

/// Logical instance name. Set exactly once when a connection is established.
///
/// Names must not contain `:` because channel names are colon-delimited
/// (`channel:<name>`, `discovery:i_am` payloads, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceName(String);

impl InstanceName {
    /// Validate and wrap a logical name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidName`] if the name contains `:`.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        if name.contains(':') {
            return Err(InvalidName(name));
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Random per-process identifier, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh random client id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client id from its string form (as carried in discovery
    /// payloads).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
