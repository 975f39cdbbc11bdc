//! Typed identifiers for users and syncable entities.
//!
//! All ID types wrap UUIDv7 (time-ordered, globally unique, generated
//! client-side at creation). They're opaque on the wire and display as
//! standard UUID text for logging. The `short()` form (first 8 hex chars)
//! is for human-facing output — never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

/// A task identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(uuid::Uuid);

/// A label identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(uuid::Uuid);

/// A task-label link identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(uuid::Uuid);

/// A working-log entry identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }

            /// Reconstruct from a raw UUID (e.g. a stored column).
            pub fn from_uuid(u: uuid::Uuid) -> Self {
                Self(u)
            }

            /// Parse from standard UUID text or 32-char hex.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.0)
            }
        }

        impl std::str::FromStr for $T {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }
    };
}

impl_typed_id!(UserId, "UserId");
impl_typed_id!(TaskId, "TaskId");
impl_typed_id!(LabelId, "LabelId");
impl_typed_id!(LinkId, "LinkId");
impl_typed_id!(EntryId, "EntryId");
