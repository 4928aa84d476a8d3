//! Identifier newtypes.
//!
//! All identifiers are string-backed and use `Arc<str>` internally so that
//! cloning is a reference-count bump. Fresh identifiers are generated with
//! nanoid and need no coordination between canvases, which keeps merged
//! imports collision-free in practice.

use core::borrow::Borrow;
use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Creates a new identifier with a unique nanoid.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, nanoid::nanoid!(12)).into())
            }

            /// Creates an identifier from a specific string value.
            #[must_use]
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.into())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value.into())
            }
        }

        impl From<&$name> for $name {
            fn from(value: &$name) -> Self {
                value.clone()
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self(raw.into()))
            }
        }
    };
}

string_id!(
    /// Unique identifier for a node, stable for the node's lifetime.
    NodeId,
    "node"
);

string_id!(
    /// Unique identifier for a connection.
    ConnectionId,
    "conn"
);

string_id!(
    /// Identifier of a port, unique within its owning node.
    PortId,
    "port"
);

string_id!(
    /// Identifier of a canvas snapshot.
    SnapshotId,
    "snap"
);
