//! Correlation identifiers
//!
//! `RequestId` tags every save/fetch so that the start, end and error events of
//! one store call can be grouped. `OperationId` names a single pending remote
//! operation in a replication outbox; being UUIDv7 it also sorts by creation
//! time, which the outbox relies on for FIFO draining.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! time_ordered_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh identifier (UUIDv7)
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wrap an identifier read back from storage
            pub fn from_string(s: String) -> Self {
                Self(s)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

time_ordered_id!(
    /// Identifier of one save or fetch call against a store backend
    RequestId
);

time_ordered_id!(
    /// Identifier of one queued remote replication operation
    OperationId
);
