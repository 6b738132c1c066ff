// ABOUTME: Persistence adapter error types shared by the in-memory and SQL stores
// ABOUTME: Classifies failures as retryable (transient) or fatal for the retry boundary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Errors raised by a storage adapter
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The operation did not complete within its time budget
    #[error("Store operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Budget that was exceeded
        timeout_ms: u64,
    },

    /// The backing store is unreachable, locked or busy
    #[error("Store unavailable: {context}")]
    Unavailable {
        /// Description of the transient failure
        context: String,
    },

    /// A uniqueness constraint rejected the write
    #[error("Conflicting {entity} record: {key}")]
    Conflict {
        /// Entity kind
        entity: &'static str,
        /// Conflicting key
        key: String,
    },

    /// A persisted record could not be decoded
    #[error("Stored {entity} record is corrupt: {reason}")]
    Corrupt {
        /// Entity kind
        entity: &'static str,
        /// What failed to decode
        reason: String,
    },

    /// Any other query failure
    #[error("Query failed: {context}")]
    Query {
        /// Driver message
        context: String,
    },

    /// JSON column encoding failed
    #[error("Serialization failed for {context}")]
    Serialization {
        /// Column or entity
        context: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether retrying the same operation may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }

    /// Build a `Corrupt` error
    pub fn corrupt(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            entity,
            reason: reason.into(),
        }
    }
}

/// Check if a driver message describes a transient condition
///
/// Locking, busy and timeout conditions clear on their own; constraint
/// violations and permission errors do not.
#[must_use]
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();

    if lower.contains("unique constraint")
        || lower.contains("foreign key constraint")
        || lower.contains("check constraint")
        || lower.contains("not null constraint")
        || lower.contains("permission denied")
    {
        return false;
    }

    lower.contains("deadlock")
        || lower.contains("database is locked")
        || lower.contains("busy")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("could not serialize")
}

#[cfg(feature = "database-errors")]
mod sqlx_conversion {
    use super::{is_transient_message, StoreError};

    impl From<sqlx::Error> for StoreError {
        fn from(error: sqlx::Error) -> Self {
            match &error {
                sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
                | sqlx::Error::Io(_) => Self::Unavailable {
                    context: error.to_string(),
                },
                sqlx::Error::Database(db_error) => {
                    if is_transient_message(db_error.message()) {
                        Self::Unavailable {
                            context: db_error.message().to_owned(),
                        }
                    } else if db_error.is_unique_violation() {
                        Self::Conflict {
                            entity: "record",
                            key: db_error.message().to_owned(),
                        }
                    } else {
                        Self::Query {
                            context: db_error.message().to_owned(),
                        }
                    }
                }
                sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Self::Corrupt {
                    entity: "row",
                    reason: error.to_string(),
                },
                _ => Self::Query {
                    context: error.to_string(),
                },
            }
        }
    }
}
