//! Canonical schema constants for structured logging
//!
//! Every store event uses these keys so that log pipelines and the test
//! capture layer can match on them.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_OPERATION_ID: &str = "operation_id";

// Store / identifier context
pub const FIELD_STORE_ID: &str = "store_id";
pub const FIELD_ENTITY_NAME: &str = "entity_name";
pub const FIELD_PRIMARY_KEY: &str = "primary_key";
pub const FIELD_COLLECTION: &str = "collection";

// Batch sizes
pub const FIELD_INSERTED: &str = "inserted";
pub const FIELD_UPDATED: &str = "updated";
pub const FIELD_DELETED: &str = "deleted";
pub const FIELD_FETCHED: &str = "fetched";

// Replication
pub const FIELD_PENDING: &str = "pending";
pub const FIELD_ATTEMPTS: &str = "attempts";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_REPLICATED: &str = "replicated";
pub const EVENT_REPLICATION_FAILED: &str = "replication_failed";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_distinct() {
        let events = [
            EVENT_START,
            EVENT_END,
            EVENT_END_ERROR,
            EVENT_REPLICATED,
            EVENT_REPLICATION_FAILED,
        ];
        for (i, a) in events.iter().enumerate() {
            for b in &events[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_error_fields_are_namespaced() {
        assert!(FIELD_ERR_KIND.starts_with("err."));
        assert!(FIELD_ERR_CODE.starts_with("err."));
    }
}
