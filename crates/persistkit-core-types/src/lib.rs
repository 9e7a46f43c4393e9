//! Core types shared across the persistkit facilities
//!
//! This crate provides the foundational types used by the error, logging and
//! store layers:
//!
//! - **Correlation types**: RequestId (one per save/fetch), OperationId (one per
//!   replication outbox entry)
//! - **Sensitive data**: Sensitive<T> marker for automatic redaction of
//!   engine credentials
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::{OperationId, RequestId};
pub use sensitive::Sensitive;
