//! Single-file JSON table storage
//!
//! Provides the atomic write primitive, the table file format, and the
//! `JsonFileStore` backend built on them

pub mod atomic;
pub mod store;
pub mod table;

pub use store::{store_identifier_for, JsonFileStore};
pub use table::Table;
