pub mod entity_schema;
pub mod identifier;
pub mod request;
pub mod snapshot;

pub use entity_schema::{AttributeKind, EntitySchema, Schema};
pub use identifier::PersistentIdentifier;
pub use request::{
    FetchRequest, FetchResult, Predicate, SaveRequest, SaveResult, SortDescriptor, SortOrder,
};
pub use snapshot::{Relationship, Snapshot};
