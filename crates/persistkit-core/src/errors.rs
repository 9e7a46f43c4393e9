use thiserror::Error;

/// Result type alias using the canonical ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers (the coordinator, the
/// CLI, tests) can match on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Persisted data
    /// Persisted bytes could not be decoded into snapshots
    Decode,
    /// A snapshot or document could not be encoded
    Encode,

    // Query policy
    /// The fetch carried a predicate; the caller must filter in memory
    PredicateNotSupported,
    /// The fetch carried sort descriptors; the caller must sort in memory
    SortNotSupported,

    // Identity / routing
    /// A snapshot lacks the collection name needed to route it
    MissingRoutingField,
    /// Identifier lifecycle invariant broken (reuse, double promotion, overlap)
    IdentifierConflict,

    // Validation
    InvalidInput,
    NotFound,

    // Integration/IO
    Io,
    /// Remote replication engine call failed
    SyncEngine,
    Timeout,
    Concurrency,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Decode => "ERR_DECODE",
            ExErrorKind::Encode => "ERR_ENCODE",
            ExErrorKind::PredicateNotSupported => "ERR_PREDICATE_NOT_SUPPORTED",
            ExErrorKind::SortNotSupported => "ERR_SORT_NOT_SUPPORTED",
            ExErrorKind::MissingRoutingField => "ERR_MISSING_ROUTING_FIELD",
            ExErrorKind::IdentifierConflict => "ERR_IDENTIFIER_CONFLICT",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::SyncEngine => "ERR_SYNC_ENGINE",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// True for the two kinds that ask the caller to evaluate the query itself
    pub fn is_unsupported_query(&self) -> bool {
        matches!(
            self,
            ExErrorKind::PredicateNotSupported | ExErrorKind::SortNotSupported
        )
    }
}

/// Canonical structured error type
///
/// Carries a classification kind plus optional context (operation, store,
/// entity, identifier, collection) so that a failed save or fetch can be
/// logged and asserted on without string matching.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    store_id: Option<String>,
    entity_name: Option<String>,
    primary_key: Option<String>,
    collection: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            store_id: None,
            entity_name: None,
            primary_key: None,
            collection: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add store identifier context
    pub fn with_store_id(mut self, id: impl Into<String>) -> Self {
        self.store_id = Some(id.into());
        self
    }

    /// Add entity name context
    pub fn with_entity_name(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self
    }

    /// Add primary key context
    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    /// Add collection context
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn store_id(&self) -> Option<&str> {
        self.store_id.as_deref()
    }

    pub fn entity_name(&self) -> Option<&str> {
        self.entity_name.as_deref()
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(store_id) = &self.store_id {
            write!(f, " (store: {})", store_id)?;
        }
        if let (Some(entity), Some(key)) = (&self.entity_name, &self.primary_key) {
            write!(f, " (identifier: {}/{})", entity, key)?;
        } else if let Some(entity) = &self.entity_name {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(collection) = &self.collection {
            write!(f, " (collection: {})", collection)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Which part of a fetch request a backend refused to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedQueryKind {
    Predicate,
    Sort,
}

impl std::fmt::Display for UnsupportedQueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsupportedQueryKind::Predicate => f.write_str("predicate"),
            UnsupportedQueryKind::Sort => f.write_str("sort"),
        }
    }
}

/// Typed store errors raised at the call site
///
/// Converted into `ExError` at the store boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend does not evaluate this part of a fetch request
    #[error("Fetch {query} is not supported by this store; evaluate it in memory")]
    UnsupportedQuery { query: UnsupportedQueryKind },

    /// A snapshot has no collection name to route it by
    #[error("Snapshot {entity_name}/{primary_key} has no collection name")]
    MissingRoutingField {
        entity_name: String,
        primary_key: String,
    },

    /// A temporary identifier was promoted twice, or a permanent one re-promoted
    #[error("Identifier {entity_name}/{primary_key} cannot be promoted: {reason}")]
    IdentifierConflict {
        entity_name: String,
        primary_key: String,
        reason: String,
    },

    /// The same identifier appears in more than one list of a save request
    #[error("Identifier {entity_name}/{primary_key} appears in both {first} and {second}")]
    OverlappingRequest {
        entity_name: String,
        primary_key: String,
        first: &'static str,
        second: &'static str,
    },

    /// Persisted data is malformed
    #[error("Decode failed: {message}")]
    Decode { message: String },

    /// Encoding a snapshot or document failed
    #[error("Encode failed: {message}")]
    Encode { message: String },

    /// Required attribute missing or of the wrong type
    #[error("Attribute {attribute} on {entity_name}: {reason}")]
    InvalidAttribute {
        entity_name: String,
        attribute: String,
        reason: String,
    },
}

impl From<StoreError> for ExError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::UnsupportedQuery { query } => match query {
                UnsupportedQueryKind::Predicate => {
                    ExError::new(ExErrorKind::PredicateNotSupported).with_message(message)
                }
                UnsupportedQueryKind::Sort => {
                    ExError::new(ExErrorKind::SortNotSupported).with_message(message)
                }
            },

            StoreError::MissingRoutingField {
                entity_name,
                primary_key,
            } => ExError::new(ExErrorKind::MissingRoutingField)
                .with_entity_name(entity_name)
                .with_primary_key(primary_key)
                .with_message("Snapshot has no collection name"),

            StoreError::IdentifierConflict {
                entity_name,
                primary_key,
                reason,
            } => ExError::new(ExErrorKind::IdentifierConflict)
                .with_entity_name(entity_name)
                .with_primary_key(primary_key)
                .with_message(reason),

            StoreError::OverlappingRequest {
                entity_name,
                primary_key,
                ..
            } => ExError::new(ExErrorKind::IdentifierConflict)
                .with_entity_name(entity_name)
                .with_primary_key(primary_key)
                .with_message(message),

            StoreError::Decode { .. } => ExError::new(ExErrorKind::Decode).with_message(message),

            StoreError::Encode { .. } => ExError::new(ExErrorKind::Encode).with_message(message),

            StoreError::InvalidAttribute { entity_name, .. } => {
                ExError::new(ExErrorKind::Decode)
                    .with_entity_name(entity_name)
                    .with_message(message)
            }
        }
    }
}

/// Build a Decode error from a JSON failure
pub fn decode_error(op: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Decode)
        .with_op(op)
        .with_message(err.to_string())
}

/// Build an Encode error from a JSON failure
pub fn encode_error(op: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Encode)
        .with_op(op)
        .with_message(err.to_string())
}

/// Build an Io error
pub fn io_error(op: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(op)
        .with_message(err.to_string())
}

/// Build a Concurrency error for a poisoned lock
pub fn poisoned(op: &str) -> ExError {
    ExError::new(ExErrorKind::Concurrency)
        .with_op(op)
        .with_message("lock poisoned by a panicking holder")
}
