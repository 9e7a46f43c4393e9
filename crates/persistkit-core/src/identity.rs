//! Identifier authority
//!
//! Mints permanent identifiers for one store and remembers which temporary
//! identifiers it has already promoted. Promotion is two-phase: `mint_for`
//! hands out a candidate, and `commit` records it only after the batch that
//! carried it has been written durably. A save that fails before `commit`
//! can therefore be retried with the same temporary identifiers.
//!
//! Only the most recent promotions are remembered (`DEFAULT_PROMOTION_MEMORY`
//! by default). An older temporary identifier submitted again is minted a
//! fresh key.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::errors::StoreError;
use crate::model::PersistentIdentifier;

/// Collision retries before giving up on a fresh key
const MINT_ATTEMPTS: usize = 3;

/// Promotions remembered per authority
pub const DEFAULT_PROMOTION_MEMORY: usize = 4096;

#[derive(Debug, Clone)]
pub struct IdentifierAuthority {
    store_identifier: String,
    promoted: HashMap<PersistentIdentifier, PersistentIdentifier>,
    // commit order, oldest first
    order: VecDeque<PersistentIdentifier>,
    capacity: usize,
}

impl IdentifierAuthority {
    pub fn new(store_identifier: impl Into<String>) -> Self {
        Self::with_capacity(store_identifier, DEFAULT_PROMOTION_MEMORY)
    }

    /// An authority remembering at most `capacity` promotions
    pub fn with_capacity(store_identifier: impl Into<String>, capacity: usize) -> Self {
        Self {
            store_identifier: store_identifier.into(),
            promoted: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn store_identifier(&self) -> &str {
        &self.store_identifier
    }

    /// A fresh permanent identifier for `entity_name` (UUID v4 key)
    pub fn mint(&self, entity_name: &str) -> PersistentIdentifier {
        PersistentIdentifier::permanent(
            self.store_identifier.clone(),
            entity_name,
            Uuid::new_v4().to_string(),
        )
    }

    /// Candidate permanent identifier for `temporary`
    ///
    /// `exists` reports keys already taken in the backing table; a colliding
    /// candidate is re-minted.
    ///
    /// # Errors
    ///
    /// `IdentifierConflict` when `temporary` is not temporary, was already
    /// promoted, or no free key could be found.
    pub fn mint_for(
        &self,
        temporary: &PersistentIdentifier,
        exists: impl Fn(&PersistentIdentifier) -> bool,
    ) -> std::result::Result<PersistentIdentifier, StoreError> {
        let conflict = |reason: &str| StoreError::IdentifierConflict {
            entity_name: temporary.entity_name().to_string(),
            primary_key: temporary.primary_key().to_string(),
            reason: reason.to_string(),
        };

        if !temporary.is_temporary() {
            return Err(conflict("identifier is already permanent"));
        }
        if let Some(existing) = self.promoted.get(temporary) {
            return Err(conflict(&format!("already promoted to {}", existing)));
        }

        for _ in 0..MINT_ATTEMPTS {
            let candidate = self.mint(temporary.entity_name());
            if !exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(conflict("no free primary key after repeated collisions"))
    }

    /// Record promotions after the batch carrying them is durable, forgetting
    /// the oldest beyond capacity
    pub fn commit(&mut self, remapped: &HashMap<PersistentIdentifier, PersistentIdentifier>) {
        for (temporary, permanent) in remapped {
            if self
                .promoted
                .insert(temporary.clone(), permanent.clone())
                .is_none()
            {
                self.order.push_back(temporary.clone());
            }
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.promoted.remove(&oldest);
            }
        }
    }

    /// Number of promotions currently remembered
    pub fn remembered(&self) -> usize {
        self.promoted.len()
    }

    /// Permanent identifier a temporary one was promoted to, if any
    pub fn permanent_for(&self, temporary: &PersistentIdentifier) -> Option<&PersistentIdentifier> {
        self.promoted.get(temporary)
    }
}
