//! Registry of mutations currently in flight.
//!
//! At most one delete or update may target a given `(type, id)` at a time.
//! The slot is held by a [`PendingGuard`] and released when the guard drops,
//! whichever way the mutation ends.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::trace;

use crate::EntityType;

#[derive(Debug, Default)]
pub(crate) struct PendingMutations {
    slots: DashSet<(EntityType, String)>,
}

impl PendingMutations {
    /// Claim the slot for `(entity_type, key)`, or `None` if it is taken.
    pub(crate) fn try_begin(
        self: &Arc<Self>,
        entity_type: EntityType,
        key: &str,
    ) -> Option<PendingGuard> {
        if !self.slots.insert((entity_type, key.to_string())) {
            return None;
        }
        trace!(entity_type = %entity_type, key = %key, "mutation slot claimed");
        Some(PendingGuard {
            registry: Arc::clone(self),
            entity_type,
            key: key.to_string(),
        })
    }

    pub(crate) fn is_pending(&self, entity_type: EntityType, key: &str) -> bool {
        self.slots.contains(&(entity_type, key.to_string()))
    }
}

/// Holds one in-flight slot until dropped.
#[derive(Debug)]
pub struct PendingGuard {
    registry: Arc<PendingMutations>,
    entity_type: EntityType,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry
            .slots
            .remove(&(self.entity_type, std::mem::take(&mut self.key)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_is_exclusive_until_dropped() {
        let registry = Arc::new(PendingMutations::default());

        let guard = registry.try_begin(EntityType::Statuses, "s1");
        assert!(guard.is_some());
        assert!(registry.is_pending(EntityType::Statuses, "s1"));
        assert!(registry.try_begin(EntityType::Statuses, "s1").is_none());

        // Same id under another type is independent.
        assert!(registry.try_begin(EntityType::Accounts, "s1").is_some());

        drop(guard);
        assert!(!registry.is_pending(EntityType::Statuses, "s1"));
        assert!(registry.try_begin(EntityType::Statuses, "s1").is_some());
    }
}
