//! Normalized in-memory entity cache.
//!
//! The store maps `(EntityType, id)` to one [`EntityRecord`] and keeps, per
//! entity type, any number of named [`EntityList`]s of ids. Every operation
//! completes synchronously under a single per-type lock, so two calls on
//! unrelated entity types never interfere and no call observes another's
//! partial state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::pending::{PendingGuard, PendingMutations};
use crate::{DeleteOptions, Entity, EntityRecord, EntityType, ListKey, ListPosition, PageInfo};

/// Broadcast channel capacity for store updates.
const BROADCAST_CHANNEL_CAPACITY: usize = 1024;

/// Freshness of a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListStatus {
    /// Contents reflect the last successful fetch.
    Fresh,
    /// Contents may be outdated; the next read refetches.
    #[default]
    Stale,
    /// A fetch is in progress.
    Fetching,
}

/// Fetch bookkeeping for one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListState {
    pub status: ListStatus,
    /// Whether any fetch of this list has ever succeeded.
    pub fetched: bool,
    /// Message of the last failed fetch, cleared on success.
    pub error: Option<String>,
    pub next: Option<String>,
    pub prev: Option<String>,
    pub total_count: Option<u64>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Invalidated while a fetch was running; that fetch settles to Stale.
    stale_on_settle: bool,
}

impl ListState {
    /// Whether a read of this list should trigger a fetch.
    pub fn needs_fetch(&self) -> bool {
        self.status == ListStatus::Stale
    }
}

/// An ordered view over ids of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityList {
    pub ids: Vec<String>,
    pub state: ListState,
}

impl EntityList {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.ids.iter().position(|i| i == id) else {
            return false;
        };
        self.ids.remove(pos);
        if let Some(total) = self.state.total_count.as_mut() {
            *total = total.saturating_sub(1);
        }
        true
    }

    /// Insert ids not already present. Returns how many were added.
    fn splice(&mut self, ids: &[String], position: ListPosition) -> usize {
        let mut fresh: Vec<String> = Vec::new();
        for id in ids {
            if !self.contains(id) && !fresh.contains(id) {
                fresh.push(id.clone());
            }
        }
        let added = fresh.len();
        match position {
            ListPosition::Start => {
                fresh.append(&mut self.ids);
                self.ids = fresh;
            }
            ListPosition::End => self.ids.append(&mut fresh),
        }
        if let Some(total) = self.state.total_count.as_mut() {
            *total += added as u64;
        }
        added
    }
}

/// How a completed fetch is merged into its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// First page: the list becomes exactly the fetched ids.
    Replace,
    /// Following page: fetched ids are appended.
    Append,
}

/// Update event for store subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    /// Entities were inserted or replaced.
    Imported {
        entity_type: EntityType,
        ids: Vec<String>,
    },
    /// Entities were removed.
    Deleted {
        entity_type: EntityType,
        ids: Vec<String>,
        preserve_lists: bool,
    },
    /// Membership or state of a list changed.
    ListChanged {
        entity_type: EntityType,
        key: ListKey,
    },
    /// A list was marked stale.
    ListInvalidated {
        entity_type: EntityType,
        key: ListKey,
    },
    /// Every entity and list was dropped.
    Cleared,
}

#[derive(Debug, Default)]
struct EntityCache {
    store: HashMap<String, EntityRecord>,
    lists: HashMap<ListKey, EntityList>,
}

impl EntityCache {
    fn upsert(&mut self, records: Vec<EntityRecord>, entity_type: EntityType) -> Vec<String> {
        records
            .into_iter()
            .filter_map(|record| {
                if record.entity_type() != entity_type {
                    warn!(
                        expected = %entity_type,
                        actual = %record.entity_type(),
                        id = %record.id(),
                        "store: skipping record imported under the wrong type"
                    );
                    return None;
                }
                let id = record.id().to_string();
                self.store.insert(id.clone(), record);
                Some(id)
            })
            .collect()
    }
}

/// Process-wide cache of normalized entities and their lists.
///
/// Construct one per application context and share it by `Arc`.
pub struct EntityStore {
    caches: DashMap<EntityType, EntityCache>,
    pending: Arc<PendingMutations>,
    updates_tx: broadcast::Sender<StoreUpdate>,
}

impl EntityStore {
    /// Create a new empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to store updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates_tx.subscribe()
    }

    fn broadcast(&self, update: StoreUpdate) {
        if self.updates_tx.send(update).is_err() {
            trace!("no subscribers for store update");
        }
    }

    // =========================================================================
    // Entity operations
    // =========================================================================

    /// Insert or replace each record under `entity_type`, keyed by its id.
    ///
    /// Records of another type are skipped.
    pub fn import_entities(&self, records: Vec<EntityRecord>, entity_type: EntityType) {
        if records.is_empty() {
            return;
        }
        let ids = self.caches.entry(entity_type).or_default().upsert(records, entity_type);
        if ids.is_empty() {
            return;
        }
        trace!(entity_type = %entity_type, count = ids.len(), "store: entities imported");
        self.broadcast(StoreUpdate::Imported { entity_type, ids });
    }

    /// Typed form of [`import_entities`](Self::import_entities).
    pub fn import<T: Entity>(&self, entities: Vec<T>) {
        self.import_entities(
            entities.into_iter().map(Entity::into_record).collect(),
            T::TYPE,
        );
    }

    /// Import records and insert their ids into one list.
    ///
    /// Ids already in the list keep their position.
    pub fn import_into_list(
        &self,
        records: Vec<EntityRecord>,
        entity_type: EntityType,
        key: &ListKey,
        position: ListPosition,
    ) {
        let ids = {
            let mut cache = self.caches.entry(entity_type).or_default();
            let ids = cache.upsert(records, entity_type);
            cache
                .lists
                .entry(key.clone())
                .or_default()
                .splice(&ids, position);
            ids
        };
        trace!(entity_type = %entity_type, key = %key, count = ids.len(), "store: entities imported into list");
        if !ids.is_empty() {
            self.broadcast(StoreUpdate::Imported { entity_type, ids });
        }
        self.broadcast(StoreUpdate::ListChanged {
            entity_type,
            key: key.clone(),
        });
    }

    /// Remove entities by id.
    ///
    /// Unless `opts.preserve_lists` is set, the ids are also removed from
    /// every list of `entity_type`. Missing ids are ignored.
    pub fn delete_entities<I, S>(&self, ids: I, entity_type: EntityType, opts: DeleteOptions)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();

        let changed = {
            let Some(mut cache) = self.caches.get_mut(&entity_type) else {
                return;
            };
            let mut changed = false;
            for id in &ids {
                changed |= cache.store.remove(id).is_some();
                if !opts.preserve_lists {
                    for list in cache.lists.values_mut() {
                        changed |= list.remove(id);
                    }
                }
            }
            changed
        };

        if changed {
            trace!(
                entity_type = %entity_type,
                ids = ?ids,
                preserve_lists = opts.preserve_lists,
                "store: entities deleted"
            );
            self.broadcast(StoreUpdate::Deleted {
                entity_type,
                ids,
                preserve_lists: opts.preserve_lists,
            });
        }
    }

    /// Apply a typed in-place edit to a stored entity.
    ///
    /// Returns the entity as it was before the edit, or `None` if it is not
    /// stored. An edit that changes the id is reverted.
    pub fn update_entity<T, F>(&self, id: &str, edit: F) -> Option<T>
    where
        T: Entity,
        F: FnOnce(&mut T),
    {
        let snapshot = {
            let mut cache = self.caches.get_mut(&T::TYPE)?;
            let entity = cache.store.get_mut(id).and_then(T::from_record_mut)?;
            let snapshot = entity.clone();
            edit(entity);
            if entity.id() != id {
                warn!(entity_type = %T::TYPE, id = %id, "store: edit changed entity id, reverting");
                *entity = snapshot;
                return None;
            }
            snapshot
        };
        trace!(entity_type = %T::TYPE, id = %id, "store: entity updated");
        self.broadcast(StoreUpdate::Imported {
            entity_type: T::TYPE,
            ids: vec![id.to_string()],
        });
        Some(snapshot)
    }

    /// Get a typed entity by id.
    pub fn get<T: Entity>(&self, id: &str) -> Option<T> {
        self.caches
            .get(&T::TYPE)?
            .store
            .get(id)
            .and_then(T::from_record)
            .cloned()
    }

    /// Get a record by type and id.
    pub fn get_record(&self, entity_type: EntityType, id: &str) -> Option<EntityRecord> {
        self.caches.get(&entity_type)?.store.get(id).cloned()
    }

    pub fn contains(&self, entity_type: EntityType, id: &str) -> bool {
        self.caches
            .get(&entity_type)
            .is_some_and(|cache| cache.store.contains_key(id))
    }

    /// Number of stored entities of a type.
    pub fn len(&self, entity_type: EntityType) -> usize {
        self.caches
            .get(&entity_type)
            .map_or(0, |cache| cache.store.len())
    }

    pub fn is_empty(&self, entity_type: EntityType) -> bool {
        self.len(entity_type) == 0
    }

    // =========================================================================
    // List operations
    // =========================================================================

    /// Insert an id into a list, creating the list if needed.
    ///
    /// Returns false if the id was already present.
    pub fn add_entity_to_list(
        &self,
        entity_type: EntityType,
        key: &ListKey,
        id: &str,
        position: ListPosition,
    ) -> bool {
        let added = self
            .caches
            .entry(entity_type)
            .or_default()
            .lists
            .entry(key.clone())
            .or_default()
            .splice(&[id.to_string()], position)
            > 0;
        if added {
            trace!(entity_type = %entity_type, key = %key, id = %id, "store: id added to list");
            self.broadcast(StoreUpdate::ListChanged {
                entity_type,
                key: key.clone(),
            });
        }
        added
    }

    /// Remove an id from one list. Returns false if it was not present.
    pub fn remove_entity_from_list(&self, entity_type: EntityType, key: &ListKey, id: &str) -> bool {
        self.dismiss_entities([id], entity_type, key) > 0
    }

    /// Remove ids from one list, leaving the entities and other lists
    /// untouched. Returns how many ids were removed.
    pub fn dismiss_entities<I, S>(&self, ids: I, entity_type: EntityType, key: &ListKey) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed = {
            let Some(mut cache) = self.caches.get_mut(&entity_type) else {
                return 0;
            };
            let Some(list) = cache.lists.get_mut(key) else {
                return 0;
            };
            ids.into_iter()
                .filter(|id| list.remove(id.as_ref()))
                .count()
        };
        if removed > 0 {
            trace!(entity_type = %entity_type, key = %key, removed, "store: ids dismissed from list");
            self.broadcast(StoreUpdate::ListChanged {
                entity_type,
                key: key.clone(),
            });
        }
        removed
    }

    /// Mark a list stale so its next read refetches.
    ///
    /// Ids are kept, so readers see the old contents until the refetch lands.
    /// Invalidating a list mid-fetch makes that fetch settle as stale.
    pub fn invalidate_list(&self, entity_type: EntityType, key: &ListKey) {
        {
            let Some(mut cache) = self.caches.get_mut(&entity_type) else {
                return;
            };
            let Some(list) = cache.lists.get_mut(key) else {
                return;
            };
            match list.state.status {
                ListStatus::Fresh => list.state.status = ListStatus::Stale,
                ListStatus::Fetching => list.state.stale_on_settle = true,
                ListStatus::Stale => {}
            }
        }
        trace!(entity_type = %entity_type, key = %key, "store: list invalidated");
        self.broadcast(StoreUpdate::ListInvalidated {
            entity_type,
            key: key.clone(),
        });
    }

    /// Move a list to Fetching. Returns false if a fetch is already running.
    pub fn begin_list_fetch(&self, entity_type: EntityType, key: &ListKey) -> bool {
        let mut cache = self.caches.entry(entity_type).or_default();
        let list = cache.lists.entry(key.clone()).or_default();
        if list.state.status == ListStatus::Fetching {
            return false;
        }
        list.state.status = ListStatus::Fetching;
        list.state.stale_on_settle = false;
        true
    }

    /// Land a successful fetch: import the records, merge their ids into the
    /// list and move it to Fresh.
    pub fn complete_list_fetch(
        &self,
        records: Vec<EntityRecord>,
        entity_type: EntityType,
        key: &ListKey,
        page: PageInfo,
        mode: FetchMode,
    ) {
        let ids = {
            let mut cache = self.caches.entry(entity_type).or_default();
            let ids = cache.upsert(records, entity_type);
            let list = cache.lists.entry(key.clone()).or_default();
            match mode {
                FetchMode::Replace => {
                    list.ids.clear();
                    list.splice(&ids, ListPosition::End);
                    list.state.total_count = page.total_count;
                    list.state.prev = page.prev;
                }
                FetchMode::Append => {
                    // The server total already counts the ids of later pages.
                    let total_count = list.state.total_count;
                    list.splice(&ids, ListPosition::End);
                    list.state.total_count = page.total_count.or(total_count);
                }
            }
            list.state.next = page.next;
            list.state.fetched = true;
            list.state.error = None;
            list.state.last_fetched_at = Some(Utc::now());
            list.state.status = if list.state.stale_on_settle {
                ListStatus::Stale
            } else {
                ListStatus::Fresh
            };
            list.state.stale_on_settle = false;
            ids
        };
        trace!(entity_type = %entity_type, key = %key, count = ids.len(), "store: list fetch completed");
        if !ids.is_empty() {
            self.broadcast(StoreUpdate::Imported { entity_type, ids });
        }
        self.broadcast(StoreUpdate::ListChanged {
            entity_type,
            key: key.clone(),
        });
    }

    /// Record a failed fetch. The list keeps its ids and becomes Stale.
    pub fn fail_list_fetch(&self, entity_type: EntityType, key: &ListKey, error: &str) {
        {
            let mut cache = self.caches.entry(entity_type).or_default();
            let list = cache.lists.entry(key.clone()).or_default();
            list.state.status = ListStatus::Stale;
            list.state.error = Some(error.to_string());
            list.state.stale_on_settle = false;
        }
        warn!(entity_type = %entity_type, key = %key, error = %error, "store: list fetch failed");
        self.broadcast(StoreUpdate::ListChanged {
            entity_type,
            key: key.clone(),
        });
    }

    /// Snapshot of a list.
    pub fn list(&self, entity_type: EntityType, key: &ListKey) -> Option<EntityList> {
        self.caches.get(&entity_type)?.lists.get(key).cloned()
    }

    pub fn list_ids(&self, entity_type: EntityType, key: &ListKey) -> Option<Vec<String>> {
        self.caches
            .get(&entity_type)?
            .lists
            .get(key)
            .map(|list| list.ids.clone())
    }

    pub fn list_state(&self, entity_type: EntityType, key: &ListKey) -> Option<ListState> {
        self.caches
            .get(&entity_type)?
            .lists
            .get(key)
            .map(|list| list.state.clone())
    }

    /// Entities of a list, in list order. Ids with no stored entity are
    /// skipped.
    pub fn list_entities<T: Entity>(&self, key: &ListKey) -> Vec<T> {
        let Some(cache) = self.caches.get(&T::TYPE) else {
            return Vec::new();
        };
        let Some(list) = cache.lists.get(key) else {
            return Vec::new();
        };
        list.ids
            .iter()
            .filter_map(|id| cache.store.get(id).and_then(T::from_record).cloned())
            .collect()
    }

    /// Keys of every list of a type, sorted.
    pub fn list_keys(&self, entity_type: EntityType) -> Vec<ListKey> {
        let mut keys: Vec<_> = self
            .caches
            .get(&entity_type)
            .map(|cache| cache.lists.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Drop every entity and list.
    pub fn clear(&self) {
        self.caches.clear();
        self.broadcast(StoreUpdate::Cleared);
    }

    // =========================================================================
    // In-flight mutations
    // =========================================================================

    /// Claim the in-flight slot for `(entity_type, key)`.
    pub fn begin_mutation(&self, entity_type: EntityType, key: &str) -> Option<PendingGuard> {
        self.pending.try_begin(entity_type, key)
    }

    /// Whether a mutation currently holds `(entity_type, key)`.
    pub fn is_pending(&self, entity_type: EntityType, key: &str) -> bool {
        self.pending.is_pending(entity_type, key)
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        let (updates_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Self {
            caches: DashMap::new(),
            pending: Arc::new(PendingMutations::default()),
            updates_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BookmarkFolder, Group};
    use pretty_assertions::assert_eq;

    fn folder(id: &str, name: &str) -> BookmarkFolder {
        BookmarkFolder {
            id: id.to_string(),
            name: name.to_string(),
            emoji: None,
            emoji_url: None,
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_import_and_get() {
        let store = EntityStore::new();
        store.import(vec![folder("f1", "Read later"), folder("f2", "Recipes")]);

        assert_eq!(store.len(EntityType::BookmarkFolders), 2);
        assert_eq!(
            store.get::<BookmarkFolder>("f1"),
            Some(folder("f1", "Read later"))
        );
        assert!(store.get::<Group>("f1").is_none());
    }

    #[test]
    fn test_import_replaces_whole_record() {
        let store = EntityStore::new();
        store.import(vec![BookmarkFolder {
            emoji: Some("📚".to_string()),
            ..folder("f1", "Read later")
        }]);
        store.import(vec![folder("f1", "Later")]);

        let stored = store.get::<BookmarkFolder>("f1").unwrap();
        assert_eq!(stored.name, "Later");
        assert_eq!(stored.emoji, None);
        assert_eq!(store.len(EntityType::BookmarkFolders), 1);
    }

    #[test]
    fn test_import_skips_wrong_type() {
        let store = EntityStore::new();
        store.import_entities(
            vec![folder("f1", "a").into_record()],
            EntityType::Groups,
        );
        assert_eq!(store.len(EntityType::Groups), 0);
        assert_eq!(store.len(EntityType::BookmarkFolders), 0);
    }

    #[test]
    fn test_delete_removes_from_every_list() {
        let store = EntityStore::new();
        let a = ListKey::root();
        let b = ListKey::from("pinned");
        store.import_into_list(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &a,
            ListPosition::End,
        );
        store.add_entity_to_list(EntityType::BookmarkFolders, &b, "f1", ListPosition::End);

        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::default());

        assert!(!store.contains(EntityType::BookmarkFolders, "f1"));
        assert_eq!(store.list_ids(EntityType::BookmarkFolders, &a), Some(ids(&["f2"])));
        assert_eq!(store.list_ids(EntityType::BookmarkFolders, &b), Some(vec![]));
    }

    #[test]
    fn test_delete_preserving_lists() {
        let store = EntityStore::new();
        let key = ListKey::root();
        store.import_into_list(
            vec![folder("f1", "a").into_record()],
            EntityType::BookmarkFolders,
            &key,
            ListPosition::End,
        );

        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::preserve_lists());

        assert!(store.get::<BookmarkFolder>("f1").is_none());
        assert_eq!(store.list_ids(EntityType::BookmarkFolders, &key), Some(ids(&["f1"])));
        // Ids without a stored entity are skipped when resolving.
        assert!(store.list_entities::<BookmarkFolder>(&key).is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = EntityStore::new();
        let key = ListKey::root();
        store.import_into_list(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &key,
            ListPosition::End,
        );

        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::default());
        let once = (
            store.get::<BookmarkFolder>("f2"),
            store.list(EntityType::BookmarkFolders, &key),
        );
        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::default());
        let twice = (
            store.get::<BookmarkFolder>("f2"),
            store.list(EntityType::BookmarkFolders, &key),
        );
        assert_eq!(once, twice);

        // Unknown type and id are no-ops.
        store.delete_entities(["zzz"], EntityType::Statuses, DeleteOptions::default());
    }

    #[test]
    fn test_list_membership_edits_are_idempotent() {
        let store = EntityStore::new();
        let key = ListKey::new(["members", "g1"]);

        assert!(store.add_entity_to_list(EntityType::GroupMemberships, &key, "m1", ListPosition::End));
        assert!(!store.add_entity_to_list(EntityType::GroupMemberships, &key, "m1", ListPosition::Start));
        assert!(store.add_entity_to_list(EntityType::GroupMemberships, &key, "m0", ListPosition::Start));
        assert_eq!(
            store.list_ids(EntityType::GroupMemberships, &key),
            Some(ids(&["m0", "m1"]))
        );

        assert!(store.remove_entity_from_list(EntityType::GroupMemberships, &key, "m1"));
        assert!(!store.remove_entity_from_list(EntityType::GroupMemberships, &key, "m1"));
        assert_eq!(
            store.list_ids(EntityType::GroupMemberships, &key),
            Some(ids(&["m0"]))
        );
    }

    #[test]
    fn test_import_into_list_start_keeps_existing_positions() {
        let store = EntityStore::new();
        let key = ListKey::root();
        store.import_into_list(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &key,
            ListPosition::End,
        );
        store.import_into_list(
            vec![folder("f3", "c").into_record(), folder("f2", "b2").into_record()],
            EntityType::BookmarkFolders,
            &key,
            ListPosition::Start,
        );
        assert_eq!(
            store.list_ids(EntityType::BookmarkFolders, &key),
            Some(ids(&["f3", "f1", "f2"]))
        );
        assert_eq!(store.get::<BookmarkFolder>("f2").unwrap().name, "b2");
    }

    #[test]
    fn test_total_count_tracks_membership() {
        let store = EntityStore::new();
        let key = ListKey::root();
        assert!(store.begin_list_fetch(EntityType::BookmarkFolders, &key));
        store.complete_list_fetch(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo {
                total_count: Some(10),
                ..PageInfo::default()
            },
            FetchMode::Replace,
        );
        assert_eq!(store.list_state(EntityType::BookmarkFolders, &key).unwrap().total_count, Some(10));

        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::default());
        store.add_entity_to_list(EntityType::BookmarkFolders, &key, "f9", ListPosition::End);
        store.add_entity_to_list(EntityType::BookmarkFolders, &key, "f8", ListPosition::End);
        assert_eq!(store.list_state(EntityType::BookmarkFolders, &key).unwrap().total_count, Some(11));
    }

    #[test]
    fn test_list_fetch_lifecycle() {
        let store = EntityStore::new();
        let key = ListKey::root();

        assert!(store.begin_list_fetch(EntityType::BookmarkFolders, &key));
        assert!(!store.begin_list_fetch(EntityType::BookmarkFolders, &key));
        store.complete_list_fetch(
            vec![folder("f1", "a").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo {
                next: Some("https://social.example/next".to_string()),
                ..PageInfo::default()
            },
            FetchMode::Replace,
        );

        let state = store.list_state(EntityType::BookmarkFolders, &key).unwrap();
        assert_eq!(state.status, ListStatus::Fresh);
        assert!(state.fetched);
        assert!(state.last_fetched_at.is_some());
        assert_eq!(state.next.as_deref(), Some("https://social.example/next"));

        store.invalidate_list(EntityType::BookmarkFolders, &key);
        let state = store.list_state(EntityType::BookmarkFolders, &key).unwrap();
        assert_eq!(state.status, ListStatus::Stale);
        assert_eq!(store.list_ids(EntityType::BookmarkFolders, &key), Some(ids(&["f1"])));

        assert!(store.begin_list_fetch(EntityType::BookmarkFolders, &key));
        store.fail_list_fetch(EntityType::BookmarkFolders, &key, "request failed with status 502");
        let state = store.list_state(EntityType::BookmarkFolders, &key).unwrap();
        assert_eq!(state.status, ListStatus::Stale);
        assert_eq!(state.error.as_deref(), Some("request failed with status 502"));
        assert_eq!(store.list_ids(EntityType::BookmarkFolders, &key), Some(ids(&["f1"])));
    }

    #[test]
    fn test_invalidate_during_fetch_settles_stale() {
        let store = EntityStore::new();
        let key = ListKey::root();

        assert!(store.begin_list_fetch(EntityType::Groups, &key));
        store.invalidate_list(EntityType::Groups, &key);
        store.complete_list_fetch(vec![], EntityType::Groups, &key, PageInfo::default(), FetchMode::Replace);

        let state = store.list_state(EntityType::Groups, &key).unwrap();
        assert_eq!(state.status, ListStatus::Stale);
        assert!(state.fetched);
    }

    #[test]
    fn test_append_page() {
        let store = EntityStore::new();
        let key = ListKey::root();
        store.begin_list_fetch(EntityType::BookmarkFolders, &key);
        store.complete_list_fetch(
            vec![folder("f1", "a").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo {
                next: Some("n1".into()),
                prev: Some("p1".into()),
                total_count: None,
            },
            FetchMode::Replace,
        );
        store.begin_list_fetch(EntityType::BookmarkFolders, &key);
        store.complete_list_fetch(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo::default(),
            FetchMode::Append,
        );

        let list = store.list(EntityType::BookmarkFolders, &key).unwrap();
        assert_eq!(list.ids, ids(&["f1", "f2"]));
        assert_eq!(list.state.next, None);
        assert_eq!(list.state.prev.as_deref(), Some("p1"));
    }

    #[test]
    fn test_append_page_keeps_server_total() {
        let store = EntityStore::new();
        let key = ListKey::root();
        store.begin_list_fetch(EntityType::BookmarkFolders, &key);
        store.complete_list_fetch(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo {
                next: Some("n1".into()),
                prev: None,
                total_count: Some(4),
            },
            FetchMode::Replace,
        );
        store.begin_list_fetch(EntityType::BookmarkFolders, &key);
        store.complete_list_fetch(
            vec![folder("f3", "c").into_record(), folder("f4", "d").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo::default(),
            FetchMode::Append,
        );

        let state = store.list_state(EntityType::BookmarkFolders, &key).unwrap();
        assert_eq!(state.total_count, Some(4));

        store.begin_list_fetch(EntityType::BookmarkFolders, &key);
        store.complete_list_fetch(
            vec![folder("f5", "e").into_record()],
            EntityType::BookmarkFolders,
            &key,
            PageInfo {
                total_count: Some(5),
                ..PageInfo::default()
            },
            FetchMode::Append,
        );
        let state = store.list_state(EntityType::BookmarkFolders, &key).unwrap();
        assert_eq!(state.total_count, Some(5));
    }

    #[test]
    fn test_update_entity_returns_snapshot() {
        let store = EntityStore::new();
        store.import(vec![folder("f1", "Read later")]);

        let before = store.update_entity::<BookmarkFolder, _>("f1", |f| f.name = "Later".to_string());
        assert_eq!(before, Some(folder("f1", "Read later")));
        assert_eq!(store.get::<BookmarkFolder>("f1").unwrap().name, "Later");

        assert!(store.update_entity::<BookmarkFolder, _>("missing", |_| {}).is_none());
    }

    #[test]
    fn test_update_entity_rejects_id_change() {
        let store = EntityStore::new();
        store.import(vec![folder("f1", "Read later")]);

        let result = store.update_entity::<BookmarkFolder, _>("f1", |f| f.id = "f2".to_string());
        assert!(result.is_none());
        assert_eq!(store.get::<BookmarkFolder>("f1"), Some(folder("f1", "Read later")));
    }

    #[test]
    fn test_dismiss_keeps_entity() {
        let store = EntityStore::new();
        let key = ListKey::root();
        store.import_into_list(
            vec![folder("f1", "a").into_record(), folder("f2", "b").into_record()],
            EntityType::BookmarkFolders,
            &key,
            ListPosition::End,
        );

        assert_eq!(store.dismiss_entities(["f1", "nope"], EntityType::BookmarkFolders, &key), 1);
        assert!(store.contains(EntityType::BookmarkFolders, "f1"));
        assert_eq!(store.list_ids(EntityType::BookmarkFolders, &key), Some(ids(&["f2"])));
    }

    #[test]
    fn test_subscribe_updates() {
        let store = EntityStore::new();
        let mut rx = store.subscribe();

        store.import(vec![folder("f1", "a")]);
        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::default());
        // Second delete changes nothing and sends nothing.
        store.delete_entities(["f1"], EntityType::BookmarkFolders, DeleteOptions::default());
        store.clear();

        assert_eq!(
            rx.try_recv().unwrap(),
            StoreUpdate::Imported {
                entity_type: EntityType::BookmarkFolders,
                ids: ids(&["f1"]),
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreUpdate::Deleted {
                entity_type: EntityType::BookmarkFolders,
                ids: ids(&["f1"]),
                preserve_lists: false,
            }
        );
        assert_eq!(rx.try_recv().unwrap(), StoreUpdate::Cleared);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_imports_of_different_types() {
        let store = EntityStore::new();
        let mut handles = vec![];

        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    let id = format!("{}-{}", i, j);
                    if i % 2 == 0 {
                        store.import(vec![folder(&id, "x")]);
                    } else {
                        store.add_entity_to_list(
                            EntityType::Groups,
                            &ListKey::root(),
                            &id,
                            ListPosition::End,
                        );
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(EntityType::BookmarkFolders), 400);
        assert_eq!(
            store.list_ids(EntityType::Groups, &ListKey::root()).unwrap().len(),
            400
        );
    }
}
