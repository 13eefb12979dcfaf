//! Stateful property testing for the entity store.
//!
//! Uses proptest-state-machine to drive the store and the delete hook
//! through random sequences of imports, list edits and deletes. The model
//! tracks:
//!
//! - Which entities exist and under which name
//! - Membership and order of each list
//! - Outcome of optimistic deletes that either commit or roll back

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tokio::runtime::Runtime;

use soapstone_entities::testing::QueuedExecutor;
use soapstone_entities::{
    ApiResponse, BookmarkFolder, DeleteEntity, DeleteOptions, Entity, EntityRequest, EntityStore,
    EntityType, ListKey, ListPosition,
};

const IDS: [&str; 5] = ["f1", "f2", "f3", "f4", "f5"];
const KEYS: [&str; 3] = ["", "pinned", "archive"];

fn list_key(name: &str) -> ListKey {
    if name.is_empty() {
        ListKey::root()
    } else {
        ListKey::from(name)
    }
}

fn folder(id: &str, name: &str) -> BookmarkFolder {
    BookmarkFolder {
        id: id.to_string(),
        name: name.to_string(),
        emoji: None,
        emoji_url: None,
    }
}

/// Operations that can be performed on the store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Insert or replace an entity.
    Import { id: &'static str, name: String },
    /// Import an entity and insert it into a list.
    ImportIntoList {
        id: &'static str,
        name: String,
        key: &'static str,
        at_start: bool,
    },
    /// Insert an id into a list.
    AddToList {
        id: &'static str,
        key: &'static str,
        at_start: bool,
    },
    /// Remove an id from one list.
    RemoveFromList { id: &'static str, key: &'static str },
    /// Direct store delete.
    Delete { id: &'static str, preserve_lists: bool },
    /// Delete through the hook; the server accepts or rejects it.
    OptimisticDelete { id: &'static str, succeed: bool },
}

/// Reference model for the store state.
#[derive(Clone, Debug, Default)]
pub struct StoreModel {
    /// Stored entities by id, holding the folder name.
    pub entities: BTreeMap<String, String>,
    /// Lists by key name.
    pub lists: BTreeMap<&'static str, Vec<String>>,
}

impl StoreModel {
    fn insert(&mut self, key: &'static str, id: &str, at_start: bool) {
        let list = self.lists.entry(key).or_default();
        if list.iter().any(|i| i == id) {
            return;
        }
        if at_start {
            list.insert(0, id.to_string());
        } else {
            list.push(id.to_string());
        }
    }

    fn remove_everywhere(&mut self, id: &str) {
        for list in self.lists.values_mut() {
            list.retain(|i| i != id);
        }
    }
}

fn id_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(IDS.to_vec())
}

fn key_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(KEYS.to_vec())
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

impl ReferenceStateMachine for StoreModel {
    type State = Self;
    type Transition = StoreOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            3 => (id_strategy(), name_strategy())
                .prop_map(|(id, name)| StoreOperation::Import { id, name }),
            3 => (id_strategy(), name_strategy(), key_strategy(), any::<bool>())
                .prop_map(|(id, name, key, at_start)| StoreOperation::ImportIntoList {
                    id,
                    name,
                    key,
                    at_start,
                }),
            2 => (id_strategy(), key_strategy(), any::<bool>())
                .prop_map(|(id, key, at_start)| StoreOperation::AddToList { id, key, at_start }),
            1 => (id_strategy(), key_strategy())
                .prop_map(|(id, key)| StoreOperation::RemoveFromList { id, key }),
            1 => (id_strategy(), any::<bool>())
                .prop_map(|(id, preserve_lists)| StoreOperation::Delete { id, preserve_lists }),
            2 => (id_strategy(), any::<bool>())
                .prop_map(|(id, succeed)| StoreOperation::OptimisticDelete { id, succeed }),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            StoreOperation::Import { id, name } => {
                state.entities.insert(id.to_string(), name.clone());
            }
            StoreOperation::ImportIntoList {
                id,
                name,
                key,
                at_start,
            } => {
                state.entities.insert(id.to_string(), name.clone());
                state.insert(*key, id, *at_start);
            }
            StoreOperation::AddToList { id, key, at_start } => {
                state.insert(*key, id, *at_start);
            }
            StoreOperation::RemoveFromList { id, key } => {
                if let Some(list) = state.lists.get_mut(key) {
                    list.retain(|i| i != id);
                }
            }
            StoreOperation::Delete { id, preserve_lists } => {
                state.entities.remove(*id);
                if !preserve_lists {
                    state.remove_everywhere(id);
                }
            }
            StoreOperation::OptimisticDelete { id, succeed } => {
                // A rejected delete leaves everything as it was.
                if *succeed {
                    state.entities.remove(*id);
                    state.remove_everywhere(id);
                }
            }
        }
        state
    }
}

/// Test harness that wraps the real store and delete hook with a tokio runtime.
pub struct StoreTestHarness {
    runtime: Runtime,
    store: Arc<EntityStore>,
    executor: Arc<QueuedExecutor>,
    deleter: DeleteEntity,
}

impl StoreTestHarness {
    fn new() -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let store = EntityStore::new();
        let executor = QueuedExecutor::new();
        let deleter = DeleteEntity::new(
            Arc::clone(&store),
            executor.clone(),
            EntityType::BookmarkFolders,
            EntityRequest::delete("/api/v1/pleroma/bookmark_folders/:id").expect("valid template"),
        );
        Self {
            runtime,
            store,
            executor,
            deleter,
        }
    }

    fn apply_operation(&self, op: &StoreOperation) {
        let ty = EntityType::BookmarkFolders;
        match op {
            StoreOperation::Import { id, name } => {
                self.store.import(vec![folder(id, name)]);
            }
            StoreOperation::ImportIntoList {
                id,
                name,
                key,
                at_start,
            } => {
                let position = if *at_start {
                    ListPosition::Start
                } else {
                    ListPosition::End
                };
                self.store.import_into_list(
                    vec![folder(id, name).into_record()],
                    ty,
                    &list_key(key),
                    position,
                );
            }
            StoreOperation::AddToList { id, key, at_start } => {
                let position = if *at_start {
                    ListPosition::Start
                } else {
                    ListPosition::End
                };
                self.store.add_entity_to_list(ty, &list_key(key), id, position);
            }
            StoreOperation::RemoveFromList { id, key } => {
                self.store.remove_entity_from_list(ty, &list_key(key), id);
            }
            StoreOperation::Delete { id, preserve_lists } => {
                let opts = DeleteOptions {
                    preserve_lists: *preserve_lists,
                };
                self.store.delete_entities([*id], ty, opts);
            }
            StoreOperation::OptimisticDelete { id, succeed } => {
                if *succeed {
                    self.executor.push(Ok(ApiResponse::empty()));
                } else {
                    self.executor.push_status(500);
                }
                let result = self.runtime.block_on(async { self.deleter.delete(id).await });
                assert_eq!(result.is_ok(), *succeed, "unexpected delete outcome: {:?}", result);
            }
        }
    }

    fn verify_invariants(&self, model: &StoreModel) {
        let ty = EntityType::BookmarkFolders;

        // Invariant 1: stored entities match the model
        assert_eq!(self.store.len(ty), model.entities.len());
        for (id, name) in &model.entities {
            let stored = self.store.get::<BookmarkFolder>(id);
            assert_eq!(stored.map(|f| f.name), Some(name.clone()), "entity {} mismatch", id);
        }

        // Invariant 2: every list matches the model, order included
        for (key, ids) in &model.lists {
            let actual = self.store.list_ids(ty, &list_key(key)).unwrap_or_default();
            assert_eq!(&actual, ids, "list {:?} mismatch", key);
        }

        // Invariant 3: no list holds an id twice
        for key in self.store.list_keys(ty) {
            let mut ids = self.store.list_ids(ty, &key).unwrap_or_default();
            let len = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), len, "duplicate ids in list {}", key);
        }

        // Invariant 4: no mutation slot is left claimed
        for id in IDS {
            assert!(!self.store.is_pending(ty, id), "slot {} still claimed", id);
        }
        assert!(!self.deleter.is_loading());
    }
}

impl StateMachineTest for StoreTestHarness {
    type SystemUnderTest = Self;
    type Reference = StoreModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_operation(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn store_state_machine_test(sequential 1..60 => StoreTestHarness);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn delete_is_idempotent(
        ids in prop::collection::vec(id_strategy(), 1..10),
        target in id_strategy(),
        preserve_lists in any::<bool>(),
    ) {
        let store = EntityStore::new();
        for id in &ids {
            store.import_into_list(
                vec![folder(id, "x").into_record()],
                EntityType::BookmarkFolders,
                &ListKey::root(),
                ListPosition::End,
            );
        }
        let opts = DeleteOptions { preserve_lists };

        store.delete_entities([target], EntityType::BookmarkFolders, opts);
        let once = store.list(EntityType::BookmarkFolders, &ListKey::root());
        let len_once = store.len(EntityType::BookmarkFolders);

        store.delete_entities([target], EntityType::BookmarkFolders, opts);
        prop_assert_eq!(store.list(EntityType::BookmarkFolders, &ListKey::root()), once);
        prop_assert_eq!(store.len(EntityType::BookmarkFolders), len_once);
    }

    #[test]
    fn failed_delete_restores_prior_state(
        ids in prop::collection::vec(id_strategy(), 1..10),
        target in id_strategy(),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let store = EntityStore::new();
            for id in &ids {
                store.import_into_list(
                    vec![folder(id, id).into_record()],
                    EntityType::BookmarkFolders,
                    &ListKey::root(),
                    ListPosition::End,
                );
            }
            let before_entity = store.get::<BookmarkFolder>(target);
            let before_list = store.list(EntityType::BookmarkFolders, &ListKey::root());

            let executor = QueuedExecutor::new();
            executor.push_status(500);
            let hook = DeleteEntity::new(
                Arc::clone(&store),
                executor.clone(),
                EntityType::BookmarkFolders,
                EntityRequest::delete("/api/v1/pleroma/bookmark_folders/:id").unwrap(),
            );
            let result = hook.delete(target).await;

            prop_assert!(result.is_err());
            prop_assert_eq!(store.get::<BookmarkFolder>(target), before_entity);
            prop_assert_eq!(store.list(EntityType::BookmarkFolders, &ListKey::root()), before_list);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
