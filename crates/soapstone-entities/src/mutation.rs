//! Mutating hooks: delete, create, update and dismiss.
//!
//! Each hook applies its local effect synchronously when called, then
//! settles on a detached task. The returned future only observes that task,
//! so dropping it does not stop the store from being committed or rolled
//! back, and callbacks still run exactly once.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    DeleteOptions, Entity, EntityRequest, EntityStore, EntityType, ListKey, ListPosition,
    MutationError, PendingGuard, RequestExecutor, Schema, ValidationError, validate_many,
};

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;
type ErrorCallback = Box<dyn FnOnce(&MutationError) + Send>;

/// Optional callbacks run once a mutation has settled.
///
/// When a callback runs, the store already reflects the outcome.
pub struct EntityCallbacks<T> {
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for EntityCallbacks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }
}

impl<T: Clone> EntityCallbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&MutationError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn settle(self, result: &Result<T, MutationError>) {
        match result {
            Ok(value) => {
                if let Some(f) = self.on_success {
                    f(value.clone());
                }
            }
            Err(err) => {
                if let Some(f) = self.on_error {
                    f(err);
                }
            }
        }
    }

    fn reject(self, err: MutationError) -> MutationError {
        if let Some(f) = self.on_error {
            f(&err);
        }
        err
    }
}

/// Count of settlements in flight for one hook.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadingCounter(Arc<AtomicUsize>);

impl LoadingCounter {
    pub(crate) fn start(&self) -> LoadingGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LoadingGuard(Arc::clone(&self.0))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

pub(crate) struct LoadingGuard(Arc<AtomicUsize>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type Settlement<T> = Result<JoinHandle<Result<T, MutationError>>, MutationError>;

fn current_runtime() -> Result<Handle, MutationError> {
    Handle::try_current().map_err(|e| MutationError::Aborted(e.to_string()))
}

async fn join<T>(settlement: Settlement<T>) -> Result<T, MutationError> {
    settlement?
        .await
        .map_err(|e| MutationError::Aborted(e.to_string()))?
}

fn in_flight(entity_type: EntityType, id: &str) -> MutationError {
    MutationError::InFlight {
        entity_type,
        id: id.to_string(),
    }
}

// =============================================================================
// Delete
// =============================================================================

/// Optimistically deletes entities of one type.
///
/// The entity disappears from the keyed store at once but stays in its
/// lists. On success it is removed from every list; on failure the prior
/// record is restored.
#[derive(Clone)]
pub struct DeleteEntity {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    entity_type: EntityType,
    request: EntityRequest,
    loading: LoadingCounter,
}

impl DeleteEntity {
    /// `request` is a template whose `:id` receives the deleted id.
    pub fn new(
        store: Arc<EntityStore>,
        executor: Arc<dyn RequestExecutor>,
        entity_type: EntityType,
        request: EntityRequest,
    ) -> Self {
        Self {
            store,
            executor,
            entity_type,
            request,
            loading: LoadingCounter::default(),
        }
    }

    /// Whether a delete issued by this hook has not yet settled.
    pub fn is_loading(&self) -> bool {
        self.loading.is_active()
    }

    pub fn delete(&self, id: &str) -> impl Future<Output = Result<(), MutationError>> + Send + 'static {
        self.delete_with_callbacks(id, EntityCallbacks::new())
    }

    /// Delete `id`; `callbacks` receive the id on success.
    pub fn delete_with_callbacks(
        &self,
        id: &str,
        callbacks: EntityCallbacks<String>,
    ) -> impl Future<Output = Result<(), MutationError>> + Send + 'static {
        let settlement = self.start(id, callbacks);
        async move { join(settlement).await.map(|_| ()) }
    }

    fn prepare(&self, id: &str) -> Result<(Handle, EntityRequest, PendingGuard), MutationError> {
        let runtime = current_runtime()?;
        let request = self.request.clone().with_param("id", id);
        request.check()?;
        let guard = self
            .store
            .begin_mutation(self.entity_type, id)
            .ok_or_else(|| in_flight(self.entity_type, id))?;
        Ok((runtime, request, guard))
    }

    fn start(&self, id: &str, callbacks: EntityCallbacks<String>) -> Settlement<String> {
        let (runtime, request, guard) = match self.prepare(id) {
            Ok(prepared) => prepared,
            Err(err) => return Err(callbacks.reject(err)),
        };

        let entity_type = self.entity_type;
        let snapshot = self.store.get_record(entity_type, id);
        self.store
            .delete_entities([id], entity_type, DeleteOptions::preserve_lists());
        let loading = self.loading.start();

        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let id = id.to_string();

        Ok(runtime.spawn(async move {
            let result = match executor.execute(&request).await {
                Ok(_) => {
                    store.delete_entities([&id], entity_type, DeleteOptions::default());
                    debug!(entity_type = %entity_type, id = %id, "delete committed");
                    Ok(id)
                }
                Err(err) => {
                    if let Some(record) = snapshot {
                        store.import_entities(vec![record], entity_type);
                    }
                    warn!(entity_type = %entity_type, id = %id, error = %err, "delete failed, rolled back");
                    Err(MutationError::from(err))
                }
            };
            drop(guard);
            drop(loading);
            callbacks.settle(&result);
            result
        }))
    }
}

// =============================================================================
// Create
// =============================================================================

/// Where a created entity is recorded.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// List that receives the created ids.
    pub list_key: Option<ListKey>,
    pub position: ListPosition,
    /// Reject a second create with the same key while one is in flight.
    pub single_flight_key: Option<String>,
}

impl CreateOptions {
    pub fn into_list(key: ListKey) -> Self {
        Self {
            list_key: Some(key),
            ..Self::default()
        }
    }

    pub fn at(mut self, position: ListPosition) -> Self {
        self.position = position;
        self
    }

    pub fn single_flight(mut self, key: impl Into<String>) -> Self {
        self.single_flight_key = Some(key.into());
        self
    }
}

/// Creates entities pessimistically: nothing touches the store until the
/// server answers and the answer validates.
#[derive(Clone)]
pub struct CreateEntity<T: Entity> {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    request: EntityRequest,
    schema: Arc<dyn Schema<T>>,
    options: CreateOptions,
    submitting: LoadingCounter,
}

impl<T: Entity> CreateEntity<T> {
    pub fn new(
        store: Arc<EntityStore>,
        executor: Arc<dyn RequestExecutor>,
        request: EntityRequest,
        schema: Arc<dyn Schema<T>>,
        options: CreateOptions,
    ) -> Self {
        Self {
            store,
            executor,
            request,
            schema,
            options,
            submitting: LoadingCounter::default(),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_active()
    }

    /// Send the create request with an optional JSON body.
    ///
    /// Resolves to the first created entity.
    pub fn create(
        &self,
        body: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<T, MutationError>> + Send + 'static {
        self.create_with_callbacks(body, EntityCallbacks::new())
    }

    pub fn create_with_callbacks(
        &self,
        body: Option<serde_json::Value>,
        callbacks: EntityCallbacks<T>,
    ) -> impl Future<Output = Result<T, MutationError>> + Send + 'static {
        let settlement = self.start(body, callbacks);
        async move { join(settlement).await }
    }

    fn prepare(
        &self,
        body: Option<serde_json::Value>,
    ) -> Result<(Handle, EntityRequest, Option<PendingGuard>), MutationError> {
        let runtime = current_runtime()?;
        let mut request = self.request.clone();
        if let Some(body) = body {
            request = request.with_body(body);
        }
        request.check()?;
        let guard = match &self.options.single_flight_key {
            Some(key) => Some(
                self.store
                    .begin_mutation(T::TYPE, key)
                    .ok_or_else(|| in_flight(T::TYPE, key))?,
            ),
            None => None,
        };
        Ok((runtime, request, guard))
    }

    fn start(&self, body: Option<serde_json::Value>, callbacks: EntityCallbacks<T>) -> Settlement<T> {
        let (runtime, request, guard) = match self.prepare(body) {
            Ok(prepared) => prepared,
            Err(err) => return Err(callbacks.reject(err)),
        };
        let submitting = self.submitting.start();

        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let schema = Arc::clone(&self.schema);
        let options = self.options.clone();

        Ok(runtime.spawn(async move {
            let result = run_create(&store, executor.as_ref(), schema.as_ref(), &request, &options).await;
            if let Err(err) = &result {
                warn!(entity_type = %T::TYPE, request = %request, error = %err, "create failed");
            }
            drop(guard);
            drop(submitting);
            callbacks.settle(&result);
            result
        }))
    }
}

async fn run_create<T: Entity>(
    store: &EntityStore,
    executor: &dyn RequestExecutor,
    schema: &dyn Schema<T>,
    request: &EntityRequest,
    options: &CreateOptions,
) -> Result<T, MutationError> {
    let response = executor.execute(request).await?;
    let entities = validate_many(schema, response.body)?;
    let first = entities
        .first()
        .cloned()
        .ok_or_else(|| ValidationError::new(T::TYPE, "empty response"))?;

    let records = entities.into_iter().map(Entity::into_record).collect();
    match &options.list_key {
        Some(key) => store.import_into_list(records, T::TYPE, key, options.position),
        None => store.import_entities(records, T::TYPE),
    }
    debug!(entity_type = %T::TYPE, id = %first.id(), "create committed");
    Ok(first)
}

// =============================================================================
// Update
// =============================================================================

/// Updates a single entity by id.
///
/// [`update`](Self::update) waits for the server. [`update_with`](Self::update_with)
/// applies a local patch first and restores the prior record on failure.
#[derive(Clone)]
pub struct UpdateEntity<T: Entity> {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    request: EntityRequest,
    schema: Arc<dyn Schema<T>>,
    loading: LoadingCounter,
}

impl<T: Entity> UpdateEntity<T> {
    pub fn new(
        store: Arc<EntityStore>,
        executor: Arc<dyn RequestExecutor>,
        request: EntityRequest,
        schema: Arc<dyn Schema<T>>,
    ) -> Self {
        Self {
            store,
            executor,
            request,
            schema,
            loading: LoadingCounter::default(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_active()
    }

    pub fn update(
        &self,
        id: &str,
        body: serde_json::Value,
    ) -> impl Future<Output = Result<T, MutationError>> + Send + 'static {
        let settlement = self.start(id, body, None::<fn(&mut T)>, EntityCallbacks::new());
        async move { join(settlement).await }
    }

    pub fn update_with<F: FnOnce(&mut T)>(
        &self,
        id: &str,
        body: serde_json::Value,
        patch: F,
    ) -> impl Future<Output = Result<T, MutationError>> + Send + 'static {
        let settlement = self.start(id, body, Some(patch), EntityCallbacks::new());
        async move { join(settlement).await }
    }

    pub fn update_with_callbacks(
        &self,
        id: &str,
        body: serde_json::Value,
        callbacks: EntityCallbacks<T>,
    ) -> impl Future<Output = Result<T, MutationError>> + Send + 'static {
        let settlement = self.start(id, body, None::<fn(&mut T)>, callbacks);
        async move { join(settlement).await }
    }

    fn prepare(
        &self,
        id: &str,
        body: serde_json::Value,
    ) -> Result<(Handle, EntityRequest, PendingGuard), MutationError> {
        let runtime = current_runtime()?;
        let request = self.request.clone().with_param("id", id).with_body(body);
        request.check()?;
        let guard = self
            .store
            .begin_mutation(T::TYPE, id)
            .ok_or_else(|| in_flight(T::TYPE, id))?;
        Ok((runtime, request, guard))
    }

    fn start<F: FnOnce(&mut T)>(
        &self,
        id: &str,
        body: serde_json::Value,
        patch: Option<F>,
        callbacks: EntityCallbacks<T>,
    ) -> Settlement<T> {
        let (runtime, request, guard) = match self.prepare(id, body) {
            Ok(prepared) => prepared,
            Err(err) => return Err(callbacks.reject(err)),
        };

        let snapshot = patch.and_then(|patch| self.store.update_entity::<T, _>(id, patch));
        let loading = self.loading.start();

        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let schema = Arc::clone(&self.schema);
        let id = id.to_string();

        Ok(runtime.spawn(async move {
            let result = run_update(&store, executor.as_ref(), schema.as_ref(), &request, &id).await;
            if let Err(err) = &result {
                if let Some(snapshot) = snapshot {
                    store.import(vec![snapshot]);
                }
                warn!(entity_type = %T::TYPE, id = %id, error = %err, "update failed, rolled back");
            }
            drop(guard);
            drop(loading);
            callbacks.settle(&result);
            result
        }))
    }
}

async fn run_update<T: Entity>(
    store: &EntityStore,
    executor: &dyn RequestExecutor,
    schema: &dyn Schema<T>,
    request: &EntityRequest,
    id: &str,
) -> Result<T, MutationError> {
    let response = executor.execute(request).await?;
    if response.body.is_null() {
        // No body: the local record, patched or not, stands.
        return store
            .get::<T>(id)
            .ok_or_else(|| ValidationError::new(T::TYPE, "empty response").into());
    }
    let entity = schema.validate(response.body)?;
    store.import(vec![entity.clone()]);
    debug!(entity_type = %T::TYPE, id = %id, "update committed");
    Ok(entity)
}

// =============================================================================
// Dismiss
// =============================================================================

type BodyBuilder = Arc<dyn Fn(&str) -> serde_json::Value + Send + Sync>;

/// Removes an id from one list after the server confirms, leaving the entity
/// and every other list alone.
#[derive(Clone)]
pub struct DismissEntity {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    entity_type: EntityType,
    list_key: ListKey,
    request: EntityRequest,
    body: Option<BodyBuilder>,
    loading: LoadingCounter,
}

impl DismissEntity {
    pub fn new(
        store: Arc<EntityStore>,
        executor: Arc<dyn RequestExecutor>,
        entity_type: EntityType,
        list_key: ListKey,
        request: EntityRequest,
    ) -> Self {
        Self {
            store,
            executor,
            entity_type,
            list_key,
            request,
            body: None,
            loading: LoadingCounter::default(),
        }
    }

    /// Build the request body from the dismissed id.
    pub fn with_body(mut self, body: impl Fn(&str) -> serde_json::Value + Send + Sync + 'static) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_active()
    }

    pub fn dismiss(&self, id: &str) -> impl Future<Output = Result<(), MutationError>> + Send + 'static {
        self.dismiss_with_callbacks(id, EntityCallbacks::new())
    }

    pub fn dismiss_with_callbacks(
        &self,
        id: &str,
        callbacks: EntityCallbacks<String>,
    ) -> impl Future<Output = Result<(), MutationError>> + Send + 'static {
        let settlement = self.start(id, callbacks);
        async move { join(settlement).await.map(|_| ()) }
    }

    fn prepare(&self, id: &str) -> Result<(Handle, EntityRequest, PendingGuard), MutationError> {
        let runtime = current_runtime()?;
        let mut request = self.request.clone().with_param("id", id);
        if let Some(body) = &self.body {
            request = request.with_body(body(id));
        }
        request.check()?;
        let guard = self
            .store
            .begin_mutation(self.entity_type, id)
            .ok_or_else(|| in_flight(self.entity_type, id))?;
        Ok((runtime, request, guard))
    }

    fn start(&self, id: &str, callbacks: EntityCallbacks<String>) -> Settlement<String> {
        let (runtime, request, guard) = match self.prepare(id) {
            Ok(prepared) => prepared,
            Err(err) => return Err(callbacks.reject(err)),
        };
        let loading = self.loading.start();

        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let entity_type = self.entity_type;
        let list_key = self.list_key.clone();
        let id = id.to_string();

        Ok(runtime.spawn(async move {
            let result = match executor.execute(&request).await {
                Ok(_) => {
                    store.dismiss_entities([&id], entity_type, &list_key);
                    debug!(entity_type = %entity_type, key = %list_key, id = %id, "dismiss committed");
                    Ok(id)
                }
                Err(err) => {
                    warn!(entity_type = %entity_type, id = %id, error = %err, "dismiss failed");
                    Err(MutationError::from(err))
                }
            };
            drop(guard);
            drop(loading);
            callbacks.settle(&result);
            result
        }))
    }
}
