//! Read hooks over the store: one entity by id, or one paginated list.
//!
//! List fetches run on a detached task so a list never stays `Fetching`
//! because its caller went away.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::mutation::LoadingCounter;
use crate::store::{FetchMode, ListState, ListStatus};
use crate::{
    Entity, EntityRequest, EntityStore, ListKey, QueryError, RequestExecutor, Schema,
    validate_list,
};

/// Fetches a single entity and keeps it in the store.
#[derive(Clone)]
pub struct EntityQuery<T: Entity> {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    id: String,
    request: EntityRequest,
    schema: Arc<dyn Schema<T>>,
    refetch: bool,
    fetching: LoadingCounter,
}

impl<T: Entity> EntityQuery<T> {
    /// `id` is the store id that `request` produces.
    pub fn new(
        store: Arc<EntityStore>,
        executor: Arc<dyn RequestExecutor>,
        id: impl Into<String>,
        request: EntityRequest,
        schema: Arc<dyn Schema<T>>,
    ) -> Self {
        Self {
            store,
            executor,
            id: id.into(),
            request,
            schema,
            refetch: false,
            fetching: LoadingCounter::default(),
        }
    }

    /// Always go to the server in [`load`](Self::load), even on a cache hit.
    pub fn refetch(mut self, refetch: bool) -> Self {
        self.refetch = refetch;
        self
    }

    /// The cached entity, if any.
    pub fn entity(&self) -> Option<T> {
        self.store.get::<T>(&self.id)
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.is_active()
    }

    /// Return the cached entity, fetching only on a miss or when
    /// [`refetch`](Self::refetch) is set.
    pub async fn load(&self) -> Result<T, QueryError> {
        if !self.refetch {
            if let Some(entity) = self.entity() {
                return Ok(entity);
            }
        }
        self.fetch().await
    }

    /// Fetch from the server and import the result.
    pub async fn fetch(&self) -> Result<T, QueryError> {
        let _fetching = self.fetching.start();
        self.request.check()?;

        let response = match self.executor.execute(&self.request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(entity_type = %T::TYPE, id = %self.id, error = %err, "entity fetch failed");
                return Err(err.into());
            }
        };
        let entity = self.schema.validate(response.body)?;
        self.store.import(vec![entity.clone()]);
        debug!(entity_type = %T::TYPE, id = %entity.id(), "entity fetched");
        Ok(entity)
    }
}

/// Result of [`EntityListQuery::read`].
pub struct ListSnapshot<T> {
    /// Entities currently in the list.
    pub entities: Vec<T>,
    pub state: ListState,
    /// Background refetch started by this read, when the list was stale.
    pub revalidating: Option<JoinHandle<Result<Vec<T>, QueryError>>>,
}

/// Fetches one list of entities page by page.
#[derive(Clone)]
pub struct EntityListQuery<T: Entity> {
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    key: ListKey,
    request: EntityRequest,
    schema: Arc<dyn Schema<T>>,
}

impl<T: Entity> EntityListQuery<T> {
    pub fn new(
        store: Arc<EntityStore>,
        executor: Arc<dyn RequestExecutor>,
        key: ListKey,
        request: EntityRequest,
        schema: Arc<dyn Schema<T>>,
    ) -> Self {
        Self {
            store,
            executor,
            key,
            request,
            schema,
        }
    }

    pub fn key(&self) -> &ListKey {
        &self.key
    }

    /// Entities of the list in order.
    pub fn entities(&self) -> Vec<T> {
        self.store.list_entities::<T>(&self.key)
    }

    /// Fetch state of the list; a list never fetched reports the default.
    pub fn state(&self) -> ListState {
        self.store
            .list_state(T::TYPE, &self.key)
            .unwrap_or_default()
    }

    pub fn is_fetching(&self) -> bool {
        self.state().status == ListStatus::Fetching
    }

    pub fn has_more(&self) -> bool {
        self.state().next.is_some()
    }

    /// Fetch the first page, replacing the list.
    ///
    /// If a fetch is already running, resolves to the current entities.
    pub async fn fetch(&self) -> Result<Vec<T>, QueryError> {
        join(self.spawn_fetch(self.request.clone(), FetchMode::Replace)).await
    }

    /// Fetch the page after the last one and append it.
    ///
    /// Resolves to an empty page when there is nothing more.
    pub async fn fetch_next_page(&self) -> Result<Vec<T>, QueryError> {
        let Some(next) = self.state().next else {
            return Ok(Vec::new());
        };
        let request = EntityRequest::follow(&next)?;
        join(self.spawn_fetch(request, FetchMode::Append)).await
    }

    /// Mark the list stale; the next [`read`](Self::read) refetches.
    pub fn invalidate(&self) {
        self.store.invalidate_list(T::TYPE, &self.key);
    }

    /// Current contents, plus a background refetch when the list is stale.
    pub fn read(&self) -> ListSnapshot<T> {
        let state = self.state();
        let revalidating = if state.needs_fetch() {
            match self.spawn_fetch(self.request.clone(), FetchMode::Replace) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(entity_type = %T::TYPE, key = %self.key, error = %err, "cannot revalidate list");
                    None
                }
            }
        } else {
            None
        };
        ListSnapshot {
            entities: self.entities(),
            state,
            revalidating,
        }
    }

    fn spawn_fetch(
        &self,
        request: EntityRequest,
        mode: FetchMode,
    ) -> Result<JoinHandle<Result<Vec<T>, QueryError>>, QueryError> {
        let runtime = Handle::try_current().map_err(|e| QueryError::Aborted(e.to_string()))?;
        Ok(runtime.spawn(fetch_list_page(
            Arc::clone(&self.store),
            Arc::clone(&self.executor),
            Arc::clone(&self.schema),
            self.key.clone(),
            request,
            mode,
        )))
    }
}

async fn join<T>(
    task: Result<JoinHandle<Result<Vec<T>, QueryError>>, QueryError>,
) -> Result<Vec<T>, QueryError> {
    task?
        .await
        .map_err(|e| QueryError::Aborted(e.to_string()))?
}

async fn fetch_list_page<T: Entity>(
    store: Arc<EntityStore>,
    executor: Arc<dyn RequestExecutor>,
    schema: Arc<dyn Schema<T>>,
    key: ListKey,
    request: EntityRequest,
    mode: FetchMode,
) -> Result<Vec<T>, QueryError> {
    if !store.begin_list_fetch(T::TYPE, &key) {
        debug!(entity_type = %T::TYPE, key = %key, "list fetch already running");
        return Ok(store.list_entities::<T>(&key));
    }

    let result = async {
        request.check()?;
        let response = executor.execute(&request).await?;
        let entities = validate_list(schema.as_ref(), response.body)?;
        Ok::<_, QueryError>((entities, response.page))
    }
    .await;

    match result {
        Ok((entities, page)) => {
            let records = entities.iter().cloned().map(Entity::into_record).collect();
            store.complete_list_fetch(records, T::TYPE, &key, page, mode);
            Ok(entities)
        }
        Err(err) => {
            store.fail_list_fetch(T::TYPE, &key, &err.to_string());
            Err(err)
        }
    }
}
