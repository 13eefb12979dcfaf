//! Normalized entity cache for Soapstone.
//!
//! Server records are stored once per `(EntityType, id)` and referenced by
//! id from any number of named lists. Hooks built on top of the store fetch
//! and mutate entities through a pluggable [`RequestExecutor`].
//!
//! ## Features
//!
//! - **Store**: Thread-safe cache of entities and lists with change broadcasts
//! - **Mutations**: Optimistic delete with rollback, pessimistic create, update and dismiss
//! - **Queries**: Single-entity and paginated list fetches with stale-while-revalidate reads
//! - **Requests**: Typed URL templates with escaped parameters
//! - **Schemas**: Validation and normalization of server payloads

mod entities;
mod error;
pub mod mutation;
mod pending;
pub mod query;
mod request;
mod schema;
pub mod store;
pub mod testing;
mod types;

pub use entities::*;
pub use error::{MutationError, QueryError, RequestError, TemplateError, ValidationError};
pub use mutation::{
    CreateEntity, CreateOptions, DeleteEntity, DismissEntity, EntityCallbacks, UpdateEntity,
};
pub use pending::PendingGuard;
pub use query::{EntityListQuery, EntityQuery, ListSnapshot};
pub use request::{
    ApiResponse, EntityRequest, Method, PageInfo, RequestExecutor, RequestParams, RequestTarget,
    UrlTemplate,
};
pub use schema::{
    FirstElement, GroupSchema, MISSING_AVATAR, MISSING_HEADER, Schema, SerdeSchema, normalize_group,
    validate_list, validate_many,
};
pub use store::{EntityList, EntityStore, FetchMode, ListState, ListStatus, StoreUpdate};
pub use types::{DeleteOptions, EntityType, ListKey, ListPosition, UnknownEntityType};
