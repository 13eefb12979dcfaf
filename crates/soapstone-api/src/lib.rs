//! HTTP transport and domain hooks for Soapstone.
//!
//! [`HttpExecutor`] implements [`RequestExecutor`](soapstone_entities::RequestExecutor)
//! on `reqwest`. [`ApiContext`] pairs it with an
//! [`EntityStore`](soapstone_entities::EntityStore) and builds the hooks for
//! bookmark folders, groups and statuses.

mod bookmarks;
mod config;
mod context;
mod error;
mod groups;
mod http;
mod statuses;

pub use bookmarks::BookmarkFolderParams;
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_USER_AGENT};
pub use context::ApiContext;
pub use error::ApiError;
pub use groups::{
    BlockGroupMember, GroupAction, GroupRoleChange, GroupView, Membership, members_key,
};
pub use http::{HttpExecutor, parse_link_header};
