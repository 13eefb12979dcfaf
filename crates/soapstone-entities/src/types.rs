//! Keys used to address entities and lists in the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error when parsing an entity type name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntityType(String);

/// The kind of server object an entity represents.
///
/// Ids are only unique within one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Accounts,
    Statuses,
    Groups,
    GroupRelationships,
    GroupMemberships,
    BookmarkFolders,
    Relationships,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: [EntityType; 7] = [
        EntityType::Accounts,
        EntityType::Statuses,
        EntityType::Groups,
        EntityType::GroupRelationships,
        EntityType::GroupMemberships,
        EntityType::BookmarkFolders,
        EntityType::Relationships,
    ];

    /// Stable name of this entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Accounts => "Accounts",
            EntityType::Statuses => "Statuses",
            EntityType::Groups => "Groups",
            EntityType::GroupRelationships => "GroupRelationships",
            EntityType::GroupMemberships => "GroupMemberships",
            EntityType::BookmarkFolders => "BookmarkFolders",
            EntityType::Relationships => "Relationships",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}

/// Name of one list within an entity type.
///
/// A list key is a path of segments, e.g. `["members", "<group id>"]`.
/// The empty key names the default list of a type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListKey(Vec<String>);

impl ListKey {
    /// The default list of an entity type.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a key from path segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path segments of this key.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        write!(f, "{}", self.0.join(":"))
    }
}

impl From<&str> for ListKey {
    fn from(s: &str) -> Self {
        Self(vec![s.to_string()])
    }
}

impl From<String> for ListKey {
    fn from(s: String) -> Self {
        Self(vec![s])
    }
}

/// Where an id is inserted into a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListPosition {
    Start,
    #[default]
    End,
}

/// Options for [`EntityStore::delete_entities`](crate::EntityStore::delete_entities).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Keep the deleted ids in every list they belong to.
    pub preserve_lists: bool,
}

impl DeleteOptions {
    /// Remove from the keyed store only, leaving list membership untouched.
    pub fn preserve_lists() -> Self {
        Self {
            preserve_lists: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trips_through_name() {
        for ty in EntityType::ALL {
            assert_eq!(ty.as_str().parse::<EntityType>(), Ok(ty));
        }
    }

    #[test]
    fn test_unknown_entity_type() {
        let err = "Widgets".parse::<EntityType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown entity type: Widgets");
    }

    #[test]
    fn test_list_key_display() {
        assert_eq!(ListKey::root().to_string(), "<root>");
        assert_eq!(ListKey::new(["members", "g1"]).to_string(), "members:g1");
        assert!(ListKey::root().is_root());
        assert!(!ListKey::from("g1").is_root());
    }
}
