//! Domain records held by the entity store.
//!
//! Every record type implements [`Entity`], which ties it to one
//! [`EntityType`] and converts it to and from the tagged [`EntityRecord`]
//! the store keeps internally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntityType;

/// A normalized, server-sourced record addressed by `(TYPE, id)`.
pub trait Entity: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// The entity type this record is stored under.
    const TYPE: EntityType;

    /// Server-assigned id, unique within [`Self::TYPE`].
    fn id(&self) -> &str;

    fn into_record(self) -> EntityRecord;

    fn from_record(record: &EntityRecord) -> Option<&Self>;

    fn from_record_mut(record: &mut EntityRecord) -> Option<&mut Self>;
}

/// A remote account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub acct: String,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub statuses_count: u64,
}

/// Who can see a status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
    Group,
}

/// A post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub spoiler_text: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub favourited: bool,
    #[serde(default)]
    pub reblogged: bool,
    #[serde(default)]
    pub bookmarked: bool,
}

/// A group.
///
/// `domain` is derived from `url` by [`GroupSchema`](crate::GroupSchema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub avatar_static: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub header_static: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub membership_required: bool,
    #[serde(default)]
    pub members_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub domain: String,
}

/// Role of an account within a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Owner,
    Admin,
    #[default]
    User,
}

/// The current account's relationship to a group. Keyed by group id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRelationship {
    pub id: String,
    #[serde(default)]
    pub member: bool,
    #[serde(default)]
    pub requested: bool,
    #[serde(default)]
    pub role: Option<GroupRole>,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default)]
    pub notifying: Option<bool>,
    #[serde(default)]
    pub muting: bool,
    #[serde(default)]
    pub pending_requests: bool,
}

/// One membership of an account in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: String,
    pub account: Account,
    #[serde(default)]
    pub role: GroupRole,
}

/// A named folder of bookmarked statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkFolder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub emoji_url: Option<String>,
}

/// The current account's relationship to another account. Keyed by account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub followed_by: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default)]
    pub muting: bool,
    #[serde(default)]
    pub muting_notifications: bool,
    #[serde(default)]
    pub requested: bool,
    #[serde(default)]
    pub domain_blocking: bool,
    #[serde(default)]
    pub endorsed: bool,
    #[serde(default)]
    pub note: String,
}

/// Any record the store can hold, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entity")]
pub enum EntityRecord {
    Account(Account),
    Status(Status),
    Group(Group),
    GroupRelationship(GroupRelationship),
    GroupMember(GroupMember),
    BookmarkFolder(BookmarkFolder),
    Relationship(Relationship),
}

impl EntityRecord {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRecord::Account(_) => EntityType::Accounts,
            EntityRecord::Status(_) => EntityType::Statuses,
            EntityRecord::Group(_) => EntityType::Groups,
            EntityRecord::GroupRelationship(_) => EntityType::GroupRelationships,
            EntityRecord::GroupMember(_) => EntityType::GroupMemberships,
            EntityRecord::BookmarkFolder(_) => EntityType::BookmarkFolders,
            EntityRecord::Relationship(_) => EntityType::Relationships,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRecord::Account(e) => &e.id,
            EntityRecord::Status(e) => &e.id,
            EntityRecord::Group(e) => &e.id,
            EntityRecord::GroupRelationship(e) => &e.id,
            EntityRecord::GroupMember(e) => &e.id,
            EntityRecord::BookmarkFolder(e) => &e.id,
            EntityRecord::Relationship(e) => &e.id,
        }
    }
}

macro_rules! impl_entity {
    ($($ty:ident => $entity_type:ident),+ $(,)?) => {
        $(
            impl Entity for $ty {
                const TYPE: EntityType = EntityType::$entity_type;

                fn id(&self) -> &str {
                    &self.id
                }

                fn into_record(self) -> EntityRecord {
                    EntityRecord::$ty(self)
                }

                fn from_record(record: &EntityRecord) -> Option<&Self> {
                    match record {
                        EntityRecord::$ty(e) => Some(e),
                        _ => None,
                    }
                }

                fn from_record_mut(record: &mut EntityRecord) -> Option<&mut Self> {
                    match record {
                        EntityRecord::$ty(e) => Some(e),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for EntityRecord {
                fn from(entity: $ty) -> Self {
                    EntityRecord::$ty(entity)
                }
            }
        )+
    };
}

impl_entity! {
    Account => Accounts,
    Status => Statuses,
    Group => Groups,
    GroupRelationship => GroupRelationships,
    GroupMember => GroupMemberships,
    BookmarkFolder => BookmarkFolders,
    Relationship => Relationships,
}
