//! Group hooks: group details, membership and moderation.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use soapstone_entities::{
    CreateEntity, CreateOptions, DismissEntity, EntityListQuery, EntityQuery, EntityRequest,
    EntityStore, EntityType, FirstElement, Group, GroupMember, GroupRelationship, GroupRole,
    DeleteOptions, GroupSchema, ListKey, MutationError, QueryError, RequestExecutor, SerdeSchema,
    TemplateError,
};

use crate::ApiContext;

const GROUPS: &str = "/api/v1/groups";
const GROUP: &str = "/api/v1/groups/:id";
const GROUP_RELATIONSHIPS: &str = "/api/v1/groups/relationships?id[]=:id";
const GROUP_MEMBERSHIPS: &str = "/api/v1/groups/:id/memberships";
const GROUP_KICK: &str = "/api/v1/groups/:group_id/kick";
const GROUP_BLOCKS: &str = "/api/v1/groups/:group_id/blocks";
const GROUP_PROMOTE: &str = "/api/v1/groups/:id/promote";
const GROUP_DEMOTE: &str = "/api/v1/groups/:id/demote";

/// A group together with the current account's relationship to it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupView {
    pub group: Group,
    pub relationship: Option<GroupRelationship>,
}

/// Which way a [`GroupAction`] changes membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Join,
    Leave,
}

impl Membership {
    fn template(self) -> &'static str {
        match self {
            Membership::Join => "/api/v1/groups/:id/join",
            Membership::Leave => "/api/v1/groups/:id/leave",
        }
    }
}

/// Join or leave one group.
///
/// The returned relationship is stored under the group id. Unlike a plain
/// [`CreateEntity`], a successful run also invalidates the groups list so the
/// next read refetches it; callers do not invalidate it themselves. A failed
/// run leaves the list as it was.
#[derive(Clone)]
pub struct GroupAction {
    executor: Arc<dyn RequestExecutor>,
    group_id: String,
    membership: Membership,
    create: CreateEntity<GroupRelationship>,
    groups: EntityListQuery<Group>,
}

impl GroupAction {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn is_submitting(&self) -> bool {
        self.create.is_submitting()
    }

    /// Send the request.
    ///
    /// Resolves to `None` without a request when logged out.
    pub async fn run(&self) -> Result<Option<GroupRelationship>, MutationError> {
        if !self.executor.is_logged_in() {
            debug!(group_id = %self.group_id, membership = ?self.membership, "logged out, skipping");
            return Ok(None);
        }

        let relationship = self.create.create(None).await?;
        self.groups.invalidate();
        Ok(Some(relationship))
    }
}

/// Block a member from a group.
///
/// Once the server confirms, the membership is deleted from the store and
/// from every member list.
#[derive(Clone)]
pub struct BlockGroupMember {
    store: Arc<EntityStore>,
    dismiss: DismissEntity,
}

impl BlockGroupMember {
    pub fn is_loading(&self) -> bool {
        self.dismiss.is_loading()
    }

    /// `member_id` is the membership id.
    pub async fn run(&self, member_id: &str) -> Result<(), MutationError> {
        self.dismiss.dismiss(member_id).await?;
        self.store
            .delete_entities([member_id], EntityType::GroupMemberships, DeleteOptions::default());
        Ok(())
    }
}

/// Give group members a new role.
#[derive(Clone)]
pub struct GroupRoleChange {
    store: Arc<EntityStore>,
    group_id: String,
    role: GroupRole,
    create: CreateEntity<GroupMember>,
}

impl GroupRoleChange {
    pub fn role(&self) -> GroupRole {
        self.role
    }

    pub fn is_submitting(&self) -> bool {
        self.create.is_submitting()
    }

    /// Resolves to the updated membership, which moves to the member list of
    /// its new role.
    pub async fn run(&self, account_id: &str) -> Result<GroupMember, MutationError> {
        let body = json!({ "role": role_param(self.role), "account_ids": [account_id] });
        let member = self.create.create(Some(body)).await?;
        for role in [GroupRole::Owner, GroupRole::Admin, GroupRole::User] {
            if role != self.role {
                self.store.remove_entity_from_list(
                    EntityType::GroupMemberships,
                    &members_key(&self.group_id, role),
                    &member.id,
                );
            }
        }
        debug!(group_id = %self.group_id, member_id = %member.id, role = role_param(self.role), "role changed");
        Ok(member)
    }
}

impl ApiContext {
    /// The groups the current account belongs to.
    pub fn groups(&self) -> Result<EntityListQuery<Group>, TemplateError> {
        Ok(EntityListQuery::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            ListKey::root(),
            EntityRequest::get(GROUPS)?,
            Arc::new(GroupSchema),
        ))
    }

    pub fn group(&self, group_id: &str) -> Result<EntityQuery<Group>, TemplateError> {
        Ok(EntityQuery::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            group_id,
            EntityRequest::get(GROUP)?.with_param("id", group_id),
            Arc::new(GroupSchema),
        ))
    }

    pub fn group_relationship(
        &self,
        group_id: &str,
    ) -> Result<EntityQuery<GroupRelationship>, TemplateError> {
        Ok(EntityQuery::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            group_id,
            EntityRequest::get(GROUP_RELATIONSHIPS)?.with_param("id", group_id),
            Arc::new(FirstElement(SerdeSchema::<GroupRelationship>::new())),
        ))
    }

    /// Fetch a group and, when logged in, its relationship.
    ///
    /// A failed relationship fetch leaves `relationship` empty rather than
    /// failing the whole load.
    pub async fn load_group(&self, group_id: &str) -> Result<GroupView, QueryError> {
        let group = self.group(group_id)?.refetch(true).load().await?;
        let relationship = if self.is_logged_in() {
            self.group_relationship(group_id)?.fetch().await.ok()
        } else {
            None
        };
        Ok(GroupView {
            group,
            relationship,
        })
    }

    pub fn join_group(&self, group_id: &str) -> Result<GroupAction, TemplateError> {
        self.group_action(group_id, Membership::Join)
    }

    pub fn leave_group(&self, group_id: &str) -> Result<GroupAction, TemplateError> {
        self.group_action(group_id, Membership::Leave)
    }

    fn group_action(&self, group_id: &str, membership: Membership) -> Result<GroupAction, TemplateError> {
        let request = EntityRequest::post(membership.template())?.with_param("id", group_id);
        let create = CreateEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            request,
            Arc::new(SerdeSchema::<GroupRelationship>::new()),
            CreateOptions::into_list(ListKey::from(group_id)).single_flight(group_id),
        );
        Ok(GroupAction {
            executor: Arc::clone(self.executor()),
            group_id: group_id.to_string(),
            membership,
            create,
            groups: self.groups()?,
        })
    }

    /// Members of a group holding `role`.
    pub fn group_members(
        &self,
        group_id: &str,
        role: GroupRole,
    ) -> Result<EntityListQuery<GroupMember>, TemplateError> {
        let request = EntityRequest::get(GROUP_MEMBERSHIPS)?
            .with_param("id", group_id)
            .with_query("role", role_param(role));
        Ok(EntityListQuery::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            members_key(group_id, role),
            request,
            Arc::new(SerdeSchema::<GroupMember>::new()),
        ))
    }

    /// Remove a member from a group.
    ///
    /// The dismissed id is the membership id. On success it leaves the
    /// plain-member list of that group and nothing else.
    pub fn kick_group_member(&self, group_id: &str) -> Result<DismissEntity, TemplateError> {
        let request = EntityRequest::post(GROUP_KICK)?.with_param("group_id", group_id);
        Ok(self.member_request(group_id, request))
    }

    pub fn block_group_member(&self, group_id: &str) -> Result<BlockGroupMember, TemplateError> {
        let request = EntityRequest::post(GROUP_BLOCKS)?.with_param("group_id", group_id);
        Ok(BlockGroupMember {
            store: Arc::clone(self.store()),
            dismiss: self.member_request(group_id, request),
        })
    }

    /// Make members admins of `group_id`.
    pub fn promote_group_member(&self, group_id: &str) -> Result<GroupRoleChange, TemplateError> {
        self.group_role_change(group_id, GROUP_PROMOTE, GroupRole::Admin)
    }

    /// Make members plain users of `group_id`.
    pub fn demote_group_member(&self, group_id: &str) -> Result<GroupRoleChange, TemplateError> {
        self.group_role_change(group_id, GROUP_DEMOTE, GroupRole::User)
    }

    fn group_role_change(
        &self,
        group_id: &str,
        template: &str,
        role: GroupRole,
    ) -> Result<GroupRoleChange, TemplateError> {
        let request = EntityRequest::post(template)?.with_param("id", group_id);
        let create = CreateEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            request,
            Arc::new(SerdeSchema::<GroupMember>::new()),
            CreateOptions::into_list(members_key(group_id, role)),
        );
        Ok(GroupRoleChange {
            store: Arc::clone(self.store()),
            group_id: group_id.to_string(),
            role,
            create,
        })
    }

    // Moderation requests name accounts, but hooks dismiss membership ids.
    fn member_request(&self, group_id: &str, request: EntityRequest) -> DismissEntity {
        let store = Arc::clone(self.store());
        DismissEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            EntityType::GroupMemberships,
            members_key(group_id, GroupRole::User),
            request,
        )
        .with_body(move |member_id| {
            json!({ "account_ids": [member_account_id(&store, member_id)] })
        })
    }
}

/// List key of the members of `group_id` with `role`.
pub fn members_key(group_id: &str, role: GroupRole) -> ListKey {
    ListKey::new([group_id, role_param(role)])
}

fn role_param(role: GroupRole) -> &'static str {
    match role {
        GroupRole::Owner => "owner",
        GroupRole::Admin => "admin",
        GroupRole::User => "user",
    }
}

// Memberships not loaded yet fall back to treating the id as an account id.
fn member_account_id(store: &EntityStore, member_id: &str) -> String {
    store
        .get::<GroupMember>(member_id)
        .map(|member| member.account.id)
        .unwrap_or_else(|| member_id.to_string())
}
