//! Bookmark folder hooks.

use std::sync::Arc;

use serde::Serialize;

use soapstone_entities::{
    BookmarkFolder, CreateEntity, CreateOptions, DeleteEntity, EntityListQuery, EntityRequest,
    EntityType, ListKey, SerdeSchema, TemplateError, UpdateEntity,
};

use crate::{ApiContext, ApiError};

const BOOKMARK_FOLDERS: &str = "/api/v1/pleroma/bookmark_folders";
const BOOKMARK_FOLDER: &str = "/api/v1/pleroma/bookmark_folders/:id";

/// Body of a create or update request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BookmarkFolderParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl BookmarkFolderParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emoji: None,
        }
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn to_body(&self) -> Result<serde_json::Value, ApiError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl ApiContext {
    /// All folders of the current account, in the root list.
    pub fn bookmark_folders(&self) -> Result<EntityListQuery<BookmarkFolder>, TemplateError> {
        Ok(EntityListQuery::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            ListKey::root(),
            EntityRequest::get(BOOKMARK_FOLDERS)?,
            Arc::new(SerdeSchema::<BookmarkFolder>::new()),
        ))
    }

    /// A cached folder.
    pub fn bookmark_folder(&self, id: &str) -> Option<BookmarkFolder> {
        self.store().get::<BookmarkFolder>(id)
    }

    /// New folders are appended to the root list.
    pub fn create_bookmark_folder(&self) -> Result<CreateEntity<BookmarkFolder>, TemplateError> {
        Ok(CreateEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            EntityRequest::post(BOOKMARK_FOLDERS)?,
            Arc::new(SerdeSchema::<BookmarkFolder>::new()),
            CreateOptions::into_list(ListKey::root()),
        ))
    }

    pub fn update_bookmark_folder(&self) -> Result<UpdateEntity<BookmarkFolder>, TemplateError> {
        Ok(UpdateEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            EntityRequest::patch(BOOKMARK_FOLDER)?,
            Arc::new(SerdeSchema::<BookmarkFolder>::new()),
        ))
    }

    pub fn delete_bookmark_folder(&self) -> Result<DeleteEntity, TemplateError> {
        Ok(DeleteEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            EntityType::BookmarkFolders,
            EntityRequest::delete(BOOKMARK_FOLDER)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use soapstone_entities::testing::QueuedExecutor;
    use soapstone_entities::{EntityStore, Method};

    fn context() -> (ApiContext, Arc<QueuedExecutor>) {
        let executor = QueuedExecutor::new();
        (ApiContext::new(EntityStore::new(), executor.clone()), executor)
    }

    #[test]
    fn test_params_body_skips_missing_emoji() {
        let body = BookmarkFolderParams::new("Recipes").to_body().unwrap();
        assert_eq!(body, json!({ "name": "Recipes" }));

        let body = BookmarkFolderParams::new("Music").emoji("🎵").to_body().unwrap();
        assert_eq!(body, json!({ "name": "Music", "emoji": "🎵" }));
    }

    #[tokio::test]
    async fn test_create_then_update_folder() {
        let (context, executor) = context();
        executor.push_json(json!({ "id": "f1", "name": "Recipes" }));
        executor.push_json(json!({ "id": "f1", "name": "Cooking", "emoji": "🍳" }));

        let body = BookmarkFolderParams::new("Recipes").to_body().unwrap();
        context.create_bookmark_folder().unwrap().create(Some(body)).await.unwrap();
        let root: Vec<String> = context
            .store()
            .list_ids(EntityType::BookmarkFolders, &ListKey::root())
            .unwrap();
        assert_eq!(root, vec!["f1"]);

        let body = BookmarkFolderParams::new("Cooking").emoji("🍳").to_body().unwrap();
        let updated = context
            .update_bookmark_folder()
            .unwrap()
            .update("f1", body)
            .await
            .unwrap();
        assert_eq!(updated.name, "Cooking");
        assert_eq!(context.bookmark_folder("f1"), Some(updated));

        let requests = executor.requests();
        assert_eq!(requests[1].method, Method::Patch);
        assert_eq!(requests[1].path().unwrap(), "/api/v1/pleroma/bookmark_folders/f1");
    }
}
