use std::sync::Arc;

use soapstone_entities::{
    DeleteEntity, EntityQuery, EntityRequest, EntityType, SerdeSchema, Status, TemplateError,
};

use crate::ApiContext;

const STATUS: &str = "/api/v1/statuses/:id";

impl ApiContext {
    pub fn status(&self, status_id: &str) -> Result<EntityQuery<Status>, TemplateError> {
        Ok(EntityQuery::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            status_id,
            EntityRequest::get(STATUS)?.with_param("id", status_id),
            Arc::new(SerdeSchema::<Status>::new()),
        ))
    }

    /// Optimistic delete; a deleted status stays in timelines until the
    /// server confirms.
    pub fn delete_status(&self) -> Result<DeleteEntity, TemplateError> {
        Ok(DeleteEntity::new(
            Arc::clone(self.store()),
            Arc::clone(self.executor()),
            EntityType::Statuses,
            EntityRequest::delete(STATUS)?,
        ))
    }
}
