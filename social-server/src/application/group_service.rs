use std::sync::Arc;

use tracing::{info, instrument};
use validator::Validate;

use crate::data::group_repository::GroupRepository;
use crate::domain::error::{DomainError, FormErrors};
use crate::domain::group::{Group, NewGroup};

#[derive(Clone)]
pub struct GroupService {
    repo: Arc<dyn GroupRepository>,
}

impl GroupService {
    pub fn new(repo: Arc<dyn GroupRepository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn create_group(&self, group: NewGroup) -> Result<Group, DomainError> {
        group
            .validate()
            .map_err(|errors| DomainError::Validation(FormErrors::from(errors)))?;
        self.repo.create(group).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, DomainError> {
        self.repo.list().await
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Group, DomainError> {
        self.repo
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| DomainError::GroupNotFound(slug.to_string()))
    }

    /// Posts in the group survive without a group.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, slug: &str) -> Result<(), DomainError> {
        let group = self.find_by_slug(slug).await?;
        self.repo.delete(group.id).await?;
        info!(slug, "group deleted");
        Ok(())
    }
}
