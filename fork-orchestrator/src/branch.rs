//! Resolves which stored revision of an application a fork should copy.

use crate::error::{ForkError, Result};
use crate::model::{Application, EntityKind};
use crate::permission::Permission;
use crate::ports::ApplicationLookup;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct BranchResolver {
    applications: Arc<dyn ApplicationLookup>,
    read_permission: Permission,
}

impl BranchResolver {
    pub fn new(applications: Arc<dyn ApplicationLookup>, read_permission: Permission) -> Self {
        Self {
            applications,
            read_permission,
        }
    }

    /// With an explicit branch, the variant on that branch is used as is.
    /// Without one, an application checked out on a non-default branch is
    /// redirected to its current default-branch variant, since the default
    /// branch may have changed after the caller captured the id.
    pub async fn resolve(&self, application_id: &str, branch: Option<&str>) -> Result<Application> {
        if let Some(branch) = branch {
            return self.find_on_branch(branch, application_id).await;
        }

        let application = self
            .applications
            .find_by_id(application_id, self.read_permission)
            .await
            .map_err(ForkError::Lookup)?
            .ok_or_else(|| ForkError::not_found(EntityKind::Application, application_id))?;

        match application.stale_branch_redirect().map(str::to_string) {
            Some(default_branch) => {
                debug!(
                    "Application {} is not on its default branch, forking from {}",
                    application_id, default_branch
                );
                self.find_on_branch(&default_branch, application_id).await
            }
            None => Ok(application),
        }
    }

    async fn find_on_branch(&self, branch: &str, default_application_id: &str) -> Result<Application> {
        self.applications
            .find_by_branch_and_default_id(branch, default_application_id, self.read_permission)
            .await
            .map_err(ForkError::Lookup)?
            .ok_or_else(|| ForkError::not_found(EntityKind::Branch, branch))
    }
}
