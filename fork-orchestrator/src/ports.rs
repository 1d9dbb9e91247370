//! Contracts of the collaborators the fork workflow calls into.
//!
//! Persistence, session resolution, the deep-copy engine and analytics all
//! live outside this crate. Lookups report absence (or lack of the required
//! permission) as `Ok(None)`; `Err` is reserved for infrastructure failures.

use crate::event::AnalyticsEvent;
use crate::model::{Application, ImportedApplication, User, Workspace};
use crate::permission::Permission;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ApplicationLookup: Send + Sync {
    /// Find an application the current user holds `permission` on
    async fn find_by_id(&self, id: &str, permission: Permission) -> Result<Option<Application>>;

    /// Find the variant of a version-controlled application checked out on `branch`
    async fn find_by_branch_and_default_id(
        &self,
        branch: &str,
        default_application_id: &str,
        permission: Permission,
    ) -> Result<Option<Application>>;

    /// Fetch an application without any permission filter
    async fn get_by_id(&self, id: &str) -> Result<Option<Application>>;
}

#[async_trait]
pub trait WorkspaceLookup: Send + Sync {
    async fn find_by_id(&self, id: &str, permission: Permission) -> Result<Option<Workspace>>;

    async fn default_environment_id(&self, workspace_id: &str) -> Result<String>;
}

#[async_trait]
pub trait SessionUserLookup: Send + Sync {
    async fn current_user(&self) -> Result<Option<User>>;
}

/// Deep-copies applications (pages, actions, datasource bindings) into a workspace.
#[async_trait]
pub trait ForkExecutor: Send + Sync {
    /// Returns the ids of the newly created applications, in input order
    async fn fork_applications(
        &self,
        target_workspace_id: &str,
        applications: Vec<Application>,
        source_environment_id: &str,
    ) -> Result<Vec<String>>;
}

#[async_trait]
pub trait AnalyticsEmitter: Send + Sync {
    async fn emit(
        &self,
        event: AnalyticsEvent,
        subject: &Application,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Maps a forked application onto the shape clients consume after an import.
#[async_trait]
pub trait ResultProjector: Send + Sync {
    async fn to_import_shape(
        &self,
        new_application_id: &str,
        workspace_id: &str,
        application: Application,
    ) -> Result<ImportedApplication>;
}
