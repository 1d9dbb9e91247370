//! In-memory implementations of the collaborator ports.
//!
//! `InMemoryCatalog` holds applications, workspaces and the session user in a
//! single snapshot that can be loaded from JSON. It backs the local runner and
//! the integration tests.

use crate::event::AnalyticsEvent;
use crate::model::{Application, ImportedApplication, User, Workspace};
use crate::permission::Permission;
use crate::ports::{
    AnalyticsEmitter, ApplicationLookup, ForkExecutor, ResultProjector, SessionUserLookup,
    WorkspaceLookup,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Environment id reported for workspaces without a default environment
pub const UNUSED_ENVIRONMENT_ID: &str = "unused_env";

/// Permissions the forking user holds on the application it created
const FORK_OWNER_PERMISSIONS: [Permission; 4] = [
    Permission::ReadApplications,
    Permission::ManageApplications,
    Permission::PublishApplications,
    Permission::ExportApplications,
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub applications: Vec<Application>,

    #[serde(default)]
    pub workspaces: Vec<Workspace>,

    #[serde(default)]
    pub session_user: Option<User>,
}

#[derive(Default)]
struct CatalogState {
    applications: HashMap<String, Application>,
    workspaces: HashMap<String, Workspace>,
    session_user: Option<User>,
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let state = CatalogState {
            applications: snapshot
                .applications
                .into_iter()
                .map(|app| (app.id.clone(), app))
                .collect(),
            workspaces: snapshot
                .workspaces
                .into_iter()
                .map(|ws| (ws.id.clone(), ws))
                .collect(),
            session_user: snapshot.session_user,
        };

        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: CatalogSnapshot =
            serde_json::from_str(json).context("Failed to parse catalog snapshot")?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Current contents, ordered by id
    pub async fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read().await;

        let mut applications: Vec<Application> = state.applications.values().cloned().collect();
        applications.sort_by(|a, b| a.id.cmp(&b.id));
        let mut workspaces: Vec<Workspace> = state.workspaces.values().cloned().collect();
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));

        CatalogSnapshot {
            applications,
            workspaces,
            session_user: state.session_user.clone(),
        }
    }

    pub async fn insert_application(&self, application: Application) {
        self.state
            .write()
            .await
            .applications
            .insert(application.id.clone(), application);
    }

    pub async fn insert_workspace(&self, workspace: Workspace) {
        self.state
            .write()
            .await
            .workspaces
            .insert(workspace.id.clone(), workspace);
    }

    pub async fn set_session_user(&self, user: Option<User>) {
        self.state.write().await.session_user = user;
    }

    pub async fn applications_in_workspace(&self, workspace_id: &str) -> Vec<Application> {
        let state = self.state.read().await;
        let mut apps: Vec<Application> = state
            .applications
            .values()
            .filter(|app| app.workspace_id == workspace_id)
            .cloned()
            .collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        apps
    }
}

#[async_trait]
impl ApplicationLookup for InMemoryCatalog {
    async fn find_by_id(&self, id: &str, permission: Permission) -> Result<Option<Application>> {
        let state = self.state.read().await;
        Ok(state
            .applications
            .get(id)
            .filter(|app| app.has_permission(permission))
            .cloned())
    }

    async fn find_by_branch_and_default_id(
        &self,
        branch: &str,
        default_application_id: &str,
        permission: Permission,
    ) -> Result<Option<Application>> {
        let state = self.state.read().await;
        Ok(state
            .applications
            .values()
            .find(|app| {
                app.version_control.as_ref().is_some_and(|vc| {
                    vc.default_application_id == default_application_id
                        && vc.current_branch == branch
                })
            })
            .filter(|app| app.has_permission(permission))
            .cloned())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Application>> {
        Ok(self.state.read().await.applications.get(id).cloned())
    }
}

#[async_trait]
impl WorkspaceLookup for InMemoryCatalog {
    async fn find_by_id(&self, id: &str, permission: Permission) -> Result<Option<Workspace>> {
        let state = self.state.read().await;
        Ok(state
            .workspaces
            .get(id)
            .filter(|ws| ws.user_permissions.contains(&permission))
            .cloned())
    }

    async fn default_environment_id(&self, workspace_id: &str) -> Result<String> {
        let state = self.state.read().await;
        let Some(workspace) = state.workspaces.get(workspace_id) else {
            bail!("Workspace not found: {}", workspace_id);
        };

        Ok(workspace
            .default_environment_id
            .clone()
            .unwrap_or_else(|| UNUSED_ENVIRONMENT_ID.to_string()))
    }
}

#[async_trait]
impl SessionUserLookup for InMemoryCatalog {
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.state.read().await.session_user.clone())
    }
}

#[async_trait]
impl ForkExecutor for InMemoryCatalog {
    async fn fork_applications(
        &self,
        target_workspace_id: &str,
        applications: Vec<Application>,
        source_environment_id: &str,
    ) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        if !state.workspaces.contains_key(target_workspace_id) {
            bail!("Target workspace not found: {}", target_workspace_id);
        }

        let mut created = Vec::with_capacity(applications.len());
        for source in applications {
            let id = Uuid::new_v4().to_string();
            debug!(
                "Copying application {} to {} (environment {})",
                source.id, id, source_environment_id
            );

            let forked = Application {
                id: id.clone(),
                name: source.name,
                workspace_id: target_workspace_id.to_string(),
                version_control: None,
                forking_enabled: false,
                user_permissions: FORK_OWNER_PERMISSIONS.into_iter().collect::<BTreeSet<_>>(),
            };
            state.applications.insert(id.clone(), forked);
            created.push(id);
        }

        Ok(created)
    }
}

#[async_trait]
impl ResultProjector for InMemoryCatalog {
    async fn to_import_shape(
        &self,
        new_application_id: &str,
        workspace_id: &str,
        application: Application,
    ) -> Result<ImportedApplication> {
        if application.id != new_application_id {
            bail!(
                "Projected application {} does not match forked id {}",
                application.id,
                new_application_id
            );
        }

        Ok(ImportedApplication {
            application,
            workspace_id: workspace_id.to_string(),
            unconfigured_datasources: Vec::new(),
            is_partial_import: false,
        })
    }
}

/// Emits analytics events as structured log lines.
#[derive(Debug, Clone, Default)]
pub struct TracingAnalytics;

#[async_trait]
impl AnalyticsEmitter for TracingAnalytics {
    async fn emit(
        &self,
        event: AnalyticsEvent,
        subject: &Application,
        payload: serde_json::Value,
    ) -> Result<()> {
        info!(event = %event, subject = %subject.id, payload = %payload, "analytics event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionControlMetadata;

    fn catalog_json() -> &'static str {
        r#"{
            "applications": [
                {
                    "id": "app-main",
                    "name": "Orders",
                    "workspace_id": "ws-src",
                    "version_control": {
                        "current_branch": "main",
                        "default_branch": "main",
                        "default_application_id": "app-main"
                    },
                    "user_permissions": ["read:applications"]
                },
                {
                    "id": "app-feature",
                    "name": "Orders",
                    "workspace_id": "ws-src",
                    "version_control": {
                        "current_branch": "feature",
                        "default_branch": "main",
                        "default_application_id": "app-main"
                    },
                    "user_permissions": ["read:applications"]
                }
            ],
            "workspaces": [
                {"id": "ws-src", "name": "Source", "default_environment_id": "env-prod"},
                {"id": "ws-dst", "name": "Target", "user_permissions": ["create:applications"]}
            ],
            "session_user": {"id": "alice"}
        }"#
    }

    #[tokio::test]
    async fn test_lookups_respect_permissions() {
        let catalog = InMemoryCatalog::from_json(catalog_json()).unwrap();

        let found = ApplicationLookup::find_by_id(&catalog, "app-main", Permission::ReadApplications)
            .await
            .unwrap();
        assert!(found.is_some());

        let denied = ApplicationLookup::find_by_id(&catalog, "app-main", Permission::ManageApplications)
            .await
            .unwrap();
        assert!(denied.is_none());

        let ws = WorkspaceLookup::find_by_id(&catalog, "ws-src", Permission::CreateApplications)
            .await
            .unwrap();
        assert!(ws.is_none());
    }

    #[tokio::test]
    async fn test_find_by_branch() {
        let catalog = InMemoryCatalog::from_json(catalog_json()).unwrap();

        let feature = catalog
            .find_by_branch_and_default_id("feature", "app-main", Permission::ReadApplications)
            .await
            .unwrap()
            .expect("feature branch should resolve");
        assert_eq!(feature.id, "app-feature");

        let missing = catalog
            .find_by_branch_and_default_id("release", "app-main", Permission::ReadApplications)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_default_environment_falls_back() {
        let catalog = InMemoryCatalog::from_json(catalog_json()).unwrap();

        assert_eq!(catalog.default_environment_id("ws-src").await.unwrap(), "env-prod");
        assert_eq!(
            catalog.default_environment_id("ws-dst").await.unwrap(),
            UNUSED_ENVIRONMENT_ID
        );
        assert!(catalog.default_environment_id("ws-none").await.is_err());
    }

    #[tokio::test]
    async fn test_executor_creates_detached_copies() {
        let catalog = InMemoryCatalog::from_json(catalog_json()).unwrap();
        let source = catalog.get_by_id("app-feature").await.unwrap().unwrap();

        let ids = catalog
            .fork_applications("ws-dst", vec![source.clone(), source], "env-prod")
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let copies = catalog.applications_in_workspace("ws-dst").await;
        assert_eq!(copies.len(), 2);
        for copy in copies {
            assert_eq!(copy.name, "Orders");
            assert_eq!(copy.version_control, None::<VersionControlMetadata>);
            assert!(copy.has_permission(Permission::ManageApplications));
        }
    }

    #[tokio::test]
    async fn test_executor_rejects_unknown_workspace() {
        let catalog = InMemoryCatalog::from_json(catalog_json()).unwrap();
        let err = catalog
            .fork_applications("ws-none", Vec::new(), "env")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ws-none"));
    }

    #[tokio::test]
    async fn test_tracing_analytics_accepts_events() {
        let catalog = InMemoryCatalog::from_json(catalog_json()).unwrap();
        let subject = catalog.get_by_id("app-main").await.unwrap().unwrap();

        TracingAnalytics
            .emit(
                AnalyticsEvent::Fork,
                &subject,
                serde_json::json!({"forkedFromAppId": "app-main"}),
            )
            .await
            .unwrap();
    }
}
