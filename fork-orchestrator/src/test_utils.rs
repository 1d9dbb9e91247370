//! Fixtures and instrumented collaborators for exercising the fork workflow.

use crate::config::ForkSettings;
use crate::event::AnalyticsEvent;
use crate::forking::{Collaborators, ForkOrchestrator};
use crate::memory::InMemoryCatalog;
use crate::model::{Application, User, VersionControlMetadata, Workspace};
use crate::operation::Operation;
use crate::permission::{Permission, PermissionPolicy};
use crate::ports::{AnalyticsEmitter, ForkExecutor};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub const SOURCE_WORKSPACE: &str = "ws-source";
pub const TARGET_WORKSPACE: &str = "ws-target";
pub const SOURCE_ENVIRONMENT: &str = "env-source";

/// Owned by a member with edit rights, forking not enabled
pub const EDITABLE_APP: &str = "app-editable";
/// Public template, forking enabled, read-only for everyone
pub const TEMPLATE_APP: &str = "app-template";
/// Readable but neither editable nor opted in
pub const READONLY_APP: &str = "app-readonly";
/// Root id of a version-controlled application, still checked out on "main"
/// after the default branch moved to "develop"
pub const GIT_ROOT_APP: &str = "app-git-root";
/// Variant on the current default branch "develop"
pub const GIT_DEVELOP_APP: &str = "app-git-develop";
/// Variant on the "release" branch
pub const GIT_RELEASE_APP: &str = "app-git-release";

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub event: AnalyticsEvent,
    pub subject: Application,
    pub payload: serde_json::Value,
}

/// Analytics emitter that records events and can be told to fail.
#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<RecordedEvent>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
    emitted: Notify,
}

impl RecordingAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let analytics = Self::default();
        analytics.fail.store(true, Ordering::SeqCst);
        analytics
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("events lock poisoned").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` emissions were attempted, or panic after a second
    pub async fn wait_for_attempts(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.attempts() < count {
                self.emitted.notified().await;
            }
        })
        .await
        .expect("timed out waiting for analytics event");
    }
}

#[async_trait]
impl AnalyticsEmitter for RecordingAnalytics {
    async fn emit(
        &self,
        event: AnalyticsEvent,
        subject: &Application,
        payload: serde_json::Value,
    ) -> Result<()> {
        let outcome = if self.fail.load(Ordering::SeqCst) {
            Err(anyhow::anyhow!("analytics backend unavailable"))
        } else {
            self.events
                .lock()
                .expect("events lock poisoned")
                .push(RecordedEvent {
                    event,
                    subject: subject.clone(),
                    payload,
                });
            Ok(())
        };

        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.emitted.notify_one();
        outcome
    }
}

/// Executor that signals when it is entered and blocks until released.
pub struct GatedExecutor {
    inner: Arc<dyn ForkExecutor>,
    entered: Notify,
    gate: Semaphore,
    calls: AtomicUsize,
}

impl GatedExecutor {
    pub fn new(inner: Arc<dyn ForkExecutor>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn wait_until_entered(&self) {
        tokio::time::timeout(Duration::from_secs(1), self.entered.notified())
            .await
            .expect("timed out waiting for executor to be invoked");
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForkExecutor for GatedExecutor {
    async fn fork_applications(
        &self,
        target_workspace_id: &str,
        applications: Vec<Application>,
        source_environment_id: &str,
    ) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.acquire().await?.forget();

        self.inner
            .fork_applications(target_workspace_id, applications, source_environment_id)
            .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorCall {
    pub target_workspace_id: String,
    pub application_ids: Vec<String>,
    pub source_environment_id: String,
}

/// Executor that records every call before delegating.
pub struct RecordingExecutor {
    inner: Arc<dyn ForkExecutor>,
    calls: Mutex<Vec<ExecutorCall>>,
}

impl RecordingExecutor {
    pub fn new(inner: Arc<dyn ForkExecutor>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }
}

#[async_trait]
impl ForkExecutor for RecordingExecutor {
    async fn fork_applications(
        &self,
        target_workspace_id: &str,
        applications: Vec<Application>,
        source_environment_id: &str,
    ) -> Result<Vec<String>> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(ExecutorCall {
                target_workspace_id: target_workspace_id.to_string(),
                application_ids: applications.iter().map(|app| app.id.clone()).collect(),
                source_environment_id: source_environment_id.to_string(),
            });

        self.inner
            .fork_applications(target_workspace_id, applications, source_environment_id)
            .await
    }
}

/// Executor that always fails, counting invocations.
#[derive(Default)]
pub struct FailingExecutor {
    calls: AtomicUsize,
}

impl FailingExecutor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForkExecutor for FailingExecutor {
    async fn fork_applications(
        &self,
        _target_workspace_id: &str,
        _applications: Vec<Application>,
        _source_environment_id: &str,
    ) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("page copy failed")
    }
}

pub fn member() -> User {
    User {
        id: "alice".to_string(),
        is_anonymous: false,
    }
}

pub fn application(id: &str, name: &str, forking_enabled: bool, permissions: &[Permission]) -> Application {
    Application {
        id: id.to_string(),
        name: name.to_string(),
        workspace_id: SOURCE_WORKSPACE.to_string(),
        version_control: None,
        forking_enabled,
        user_permissions: permissions.iter().copied().collect::<BTreeSet<_>>(),
    }
}

fn git_application(id: &str, current_branch: &str) -> Application {
    let mut app = application(
        id,
        &format!("Git Orders ({current_branch})"),
        false,
        &[Permission::ReadApplications, Permission::ManageApplications],
    );
    app.version_control = Some(VersionControlMetadata {
        current_branch: current_branch.to_string(),
        default_branch: "develop".to_string(),
        default_application_id: GIT_ROOT_APP.to_string(),
    });
    app
}

/// Catalog with a source and target workspace, the fixture applications
/// above and `alice` signed in.
pub async fn fixture_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();

    catalog
        .insert_workspace(Workspace {
            id: SOURCE_WORKSPACE.to_string(),
            name: "Source".to_string(),
            user_permissions: [Permission::ReadWorkspaces].into_iter().collect(),
            default_environment_id: Some(SOURCE_ENVIRONMENT.to_string()),
        })
        .await;
    catalog
        .insert_workspace(Workspace {
            id: TARGET_WORKSPACE.to_string(),
            name: "Target".to_string(),
            user_permissions: [Permission::ReadWorkspaces, Permission::CreateApplications]
                .into_iter()
                .collect(),
            default_environment_id: None,
        })
        .await;

    catalog
        .insert_application(application(
            EDITABLE_APP,
            "Editable",
            false,
            &[Permission::ReadApplications, Permission::ManageApplications],
        ))
        .await;
    catalog
        .insert_application(application(
            TEMPLATE_APP,
            "Template",
            true,
            &[Permission::ReadApplications],
        ))
        .await;
    catalog
        .insert_application(application(
            READONLY_APP,
            "Read Only",
            false,
            &[Permission::ReadApplications],
        ))
        .await;

    catalog
        .insert_application(git_application(GIT_ROOT_APP, "main"))
        .await;
    catalog
        .insert_application(git_application(GIT_DEVELOP_APP, "develop"))
        .await;
    catalog
        .insert_application(git_application(GIT_RELEASE_APP, "release"))
        .await;

    catalog.set_session_user(Some(member())).await;
    catalog
}

/// Orchestrator wired to the catalog for everything except analytics and execution.
pub fn orchestrator_with(
    catalog: &InMemoryCatalog,
    analytics: Arc<dyn AnalyticsEmitter>,
    executor: Arc<dyn ForkExecutor>,
) -> ForkOrchestrator {
    let catalog = Arc::new(catalog.clone());
    let collaborators = Collaborators {
        applications: catalog.clone(),
        workspaces: catalog.clone(),
        session: catalog.clone(),
        executor,
        analytics,
        projector: catalog,
    };

    let settings = ForkSettings {
        analytics_enabled: true,
        permissions: PermissionPolicy::default(),
        ..ForkSettings::default()
    };
    ForkOrchestrator::new(collaborators, settings)
}

/// Orchestrator over the fixture catalog with a recording analytics emitter.
pub async fn fixture_orchestrator() -> (ForkOrchestrator, InMemoryCatalog, Arc<RecordingAnalytics>) {
    let catalog = fixture_catalog().await;
    let analytics = Arc::new(RecordingAnalytics::new());
    let orchestrator = orchestrator_with(
        &catalog,
        analytics.clone(),
        Arc::new(catalog.clone()),
    );
    (orchestrator, catalog, analytics)
}

/// Poll until the operation reaches a terminal state, or panic after two seconds
pub async fn wait_for_operation(orchestrator: &ForkOrchestrator, id: &str) -> Operation {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let operation = orchestrator
                .get_operation(id)
                .await
                .expect("operation should be recorded");
            if operation.status.is_terminal() {
                return operation;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for fork operation to finish")
}
