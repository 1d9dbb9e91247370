use crate::authorize::ForkAuthorizer;
use crate::branch::BranchResolver;
use crate::config::ForkSettings;
use crate::error::{ForkError, Result};
use crate::event::{fork_payload, AnalyticsEvent, EventData, WORKSPACE_KEY};
use crate::model::{Application, EntityKind, ForkRequest, ImportedApplication, User, Workspace};
use crate::operation::{Operation, OperationFilters, OperationTracker};
use crate::permission::Permission;
use crate::ports::{
    AnalyticsEmitter, ApplicationLookup, ForkExecutor, ResultProjector, SessionUserLookup,
    WorkspaceLookup,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

/// External systems a `ForkOrchestrator` delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub applications: Arc<dyn ApplicationLookup>,
    pub workspaces: Arc<dyn WorkspaceLookup>,
    pub session: Arc<dyn SessionUserLookup>,
    pub executor: Arc<dyn ForkExecutor>,
    pub analytics: Arc<dyn AnalyticsEmitter>,
    pub projector: Arc<dyn ResultProjector>,
}

/// Result of the deep copy, before the new application is re-read.
#[derive(Debug, Clone)]
pub struct ForkOutcome {
    pub forked_application_id: String,
    pub event_data: EventData,
}

/// Caller-side view of a running fork.
///
/// Awaiting the handle yields the fork's outcome. Dropping it only stops
/// the caller from listening; the fork itself keeps running to completion
/// and its result stays available through the operation record.
#[derive(Debug)]
pub struct ForkHandle {
    operation_id: String,
    outcome: oneshot::Receiver<Result<Application>>,
}

impl ForkHandle {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }
}

impl Future for ForkHandle {
    type Output = Result<Application>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ForkError::Interrupted)))
    }
}

#[derive(Clone)]
pub struct ForkOrchestrator {
    collaborators: Collaborators,
    branches: BranchResolver,
    authorizer: ForkAuthorizer,
    operations: OperationTracker,
    settings: ForkSettings,
}

impl ForkOrchestrator {
    pub fn new(collaborators: Collaborators, settings: ForkSettings) -> Self {
        let branches = BranchResolver::new(
            Arc::clone(&collaborators.applications),
            settings.permissions.read_application,
        );
        let authorizer = ForkAuthorizer::new(settings.permissions.edit_application);

        Self {
            collaborators,
            branches,
            authorizer,
            operations: OperationTracker::with_limit(settings.max_retained_operations),
            settings,
        }
    }

    pub fn settings(&self) -> &ForkSettings {
        &self.settings
    }

    /// Fork an application into a workspace, copying datasource bindings
    /// from `source_environment_id`.
    ///
    /// The fork runs on its own task. If the caller stops awaiting this
    /// future, the fork still runs to completion.
    pub async fn fork_to_workspace_with_environment(
        &self,
        source_application_id: &str,
        target_workspace_id: &str,
        source_environment_id: &str,
    ) -> Result<Application> {
        self.spawn_fork(source_application_id, target_workspace_id, source_environment_id)
            .await?
            .await
    }

    /// Start a fork on a detached task and return a handle to its outcome
    pub async fn spawn_fork(
        &self,
        source_application_id: &str,
        target_workspace_id: &str,
        source_environment_id: &str,
    ) -> Result<ForkHandle> {
        let request = ForkRequest::with_environment(
            source_application_id,
            target_workspace_id,
            source_environment_id,
        );
        request.validate()?;

        let operation_id = self
            .operations
            .record(&request.source_application_id, &request.target_workspace_id)
            .await;
        let (sender, receiver) = oneshot::channel();

        let orchestrator = self.clone();
        let op_id = operation_id.clone();
        tokio::spawn(async move {
            orchestrator.operations.mark_running(&op_id).await;

            let workflow = {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.run_fork(request).await })
            };
            let outcome = match workflow.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Fork operation {} aborted: {}", op_id, e);
                    Err(ForkError::Interrupted)
                }
            };

            match &outcome {
                Ok(forked) => orchestrator.operations.mark_success(&op_id, &forked.id).await,
                Err(e) => orchestrator.operations.mark_failed(&op_id, e).await,
            }

            if sender.send(outcome).is_err() {
                info!(
                    "Caller stopped waiting for fork operation {}, outcome kept in operation record",
                    op_id
                );
            }
        });

        Ok(ForkHandle {
            operation_id,
            outcome: receiver,
        })
    }

    /// Fork an application, resolving the revision to copy from version
    /// control and the source environment from the application's workspace.
    #[instrument(skip(self), fields(source = %source_application_id, target = %target_workspace_id))]
    pub async fn fork_to_workspace(
        &self,
        source_application_id: &str,
        target_workspace_id: &str,
        branch_name: Option<&str>,
    ) -> Result<ImportedApplication> {
        let request =
            ForkRequest::with_branch(source_application_id, target_workspace_id, branch_name);
        request.validate()?;

        let source = self
            .branches
            .resolve(&request.source_application_id, request.branch())
            .await?;

        // Datasources are bound from the source workspace's default environment
        let source_environment_id = self
            .collaborators
            .workspaces
            .default_environment_id(&source.workspace_id)
            .await
            .map_err(ForkError::Lookup)?;

        let forked = self
            .fork_to_workspace_with_environment(
                &source.id,
                &request.target_workspace_id,
                &source_environment_id,
            )
            .await?;

        let workspace_id = forked.workspace_id.clone();
        let forked_id = forked.id.clone();
        self.collaborators
            .projector
            .to_import_shape(&forked_id, &workspace_id, forked)
            .await
            .map_err(ForkError::Projection)
    }

    pub async fn get_operation(&self, id: &str) -> Result<Operation> {
        self.operations.get(id).await
    }

    pub async fn list_operations(&self, filters: OperationFilters) -> Vec<Operation> {
        self.operations.list(&filters).await
    }

    #[instrument(skip_all, fields(source = %request.source_application_id, target = %request.target_workspace_id))]
    async fn run_fork(&self, request: ForkRequest) -> Result<Application> {
        let Some(source_environment_id) = request.environment() else {
            return Err(ForkError::InvalidInput(
                "source_environment_id must not be empty".to_string(),
            ));
        };

        let outcome = self
            .execute_fork(
                &request.source_application_id,
                &request.target_workspace_id,
                source_environment_id,
            )
            .await?;

        let forked = self
            .collaborators
            .applications
            .get_by_id(&outcome.forked_application_id)
            .await
            .map_err(ForkError::Lookup)?
            .ok_or_else(|| {
                ForkError::not_found(EntityKind::Application, &outcome.forked_application_id)
            })?;

        info!(
            "Forked application {} into workspace {} as {}",
            request.source_application_id, forked.workspace_id, forked.id
        );

        self.emit_fork_event(
            &request.source_application_id,
            &request.target_workspace_id,
            &forked,
            outcome.event_data,
        );

        Ok(forked)
    }

    /// Resolve prerequisites, authorize, then hand off to the executor.
    async fn execute_fork(
        &self,
        source_application_id: &str,
        target_workspace_id: &str,
        source_environment_id: &str,
    ) -> Result<ForkOutcome> {
        let (mut application, workspace, user) = tokio::try_join!(
            self.fetch_source_application(source_application_id),
            self.fetch_target_workspace(target_workspace_id),
            self.fetch_current_user(),
        )?;

        let mut event_data = EventData::new();
        match serde_json::to_value(&workspace) {
            Ok(value) => {
                event_data.insert_once(WORKSPACE_KEY, value);
            }
            Err(e) => warn!(
                "Leaving workspace {} out of fork event data: {}",
                workspace.id, e
            ),
        }

        // Forks never inherit version control linkage
        application.version_control = None;

        if !self.authorizer.allow_fork(&user, &application) {
            warn!(
                "User {} is not allowed to fork application {}",
                user.id, application.id
            );
            return Err(ForkError::ForkingNotAllowed);
        }

        debug!(
            "Copying application {} into workspace {} from environment {}",
            application.id, workspace.id, source_environment_id
        );

        let forked_ids = self
            .collaborators
            .executor
            .fork_applications(&workspace.id, vec![application], source_environment_id)
            .await
            .map_err(ForkError::ExecutionFailure)?;

        let forked_application_id = forked_ids.into_iter().next().ok_or_else(|| {
            ForkError::ExecutionFailure(anyhow::anyhow!(
                "fork executor created no application"
            ))
        })?;

        Ok(ForkOutcome {
            forked_application_id,
            event_data,
        })
    }

    async fn fetch_source_application(&self, id: &str) -> Result<Application> {
        self.collaborators
            .applications
            .find_by_id(id, self.settings.permissions.read_application)
            .await
            .map_err(ForkError::Lookup)?
            .ok_or_else(|| ForkError::not_found(EntityKind::Application, id))
    }

    async fn fetch_target_workspace(&self, id: &str) -> Result<Workspace> {
        self.collaborators
            .workspaces
            .find_by_id(id, self.settings.permissions.create_application_in_workspace)
            .await
            .map_err(ForkError::Lookup)?
            .ok_or_else(|| ForkError::not_found(EntityKind::Workspace, id))
    }

    async fn fetch_current_user(&self) -> Result<User> {
        self.collaborators
            .session
            .current_user()
            .await
            .map_err(ForkError::Lookup)?
            .ok_or_else(|| ForkError::not_found(EntityKind::User, "session"))
    }

    /// Best effort. Runs on its own task and only ever logs failures.
    fn emit_fork_event(
        &self,
        source_application_id: &str,
        target_workspace_id: &str,
        forked: &Application,
        event_data: EventData,
    ) {
        if !self.settings.analytics_enabled {
            debug!("Analytics disabled, skipping fork event for {}", forked.id);
            return;
        }

        let applications = Arc::clone(&self.collaborators.applications);
        let analytics = Arc::clone(&self.collaborators.analytics);
        let read_permission = self.settings.permissions.read_application;
        let source_application_id = source_application_id.to_string();
        let target_workspace_id = target_workspace_id.to_string();
        let forked = forked.clone();

        tokio::spawn(async move {
            let sent = send_fork_event(
                applications.as_ref(),
                analytics.as_ref(),
                read_permission,
                &source_application_id,
                &target_workspace_id,
                &forked,
                &event_data,
            )
            .await;

            if let Err(e) = sent {
                warn!("Error sending fork analytics event for {}: {:#}", forked.id, e);
            }
        });
    }
}

async fn send_fork_event(
    applications: &dyn ApplicationLookup,
    analytics: &dyn AnalyticsEmitter,
    read_permission: Permission,
    source_application_id: &str,
    target_workspace_id: &str,
    forked: &Application,
    event_data: &EventData,
) -> anyhow::Result<()> {
    let source = applications
        .find_by_id(source_application_id, read_permission)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!("source application {} is no longer readable", source_application_id)
        })?;

    let payload = fork_payload(
        source_application_id,
        target_workspace_id,
        &source.name,
        event_data,
    );

    analytics.emit(AnalyticsEvent::Fork, forked, payload).await
}
