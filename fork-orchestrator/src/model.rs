use crate::error::{ForkError, Result};
use crate::permission::Permission;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub workspace_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_control: Option<VersionControlMetadata>,

    #[serde(default)]
    pub forking_enabled: bool,

    #[serde(default)]
    pub user_permissions: BTreeSet<Permission>,
}

impl Application {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.user_permissions.contains(&permission)
    }

    /// Default branch this application should be forked from, when it is
    /// checked out on some other branch.
    pub fn stale_branch_redirect(&self) -> Option<&str> {
        self.version_control
            .as_ref()
            .filter(|vc| vc.current_branch != vc.default_branch)
            .map(|vc| vc.default_branch.as_str())
    }
}

/// Branch linkage of an application under version control. Both branch
/// fields are always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionControlMetadata {
    pub current_branch: String,
    pub default_branch: String,
    pub default_application_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub user_permissions: BTreeSet<Permission>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_environment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    #[serde(default)]
    pub is_anonymous: bool,
}

impl User {
    pub fn anonymous() -> Self {
        Self {
            id: "anonymousUser".to_string(),
            is_anonymous: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Application,
    Workspace,
    User,
    Branch,
    Operation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Application => "application",
            EntityKind::Workspace => "workspace",
            EntityKind::User => "user",
            EntityKind::Branch => "branch",
            EntityKind::Operation => "operation",
        };
        f.write_str(name)
    }
}

/// Import-shaped projection of a forked application, as handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedApplication {
    pub application: Application,
    pub workspace_id: String,

    #[serde(default)]
    pub unconfigured_datasources: Vec<String>,

    #[serde(default)]
    pub is_partial_import: bool,
}

/// Where the source environment of a fork comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkSource {
    Environment(String),
    Branch(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkRequest {
    pub source_application_id: String,
    pub target_workspace_id: String,
    pub source: ForkSource,
}

impl ForkRequest {
    pub fn with_environment(
        source_application_id: impl Into<String>,
        target_workspace_id: impl Into<String>,
        source_environment_id: impl Into<String>,
    ) -> Self {
        Self {
            source_application_id: source_application_id.into(),
            target_workspace_id: target_workspace_id.into(),
            source: ForkSource::Environment(source_environment_id.into()),
        }
    }

    /// Empty branch names count as "no branch".
    pub fn with_branch(
        source_application_id: impl Into<String>,
        target_workspace_id: impl Into<String>,
        branch_name: Option<&str>,
    ) -> Self {
        let branch = branch_name
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);

        Self {
            source_application_id: source_application_id.into(),
            target_workspace_id: target_workspace_id.into(),
            source: ForkSource::Branch(branch),
        }
    }

    pub fn environment(&self) -> Option<&str> {
        match &self.source {
            ForkSource::Environment(env) => Some(env),
            ForkSource::Branch(_) => None,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match &self.source {
            ForkSource::Branch(branch) => branch.as_deref(),
            ForkSource::Environment(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_id("source_application_id", &self.source_application_id)?;
        require_id("target_workspace_id", &self.target_workspace_id)?;
        if let ForkSource::Environment(env) = &self.source {
            require_id("source_environment_id", env)?;
        }
        Ok(())
    }
}

fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ForkError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
