//! Permission tokens and the policy that names which token guards which step.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "read:applications")]
    ReadApplications,
    #[serde(rename = "manage:applications")]
    ManageApplications,
    #[serde(rename = "publish:applications")]
    PublishApplications,
    #[serde(rename = "export:applications")]
    ExportApplications,
    #[serde(rename = "read:workspaces")]
    ReadWorkspaces,
    #[serde(rename = "manage:workspaces")]
    ManageWorkspaces,
    #[serde(rename = "create:applications")]
    CreateApplications,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadApplications => "read:applications",
            Permission::ManageApplications => "manage:applications",
            Permission::PublishApplications => "publish:applications",
            Permission::ExportApplications => "export:applications",
            Permission::ReadWorkspaces => "read:workspaces",
            Permission::ManageWorkspaces => "manage:workspaces",
            Permission::CreateApplications => "create:applications",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which permission each lookup in the fork workflow requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionPolicy {
    #[serde(default = "default_read_permission")]
    pub read_application: Permission,

    #[serde(default = "default_edit_permission")]
    pub edit_application: Permission,

    #[serde(default = "default_create_permission")]
    pub create_application_in_workspace: Permission,
}

fn default_read_permission() -> Permission {
    Permission::ReadApplications
}

fn default_edit_permission() -> Permission {
    Permission::ManageApplications
}

fn default_create_permission() -> Permission {
    Permission::CreateApplications
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            read_application: default_read_permission(),
            edit_application: default_edit_permission(),
            create_application_in_workspace: default_create_permission(),
        }
    }
}
