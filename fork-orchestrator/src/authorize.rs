use crate::model::{Application, User};
use crate::permission::Permission;

/// Decides whether a user may fork an application.
#[derive(Debug, Clone, Copy)]
pub struct ForkAuthorizer {
    edit_permission: Permission,
}

impl ForkAuthorizer {
    pub fn new(edit_permission: Permission) -> Self {
        Self { edit_permission }
    }

    /// A signed-in editor may always fork. Anyone may fork an application
    /// that has opted in with `forking_enabled`.
    pub fn allow_fork(&self, user: &User, application: &Application) -> bool {
        let is_editor = !user.is_anonymous && application.has_permission(self.edit_permission);
        is_editor || application.forking_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn application(forking_enabled: bool, permissions: &[Permission]) -> Application {
        Application {
            id: "app-1".to_string(),
            name: "Inventory".to_string(),
            workspace_id: "ws-1".to_string(),
            version_control: None,
            forking_enabled,
            user_permissions: permissions.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn member() -> User {
        User {
            id: "alice".to_string(),
            is_anonymous: false,
        }
    }

    #[test]
    fn test_editor_may_fork_without_opt_in() {
        let authorizer = ForkAuthorizer::new(Permission::ManageApplications);
        let app = application(false, &[Permission::ReadApplications, Permission::ManageApplications]);

        assert!(authorizer.allow_fork(&member(), &app));
    }

    #[test]
    fn test_reader_needs_opt_in() {
        let authorizer = ForkAuthorizer::new(Permission::ManageApplications);

        assert!(!authorizer.allow_fork(&member(), &application(false, &[Permission::ReadApplications])));
        assert!(authorizer.allow_fork(&member(), &application(true, &[Permission::ReadApplications])));
    }

    #[test]
    fn test_anonymous_edit_permission_is_not_enough() {
        let authorizer = ForkAuthorizer::new(Permission::ManageApplications);
        let app = application(false, &[Permission::ManageApplications]);

        assert!(!authorizer.allow_fork(&User::anonymous(), &app));
    }

    #[test]
    fn test_anonymous_may_fork_opted_in_template() {
        let authorizer = ForkAuthorizer::new(Permission::ManageApplications);

        assert!(authorizer.allow_fork(&User::anonymous(), &application(true, &[])));
    }

    #[test]
    fn test_edit_permission_is_configurable() {
        let authorizer = ForkAuthorizer::new(Permission::ExportApplications);

        assert!(!authorizer.allow_fork(&member(), &application(false, &[Permission::ManageApplications])));
        assert!(authorizer.allow_fork(&member(), &application(false, &[Permission::ExportApplications])));
    }
}
