//! Application forking orchestration
//!
//! This crate sequences a fork of an application into another workspace:
//! it resolves the revision to copy, checks who may fork, hands the deep copy
//! to an external executor on a task that outlives the caller, and reports a
//! best-effort analytics event. Persistence, sessions and the copy engine are
//! reached through the traits in [`ports`].

pub mod authorize;
pub mod branch;
pub mod config;
pub mod error;
pub mod event;
pub mod forking;
pub mod memory;
pub mod model;
pub mod operation;
pub mod permission;
pub mod ports;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use authorize::ForkAuthorizer;
pub use branch::BranchResolver;
pub use config::ForkSettings;
pub use error::{ForkError, Result};
pub use event::{AnalyticsEvent, EventData};
pub use forking::{Collaborators, ForkHandle, ForkOrchestrator, ForkOutcome};
pub use memory::{InMemoryCatalog, TracingAnalytics};
pub use model::{
    Application, EntityKind, ForkRequest, ForkSource, ImportedApplication, User,
    VersionControlMetadata, Workspace,
};
pub use operation::{Operation, OperationFilters, OperationStatus};
pub use permission::{Permission, PermissionPolicy};
