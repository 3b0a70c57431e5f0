// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unified permission model for services which scope access by project.
//!
//! Every service adapter reports its projects and the principals granted each permission in
//! them. [`World`] logs into all configured services, collects their permissions concurrently
//! into one canonical tree and offers flat, diffable and persistable views of it.
mod aggregate;
pub mod diff;
mod flatten;
mod permission;
mod project;
mod service;
pub mod snapshot;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
mod world;

pub use aggregate::{DEFAULT_CONCURRENCY, ServiceAggregate, ServiceFailure, Warning};
pub use diff::{Change, DiffMode, DiffNotice, WorldDiff};
pub use flatten::{FlatPermission, flatten};
pub use permission::{
    PermissionEntry, PermissionError, PermissionSet, PrincipalKind, RawPermission,
};
pub use project::{Project, ProjectInfo, UNKNOWN_PROJECT_KEY};
pub use service::{Credentials, Service, ServiceError};
pub use snapshot::{SNAPSHOT_VERSION, Snapshot, SnapshotError};
pub use world::{ProjectPermissions, World, WorldBuilder, WorldError, WorldPermissions};
