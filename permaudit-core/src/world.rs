// SPDX-License-Identifier: MIT OR Apache-2.0

//! The collection of all configured services.
use std::collections::BTreeMap;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{ServiceAggregate, ServiceFailure, Warning};
use crate::diff::WorldDiff;
use crate::flatten::FlatPermission;
use crate::permission::PermissionSet;
use crate::service::{Credentials, Service};
use crate::snapshot::{ServiceSnapshot, Snapshot};

/// Permissions of one service, keyed and ordered by project key.
pub type ProjectPermissions = BTreeMap<String, PermissionSet>;

/// The canonical model: permissions keyed and ordered by service name, then project key.
pub type WorldPermissions = BTreeMap<String, ProjectPermissions>;

/// All configured services, keyed by their unique names.
///
/// Services are independent of each other: logins, refreshes and logouts run concurrently
/// across services and the failure of one does not stop the others. The canonical
/// [`permissions`](World::permissions) are only ever read after all of them completed.
#[derive(Debug, Default)]
pub struct World {
    services: BTreeMap<String, ServiceAggregate>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> WorldBuilder {
        WorldBuilder::default()
    }

    /// Adds a service, its name must not be taken yet.
    pub fn insert(&mut self, service: ServiceAggregate) -> Result<(), WorldError> {
        if self.services.contains_key(service.name()) {
            return Err(WorldError::DuplicateService(service.name().to_owned()));
        }
        self.services.insert(service.name().to_owned(), service);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<ServiceAggregate> {
        self.services.remove(name)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceAggregate> {
        self.services.get(name)
    }

    /// Iterates over all services in alphabetical order of their names.
    pub fn services(&self) -> impl Iterator<Item = &ServiceAggregate> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Logs into every service with the same credentials.
    ///
    /// Services which failed stay logged out, all others keep their session.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), WorldError> {
        let results = join_all(
            self.services
                .values_mut()
                .map(|service| service.login(credentials)),
        )
        .await;
        collect_failures(results)
    }

    /// Re-enumerates projects and reloads permissions of every service.
    pub async fn refresh(&mut self) -> Result<(), WorldError> {
        info!(services = self.services.len(), "refreshing all services");
        let results = join_all(self.services.values_mut().map(ServiceAggregate::refresh)).await;
        collect_failures(results)
    }

    /// Ends the session of every service.
    ///
    /// Failures are logged and handed back, they never stop the other services from logging
    /// out.
    pub async fn logout(&mut self) -> Vec<ServiceFailure> {
        let results = join_all(self.services.values_mut().map(ServiceAggregate::logout)).await;
        results.into_iter().filter_map(Result::err).collect()
    }

    /// The canonical model: service name → project key → permission set, alphabetically.
    pub fn permissions(&self) -> WorldPermissions {
        self.services
            .iter()
            .map(|(name, service)| (name.clone(), service.permissions()))
            .collect()
    }

    /// All permission assignments in first normal form, ordered by service name, project key,
    /// permission name, principal kind (groups first) and principal name.
    pub fn flat_permissions(&self) -> impl Iterator<Item = FlatPermission<'_>> {
        self.services.iter().flat_map(|(name, service)| {
            service
                .flat_permissions()
                .map(move |(project, permission, kind, assignee)| FlatPermission {
                    service: name.as_str(),
                    project,
                    permission,
                    kind,
                    assignee,
                })
        })
    }

    /// Warnings recorded by the last refresh of every service.
    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.services.values().flat_map(|service| service.warnings())
    }

    /// Compares this world, taken as the older state, with a newer one.
    pub fn diff(&self, newer: &World) -> WorldDiff {
        WorldDiff::between(&self.permissions(), &newer.permissions())
    }

    /// Captures all collected data so it can be persisted.
    pub fn snapshot(&self) -> Snapshot {
        let services = self
            .services
            .iter()
            .map(|(name, service)| {
                let snapshot = ServiceSnapshot {
                    kind: service.kind().to_owned(),
                    url: service.url().map(str::to_owned),
                    projects: service.projects().clone(),
                };
                (name.clone(), snapshot)
            })
            .collect();
        Snapshot::new(services)
    }

    /// Restores a world from a snapshot. All of its services are detached.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let services = snapshot
            .into_services()
            .into_iter()
            .map(|(name, service)| {
                let aggregate = ServiceAggregate::detached(
                    name.clone(),
                    service.kind,
                    service.url,
                    service.projects,
                );
                (name, aggregate)
            })
            .collect();
        Self { services }
    }
}

fn collect_failures(
    results: impl IntoIterator<Item = Result<(), ServiceFailure>>,
) -> Result<(), WorldError> {
    let failures: Vec<ServiceFailure> = results.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        return Ok(());
    }

    for failure in &failures {
        warn!("{failure}");
    }
    Err(WorldError::Services(failures))
}

/// Assembles a [`World`] from adapters or prepared services.
#[derive(Default)]
pub struct WorldBuilder {
    services: Vec<ServiceAggregate>,
    concurrency: Option<usize>,
}

impl WorldBuilder {
    pub fn service(mut self, service: ServiceAggregate) -> Self {
        self.services.push(service);
        self
    }

    pub fn adapter(self, name: impl Into<String>, adapter: Box<dyn Service>) -> Self {
        self.service(ServiceAggregate::new(name, adapter))
    }

    /// Number of projects fetched concurrently within each service.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn build(self) -> Result<World, WorldError> {
        let mut world = World::new();
        for service in self.services {
            let service = match self.concurrency {
                Some(concurrency) => service.with_concurrency(concurrency),
                None => service,
            };
            world.insert(service)?;
        }
        Ok(world)
    }
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("service name {0} is used more than once")]
    DuplicateService(String),

    #[error("{} service(s) failed, first: {}", .0.len(), first_failure(.0))]
    Services(Vec<ServiceFailure>),
}

impl WorldError {
    /// Per-service failures, empty for configuration errors.
    pub fn failures(&self) -> &[ServiceFailure] {
        match self {
            WorldError::Services(failures) => failures,
            WorldError::DuplicateService(_) => &[],
        }
    }
}

fn first_failure(failures: &[ServiceFailure]) -> String {
    failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}
