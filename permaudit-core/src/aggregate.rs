// SPDX-License-Identifier: MIT OR Apache-2.0

//! One configured service together with the projects discovered in it.
use std::collections::BTreeMap;
use std::fmt;

use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::permission::{PermissionSet, PrincipalKind};
use crate::project::Project;
use crate::service::{Credentials, Service, ServiceError};
use crate::world::ProjectPermissions;

/// Default number of projects whose permissions are fetched concurrently within one service.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// A non-fatal problem recorded during a refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub service: String,
    pub project: Option<String>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{} / {}: {}", self.service, project, self.message),
            None => write!(f, "{}: {}", self.service, self.message),
        }
    }
}

/// A fatal service error with the context it occurred in.
#[derive(Debug, Error)]
pub struct ServiceFailure {
    pub service: String,
    pub project: Option<String>,
    pub source: ServiceError,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(
                f,
                "service {}, project {}: {}",
                self.service, project, self.source
            ),
            None => write!(f, "service {}: {}", self.service, self.source),
        }
    }
}

/// A service adapter plus its discovered projects.
///
/// Projects are only ever (re-)enumerated explicitly. Each enumeration replaces the whole
/// collection at once, and only when it succeeded, so a failing refresh leaves the data of the
/// last successful one in place.
pub struct ServiceAggregate {
    name: String,
    kind: String,
    url: Option<String>,
    adapter: Option<Box<dyn Service>>,
    logged_in: bool,
    projects: BTreeMap<String, Project>,
    warnings: Vec<Warning>,
    concurrency: usize,
}

impl ServiceAggregate {
    pub fn new(name: impl Into<String>, adapter: Box<dyn Service>) -> Self {
        Self {
            name: name.into(),
            kind: adapter.kind().to_owned(),
            url: None,
            adapter: Some(adapter),
            logged_in: false,
            projects: BTreeMap::new(),
            warnings: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Service restored from previously collected data, without an upstream connection.
    pub fn detached(
        name: impl Into<String>,
        kind: impl Into<String>,
        url: Option<String>,
        projects: BTreeMap<String, Project>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            url,
            adapter: None,
            logged_in: false,
            projects,
            warnings: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Number of projects whose permissions are fetched at the same time, at least one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_detached(&self) -> bool {
        self.adapter.is_none()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn projects(&self) -> &BTreeMap<String, Project> {
        &self.projects
    }

    pub fn project(&self, key: &str) -> Option<&Project> {
        self.projects.get(key)
    }

    /// Warnings of the last successful refresh.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), ServiceFailure> {
        let Some(adapter) = self.adapter.as_mut() else {
            return Err(self.failure(None, ServiceError::Detached));
        };

        match adapter.login(credentials).await {
            Ok(()) => {
                info!(service = %self.name, user = %credentials.user(), "logged in");
                self.logged_in = true;
                Ok(())
            }
            Err(err) => Err(self.failure(None, err)),
        }
    }

    /// Re-enumerates all projects. Their permissions need to be loaded separately.
    pub async fn refresh_projects(&mut self) -> Result<(), ServiceFailure> {
        let projects = self
            .load_projects()
            .await
            .map_err(|err| self.failure(None, err))?;
        self.projects = projects;
        self.warnings.clear();
        Ok(())
    }

    /// Reloads the permissions of all currently known projects.
    pub async fn refresh_permissions(&mut self) -> Result<(), ServiceFailure> {
        let mut projects = self.projects.clone();
        let warnings = self.load_permissions(&mut projects).await?;
        self.projects = projects;
        self.warnings = warnings;
        Ok(())
    }

    /// Re-enumerates all projects and loads their permissions.
    pub async fn refresh(&mut self) -> Result<(), ServiceFailure> {
        info!(service = %self.name, "refreshing projects and permissions");

        let mut projects = self
            .load_projects()
            .await
            .map_err(|err| self.failure(None, err))?;
        let warnings = self.load_permissions(&mut projects).await?;

        self.projects = projects;
        self.warnings = warnings;

        info!(
            service = %self.name,
            projects = self.projects.len(),
            warnings = self.warnings.len(),
            "refresh finished"
        );
        Ok(())
    }

    /// Alphabetically ordered permissions of all projects.
    ///
    /// Projects whose permissions were never loaded show up with an empty set.
    pub fn permissions(&self) -> ProjectPermissions {
        self.projects
            .iter()
            .map(|(key, project)| (key.clone(), loaded_or_empty(project)))
            .collect()
    }

    /// Flat `(project, permission, kind, assignee)` rows, ordered by project key.
    pub fn flat_permissions(
        &self,
    ) -> impl Iterator<Item = (&str, &str, PrincipalKind, &str)> + '_ {
        self.projects.iter().flat_map(|(key, project)| {
            project.permissions().into_iter().flat_map(move |permissions| {
                permissions
                    .flatten()
                    .map(move |(permission, kind, assignee)| {
                        (key.as_str(), permission, kind, assignee)
                    })
            })
        })
    }

    /// Ends the session. Collected data stays available.
    pub async fn logout(&mut self) -> Result<(), ServiceFailure> {
        if !self.logged_in {
            return Ok(());
        }
        let Some(adapter) = self.adapter.as_mut() else {
            return Ok(());
        };

        let result = adapter.logout().await;
        self.logged_in = false;
        match result {
            Ok(()) => {
                debug!(service = %self.name, "logged out");
                Ok(())
            }
            Err(err) => {
                warn!(service = %self.name, "logout failed: {err}");
                Err(self.failure(None, err))
            }
        }
    }

    fn session(&self) -> Result<&dyn Service, ServiceError> {
        let adapter = self.adapter.as_deref().ok_or(ServiceError::Detached)?;
        if !self.logged_in {
            return Err(ServiceError::NotLoggedIn);
        }
        Ok(adapter)
    }

    async fn load_projects(&self) -> Result<BTreeMap<String, Project>, ServiceError> {
        let adapter = self.session()?;

        let mut projects = BTreeMap::new();
        let mut listing = adapter.load_projects();
        while let Some(info) = listing.next().await {
            let info = info?;
            if projects.contains_key(&info.key) {
                warn!(
                    service = %self.name,
                    project = %info.key,
                    "project listed twice, keeping the last one"
                );
            }
            projects.insert(info.key.clone(), Project::new(info));
        }

        debug!(service = %self.name, projects = projects.len(), "enumerated projects");
        Ok(projects)
    }

    async fn load_permissions(
        &self,
        projects: &mut BTreeMap<String, Project>,
    ) -> Result<Vec<Warning>, ServiceFailure> {
        let adapter = self.session().map_err(|err| self.failure(None, err))?;

        let mut results: Vec<(String, Result<Vec<ServiceError>, ServiceError>)> =
            stream::iter(projects.values_mut())
                .map(|project| async move {
                    let result = project.refresh_permissions(adapter).await;
                    (project.key().to_owned(), result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut warnings = Vec::new();
        for (key, result) in results {
            match result {
                Ok(skipped) => warnings.extend(skipped.into_iter().map(|err| Warning {
                    service: self.name.clone(),
                    project: Some(key.clone()),
                    message: err.to_string(),
                })),
                Err(err) => return Err(self.failure(Some(key), err)),
            }
        }

        Ok(warnings)
    }

    fn failure(&self, project: Option<String>, source: ServiceError) -> ServiceFailure {
        ServiceFailure {
            service: self.name.clone(),
            project,
            source,
        }
    }
}

impl fmt::Debug for ServiceAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAggregate")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("detached", &self.is_detached())
            .field("logged_in", &self.logged_in)
            .field("projects", &self.projects.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Permission set of a project, empty if it was never loaded.
pub(crate) fn loaded_or_empty(project: &Project) -> PermissionSet {
    project.permissions().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::service::{Credentials, ServiceError};
    use crate::test_utils::MockService;

    use super::ServiceAggregate;

    fn credentials() -> Credentials {
        Credentials::new("admin", "secret")
    }

    fn tracker() -> MockService {
        MockService::new("Tracker")
            .grant_user("PROJ", "Developer", "alice")
            .grant_user("PROJ", "Developer", "bob")
            .grant_user("PROJ", "Developer", "alice")
            .grant_group("PROJ", "Administrator", "admins")
            .project("EMPTY")
    }

    #[tokio::test]
    async fn refresh_merges_repeated_reports() {
        let mut service = ServiceAggregate::new("Tracker", Box::new(tracker()));
        service.login(&credentials()).await.unwrap();
        service.refresh().await.unwrap();

        let permissions = service.permissions();
        assert_eq!(permissions.keys().collect::<Vec<_>>(), vec!["EMPTY", "PROJ"]);

        let developer = permissions["PROJ"].get("Developer").unwrap();
        assert_eq!(developer.users().len(), 2);
        assert!(permissions["EMPTY"].is_empty());

        let rows: Vec<_> = service.flat_permissions().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].0, "PROJ");
        assert_eq!(rows[0].1, "Administrator");
    }

    #[tokio::test]
    async fn refresh_before_login_is_rejected() {
        let mut service = ServiceAggregate::new("Tracker", Box::new(tracker()));

        let failure = service.refresh().await.unwrap_err();
        assert!(matches!(failure.source, ServiceError::NotLoggedIn));
        assert_eq!(failure.service, "Tracker");
    }

    #[tokio::test]
    async fn unparsable_principals_are_skipped() {
        let adapter = tracker().grant_unparsable("PROJ", "Viewer", "anonymous");
        let mut service = ServiceAggregate::new("Tracker", Box::new(adapter));
        service.login(&credentials()).await.unwrap();
        service.refresh().await.unwrap();

        assert_eq!(service.warnings().len(), 1);
        assert_eq!(service.warnings()[0].project.as_deref(), Some("PROJ"));

        let permissions = service.permissions();
        assert!(!permissions["PROJ"].contains("Viewer"));
        assert!(permissions["PROJ"].contains("Developer"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_data() {
        let adapter = tracker().fail_project_after_refreshes("PROJ", 1);
        let mut service = ServiceAggregate::new("Tracker", Box::new(adapter));
        service.login(&credentials()).await.unwrap();
        service.refresh().await.unwrap();
        let before = service.permissions();

        let failure = service.refresh().await.unwrap_err();
        assert_eq!(failure.project.as_deref(), Some("PROJ"));
        assert!(matches!(failure.source, ServiceError::Unavailable(_)));
        assert_eq!(service.permissions(), before);
    }

    #[tokio::test]
    async fn failed_enumeration_keeps_previous_projects() {
        let adapter = tracker().fail_enumeration_after_refreshes(1);
        let mut service = ServiceAggregate::new("Tracker", Box::new(adapter));
        service.login(&credentials()).await.unwrap();
        service.refresh().await.unwrap();

        assert!(service.refresh_projects().await.is_err());
        assert_eq!(service.projects().len(), 2);
        assert!(service.project("PROJ").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn projects_and_permissions_refresh_separately() {
        let mut service = ServiceAggregate::new("Tracker", Box::new(tracker()));
        service.login(&credentials()).await.unwrap();

        service.refresh_projects().await.unwrap();
        assert!(!service.project("PROJ").unwrap().is_loaded());
        assert!(service.permissions()["PROJ"].is_empty());

        service.refresh_permissions().await.unwrap();
        assert!(service.project("PROJ").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn rejected_login_and_logout() {
        let adapter = tracker().accept("admin", "other");
        let mut service = ServiceAggregate::new("Tracker", Box::new(adapter));

        let failure = service.login(&credentials()).await.unwrap_err();
        assert!(matches!(failure.source, ServiceError::Authentication { .. }));
        assert!(!service.is_logged_in());

        // Logging out without a session is a no-op.
        service.logout().await.unwrap();
    }

    #[tokio::test]
    async fn detached_services_keep_their_data() {
        let mut service =
            ServiceAggregate::detached("Tracker", "Tracker", None, Default::default());

        let failure = service.login(&credentials()).await.unwrap_err();
        assert!(matches!(failure.source, ServiceError::Detached));
        assert!(service.permissions().is_empty());
    }
}
