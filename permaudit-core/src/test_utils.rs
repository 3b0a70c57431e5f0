// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities.
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde_json::json;

use crate::permission::RawPermission;
use crate::project::ProjectInfo;
use crate::service::{Credentials, Service, ServiceError};

#[derive(Clone, Debug)]
enum MockGrant {
    Valid(RawPermission),
    Unparsable { permission: String, principal: String },
}

/// In-memory service adapter with configurable projects, grants and failures.
#[derive(Debug)]
pub struct MockService {
    kind: String,
    accepted: Option<Credentials>,
    logged_in: bool,
    projects: BTreeMap<String, Vec<MockGrant>>,
    failing_projects: HashMap<String, usize>,
    failing_enumeration: Option<usize>,
    failing_logout: bool,
    enumerations: AtomicUsize,
    permission_loads: Mutex<HashMap<String, usize>>,
}

impl MockService {
    /// Service accepting any credentials, without projects.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            accepted: None,
            logged_in: false,
            projects: BTreeMap::new(),
            failing_projects: HashMap::new(),
            failing_enumeration: None,
            failing_logout: false,
            enumerations: AtomicUsize::new(0),
            permission_loads: Mutex::new(HashMap::new()),
        }
    }

    /// Only accept this user and password.
    pub fn accept(mut self, user: &str, password: &str) -> Self {
        self.accepted = Some(Credentials::new(user, password));
        self
    }

    pub fn project(mut self, key: &str) -> Self {
        self.projects.entry(key.to_owned()).or_default();
        self
    }

    pub fn grant_user(self, project: &str, permission: &str, user: &str) -> Self {
        self.grant(project, MockGrant::Valid(RawPermission::user(permission, user)))
    }

    pub fn grant_group(self, project: &str, permission: &str, group: &str) -> Self {
        self.grant(project, MockGrant::Valid(RawPermission::group(permission, group)))
    }

    /// Report a grant to a principal which is neither a user nor a group.
    pub fn grant_unparsable(self, project: &str, permission: &str, principal: &str) -> Self {
        self.grant(
            project,
            MockGrant::Unparsable {
                permission: permission.to_owned(),
                principal: principal.to_owned(),
            },
        )
    }

    /// Let permission listings of a project fail once they were loaded `successes` times.
    pub fn fail_project_after_refreshes(mut self, project: &str, successes: usize) -> Self {
        self.failing_projects.insert(project.to_owned(), successes);
        self
    }

    /// Let project listings fail halfway once they were enumerated `successes` times.
    pub fn fail_enumeration_after_refreshes(mut self, successes: usize) -> Self {
        self.failing_enumeration = Some(successes);
        self
    }

    pub fn fail_logout(mut self) -> Self {
        self.failing_logout = true;
        self
    }

    fn grant(mut self, project: &str, grant: MockGrant) -> Self {
        self.projects
            .entry(project.to_owned())
            .or_default()
            .push(grant);
        self
    }
}

#[async_trait]
impl Service for MockService {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), ServiceError> {
        if let Some(accepted) = &self.accepted {
            if accepted != credentials {
                return Err(ServiceError::Authentication {
                    user: credentials.user().to_owned(),
                    reason: "invalid credentials".into(),
                });
            }
        }
        self.logged_in = true;
        Ok(())
    }

    fn load_projects(&self) -> BoxStream<'_, Result<ProjectInfo, ServiceError>> {
        if !self.logged_in {
            return stream::once(async { Err(ServiceError::NotLoggedIn) }).boxed();
        }

        let mut items: Vec<Result<ProjectInfo, ServiceError>> = self
            .projects
            .keys()
            .map(|key| Ok(ProjectInfo::from_metadata(json!({ "key": key, "name": key }))))
            .collect();

        let enumeration = self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_enumeration
            .is_some_and(|successes| enumeration >= successes)
        {
            items.truncate(1);
            items.push(Err(ServiceError::Unavailable("connection reset".into())));
        }

        stream::iter(items).boxed()
    }

    fn load_permissions_for_project<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxStream<'a, Result<RawPermission, ServiceError>> {
        if !self.logged_in {
            return stream::once(async { Err(ServiceError::NotLoggedIn) }).boxed();
        }

        let loads = {
            let mut permission_loads = self
                .permission_loads
                .lock()
                .expect("permission load counter poisoned");
            let loads = permission_loads.entry(key.to_owned()).or_default();
            *loads += 1;
            *loads - 1
        };
        if self
            .failing_projects
            .get(key)
            .is_some_and(|successes| loads >= *successes)
        {
            return stream::once(async move {
                Err(ServiceError::Unavailable(format!("timeout loading {key}")))
            })
            .boxed();
        }

        let items: Vec<Result<RawPermission, ServiceError>> = self
            .projects
            .get(key)
            .into_iter()
            .flatten()
            .map(|grant| match grant {
                MockGrant::Valid(raw) => Ok(raw.clone()),
                MockGrant::Unparsable {
                    permission,
                    principal,
                } => Err(ServiceError::UnparsablePrincipal {
                    permission: permission.clone(),
                    principal: principal.clone(),
                }),
            })
            .collect();
        stream::iter(items).boxed()
    }

    async fn logout(&mut self) -> Result<(), ServiceError> {
        self.logged_in = false;
        if self.failing_logout {
            return Err(ServiceError::Unavailable("session already gone".into()));
        }
        Ok(())
    }
}
