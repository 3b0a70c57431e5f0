// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository manager adapter speaking the Stash / Bitbucket Server REST API (version 1.0).
//!
//! Permissions are granted on three kinds of scopes which are all reported as projects:
//!
//! * the global scope, keyed [`GLOBAL_KEY`]
//! * every project, keyed by its project key
//! * every repository, keyed `PROJECT/slug`
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use permaudit_core::{Credentials, ProjectInfo, RawPermission, Service, ServiceError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError, ServiceKind};
use crate::http::HttpClient;

/// Key of the scope holding the instance wide permissions.
pub const GLOBAL_KEY: &str = "(global)";

const REPOSITORY_DELIMITER: char = '/';

const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    values: Vec<T>,
    #[serde(default = "last_page")]
    is_last_page: bool,
    next_page_start: Option<u64>,
}

fn last_page() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Principal {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GroupGrant {
    group: Principal,
    permission: String,
}

#[derive(Debug, Deserialize)]
struct UserGrant {
    user: Principal,
    permission: String,
}

/// A permission scope, decoded from its project key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope<'a> {
    Global,
    Project(&'a str),
    Repository(&'a str, &'a str),
}

impl<'a> Scope<'a> {
    fn from_key(key: &'a str) -> Self {
        if key == GLOBAL_KEY {
            return Scope::Global;
        }
        match key.split_once(REPOSITORY_DELIMITER) {
            Some((project, slug)) => Scope::Repository(project, slug),
            None => Scope::Project(key),
        }
    }

    /// Path of the permission listings of this scope, without the principal kind.
    fn permissions_path(&self) -> String {
        match self {
            Scope::Global => "rest/api/1.0/admin/permissions".into(),
            Scope::Project(project) => format!("rest/api/1.0/projects/{project}/permissions"),
            Scope::Repository(project, slug) => {
                format!("rest/api/1.0/projects/{project}/repos/{slug}/permissions")
            }
        }
    }
}

#[derive(Debug)]
pub struct Stash {
    client: HttpClient,
    session: Option<HttpClient>,
}

impl Stash {
    pub fn new(url: &Url, config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: HttpClient::new(url, config)?,
            session: None,
        })
    }

    fn session(&self) -> Result<&HttpClient, ServiceError> {
        self.session.as_ref().ok_or(ServiceError::NotLoggedIn)
    }
}

/// All values of a paged listing, following `nextPageStart` until the last page.
fn paged<'a, T>(client: &'a HttpClient, path: String) -> BoxStream<'a, Result<T, ServiceError>>
where
    T: DeserializeOwned + Send + 'a,
{
    try_stream! {
        let mut start = 0;
        loop {
            let query = [("start", start.to_string()), ("limit", PAGE_LIMIT.to_string())];
            let page: Page<T> = client.get_json(&path, &query).await?;
            debug!(%path, start, values = page.values.len(), "fetched page");

            for value in page.values {
                yield value;
            }

            if page.is_last_page {
                break;
            }
            match page.next_page_start {
                Some(next) if next > start => start = next,
                next => Err(ServiceError::InvalidResponse(format!(
                    "{path}: page at {start} is not the last one but continues at {next:?}"
                )))?,
            }
        }
    }
    .boxed()
}

#[async_trait]
impl Service for Stash {
    fn kind(&self) -> &str {
        ServiceKind::Stash.as_str()
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), ServiceError> {
        let session = self.client.authenticated(credentials);
        let _: Page<Value> = session
            .get_json("rest/api/1.0/projects", &[("limit", "1".into())])
            .await?;
        self.session = Some(session);
        Ok(())
    }

    fn load_projects(&self) -> BoxStream<'_, Result<ProjectInfo, ServiceError>> {
        try_stream! {
            let client = self.session()?;
            yield ProjectInfo::new(
                GLOBAL_KEY,
                json!({ "key": GLOBAL_KEY, "description": "Global permissions" }),
            );

            let mut projects = paged::<Value>(client, "rest/api/1.0/projects".into());
            while let Some(project) = projects.next().await {
                let project = ProjectInfo::from_metadata(project?);
                let repositories_path = format!("rest/api/1.0/projects/{}/repos", project.key);
                let project_key = project.key.clone();
                yield project;

                let mut repositories = paged::<Value>(client, repositories_path);
                while let Some(repository) = repositories.next().await {
                    let repository = repository?;
                    let slug = repository
                        .get("slug")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            ServiceError::InvalidResponse(format!(
                                "repository of project {project_key} without slug"
                            ))
                        })?;
                    let key = format!("{project_key}{REPOSITORY_DELIMITER}{slug}");
                    yield ProjectInfo::new(key, repository);
                }
            }
        }
        .boxed()
    }

    fn load_permissions_for_project<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxStream<'a, Result<RawPermission, ServiceError>> {
        try_stream! {
            let client = self.session()?;
            let path = Scope::from_key(key).permissions_path();

            let mut groups = paged::<GroupGrant>(client, format!("{path}/groups"));
            while let Some(grant) = groups.next().await {
                let grant = grant?;
                yield RawPermission::group(grant.permission, grant.group.name);
            }

            let mut users = paged::<UserGrant>(client, format!("{path}/users"));
            while let Some(grant) = users.next().await {
                let grant = grant?;
                yield RawPermission::user(grant.permission, grant.user.name);
            }
        }
        .boxed()
    }

    async fn logout(&mut self) -> Result<(), ServiceError> {
        self.session.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{GLOBAL_KEY, Scope};

    #[test]
    fn scopes_from_keys() {
        assert_eq!(Scope::from_key(GLOBAL_KEY), Scope::Global);
        assert_eq!(Scope::from_key("PROJ"), Scope::Project("PROJ"));
        assert_eq!(
            Scope::from_key("PROJ/website"),
            Scope::Repository("PROJ", "website")
        );
        assert_eq!(
            Scope::from_key("PROJ/website").permissions_path(),
            "rest/api/1.0/projects/PROJ/repos/website/permissions"
        );
    }
}
