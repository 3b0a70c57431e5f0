// SPDX-License-Identifier: MIT OR Apache-2.0

//! Issue tracker adapter speaking the Jira REST API (version 2).
//!
//! Permissions are the project roles: every actor of a role is granted the permission named
//! after the role.
use std::collections::BTreeMap;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use permaudit_core::{Credentials, ProjectInfo, RawPermission, Service, ServiceError};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError, ServiceKind};
use crate::http::HttpClient;

const GROUP_ACTOR: &str = "atlassian-group-role-actor";
const USER_ACTOR: &str = "atlassian-user-role-actor";

#[derive(Debug, Deserialize)]
struct Role {
    #[serde(default)]
    actors: Vec<Actor>,
}

#[derive(Debug, Deserialize)]
struct Actor {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

impl Actor {
    fn into_permission(self, role: &str) -> Result<RawPermission, ServiceError> {
        let kind = match self.kind.as_str() {
            GROUP_ACTOR => "group",
            USER_ACTOR => "user",
            other => other,
        };
        RawPermission::classify(role, kind, self.name)
    }
}

#[derive(Debug)]
pub struct Jira {
    client: HttpClient,
    session: Option<HttpClient>,
}

impl Jira {
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

#[async_trait]
impl Service for Jira {
    fn kind(&self) -> &str {
        ServiceKind::Jira.as_str()
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), ServiceError> {
        let session = self.client.authenticated(credentials);
        let myself: Value = session.get_json("rest/api/2/myself", &[]).await?;
        debug!(user = ?myself.get("name"), "logged into jira");
        self.session = Some(session);
        Ok(())
    }

    fn load_projects(&self) -> BoxStream<'_, Result<ProjectInfo, ServiceError>> {
        try_stream! {
            let client = self.session()?;
            let projects: Vec<Value> = client.get_json("rest/api/2/project", &[]).await?;
            for project in projects {
                yield ProjectInfo::from_metadata(project);
            }
        }
        .boxed()
    }

    fn load_permissions_for_project<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxStream<'a, Result<RawPermission, ServiceError>> {
        let reports = try_stream! {
            let client = self.session()?;
            let roles: BTreeMap<String, String> = client
                .get_json(&format!("rest/api/2/project/{key}/role"), &[])
                .await?;

            for (name, url) in roles {
                let role: Role = client.get_json(&url, &[]).await?;
                for actor in role.actors {
                    yield actor.into_permission(&name);
                }
            }
        };

        // Unparsable actors are reported item by item, transport errors end the listing.
        reports
            .map(|report: Result<_, ServiceError>| report.and_then(|raw| raw))
            .boxed()
    }

    async fn logout(&mut self) -> Result<(), ServiceError> {
        self.session.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use permaudit_core::{RawPermission, ServiceError};

    use super::{Actor, GROUP_ACTOR, USER_ACTOR};

    fn actor(kind: &str, name: &str) -> Actor {
        Actor {
            kind: kind.into(),
            name: name.into(),
        }
    }

    #[test]
    fn actor_types() {
        assert_eq!(
            actor(USER_ACTOR, "alice").into_permission("Users").unwrap(),
            RawPermission::user("Users", "alice")
        );
        assert_eq!(
            actor(GROUP_ACTOR, "staff").into_permission("Users").unwrap(),
            RawPermission::group("Users", "staff")
        );
        assert!(matches!(
            actor("atlassian-service-role-actor", "robot").into_permission("Users"),
            Err(ServiceError::UnparsablePrincipal { principal, .. })
                if principal == "atlassian-service-role-actor:robot"
        ));
    }
}
