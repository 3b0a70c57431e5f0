// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiki adapter speaking the Confluence XML-RPC API (`confluence2`).
//!
//! Spaces are reported as projects. Their permission sets carry one entry per granted user or
//! group, entries naming neither are anonymous grants and reported as unparsable principals.
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use permaudit_core::{Credentials, ProjectInfo, RawPermission, Service, ServiceError};
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError, ServiceKind};
use crate::http::HttpClient;
use crate::xmlrpc::{self, Value, XmlRpcError};

const ENDPOINT: &str = "rpc/xmlrpc";

const ANONYMOUS: &str = "(anonymous)";

#[derive(Debug)]
pub struct Confluence {
    client: HttpClient,
    token: Option<String>,
}

impl Confluence {
    pub fn new(url: &Url, config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: HttpClient::new(url, config)?,
            token: None,
        })
    }

    fn token(&self) -> Result<&str, ServiceError> {
        self.token.as_deref().ok_or(ServiceError::NotLoggedIn)
    }

    async fn post(&self, method: &str, params: &[Value]) -> Result<String, ServiceError> {
        debug!(method, "xml-rpc call");
        let body = xmlrpc::encode_call(&format!("confluence2.{method}"), params);
        self.client.post_xml(ENDPOINT, body).await
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, ServiceError> {
        let response = self.post(method, params).await?;
        xmlrpc::decode_response(&response).map_err(|err| match err {
            XmlRpcError::Fault { .. } => ServiceError::Unavailable(err.to_string()),
            err => ServiceError::InvalidResponse(err.to_string()),
        })
    }
}

/// Permission reports of one permission set, `Err` items name no principal.
fn permissions_of_set(
    set: &Value,
) -> Result<Vec<Result<RawPermission, ServiceError>>, ServiceError> {
    let permission = set
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidResponse("permission set without type".into()))?;
    let entries: &[Value] = match set.get("spacePermissions") {
        Some(entries) => entries.as_array().ok_or_else(|| {
            ServiceError::InvalidResponse(format!("permissions of {permission} are no list"))
        })?,
        None => &[],
    };

    let name = |entry: &Value, field: &str| {
        entry
            .get(field)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
    };

    Ok(entries
        .iter()
        .map(|entry| match (name(entry, "userName"), name(entry, "groupName")) {
            (Some(user), _) => Ok(RawPermission::user(permission, user)),
            (None, Some(group)) => Ok(RawPermission::group(permission, group)),
            (None, None) => Err(ServiceError::UnparsablePrincipal {
                permission: permission.to_owned(),
                principal: ANONYMOUS.to_owned(),
            }),
        })
        .collect())
}

#[async_trait]
impl Service for Confluence {
    fn kind(&self) -> &str {
        ServiceKind::Confluence.as_str()
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), ServiceError> {
        let params = [
            Value::from(credentials.user()),
            Value::from(credentials.password()),
        ];
        let response = self.post("login", &params).await?;
        let token = match xmlrpc::decode_response(&response) {
            Ok(Value::String(token)) if !token.is_empty() => token,
            Ok(_) => {
                return Err(ServiceError::InvalidResponse(
                    "login did not answer with a token".into(),
                ));
            }
            Err(XmlRpcError::Fault { message, .. }) => {
                return Err(ServiceError::Authentication {
                    user: credentials.user().to_owned(),
                    reason: message,
                });
            }
            Err(err) => return Err(ServiceError::InvalidResponse(err.to_string())),
        };

        self.token = Some(token);
        Ok(())
    }

    fn load_projects(&self) -> BoxStream<'_, Result<ProjectInfo, ServiceError>> {
        try_stream! {
            let token = self.token()?;
            let spaces = self.call("getSpaces", &[Value::from(token)]).await?;
            let spaces = spaces.as_array().ok_or_else(|| {
                ServiceError::InvalidResponse("spaces are no list".into())
            })?;
            for space in spaces {
                yield ProjectInfo::from_metadata(space.to_json());
            }
        }
        .boxed()
    }

    fn load_permissions_for_project<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxStream<'a, Result<RawPermission, ServiceError>> {
        let reports = try_stream! {
            let token = self.token()?;
            let sets = self
                .call("getSpacePermissionSets", &[Value::from(token), Value::from(key)])
                .await?;
            let sets = sets.as_array().ok_or_else(|| {
                ServiceError::InvalidResponse(format!("permission sets of {key} are no list"))
            })?;
            for set in sets {
                for report in permissions_of_set(set)? {
                    yield report;
                }
            }
        };

        reports
            .map(|report: Result<_, ServiceError>| report.and_then(|raw| raw))
            .boxed()
    }

    async fn logout(&mut self) -> Result<(), ServiceError> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        self.call("logout", &[Value::from(token.as_str())]).await?;
        Ok(())
    }
}
