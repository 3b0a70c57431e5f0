// SPDX-License-Identifier: MIT OR Apache-2.0

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::permission::PermissionSet;
use crate::service::{Service, ServiceError};

/// Key used for projects whose upstream metadata does not carry one.
pub const UNKNOWN_PROJECT_KEY: &str = "(unknown)";

/// Identity and metadata of a project as listed by a service adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub key: String,
    pub metadata: Value,
}

impl ProjectInfo {
    pub fn new(key: impl Into<String>, metadata: Value) -> Self {
        Self {
            key: key.into(),
            metadata,
        }
    }

    /// Takes the key from the `key` field of the upstream metadata.
    pub fn from_metadata(metadata: Value) -> Self {
        let key = metadata
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_PROJECT_KEY)
            .to_owned();
        Self { key, metadata }
    }
}

/// A unit of access-control scoping within one service, for example a wiki space, an issue
/// tracker project or a repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    key: String,
    metadata: Value,
    permissions: Option<PermissionSet>,
}

impl Project {
    pub fn new(info: ProjectInfo) -> Self {
        Self {
            key: info.key,
            metadata: info.metadata,
            permissions: None,
        }
    }

    /// Project with already known permissions, for example restored from earlier data.
    pub fn with_permissions(info: ProjectInfo, permissions: PermissionSet) -> Self {
        Self {
            key: info.key,
            metadata: info.metadata,
            permissions: Some(permissions),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Permissions of the last successful refresh, `None` if they were never loaded.
    pub fn permissions(&self) -> Option<&PermissionSet> {
        self.permissions.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.permissions.is_some()
    }

    /// Loads a fresh permission set for this project from the service.
    ///
    /// The previous set is replaced as a whole, and only if the listing completed. Returns the
    /// non-fatal errors of all reported items which had to be skipped.
    pub async fn refresh_permissions(
        &mut self,
        service: &dyn Service,
    ) -> Result<Vec<ServiceError>, ServiceError> {
        let mut permissions = PermissionSet::new();
        let mut skipped = Vec::new();

        let mut reports = service.load_permissions_for_project(&self.key);
        while let Some(report) = reports.next().await {
            match report {
                Ok(raw) if raw.has_principal() => permissions.add_raw(raw),
                Ok(raw) => {
                    warn!(
                        project = %self.key,
                        permission = %raw.permission,
                        "skipping permission without principal"
                    );
                    skipped.push(ServiceError::UnparsablePrincipal {
                        permission: raw.permission,
                        principal: String::new(),
                    });
                }
                Err(err) if !err.is_fatal() => {
                    warn!(project = %self.key, "skipping permission: {err}");
                    skipped.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        debug!(project = %self.key, permissions = permissions.len(), "loaded permissions");
        self.permissions = Some(permissions);
        Ok(skipped)
    }
}
