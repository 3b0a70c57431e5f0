// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contract every upstream service adapter implements.
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::permission::RawPermission;
use crate::project::ProjectInfo;

/// Already resolved login credentials for a service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Capabilities of an upstream service like a wiki, an issue tracker or a repository manager.
///
/// Every operation may block on network I/O. `login` must succeed before any other operation
/// is used, adapters answer with [`ServiceError::NotLoggedIn`] otherwise. One adapter instance
/// holds exactly one session and is never shared between concurrent callers.
#[async_trait]
pub trait Service: Send + Sync {
    /// Human readable kind of this service, for example "Jira".
    fn kind(&self) -> &str;

    /// Establishes a session.
    async fn login(&mut self, credentials: &Credentials) -> Result<(), ServiceError>;

    /// Lists all projects of this service.
    ///
    /// Pagination of the upstream listing is hidden behind the stream.
    fn load_projects(&self) -> BoxStream<'_, Result<ProjectInfo, ServiceError>>;

    /// Lists the permission assignments of one project.
    ///
    /// Reports are allowed to be partial and to repeat permission names, they are merged by the
    /// caller. Items failing with [`ServiceError::UnparsablePrincipal`] are skipped, every other
    /// error aborts the listing.
    fn load_permissions_for_project<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxStream<'a, Result<RawPermission, ServiceError>>;

    /// Terminates the session on a best-effort basis.
    async fn logout(&mut self) -> Result<(), ServiceError>;
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service rejected the credentials.
    #[error("authentication failed for user {user}: {reason}")]
    Authentication { user: String, reason: String },

    /// An operation was used before a successful login.
    #[error("not logged in")]
    NotLoggedIn,

    /// The service was restored from a snapshot and has no connection to talk to.
    #[error("service is detached from its upstream connection")]
    Detached,

    /// Network or transport failure.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered with data we can not interpret.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// A permission was granted to something which is neither a user nor a group.
    #[error("could not classify principal {principal:?} holding {permission}")]
    UnparsablePrincipal {
        permission: String,
        principal: String,
    },
}

impl ServiceError {
    /// Returns `false` for errors which only invalidate a single reported item.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ServiceError::UnparsablePrincipal { .. })
    }
}
