// SPDX-License-Identifier: MIT OR Apache-2.0

//! Where services live and how to talk to them.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use permaudit_core::DEFAULT_CONCURRENCY;
use thiserror::Error;
use url::Url;

/// Default timeout of a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceKind {
    Confluence,
    Jira,
    Stash,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Confluence => "Confluence",
            ServiceKind::Jira => "Jira",
            ServiceKind::Stash => "Stash",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Base URL of a service with an optional label, written as `URL[,name=LABEL]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceLocation {
    url: Url,
    label: Option<String>,
}

impl ServiceLocation {
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            url: base_url(url)?,
            label: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Result<Self, ConfigError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(ConfigError::EmptyLabel);
        }
        self.label = Some(label);
        Ok(self)
    }

    /// Base URL, always ending in `/`.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl FromStr for ServiceLocation {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split(',');
        let url = parts.next().unwrap_or_default();
        let mut location = ServiceLocation::new(url.trim())?;

        for option in parts {
            match option.split_once('=') {
                Some(("name", label)) => location = location.with_label(label.trim())?,
                _ => return Err(ConfigError::UnknownOption(option.to_owned())),
            }
        }

        Ok(location)
    }
}

/// One service to audit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub kind: ServiceKind,
    pub location: ServiceLocation,
}

impl ServiceConfig {
    pub fn new(kind: ServiceKind, location: ServiceLocation) -> Self {
        Self { kind, location }
    }

    /// Unique name of the service: its kind, followed by the label in parentheses if given.
    pub fn name(&self) -> String {
        match self.location.label() {
            Some(label) => format!("{} ({label})", self.kind),
            None => self.kind.to_string(),
        }
    }
}

/// Settings shared by all connectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub concurrency: usize,
}

impl ClientConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of projects loaded at the same time within one service.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

fn base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(value).map_err(|err| ConfigError::InvalidUrl(value.to_owned(), err))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_owned()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service url {0}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("unsupported url scheme {0}, expected http or https")]
    UnsupportedScheme(String),

    #[error("unknown service option {0:?}, expected name=LABEL")]
    UnknownOption(String),

    #[error("service label must not be empty")]
    EmptyLabel,

    #[error("could not set up http client: {0}")]
    Client(#[from] reqwest::Error),
}
