// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service adapters for Jira, Stash (Bitbucket Server) and Confluence.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use permaudit_connectors::{ClientConfig, ServiceConfig, ServiceKind, connect};
//! use permaudit_core::{Credentials, World};
//!
//! let config = ServiceConfig::new(ServiceKind::Jira, "https://jira.example.org".parse()?);
//! let client = ClientConfig::default();
//!
//! let mut world = World::builder()
//!     .adapter(config.name(), connect(&config, &client)?)
//!     .concurrency(client.concurrency)
//!     .build()?;
//! world.login(&Credentials::new("auditor", "secret")).await?;
//! world.refresh().await?;
//! # Ok(())
//! # }
//! ```
mod config;
mod confluence;
mod http;
mod jira;
mod stash;
mod xmlrpc;

use permaudit_core::Service;

pub use config::{
    ClientConfig, ConfigError, DEFAULT_TIMEOUT, ServiceConfig, ServiceKind, ServiceLocation,
};
pub use confluence::Confluence;
pub use jira::Jira;
pub use stash::{GLOBAL_KEY, Stash};

/// Creates the adapter for a configured service. No connection is made before login.
pub fn connect(
    config: &ServiceConfig,
    client: &ClientConfig,
) -> Result<Box<dyn Service>, ConfigError> {
    let url = config.location.url();
    let adapter: Box<dyn Service> = match config.kind {
        ServiceKind::Confluence => Box::new(Confluence::new(url, client)?),
        ServiceKind::Jira => Box::new(Jira::new(url, client)?),
        ServiceKind::Stash => Box::new(Stash::new(url, client)?),
    };
    Ok(adapter)
}
