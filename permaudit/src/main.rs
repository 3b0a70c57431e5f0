// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collects user and group permissions from Confluence, Jira and Stash instances, renders them
//! and compares them with earlier runs.
mod app;
mod args;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use crate::args::Args;

pub fn setup_logging(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    setup_logging(args.loglevel);
    args.validate()?;

    let failures = app::run(&args).await?;
    if failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    error!("{} service(s) failed", failures.len());
    Ok(ExitCode::FAILURE)
}
