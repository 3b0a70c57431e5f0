// SPDX-License-Identifier: MIT OR Apache-2.0

//! One audit run: collect, compare, export, log out and save.
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use permaudit_connectors::{ClientConfig, ServiceConfig, connect};
use permaudit_core::{
    Credentials, DiffMode, ServiceAggregate, ServiceFailure, Snapshot, SnapshotError, World,
    WorldDiff, WorldError,
};
use permaudit_view::{HtmlView, Report, csv, text};
use tracing::{error, info, warn};

use crate::args::Args;

/// Where and how results are written.
#[derive(Clone, Debug, Default)]
pub struct Exports {
    pub print: bool,
    pub csv: Option<PathBuf>,
    pub csv_header: bool,
    pub html: Option<PathBuf>,
    pub mode: DiffMode,
}

impl From<&Args> for Exports {
    fn from(args: &Args) -> Self {
        Self {
            print: args.print,
            csv: args.csv.clone(),
            csv_header: args.csv_header,
            html: args.html.clone(),
            mode: args.diff_mode(),
        }
    }
}

/// Runs the audit described by the arguments and returns every service failure.
///
/// Exports are written even when some services failed, the returned failures decide about the
/// exit status.
pub async fn run(args: &Args) -> Result<Vec<ServiceFailure>> {
    let mut failures = Vec::new();
    let mut world = match &args.load {
        Some(path) => {
            info!(path = %path.display(), "loading saved permissions");
            World::from_snapshot(Snapshot::load(path)?)
        }
        None => {
            let credentials = args.credentials()?;
            let client = ClientConfig::default()
                .timeout(Duration::from_secs(args.timeout))
                .concurrency(args.concurrency);
            let mut world = build_world(&args.services(), &client)?;
            failures.extend(collect(&mut world, &credentials).await);
            world
        }
    };

    let result = compare(&world, args.compare.as_deref())
        .and_then(|diff| export(&world, diff.as_ref(), &Exports::from(args)));

    for failure in world.logout().await {
        warn!("{failure}");
    }
    result?;

    if let Some(path) = &args.save {
        if failures.is_empty() {
            world
                .snapshot()
                .save(path)
                .with_context(|| format!("could not save permissions to {}", path.display()))?;
            info!(path = %path.display(), "saved permissions");
        } else {
            error!(
                path = %path.display(),
                "not saving incomplete permissions, {} service(s) failed",
                failures.len()
            );
        }
    }

    Ok(failures)
}

pub fn build_world(services: &[ServiceConfig], client: &ClientConfig) -> Result<World> {
    let mut builder = World::builder().concurrency(client.concurrency);
    for service in services {
        let adapter = connect(service, client)
            .with_context(|| format!("could not set up {}", service.name()))?;
        let url = service.location.url().as_str();
        builder = builder.service(ServiceAggregate::new(service.name(), adapter).with_url(url));
    }
    Ok(builder.build()?)
}

/// Logs into every service and refreshes the ones which accepted the credentials.
///
/// Services failing to log in are removed from the world.
pub async fn collect(world: &mut World, credentials: &Credentials) -> Vec<ServiceFailure> {
    let mut failures = Vec::new();

    if let Err(err) = world.login(credentials).await {
        for failure in err.failures() {
            error!("login failed, skipping {}: {}", failure.service, failure.source);
            world.remove(&failure.service);
        }
        failures.extend(into_failures(err));
    }

    if let Err(err) = world.refresh().await {
        for failure in err.failures() {
            error!("{failure}");
        }
        failures.extend(into_failures(err));
    }

    failures
}

fn into_failures(err: WorldError) -> Vec<ServiceFailure> {
    match err {
        WorldError::Services(failures) => failures,
        WorldError::DuplicateService(_) => Vec::new(),
    }
}

/// Compares the world with a saved state.
///
/// A saved state which can not be interpreted yields an empty comparison carrying a notice. A
/// missing file is an error.
pub fn compare(world: &World, path: Option<&Path>) -> Result<Option<WorldDiff>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let current = world.permissions();
    let diff = match Snapshot::load(path) {
        Ok(snapshot) => WorldDiff::between(&snapshot.permissions(), &current),
        Err(SnapshotError::Io(err)) => {
            return Err(err)
                .with_context(|| format!("could not read compare file {}", path.display()));
        }
        Err(err) => {
            warn!(path = %path.display(), "comparison skipped: {err}");
            WorldDiff::unparsable(&current, err.to_string())
        }
    };
    Ok(Some(diff))
}

pub fn export(world: &World, diff: Option<&WorldDiff>, exports: &Exports) -> Result<()> {
    let report = match diff {
        Some(diff) => Report::changes(diff, exports.mode),
        None => Report::permissions(&world.permissions()),
    }
    .with_warnings(world.warnings());

    if exports.print {
        print!("{}", text::render(&report));
    }

    if let Some(path) = &exports.csv {
        let file = File::create(path)
            .with_context(|| format!("could not create csv file {}", path.display()))?;
        let out = BufWriter::new(file);
        match diff {
            Some(diff) => csv::write_changes(out, diff, exports.mode, exports.csv_header)?,
            None => csv::write_permissions(out, world.flat_permissions(), exports.csv_header)?,
        }
        info!(path = %path.display(), "wrote csv");
    }

    if let Some(path) = &exports.html {
        HtmlView::new()?.write(&report, path)?;
        info!(path = %path.display(), "wrote html report");
    }

    Ok(())
}
