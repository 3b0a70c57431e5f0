// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command line arguments.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::builder::RangedU64ValueParser;
use clap::{ArgGroup, Parser};
use permaudit_connectors::{DEFAULT_TIMEOUT, ServiceConfig, ServiceKind, ServiceLocation};
use permaudit_core::{Credentials, DEFAULT_CONCURRENCY, DiffMode};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "permaudit", version, about)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["print", "csv", "html", "save"])
))]
pub struct Args {
    /// User name used to log into every service.
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Password used to log into every service.
    #[arg(short = 'p', long, env = "PERMAUDIT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Read the password from the first line of a file, takes precedence over `--password`.
    #[arg(short = 'P', long, value_name = "FILE")]
    pub passfile: Option<PathBuf>,

    /// Confluence instance to audit.
    #[arg(short = 'c', long, value_name = "URL[,name=LABEL]")]
    pub confluence: Vec<ServiceLocation>,

    /// Jira instance to audit.
    #[arg(short = 'j', long, value_name = "URL[,name=LABEL]")]
    pub jira: Vec<ServiceLocation>,

    /// Stash / Bitbucket Server instance to audit.
    #[arg(short = 's', long, value_name = "URL[,name=LABEL]")]
    pub stash: Vec<ServiceLocation>,

    /// Print the permissions as an indented tree.
    #[arg(long)]
    pub print: bool,

    /// Write all permission assignments to a CSV file.
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Start the CSV file with a header row.
    #[arg(long, requires = "csv")]
    pub csv_header: bool,

    /// Write an HTML report.
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// Save the collected permissions for later comparisons.
    #[arg(short = 'S', long, value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// Use previously saved permissions instead of querying services.
    #[arg(
        short = 'L',
        long,
        value_name = "FILE",
        conflicts_with_all = ["confluence", "jira", "stash"]
    )]
    pub load: Option<PathBuf>,

    /// Compare with previously saved permissions.
    #[arg(long, value_name = "FILE")]
    pub compare: Option<PathBuf>,

    /// Only show what changed since the compared state.
    #[arg(long, requires = "compare")]
    pub changes_only: bool,

    /// Number of projects loaded at the same time within one service.
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub concurrency: usize,

    /// Timeout of a single request in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Log level, `RUST_LOG` takes precedence when set.
    #[arg(long, value_name = "LEVEL", default_value_t = LevelFilter::WARN)]
    pub loglevel: LevelFilter,
}

impl Args {
    /// Checks combinations clap can not express.
    pub fn validate(&self) -> Result<()> {
        if self.load.is_some() {
            return Ok(());
        }
        if self.services().is_empty() {
            bail!("no service given, use --confluence, --jira, --stash or --load");
        }
        if self.user.is_none() {
            bail!("--user is required when querying services");
        }
        if self.password.is_none() && self.passfile.is_none() {
            bail!("no password given, use --password, --passfile or PERMAUDIT_PASSWORD");
        }
        Ok(())
    }

    /// All configured services, Confluence first, then Jira, then Stash.
    pub fn services(&self) -> Vec<ServiceConfig> {
        [
            (ServiceKind::Confluence, &self.confluence),
            (ServiceKind::Jira, &self.jira),
            (ServiceKind::Stash, &self.stash),
        ]
        .into_iter()
        .flat_map(|(kind, locations)| {
            locations
                .iter()
                .map(move |location| ServiceConfig::new(kind, location.clone()))
        })
        .collect()
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let Some(user) = &self.user else {
            bail!("--user is required when querying services");
        };

        let password = match (&self.passfile, &self.password) {
            (Some(path), _) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("could not read password file {}", path.display()))?;
                content.lines().next().unwrap_or_default().to_owned()
            }
            (None, Some(password)) => password.clone(),
            (None, None) => bail!("no password given"),
        };
        if password.is_empty() {
            bail!("the password must not be empty");
        }

        Ok(Credentials::new(user.as_str(), password))
    }

    pub fn diff_mode(&self) -> DiffMode {
        if self.changes_only {
            DiffMode::ChangedOnly
        } else {
            DiffMode::All
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use permaudit_connectors::ServiceKind;

    use super::Args;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("permaudit").chain(args.iter().copied()))
    }

    #[test]
    fn services_in_kind_order() {
        let args = parse(&[
            "-u",
            "auditor",
            "-p",
            "secret",
            "-s",
            "https://git.example.org",
            "-j",
            "https://jira.example.org,name=internal",
            "-c",
            "https://wiki.example.org",
            "--print",
        ])
        .unwrap();
        args.validate().unwrap();

        let services = args.services();
        let kinds: Vec<_> = services.iter().map(|service| service.kind).collect();
        assert_eq!(
            kinds,
            vec![ServiceKind::Confluence, ServiceKind::Jira, ServiceKind::Stash]
        );
        assert_eq!(services[1].name(), "Jira (internal)");
        assert_eq!(args.credentials().unwrap().user(), "auditor");
    }

    #[test]
    fn an_action_is_required() {
        let args = parse(&["-u", "auditor", "-p", "secret", "-j", "https://jira.example.org"]);
        assert!(args.is_err());
    }

    #[test]
    fn load_excludes_services() {
        assert!(parse(&["-L", "old.cbor", "-j", "https://jira.example.org", "--print"]).is_err());

        let args = parse(&["-L", "old.cbor", "--print"]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn services_need_user_and_password() {
        let args = parse(&["-j", "https://jira.example.org", "--print"]).unwrap();
        assert!(args.validate().is_err());

        let args = parse(&["--print"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn empty_password_is_rejected() {
        let args = parse(&[
            "-u",
            "auditor",
            "-p",
            "",
            "-j",
            "https://jira.example.org",
            "--print",
        ])
        .unwrap();
        assert!(args.credentials().is_err());
    }

    #[test]
    fn password_from_file() {
        let path = std::env::temp_dir().join(format!("permaudit-pass-{}", std::process::id()));
        std::fs::write(&path, "from-file\nignored\n").unwrap();

        let passfile = path.to_string_lossy().into_owned();
        let args = parse(&[
            "-u",
            "auditor",
            "-P",
            &passfile,
            "-j",
            "https://jira.example.org",
            "--save",
            "out.cbor",
        ])
        .unwrap();
        let credentials = args.credentials();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(credentials.unwrap().password(), "from-file");
    }

    #[test]
    fn invalid_service_url() {
        assert!(parse(&["-j", "ftp://jira.example.org", "--print"]).is_err());
    }

    #[test]
    fn concurrency_must_be_positive() {
        assert!(parse(&["-L", "old.cbor", "--print", "--concurrency", "0"]).is_err());

        let args = parse(&["-L", "old.cbor", "--print", "--concurrency", "8"]).unwrap();
        assert_eq!(args.concurrency, 8);
        assert_eq!(parse(&["-L", "old.cbor", "--print"]).unwrap().concurrency, 4);
    }

    #[test]
    fn changes_only_requires_compare() {
        assert!(parse(&["-L", "old.cbor", "--print", "--changes-only"]).is_err());
    }
}
