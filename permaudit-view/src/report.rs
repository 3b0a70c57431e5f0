// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presentation model shared by all renderers.
use permaudit_core::diff::{EntryDiff, ProjectDiff, ServiceDiff, SetDiff};
use permaudit_core::{Change, DiffMode, Warning, WorldDiff, WorldPermissions};
use serde::Serialize;

pub const PERMISSIONS_TITLE: &str = "Atlassian permissions";

pub const CHANGES_TITLE: &str = "Atlassian permission change report";

pub const NO_CHANGES: &str = "No changes";

pub const NO_DATA: &str = "No permissions collected";

/// A message shown on top of a report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub name: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    /// Whether the report shows the result of a comparison.
    pub compared: bool,
    pub notices: Vec<Notice>,
    /// Shown instead of the tree when there are no services.
    pub empty_message: String,
    pub services: Vec<ServiceNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceNode {
    pub name: String,
    pub change: Change,
    pub projects: Vec<ProjectNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectNode {
    pub key: String,
    pub change: Change,
    pub permissions: Vec<PermissionNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionNode {
    pub name: String,
    pub change: Change,
    pub users: Vec<PrincipalNode>,
    pub groups: Vec<PrincipalNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PrincipalNode {
    pub name: String,
    pub change: Change,
}

impl Report {
    /// Report of the current permissions, without any changes.
    pub fn permissions(permissions: &WorldPermissions) -> Self {
        let mut report = Self::tree(&WorldDiff::between(permissions, permissions));
        report.title = PERMISSIONS_TITLE.into();
        report.empty_message = NO_DATA.into();
        report
    }

    /// Report of a comparison. In [`DiffMode::ChangedOnly`] mode only changed subtrees are kept.
    pub fn changes(diff: &WorldDiff, mode: DiffMode) -> Self {
        let pruned;
        let diff = match mode {
            DiffMode::All => diff,
            DiffMode::ChangedOnly => {
                pruned = diff.clone().pruned(mode);
                &pruned
            }
        };

        let mut report = Self::tree(diff);
        let (title, empty_message) = match mode {
            DiffMode::All => (PERMISSIONS_TITLE, NO_DATA),
            DiffMode::ChangedOnly => (CHANGES_TITLE, NO_CHANGES),
        };
        report.title = title.into();
        report.compared = true;
        report.empty_message = empty_message.into();
        report.notices = diff
            .notices()
            .iter()
            .map(|notice| Notice {
                name: notice.name().into(),
                text: notice.text(),
            })
            .collect();
        report
    }

    /// Adds refresh warnings as notices.
    pub fn with_warnings<'a>(mut self, warnings: impl IntoIterator<Item = &'a Warning>) -> Self {
        self.notices
            .extend(warnings.into_iter().map(|warning| Notice {
                name: "warning".into(),
                text: warning.to_string(),
            }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn tree(diff: &WorldDiff) -> Self {
        let services = diff
            .services()
            .iter()
            .map(|(name, service)| service_node(name, service))
            .collect();

        Self {
            title: String::new(),
            compared: false,
            notices: Vec::new(),
            empty_message: String::new(),
            services,
        }
    }
}

fn service_node(name: &str, diff: &ServiceDiff) -> ServiceNode {
    ServiceNode {
        name: name.to_owned(),
        change: diff.change(),
        projects: diff
            .projects()
            .iter()
            .map(|(key, project)| project_node(key, project))
            .collect(),
    }
}

fn project_node(key: &str, diff: &ProjectDiff) -> ProjectNode {
    ProjectNode {
        key: key.to_owned(),
        change: diff.change(),
        permissions: diff.entries().values().map(permission_node).collect(),
    }
}

fn permission_node(entry: &EntryDiff) -> PermissionNode {
    PermissionNode {
        name: entry.name.clone(),
        change: entry.change,
        users: principals(&entry.users),
        groups: principals(&entry.groups),
    }
}

fn principals(set: &SetDiff) -> Vec<PrincipalNode> {
    set.iter()
        .map(|(name, change)| PrincipalNode {
            name: name.to_owned(),
            change,
        })
        .collect()
}
