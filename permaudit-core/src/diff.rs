// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structural comparison of two canonical permission trees.
//!
//! Both trees are walked in lockstep, keyed by service name, project key and permission name.
//! Matched permissions are compared by principal set membership only. Permissions present on
//! one side only are wholly added or removed, while a project or service present on one side
//! only is reported as a single added or removed subtree instead of a flood of leaf changes.
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::flatten::FlatPermission;
use crate::permission::{PermissionEntry, PermissionSet, PrincipalKind};
use crate::world::{ProjectPermissions, WorldPermissions};

/// How a node of the tree differs between the older and the newer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Unchanged,
    Added,
    Removed,
}

impl Change {
    pub fn as_str(&self) -> &'static str {
        match self {
            Change::Unchanged => "unchanged",
            Change::Added => "added",
            Change::Removed => "removed",
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Membership changes of one principal set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub unchanged: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl SetDiff {
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            unchanged: old.intersection(new).cloned().collect(),
            added: new.difference(old).cloned().collect(),
            removed: old.difference(new).cloned().collect(),
        }
    }

    fn uniform(set: &BTreeSet<String>, change: Change) -> Self {
        let mut diff = Self::default();
        match change {
            Change::Unchanged => diff.unchanged = set.clone(),
            Change::Added => diff.added = set.clone(),
            Change::Removed => diff.removed = set.clone(),
        }
        diff
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// All principals of both sides in alphabetical order, with their change.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Change)> + '_ {
        let mut all = BTreeMap::new();
        for (set, change) in [
            (&self.unchanged, Change::Unchanged),
            (&self.added, Change::Added),
            (&self.removed, Change::Removed),
        ] {
            all.extend(set.iter().map(|principal| (principal.as_str(), change)));
        }
        all.into_iter()
    }
}

/// Changes of a single permission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryDiff {
    pub name: String,
    /// `Added` or `Removed` if the permission only exists on one side.
    pub change: Change,
    pub groups: SetDiff,
    pub users: SetDiff,
}

impl EntryDiff {
    pub fn between(old: &PermissionEntry, new: &PermissionEntry) -> Self {
        Self {
            name: new.name().to_owned(),
            change: Change::Unchanged,
            groups: SetDiff::between(old.groups(), new.groups()),
            users: SetDiff::between(old.users(), new.users()),
        }
    }

    fn uniform(entry: &PermissionEntry, change: Change) -> Self {
        Self {
            name: entry.name().to_owned(),
            change,
            groups: SetDiff::uniform(entry.groups(), change),
            users: SetDiff::uniform(entry.users(), change),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.change.is_change() || self.groups.has_changes() || self.users.has_changes()
    }

    /// All principals with their change, groups before users.
    pub fn principals(&self) -> impl Iterator<Item = (PrincipalKind, &str, Change)> + '_ {
        let groups = self
            .groups
            .iter()
            .map(|(name, change)| (PrincipalKind::Group, name, change));
        let users = self
            .users
            .iter()
            .map(|(name, change)| (PrincipalKind::User, name, change));
        groups.chain(users)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectDiff {
    Added(PermissionSet),
    Removed(PermissionSet),
    Compared(BTreeMap<String, EntryDiff>),
}

impl ProjectDiff {
    fn between(old: &PermissionSet, new: &PermissionSet) -> Self {
        let entries = pairs(old.entries(), new.entries())
            .into_iter()
            .map(|(name, pair)| {
                let entry = match pair {
                    Pair::Both(old, new) => EntryDiff::between(old, new),
                    Pair::Old(old) => EntryDiff::uniform(old, Change::Removed),
                    Pair::New(new) => EntryDiff::uniform(new, Change::Added),
                };
                (name.to_owned(), entry)
            })
            .collect();
        ProjectDiff::Compared(entries)
    }

    pub fn change(&self) -> Change {
        match self {
            ProjectDiff::Added(_) => Change::Added,
            ProjectDiff::Removed(_) => Change::Removed,
            ProjectDiff::Compared(_) => Change::Unchanged,
        }
    }

    pub fn has_changes(&self) -> bool {
        match self {
            ProjectDiff::Added(_) | ProjectDiff::Removed(_) => true,
            ProjectDiff::Compared(entries) => entries.values().any(EntryDiff::has_changes),
        }
    }

    /// Per-permission view, whole subtrees are expanded into uniformly changed entries.
    pub fn entries(&self) -> Cow<'_, BTreeMap<String, EntryDiff>> {
        let uniform = |set: &PermissionSet, change: Change| -> BTreeMap<String, EntryDiff> {
            set.iter()
                .map(|entry| (entry.name().to_owned(), EntryDiff::uniform(entry, change)))
                .collect()
        };
        match self {
            ProjectDiff::Added(set) => Cow::Owned(uniform(set, Change::Added)),
            ProjectDiff::Removed(set) => Cow::Owned(uniform(set, Change::Removed)),
            ProjectDiff::Compared(entries) => Cow::Borrowed(entries),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceDiff {
    Added(ProjectPermissions),
    Removed(ProjectPermissions),
    Compared(BTreeMap<String, ProjectDiff>),
}

impl ServiceDiff {
    fn between(old: &ProjectPermissions, new: &ProjectPermissions) -> Self {
        let projects = pairs(old, new)
            .into_iter()
            .map(|(key, pair)| {
                let project = match pair {
                    Pair::Both(old, new) => ProjectDiff::between(old, new),
                    Pair::Old(old) => ProjectDiff::Removed(old.clone()),
                    Pair::New(new) => ProjectDiff::Added(new.clone()),
                };
                (key.to_owned(), project)
            })
            .collect();
        ServiceDiff::Compared(projects)
    }

    pub fn change(&self) -> Change {
        match self {
            ServiceDiff::Added(_) => Change::Added,
            ServiceDiff::Removed(_) => Change::Removed,
            ServiceDiff::Compared(_) => Change::Unchanged,
        }
    }

    pub fn has_changes(&self) -> bool {
        match self {
            ServiceDiff::Added(_) | ServiceDiff::Removed(_) => true,
            ServiceDiff::Compared(projects) => projects.values().any(ProjectDiff::has_changes),
        }
    }

    /// Per-project view, whole subtrees are expanded into uniformly changed projects.
    pub fn projects(&self) -> Cow<'_, BTreeMap<String, ProjectDiff>> {
        match self {
            ServiceDiff::Added(projects) => Cow::Owned(
                projects
                    .iter()
                    .map(|(key, set)| (key.clone(), ProjectDiff::Added(set.clone())))
                    .collect(),
            ),
            ServiceDiff::Removed(projects) => Cow::Owned(
                projects
                    .iter()
                    .map(|(key, set)| (key.clone(), ProjectDiff::Removed(set.clone())))
                    .collect(),
            ),
            ServiceDiff::Compared(projects) => Cow::Borrowed(projects),
        }
    }
}

/// Non-fatal condition attached to a diff and shown as a header notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffNotice {
    /// The older state could not be interpreted, nothing was compared.
    CompareUnparsable(String),
}

impl DiffNotice {
    /// Stable identifier of the notice.
    pub fn name(&self) -> &'static str {
        match self {
            DiffNotice::CompareUnparsable(_) => "cmp_partially_unparsable",
        }
    }

    pub fn text(&self) -> String {
        match self {
            DiffNotice::CompareUnparsable(reason) => format!(
                "Compare data (partially) unparsable: {reason}. Please ensure the old data was \
                 recorded using the same version of this software."
            ),
        }
    }
}

/// Which parts of a diff are kept for output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiffMode {
    /// Old and new state, changes marked inline.
    #[default]
    All,

    /// Subtrees without any change are dropped.
    ChangedOnly,
}

/// A single reported change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffEvent<'a> {
    Service {
        service: &'a str,
        change: Change,
    },
    Project {
        service: &'a str,
        project: &'a str,
        change: Change,
    },
    Principal {
        row: FlatPermission<'a>,
        change: Change,
    },
}

/// A flattened assignment together with its change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatChange<'a> {
    pub change: Change,
    pub row: FlatPermission<'a>,
}

/// Differences between an older and a newer canonical permission tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldDiff {
    services: BTreeMap<String, ServiceDiff>,
    notices: Vec<DiffNotice>,
}

impl WorldDiff {
    pub fn between(old: &WorldPermissions, new: &WorldPermissions) -> Self {
        let services = pairs(old, new)
            .into_iter()
            .map(|(name, pair)| {
                let service = match pair {
                    Pair::Both(old, new) => ServiceDiff::between(old, new),
                    Pair::Old(old) => ServiceDiff::Removed(old.clone()),
                    Pair::New(new) => ServiceDiff::Added(new.clone()),
                };
                (name.to_owned(), service)
            })
            .collect();

        Self {
            services,
            notices: Vec::new(),
        }
    }

    /// A diff of the current state against itself, used when the older state can not be
    /// interpreted. Carries a notice explaining why nothing changed.
    pub fn unparsable(current: &WorldPermissions, reason: impl Into<String>) -> Self {
        let mut diff = Self::between(current, current);
        diff.notices
            .push(DiffNotice::CompareUnparsable(reason.into()));
        diff
    }

    pub fn services(&self) -> &BTreeMap<String, ServiceDiff> {
        &self.services
    }

    pub fn notices(&self) -> &[DiffNotice] {
        &self.notices
    }

    pub fn has_changes(&self) -> bool {
        self.services.values().any(ServiceDiff::has_changes)
    }

    /// Drops all subtrees without changes when `mode` is [`DiffMode::ChangedOnly`].
    pub fn pruned(mut self, mode: DiffMode) -> Self {
        if mode == DiffMode::All {
            return self;
        }

        for service in self.services.values_mut() {
            if let ServiceDiff::Compared(projects) = service {
                for project in projects.values_mut() {
                    if let ProjectDiff::Compared(entries) = project {
                        entries.retain(|_, entry| entry.has_changes());
                    }
                }
                projects.retain(|_, project| project.has_changes());
            }
        }
        self.services.retain(|_, service| service.has_changes());
        self
    }

    /// All changes, whole services and projects count as one event each.
    pub fn events(&self) -> Vec<DiffEvent<'_>> {
        let mut events = Vec::new();
        for (service, diff) in &self.services {
            let projects = match diff {
                ServiceDiff::Added(_) | ServiceDiff::Removed(_) => {
                    events.push(DiffEvent::Service {
                        service,
                        change: diff.change(),
                    });
                    continue;
                }
                ServiceDiff::Compared(projects) => projects,
            };

            for (project, diff) in projects {
                let entries = match diff {
                    ProjectDiff::Added(_) | ProjectDiff::Removed(_) => {
                        events.push(DiffEvent::Project {
                            service,
                            project,
                            change: diff.change(),
                        });
                        continue;
                    }
                    ProjectDiff::Compared(entries) => entries,
                };

                for entry in entries.values() {
                    for (kind, assignee, change) in entry.principals() {
                        if !change.is_change() {
                            continue;
                        }
                        events.push(DiffEvent::Principal {
                            row: FlatPermission {
                                service,
                                project,
                                permission: &entry.name,
                                kind,
                                assignee,
                            },
                            change,
                        });
                    }
                }
            }
        }
        events
    }

    /// Every assignment of both sides in first normal form with its change, in the same order
    /// as flattened permissions.
    pub fn flat_changes(&self) -> Vec<FlatChange<'_>> {
        let mut rows = Vec::new();
        for (service, diff) in &self.services {
            match diff {
                ServiceDiff::Added(projects) | ServiceDiff::Removed(projects) => {
                    for (project, set) in projects {
                        push_uniform(&mut rows, service, project, set, diff.change());
                    }
                }
                ServiceDiff::Compared(projects) => {
                    for (project, diff) in projects {
                        match diff {
                            ProjectDiff::Added(set) | ProjectDiff::Removed(set) => {
                                push_uniform(&mut rows, service, project, set, diff.change());
                            }
                            ProjectDiff::Compared(entries) => {
                                for entry in entries.values() {
                                    rows.extend(entry.principals().map(
                                        |(kind, assignee, change)| FlatChange {
                                            change,
                                            row: FlatPermission {
                                                service,
                                                project,
                                                permission: &entry.name,
                                                kind,
                                                assignee,
                                            },
                                        },
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }
        rows
    }
}

fn push_uniform<'a>(
    rows: &mut Vec<FlatChange<'a>>,
    service: &'a str,
    project: &'a str,
    set: &'a PermissionSet,
    change: Change,
) {
    rows.extend(
        set.flatten()
            .map(|(permission, kind, assignee)| FlatChange {
                change,
                row: FlatPermission {
                    service,
                    project,
                    permission,
                    kind,
                    assignee,
                },
            }),
    );
}

enum Pair<'a, V> {
    Both(&'a V, &'a V),
    Old(&'a V),
    New(&'a V),
}

/// Walks two maps in lockstep over the union of their keys.
fn pairs<'a, V>(
    old: &'a BTreeMap<String, V>,
    new: &'a BTreeMap<String, V>,
) -> Vec<(&'a str, Pair<'a, V>)> {
    let keys: BTreeSet<&str> = old.keys().chain(new.keys()).map(String::as_str).collect();
    keys.into_iter()
        .filter_map(|key| {
            let pair = match (old.get(key), new.get(key)) {
                (Some(old), Some(new)) => Pair::Both(old, new),
                (Some(old), None) => Pair::Old(old),
                (None, Some(new)) => Pair::New(new),
                (None, None) => return None,
            };
            Some((key, pair))
        })
        .collect()
}
