// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permission entries and the per-project sets they are collected in.
//!
//! Upstream services only ever report who _currently_ holds a permission, and often spread that
//! report over several partial listings (one per role actor, one per principal kind, etc.). The
//! types in this module therefore only ever grow: every report is merged into what is already
//! known and applying the same report twice leaves the state unchanged.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::service::ServiceError;

/// Kind of principal a permission can be granted to.
///
/// Groups order before users, flattened output lists group assignments first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    Group,
    User,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Group => "Group",
            PrincipalKind::User => "User",
        }
    }
}

impl Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single named permission and all users and groups known to hold it.
///
/// For issue trackers the "permission" is a project role, for wikis a space permission and for
/// repository managers a project or repository permission level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    name: String,
    users: BTreeSet<String>,
    groups: BTreeSet<String>,
}

impl PermissionEntry {
    /// Creates an entry nobody holds yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Creates an entry held by the given principals.
    pub fn with_principals<U, G>(name: impl Into<String>, users: U, groups: G) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        let mut entry = Self::new(name);
        entry.additional(users, groups);
        entry
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn users(&self) -> &BTreeSet<String> {
        &self.users
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Returns `true` if neither a user nor a group holds this permission.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }

    /// Extends this permission to the given users and groups.
    ///
    /// Accepts anything iterable over principal identifiers, so a single `Option<&str>` works
    /// as well as a whole set. Empty identifiers are ignored. Principals are never removed.
    pub fn additional<U, G>(&mut self, users: U, groups: G)
    where
        U: IntoIterator,
        U::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        extend_principals(&mut self.users, users);
        extend_principals(&mut self.groups, groups);
    }

    /// Merges the principals of another entry with the same name into this one.
    pub fn merge(&mut self, other: &PermissionEntry) -> Result<(), PermissionError> {
        if other.name != self.name {
            return Err(PermissionError::NameMismatch(
                self.name.clone(),
                other.name.clone(),
            ));
        }

        self.additional(other.users.iter().cloned(), other.groups.iter().cloned());
        Ok(())
    }

    /// Flat representation of this entry in first normal form.
    ///
    /// Yields one `(permission, kind, assignee)` tuple per assignment: all groups in
    /// alphabetical order, followed by all users in alphabetical order.
    pub fn flatten(&self) -> impl Iterator<Item = (&str, PrincipalKind, &str)> + '_ {
        let groups = self
            .groups
            .iter()
            .map(|group| (self.name.as_str(), PrincipalKind::Group, group.as_str()));
        let users = self
            .users
            .iter()
            .map(|user| (self.name.as_str(), PrincipalKind::User, user.as_str()));
        groups.chain(users)
    }
}

impl Display for PermissionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;

        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        match (self.users.is_empty(), self.groups.is_empty()) {
            (true, true) => write!(f, "None"),
            (false, true) => write!(f, "USERS({})", join(&self.users)),
            (true, false) => write!(f, "GROUPS({})", join(&self.groups)),
            (false, false) => write!(
                f,
                "USERS({}), GROUPS({})",
                join(&self.users),
                join(&self.groups)
            ),
        }
    }
}

fn extend_principals<I>(set: &mut BTreeSet<String>, principals: I)
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    set.extend(
        principals
            .into_iter()
            .map(Into::into)
            .filter(|principal: &String| !principal.is_empty()),
    );
}

/// All permissions of one project, keyed and ordered by permission name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, PermissionEntry>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a permission or amends an existing one with the given principals.
    ///
    /// This is the only way to mutate a set; applying the same report again is a no-op.
    pub fn add_permission<U, G>(&mut self, name: impl Into<String>, users: U, groups: G)
    where
        U: IntoIterator,
        U::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        let name = name.into();
        self.0
            .entry(name.clone())
            .or_insert_with(|| PermissionEntry::new(name))
            .additional(users, groups);
    }

    /// Adds a raw permission tuple as reported by a service adapter.
    pub fn add_raw(&mut self, raw: RawPermission) {
        self.add_permission(raw.permission, raw.user, raw.group);
    }

    pub fn get(&self, name: &str) -> Option<&PermissionEntry> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over all entries in alphabetical order of their names.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.0.values()
    }

    pub fn entries(&self) -> &BTreeMap<String, PermissionEntry> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flat `(permission, kind, assignee)` tuples of all entries, ordered by permission name.
    pub fn flatten(&self) -> impl Iterator<Item = (&str, PrincipalKind, &str)> + '_ {
        self.0.values().flat_map(PermissionEntry::flatten)
    }
}

impl Extend<RawPermission> for PermissionSet {
    fn extend<T: IntoIterator<Item = RawPermission>>(&mut self, iter: T) {
        for raw in iter {
            self.add_raw(raw);
        }
    }
}

impl FromIterator<RawPermission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = RawPermission>>(iter: T) -> Self {
        let mut set = PermissionSet::new();
        set.extend(iter);
        set
    }
}

impl Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.0.values().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// A single raw permission assignment as yielded by a service adapter.
///
/// Adapters may report the same permission many times, each time with a part of its
/// principals. Usually exactly one of `user` and `group` is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPermission {
    pub permission: String,
    pub user: Option<String>,
    pub group: Option<String>,
}

impl RawPermission {
    pub fn user(permission: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            user: Some(user.into()),
            group: None,
        }
    }

    pub fn group(permission: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            user: None,
            group: Some(group.into()),
        }
    }

    /// Classifies a principal by its upstream kind name (`user` or `group`, case-insensitive).
    pub fn classify(
        permission: impl Into<String>,
        kind: &str,
        name: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let permission = permission.into();
        let name = name.into();
        if kind.eq_ignore_ascii_case("user") {
            Ok(Self::user(permission, name))
        } else if kind.eq_ignore_ascii_case("group") {
            Ok(Self::group(permission, name))
        } else {
            Err(ServiceError::UnparsablePrincipal {
                permission,
                principal: format!("{kind}:{name}"),
            })
        }
    }

    /// Returns `true` if this tuple names at least one non-empty principal.
    pub fn has_principal(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.user) || present(&self.group)
    }
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("can not merge permission {1} into {0}, names differ")]
    NameMismatch(String, String),
}
