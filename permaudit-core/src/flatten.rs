// SPDX-License-Identifier: MIT OR Apache-2.0

//! First normal form projection of the canonical model.
use std::fmt;

use crate::permission::PrincipalKind;
use crate::world::WorldPermissions;

/// One principal-permission assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlatPermission<'a> {
    pub service: &'a str,
    pub project: &'a str,
    pub permission: &'a str,
    pub kind: PrincipalKind,
    pub assignee: &'a str,
}

impl<'a> FlatPermission<'a> {
    /// The row as `[service, project, permission, kind, assignee]`.
    pub fn record(&self) -> [&'a str; 5] {
        [
            self.service,
            self.project,
            self.permission,
            self.kind.as_str(),
            self.assignee,
        ]
    }
}

impl fmt::Display for FlatPermission<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}: {} {}",
            self.service, self.project, self.permission, self.kind, self.assignee
        )
    }
}

/// Flattens a canonical permission tree into rows.
///
/// Rows are ordered by service name, project key, permission name, then groups before users,
/// each alphabetically. The sequence is finite and can be restarted by calling this again.
pub fn flatten(permissions: &WorldPermissions) -> impl Iterator<Item = FlatPermission<'_>> {
    permissions.iter().flat_map(|(service, projects)| {
        projects.iter().flat_map(move |(project, set)| {
            set.flatten()
                .map(move |(permission, kind, assignee)| FlatPermission {
                    service: service.as_str(),
                    project: project.as_str(),
                    permission,
                    kind,
                    assignee,
                })
        })
    })
}

#[cfg(test)]
mod tests {
    use crate::permission::PermissionSet;
    use crate::world::WorldPermissions;

    use super::flatten;

    #[test]
    fn rows_follow_tree_order() {
        let mut wiki = PermissionSet::new();
        wiki.add_permission("View", ["bob"], ["public"]);
        let mut tracker = PermissionSet::new();
        tracker.add_permission("Developer", ["alice"], None::<&str>);

        let mut permissions = WorldPermissions::new();
        permissions
            .entry("Wiki".into())
            .or_default()
            .insert("DEMO".into(), wiki);
        permissions
            .entry("Tracker".into())
            .or_default()
            .insert("PROJ".into(), tracker);

        let rows: Vec<_> = flatten(&permissions).map(|row| row.record()).collect();
        assert_eq!(
            rows,
            vec![
                ["Tracker", "PROJ", "Developer", "User", "alice"],
                ["Wiki", "DEMO", "View", "Group", "public"],
                ["Wiki", "DEMO", "View", "User", "bob"],
            ]
        );
    }
}
