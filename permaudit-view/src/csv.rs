// SPDX-License-Identifier: MIT OR Apache-2.0

//! CSV export of flattened permissions.
//!
//! Every field is quoted and records end in `\n`. A diff export carries an additional leading
//! `Change` column.
use std::io;

use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use permaudit_core::{DiffMode, FlatPermission, WorldDiff};
use tracing::debug;

use crate::ViewError;

pub const HEADER: [&str; 5] = ["Product", "Project", "Permission", "Type", "Assignee"];

pub const CHANGE_COLUMN: &str = "Change";

fn writer<W: io::Write>(out: W) -> Writer<W> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out)
}

/// Writes one record per flattened assignment, optionally preceded by [`HEADER`].
pub fn write_permissions<'a, W, I>(out: W, rows: I, header: bool) -> Result<(), ViewError>
where
    W: io::Write,
    I: IntoIterator<Item = FlatPermission<'a>>,
{
    let mut csv = writer(out);
    if header {
        csv.write_record(HEADER)?;
    }

    let mut count = 0usize;
    for row in rows {
        csv.write_record(row.record())?;
        count += 1;
    }
    csv.flush()?;

    debug!(rows = count, "wrote permissions csv");
    Ok(())
}

/// Writes the assignments of both sides of a diff with their change.
///
/// In [`DiffMode::ChangedOnly`] mode unchanged assignments are left out.
pub fn write_changes<W: io::Write>(
    out: W,
    diff: &WorldDiff,
    mode: DiffMode,
    header: bool,
) -> Result<(), ViewError> {
    let mut csv = writer(out);
    if header {
        csv.write_record(std::iter::once(CHANGE_COLUMN).chain(HEADER))?;
    }

    let mut count = 0usize;
    for change in diff.flat_changes() {
        if mode == DiffMode::ChangedOnly && !change.change.is_change() {
            continue;
        }
        csv.write_record(std::iter::once(change.change.as_str()).chain(change.row.record()))?;
        count += 1;
    }
    csv.flush()?;

    debug!(rows = count, "wrote changes csv");
    Ok(())
}

#[cfg(test)]
mod tests {
    use permaudit_core::{DiffMode, PermissionSet, WorldDiff, WorldPermissions, flatten};

    use super::{write_changes, write_permissions};

    fn tree(users: &[&str], groups: &[&str]) -> WorldPermissions {
        let mut set = PermissionSet::new();
        set.add_permission("Developer", users.iter().copied(), groups.iter().copied());
        let mut tree = WorldPermissions::new();
        tree.entry("Jira".into())
            .or_default()
            .insert("PROJ".into(), set);
        tree
    }

    #[test]
    fn quoted_rows_with_header() {
        let tree = tree(&["alice"], &["dev \"core\""]);
        let mut out = Vec::new();
        write_permissions(&mut out, flatten(&tree), true).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            concat!(
                "\"Product\",\"Project\",\"Permission\",\"Type\",\"Assignee\"\n",
                "\"Jira\",\"PROJ\",\"Developer\",\"Group\",\"dev \"\"core\"\"\"\n",
                "\"Jira\",\"PROJ\",\"Developer\",\"User\",\"alice\"\n",
            )
        );
    }

    #[test]
    fn no_header() {
        let tree = tree(&["alice"], &[]);
        let mut out = Vec::new();
        write_permissions(&mut out, flatten(&tree), false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\"Jira\",\"PROJ\",\"Developer\",\"User\",\"alice\"\n"
        );
    }

    #[test]
    fn change_column() {
        let old = tree(&["alice", "carol"], &[]);
        let new = tree(&["bob", "carol"], &[]);
        let diff = WorldDiff::between(&old, &new);

        let mut all = Vec::new();
        write_changes(&mut all, &diff, DiffMode::All, true).unwrap();
        assert_eq!(
            String::from_utf8(all).unwrap(),
            concat!(
                "\"Change\",\"Product\",\"Project\",\"Permission\",\"Type\",\"Assignee\"\n",
                "\"removed\",\"Jira\",\"PROJ\",\"Developer\",\"User\",\"alice\"\n",
                "\"added\",\"Jira\",\"PROJ\",\"Developer\",\"User\",\"bob\"\n",
                "\"unchanged\",\"Jira\",\"PROJ\",\"Developer\",\"User\",\"carol\"\n",
            )
        );

        let mut changed = Vec::new();
        write_changes(&mut changed, &diff, DiffMode::ChangedOnly, false).unwrap();
        assert_eq!(String::from_utf8(changed).unwrap().lines().count(), 2);
    }
}
