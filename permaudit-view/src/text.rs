// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indented plain text rendering.
//!
//! ```text
//!   Jira
//!     PROJ
//!       Developer: USERS(alice, +bob), GROUPS(developers)
//! + Stash
//! ```
//!
//! Reports of a comparison get a leading marker column: added nodes are marked with `+`,
//! removed ones with `-`. Changed principals carry the same markers in front of their names.
use std::fmt::Write;

use permaudit_core::Change;

use crate::report::{PermissionNode, PrincipalNode, Report};

const INDENT: &str = "  ";

pub fn render(report: &Report) -> String {
    let mut out = String::new();
    for notice in &report.notices {
        let _ = writeln!(out, "! {}", notice.text);
    }

    if report.is_empty() {
        out.push_str(&report.empty_message);
        out.push('\n');
        return out;
    }

    let mut line = |depth: usize, change: Change, text: &str| {
        let column = match (report.compared, change) {
            (false, _) => "",
            (true, Change::Unchanged) => "  ",
            (true, Change::Added) => "+ ",
            (true, Change::Removed) => "- ",
        };
        let _ = writeln!(out, "{column}{}{text}", INDENT.repeat(depth));
    };

    for service in &report.services {
        line(0, service.change, &service.name);
        for project in &service.projects {
            line(1, project.change, &project.key);
            for permission in &project.permissions {
                line(2, permission.change, &permission_text(permission));
            }
        }
    }
    out
}

fn marker(change: Change) -> &'static str {
    match change {
        Change::Unchanged => "",
        Change::Added => "+",
        Change::Removed => "-",
    }
}

fn permission_text(permission: &PermissionNode) -> String {
    let join = |principals: &[PrincipalNode]| {
        principals
            .iter()
            .map(|principal| format!("{}{}", marker(principal.change), principal.name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let principals = match (permission.users.is_empty(), permission.groups.is_empty()) {
        (true, true) => "None".to_owned(),
        (false, true) => format!("USERS({})", join(&permission.users)),
        (true, false) => format!("GROUPS({})", join(&permission.groups)),
        (false, false) => format!(
            "USERS({}), GROUPS({})",
            join(&permission.users),
            join(&permission.groups)
        ),
    };
    format!("{}: {principals}", permission.name)
}
