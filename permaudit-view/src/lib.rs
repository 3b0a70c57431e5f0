// SPDX-License-Identifier: MIT OR Apache-2.0

//! Renderers for collected permissions and their changes.
//!
//! A [`Report`] is built either from the canonical permission tree of a world or from a
//! [`WorldDiff`](permaudit_core::WorldDiff) and can then be rendered as an indented text tree or
//! as an HTML page. CSV export works on flattened rows directly.
//!
//! ```
//! use permaudit_core::{PermissionSet, WorldPermissions};
//! use permaudit_view::{Report, text};
//!
//! let mut set = PermissionSet::new();
//! set.add_permission("Developer", ["alice"], None::<&str>);
//! let mut permissions = WorldPermissions::new();
//! permissions.entry("Jira".into()).or_default().insert("PROJ".into(), set);
//!
//! let output = text::render(&Report::permissions(&permissions));
//! assert_eq!(output, "Jira\n  PROJ\n    Developer: USERS(alice)\n");
//! ```
pub mod csv;
mod html;
mod report;
pub mod text;

pub use html::HtmlView;
pub use report::{
    CHANGES_TITLE, NO_CHANGES, NO_DATA, Notice, PERMISSIONS_TITLE, PermissionNode, PrincipalNode,
    ProjectNode, Report, ServiceNode,
};

/// Errors while rendering or writing a view.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("invalid template: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("failed rendering template: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("failed writing csv: {0}")]
    Csv(#[from] ::csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
