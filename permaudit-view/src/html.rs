// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTML rendering through a handlebars template.
use std::fs;
use std::path::Path;

use handlebars::Handlebars;

use crate::ViewError;
use crate::report::Report;

const TEMPLATE_NAME: &str = "report";

const DEFAULT_TEMPLATE: &str = include_str!("../templates/report.html.hbs");

/// Renders [`Report`]s as standalone HTML pages.
///
/// The template receives the serialized report. Every node carries a `change` field which is
/// one of `unchanged`, `added` or `removed`.
pub struct HtmlView {
    handlebars: Handlebars<'static>,
}

impl HtmlView {
    /// View using the bundled template.
    pub fn new() -> Result<Self, ViewError> {
        Self::with_template(DEFAULT_TEMPLATE)
    }

    /// View using a custom template source.
    pub fn with_template(source: &str) -> Result<Self, ViewError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_template_string(TEMPLATE_NAME, source)?;
        Ok(Self { handlebars })
    }

    pub fn render(&self, report: &Report) -> Result<String, ViewError> {
        Ok(self.handlebars.render(TEMPLATE_NAME, report)?)
    }

    /// Renders the report into a file, replacing its previous content.
    pub fn write(&self, report: &Report, path: impl AsRef<Path>) -> Result<(), ViewError> {
        let html = self.render(report)?;
        fs::write(path, html)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use permaudit_core::{DiffMode, PermissionSet, WorldDiff, WorldPermissions};

    use crate::report::Report;

    use super::HtmlView;

    fn tree(users: &[&str]) -> WorldPermissions {
        let mut set = PermissionSet::new();
        set.add_permission("Developer", users.iter().copied(), ["<devs>"]);
        let mut tree = WorldPermissions::new();
        tree.entry("Jira".into())
            .or_default()
            .insert("PROJ".into(), set);
        tree
    }

    #[test]
    fn permissions_page() {
        let html = HtmlView::new()
            .unwrap()
            .render(&Report::permissions(&tree(&["alice", "bob"])))
            .unwrap();

        assert!(html.contains("<title>Atlassian permissions</title>"));
        assert!(html.contains("<h2>Jira</h2>"));
        assert!(html.contains("<h3>PROJ</h3>"));
        assert!(html.contains("<td>alice, bob</td>"));
        assert!(html.contains("&lt;devs&gt;"));
        assert!(!html.contains("<ins>"));
    }

    #[test]
    fn changes_are_marked() {
        let diff = WorldDiff::between(&tree(&["alice"]), &tree(&["bob"]));
        let html = HtmlView::new()
            .unwrap()
            .render(&Report::changes(&diff, DiffMode::ChangedOnly))
            .unwrap();

        assert!(html.contains("Atlassian permission change report"));
        assert!(html.contains("<del>alice</del>, <ins>bob</ins>"));
    }

    #[test]
    fn notices_and_empty_message() {
        let diff = WorldDiff::unparsable(&WorldPermissions::new(), "truncated file");
        let html = HtmlView::new()
            .unwrap()
            .render(&Report::changes(&diff, DiffMode::ChangedOnly))
            .unwrap();

        assert!(html.contains("class=\"notice cmp_partially_unparsable\""));
        assert!(html.contains("truncated file"));
        assert!(html.contains("<p>No changes</p>"));
    }

    #[test]
    fn invalid_template() {
        assert!(HtmlView::with_template("{{#each services}}").is_err());
    }
}
