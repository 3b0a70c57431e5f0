// SPDX-License-Identifier: MIT OR Apache-2.0

use permaudit_core::test_utils::MockService;
use permaudit_core::{Credentials, DiffMode, World};
use permaudit_view::{HtmlView, Report, csv, text};

async fn collected(users: &[&str]) -> World {
    let mut tracker = MockService::new("Jira").grant_group("PROJ", "Developer", "developers");
    for user in users {
        tracker = tracker.grant_user("PROJ", "Developer", user);
    }

    let mut world = World::builder()
        .adapter("Jira", Box::new(tracker))
        .build()
        .unwrap();
    world
        .login(&Credentials::new("auditor", "secret"))
        .await
        .unwrap();
    world.refresh().await.unwrap();
    world
}

#[tokio::test]
async fn render_collected_world() {
    let world = collected(&["alice"]).await;
    let report = Report::permissions(&world.permissions());

    assert_eq!(
        text::render(&report),
        "Jira\n  PROJ\n    Developer: USERS(alice), GROUPS(developers)\n"
    );

    let mut out = Vec::new();
    csv::write_permissions(&mut out, world.flat_permissions(), true).unwrap();
    let csv = String::from_utf8(out).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "\"Product\",\"Project\",\"Permission\",\"Type\",\"Assignee\"",
            "\"Jira\",\"PROJ\",\"Developer\",\"Group\",\"developers\"",
            "\"Jira\",\"PROJ\",\"Developer\",\"User\",\"alice\"",
        ]
    );

    let html = HtmlView::new().unwrap().render(&report).unwrap();
    assert!(html.contains("<td>developers</td>"));
}

#[tokio::test]
async fn render_changes_between_runs() {
    let before = collected(&["alice"]).await;
    let after = collected(&["alice", "bob"]).await;
    let diff = before.diff(&after);

    let report = Report::changes(&diff, DiffMode::ChangedOnly);
    assert_eq!(
        text::render(&report),
        concat!(
            "  Jira\n",
            "    PROJ\n",
            "      Developer: USERS(alice, +bob), GROUPS(developers)\n",
        )
    );

    let mut out = Vec::new();
    csv::write_changes(&mut out, &diff, DiffMode::ChangedOnly, false).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\"added\",\"Jira\",\"PROJ\",\"Developer\",\"User\",\"bob\"\n"
    );

    let unchanged = before.diff(&before);
    let report = Report::changes(&unchanged, DiffMode::ChangedOnly);
    assert_eq!(text::render(&report), "No changes\n");
}
