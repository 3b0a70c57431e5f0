// SPDX-License-Identifier: MIT OR Apache-2.0

use permaudit_core::test_utils::MockService;
use permaudit_core::{Change, Credentials, DiffMode, PrincipalKind, Snapshot, World};

fn world() -> World {
    World::builder()
        .adapter(
            "Wiki",
            Box::new(MockService::new("Confluence").grant_group("DEMO", "View", "public")),
        )
        .adapter(
            "Tracker",
            Box::new(
                MockService::new("Jira")
                    .accept("auditor", "secret")
                    .grant_user("PROJ", "Developer", "alice"),
            ),
        )
        .concurrency(2)
        .build()
        .unwrap()
}

#[tokio::test]
async fn collect_and_flatten() {
    let mut world = world();
    world
        .login(&Credentials::new("auditor", "secret"))
        .await
        .unwrap();
    world.refresh().await.unwrap();

    let permissions = world.permissions();
    let view = permissions["Wiki"]["DEMO"].get("View").unwrap();
    assert!(view.groups().contains("public"));
    let developer = permissions["Tracker"]["PROJ"].get("Developer").unwrap();
    assert!(developer.users().contains("alice"));

    let rows: Vec<_> = world.flat_permissions().map(|row| row.record()).collect();
    assert_eq!(
        rows,
        vec![
            ["Tracker", "PROJ", "Developer", "User", "alice"],
            ["Wiki", "DEMO", "View", "Group", "public"],
        ]
    );

    // Restarting the sequence yields the same rows.
    assert_eq!(world.flat_permissions().count(), rows.len());
    assert!(world.logout().await.is_empty());
}

#[tokio::test]
async fn snapshot_survives_logout() {
    let mut world = world();
    world
        .login(&Credentials::new("auditor", "secret"))
        .await
        .unwrap();
    world.refresh().await.unwrap();
    world.logout().await;

    let path = std::env::temp_dir().join(format!("permaudit-{}.cbor", std::process::id()));
    world.snapshot().save(&path).unwrap();
    let restored = World::from_snapshot(Snapshot::load(&path).unwrap());
    std::fs::remove_file(&path).unwrap();

    assert_eq!(restored.permissions(), world.permissions());
    assert!(restored.services().all(|service| service.is_detached()));
    assert!(!restored.diff(&world).has_changes());
}

#[tokio::test]
async fn compare_with_earlier_state() {
    let credentials = Credentials::new("auditor", "secret");

    let mut before = world();
    before.login(&credentials).await.unwrap();
    before.refresh().await.unwrap();
    let before = World::from_snapshot(before.snapshot());

    let mut after = World::builder()
        .adapter(
            "Wiki",
            Box::new(
                MockService::new("Confluence")
                    .grant_group("DEMO", "View", "public")
                    .grant_user("DEMO", "View", "bob"),
            ),
        )
        .adapter("Tracker", Box::new(MockService::new("Jira").project("PROJ")))
        .build()
        .unwrap();
    after.login(&credentials).await.unwrap();
    after.refresh().await.unwrap();

    let diff = before.diff(&after).pruned(DiffMode::ChangedOnly);
    assert!(diff.has_changes());

    let changes: Vec<_> = diff
        .flat_changes()
        .into_iter()
        .filter(|change| change.change.is_change())
        .map(|change| (change.change, change.row.kind, change.row.assignee))
        .collect();
    assert_eq!(
        changes,
        vec![
            (Change::Removed, PrincipalKind::User, "alice"),
            (Change::Added, PrincipalKind::User, "bob"),
        ]
    );
}
