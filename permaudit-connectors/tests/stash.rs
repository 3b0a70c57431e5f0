// SPDX-License-Identifier: MIT OR Apache-2.0

use futures_util::{StreamExt, TryStreamExt};
use permaudit_connectors::{
    ClientConfig, GLOBAL_KEY, ServiceConfig, ServiceKind, ServiceLocation, connect,
};
use permaudit_core::{Credentials, RawPermission, Service, ServiceError};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stash(server: &MockServer) -> Box<dyn Service> {
    let location = ServiceLocation::new(&server.uri()).unwrap();
    let config = ServiceConfig::new(ServiceKind::Stash, location);
    connect(&config, &ClientConfig::default()).unwrap()
}

fn page(values: Value, next_page_start: Option<u64>) -> Value {
    let size = values.as_array().map(Vec::len).unwrap_or_default();
    json!({
        "values": values,
        "size": size,
        "isLastPage": next_page_start.is_none(),
        "nextPageStart": next_page_start,
    })
}

async fn mount_page(server: &MockServer, route: &str, start: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("start", start.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn logged_in(server: &MockServer) -> Box<dyn Service> {
    Mock::given(method("GET"))
        .and(path("/rest/api/1.0/projects"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([]), None)))
        .with_priority(1)
        .mount(server)
        .await;

    let mut adapter = stash(server);
    adapter
        .login(&Credentials::new("auditor", "secret"))
        .await
        .unwrap();
    adapter
}

#[tokio::test]
async fn scopes_across_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/rest/api/1.0/projects",
        0,
        page(json!([{ "key": "ALPHA", "name": "Alpha" }]), Some(1)),
    )
    .await;
    mount_page(
        &server,
        "/rest/api/1.0/projects",
        1,
        page(json!([{ "key": "BETA", "name": "Beta" }]), None),
    )
    .await;
    mount_page(
        &server,
        "/rest/api/1.0/projects/ALPHA/repos",
        0,
        page(json!([{ "slug": "website", "name": "Website" }]), None),
    )
    .await;
    mount_page(
        &server,
        "/rest/api/1.0/projects/BETA/repos",
        0,
        page(json!([]), None),
    )
    .await;

    let adapter = logged_in(&server).await;
    let keys: Vec<String> = adapter
        .load_projects()
        .map_ok(|project| project.key)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(keys, vec![GLOBAL_KEY, "ALPHA", "ALPHA/website", "BETA"]);
}

#[tokio::test]
async fn page_without_continuation_is_invalid() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/rest/api/1.0/projects",
        0,
        json!({
            "values": [{ "key": "ALPHA", "name": "Alpha" }],
            "size": 1,
            "isLastPage": false,
        }),
    )
    .await;
    mount_page(
        &server,
        "/rest/api/1.0/projects/ALPHA/repos",
        0,
        page(json!([]), None),
    )
    .await;

    let adapter = logged_in(&server).await;
    let result: Result<Vec<String>, _> = adapter
        .load_projects()
        .map_ok(|project| project.key)
        .try_collect()
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidResponse(_))));
}

#[tokio::test]
async fn permissions_of_repository() {
    let server = MockServer::start().await;
    let base = "/rest/api/1.0/projects/ALPHA/repos/website/permissions";
    mount_page(
        &server,
        &format!("{base}/groups"),
        0,
        page(
            json!([{ "group": { "name": "developers" }, "permission": "REPO_WRITE" }]),
            None,
        ),
    )
    .await;
    mount_page(
        &server,
        &format!("{base}/users"),
        0,
        page(
            json!([{ "user": { "name": "alice", "id": 1 }, "permission": "REPO_ADMIN" }]),
            None,
        ),
    )
    .await;

    let adapter = logged_in(&server).await;
    let reports: Vec<RawPermission> = adapter
        .load_permissions_for_project("ALPHA/website")
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        reports,
        vec![
            RawPermission::group("REPO_WRITE", "developers"),
            RawPermission::user("REPO_ADMIN", "alice"),
        ]
    );
}

#[tokio::test]
async fn global_permissions() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/rest/api/1.0/admin/permissions/groups",
        0,
        page(
            json!([{ "group": { "name": "stash-users" }, "permission": "LICENSED_USER" }]),
            None,
        ),
    )
    .await;
    mount_page(
        &server,
        "/rest/api/1.0/admin/permissions/users",
        0,
        page(json!([]), None),
    )
    .await;

    let adapter = logged_in(&server).await;
    let reports: Vec<_> = adapter.load_permissions_for_project(GLOBAL_KEY).collect().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].as_ref().unwrap(),
        &RawPermission::group("LICENSED_USER", "stash-users")
    );
}
