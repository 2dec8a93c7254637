//! Shared test helpers for remote source integration tests
//!
//! Provides wiremock-based mock servers for the object-tree and listing
//! APIs. Each helper mounts the endpoints a scenario needs and returns a
//! source pointing at the mock server.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use treemirror_core::retry::RetryPolicy;
use treemirror_remote::{HttpObjectTreeClient, ListingSource, ObjectTreeSource};

/// Public endpoint of the shared folder used by object-tree tests
pub const SHARE_ENDPOINT: &str = "https://share.example.net/folder/root-1";
pub const SERVICE_HOST: &str = "share.example.net";

/// Two attempts, short delay
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10))
}

/// Flat listing of a small share:
///
/// ```text
/// root-1/
///   update-manifest.yaml
///   Content/
///     Cards/
///       a.png (5 bytes)
/// ```
pub fn share_nodes() -> serde_json::Value {
    serde_json::json!({
        "nodes": [
            {"id": "root-1", "parent": null, "name": "share", "type": "directory"},
            {"id": "m-1", "parent": "root-1", "name": "update-manifest.yaml", "type": "file",
             "size": 9, "modified": "2024-03-01T10:00:00Z"},
            {"id": "d-1", "parent": "root-1", "name": "Content", "type": "directory"},
            {"id": "d-2", "parent": "d-1", "name": "Cards", "type": "directory"},
            {"id": "f-1", "parent": "d-2", "name": "a.png", "type": "file",
             "size": 5, "modified": "2024-03-02T10:00:00Z"}
        ]
    })
}

/// Mounts `POST /session/anonymous` answering with `token`
pub async fn mount_anonymous_session(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/session/anonymous"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": token })))
        .mount(server)
        .await;
}

/// Mounts `GET /nodes?root=root-1` answering with [`share_nodes`]
pub async fn mount_share_nodes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/nodes"))
        .and(query_param("root", "root-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(share_nodes()))
        .mount(server)
        .await;
}

/// Mounts a content endpoint for one node
pub async fn mount_content(server: &MockServer, node_id: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/nodes/{node_id}/content")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Object-tree source talking to `server`, anonymous, fast retries
pub fn object_tree_source(server: &MockServer) -> ObjectTreeSource {
    let client = Arc::new(HttpObjectTreeClient::with_base_url(server.uri()));
    ObjectTreeSource::new(SHARE_ENDPOINT, SERVICE_HOST, client)
        .expect("valid endpoint")
        .with_retry_policy(fast_retry())
}

/// Sets up an anonymous object-tree share with listing and content mounted
pub async fn setup_object_tree_mock() -> (MockServer, ObjectTreeSource) {
    let server = MockServer::start().await;
    mount_anonymous_session(&server, "anon-token").await;
    mount_share_nodes(&server).await;
    mount_content(&server, "m-1", b"rules: []").await;
    mount_content(&server, "f-1", b"12345").await;

    let source = object_tree_source(&server);
    (server, source)
}

/// Listing endpoint below the mock server
pub fn listing_endpoint(server: &MockServer) -> String {
    format!("{}/updates", server.uri())
}

/// Mounts `HEAD /updates/` answering 200
pub async fn mount_listing_probe(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Mounts `GET /updates/?list=recursive` answering with `entries`
pub async fn mount_listing(server: &MockServer, entries: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/updates/"))
        .and(query_param("list", "recursive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
}

/// Anonymous listing source for `server`, fast retries
pub fn listing_source(server: &MockServer) -> ListingSource {
    ListingSource::from_endpoint(&listing_endpoint(server), None)
        .expect("valid endpoint")
        .with_retry_policy(fast_retry())
}
