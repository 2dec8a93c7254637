//! Object-tree source: sessions, retries, listing, downloads

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{bearer_token, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use treemirror_core::domain::{NodeKind, UpdateError};
use treemirror_core::ports::{Credentials, ProgressFn, RemoteSource};
use treemirror_remote::session::{MemorySessionStore, SessionStore, StoredSession};

use crate::common::{
    mount_anonymous_session, mount_share_nodes, object_tree_source, setup_object_tree_mock,
    share_nodes,
};

#[tokio::test]
async fn connect_retries_once_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/anonymous"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_anonymous_session(&server, "anon-token").await;

    let source = object_tree_source(&server);
    source.connect(&CancellationToken::new()).await.unwrap();
    assert_eq!(source.session_token().await.as_deref(), Some("anon-token"));
}

#[tokio::test]
async fn connect_gives_up_after_two_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/anonymous"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let source = object_tree_source(&server);
    let err = source.connect(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, UpdateError::Connection(_)));
    assert!(source.session_token().await.is_none());
}

#[tokio::test]
async fn connect_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/anonymous"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "t"})))
        .expect(1)
        .mount(&server)
        .await;

    let source = object_tree_source(&server);
    let cancel = CancellationToken::new();
    source.connect(&cancel).await.unwrap();
    source.connect(&cancel).await.unwrap();
}

#[tokio::test]
async fn credentials_are_used_for_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/login"))
        .and(body_json(serde_json::json!({"username": "alice", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "user-token"})))
        .expect(1)
        .mount(&server)
        .await;

    let source = object_tree_source(&server)
        .with_credentials(Some(Credentials::new("alice", "hunter2")));
    source.connect(&CancellationToken::new()).await.unwrap();
    assert_eq!(source.session_token().await.as_deref(), Some("user-token"));
}

#[tokio::test]
async fn stored_session_is_resumed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/resume"))
        .and(body_json(serde_json::json!({"token": "old-token"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "fresh-token"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::new());
    let account = "anonymous@https://share.example.net/folder/root-1";
    store.store(account, &StoredSession::new("old-token")).unwrap();

    let source = object_tree_source(&server).with_session_store(store.clone());
    source.connect(&CancellationToken::new()).await.unwrap();

    assert_eq!(source.session_token().await.as_deref(), Some("fresh-token"));
    assert_eq!(store.load(account).unwrap().unwrap().token, "fresh-token");
}

#[tokio::test]
async fn rejected_stored_session_falls_back_to_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/resume"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    mount_anonymous_session(&server, "anon-token").await;

    let store = Arc::new(MemorySessionStore::new());
    let account = "anonymous@https://share.example.net/folder/root-1";
    store.store(account, &StoredSession::new("expired")).unwrap();

    let source = object_tree_source(&server).with_session_store(store.clone());
    source.connect(&CancellationToken::new()).await.unwrap();
    assert_eq!(source.session_token().await.as_deref(), Some("anon-token"));
    assert_eq!(store.load(account).unwrap().unwrap().token, "anon-token");
}

#[tokio::test]
async fn list_tree_links_parents_and_is_memoized() {
    let server = MockServer::start().await;
    mount_anonymous_session(&server, "anon-token").await;
    Mock::given(method("GET"))
        .and(path("/nodes"))
        .and(bearer_token("anon-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(share_nodes()))
        .expect(2)
        .mount(&server)
        .await;

    let source = object_tree_source(&server);
    let cancel = CancellationToken::new();

    let tree = source.list_tree(&cancel).await.unwrap();
    assert_eq!(tree.len(), 5);
    let cards = tree.resolve("CONTENT/cards").unwrap();
    let png = tree.child_by_name(cards, "a.png").unwrap();
    assert_eq!(png.kind, NodeKind::File);
    assert_eq!(png.size, 5);

    let again = source.list_tree(&cancel).await.unwrap();
    assert!(Arc::ptr_eq(&tree, &again));

    source.invalidate().await;
    let fresh = source.list_tree(&cancel).await.unwrap();
    assert!(!Arc::ptr_eq(&tree, &fresh));
}

#[tokio::test]
async fn list_tree_retries_then_reports_listing_error() {
    let server = MockServer::start().await;
    mount_anonymous_session(&server, "anon-token").await;
    Mock::given(method("GET"))
        .and(path("/nodes"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let source = object_tree_source(&server);
    let err = source.list_tree(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, UpdateError::Listing(_)));
}

#[tokio::test]
async fn read_bytes_fetches_manifest() {
    let (_server, source) = setup_object_tree_mock().await;
    let cancel = CancellationToken::new();

    let tree = source.list_tree(&cancel).await.unwrap();
    let manifest = tree
        .child_by_name(tree.root(), "Update-Manifest.YAML")
        .unwrap()
        .clone();
    let bytes = source.read_bytes(&manifest, &cancel).await.unwrap();
    assert_eq!(bytes, b"rules: []");
}

#[tokio::test]
async fn download_writes_file_and_reports_progress() {
    let (_server, source) = setup_object_tree_mock().await;
    let cancel = CancellationToken::new();
    let local = TempDir::new().unwrap();

    let tree = source.list_tree(&cancel).await.unwrap();
    let cards = tree.resolve("Content/Cards").unwrap();
    let png = tree.child_by_name(cards, "a.png").unwrap().clone();

    let dest = local.path().join("chara/a.png");
    std::fs::create_dir_all(&dest).unwrap();

    let last = Arc::new(Mutex::new((0, 0)));
    let sink = Arc::clone(&last);
    let progress: ProgressFn = Arc::new(move |done, total| *sink.lock().unwrap() = (done, total));

    source.download(&png, &dest, Some(progress), &cancel).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"12345");
    assert_eq!(*last.lock().unwrap(), (5, 5));
}

#[tokio::test]
async fn failed_download_leaves_no_file() {
    let server = MockServer::start().await;
    mount_anonymous_session(&server, "anon-token").await;
    mount_share_nodes(&server).await;
    Mock::given(method("GET"))
        .and(path("/nodes/f-1/content"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = object_tree_source(&server);
    let cancel = CancellationToken::new();
    let local = TempDir::new().unwrap();
    let tree = source.list_tree(&cancel).await.unwrap();
    let cards = tree.resolve("Content/Cards").unwrap();
    let png = tree.child_by_name(cards, "a.png").unwrap().clone();

    let dest = local.path().join("a.png");
    let err = source.download(&png, &dest, None, &cancel).await.unwrap_err();
    assert!(matches!(err, UpdateError::Transfer { .. }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn cancelled_download_leaves_no_file() {
    let server = MockServer::start().await;
    mount_anonymous_session(&server, "anon-token").await;
    mount_share_nodes(&server).await;
    Mock::given(method("GET"))
        .and(path("/nodes/f-1/content"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"12345".to_vec())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let source = object_tree_source(&server);
    let cancel = CancellationToken::new();
    let local = TempDir::new().unwrap();
    let tree = source.list_tree(&cancel).await.unwrap();
    let cards = tree.resolve("Content/Cards").unwrap();
    let png = tree.child_by_name(cards, "a.png").unwrap().clone();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let dest = local.path().join("a.png");
    let err = source.download(&png, &dest, None, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!dest.exists());
}
