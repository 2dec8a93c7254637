//! Type conflicts between the remote and local trees, and odd names

use tempfile::TempDir;

use treemirror_core::domain::NodeRecord;

use crate::common::*;

#[tokio::test]
async fn local_directory_in_place_of_remote_file_is_replaced() {
    let local = TempDir::new().unwrap();
    write_local(&local.path().join("data.pak/leftover.txt"), b"old");
    let source = FakeSource::builder()
        .manifest(&manifest(&[("mods", local.path(), "")]))
        .file("mods/data.pak", b"pak")
        .build();

    let tasks = tasks_for(&source).await;
    assert_eq!(tasks[0].download_count(), 1);
    assert_eq!(tasks[0].items[0].target_path(), local.path().join("data.pak"));

    apply_all(&tasks).await;
    let target = local.path().join("data.pak");
    assert!(target.is_file());
    assert_eq!(std::fs::read(target).unwrap(), b"pak");
}

#[tokio::test]
async fn local_file_in_place_of_remote_directory_is_deleted_first() {
    let local = TempDir::new().unwrap();
    write_local(&local.path().join("textures"), b"not a dir");
    let source = FakeSource::builder()
        .manifest(&manifest(&[("mods", local.path(), "remove_extraneous: true")]))
        .file("mods/textures/t.dds", b"dds")
        .build();

    let tasks = tasks_for(&source).await;
    let items = &tasks[0].items;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_delete());
    assert_eq!(items[0].target_path(), local.path().join("textures"));
    assert!(items[1].is_download());
    assert_eq!(items[1].target_path(), local.path().join("textures/t.dds"));

    apply_all(&tasks).await;
    assert_eq!(std::fs::read(local.path().join("textures/t.dds")).unwrap(), b"dds");
}

#[tokio::test]
async fn local_file_in_place_of_remote_directory_is_kept_without_removal() {
    let local = TempDir::new().unwrap();
    write_local(&local.path().join("textures"), b"not a dir");
    let source = FakeSource::builder()
        .manifest(&manifest(&[("mods", local.path(), "")]))
        .file("mods/textures/t.dds", b"dds")
        .build();

    let tasks = tasks_for(&source).await;
    assert_eq!(tasks[0].items.len(), 1);
    assert!(tasks[0].items[0].is_download());
    assert_eq!(
        tasks[0].items[0].target_path(),
        local.path().join("textures/t.dds")
    );
}

#[tokio::test]
async fn missing_client_path_downloads_into_new_directories() {
    let local = TempDir::new().unwrap();
    let client = local.path().join("not/yet/created");
    let source = FakeSource::builder()
        .manifest(&manifest(&[("mods", &client, "remove_extraneous: true")]))
        .file("mods/a/b.txt", b"b")
        .dir("mods/empty")
        .build();

    let tasks = tasks_for(&source).await;
    assert_eq!(tasks[0].download_count(), 1);
    assert_eq!(tasks[0].delete_count(), 0);

    apply_all(&tasks).await;
    assert!(client.join("a/b.txt").is_file());
}

#[tokio::test]
async fn unusable_remote_names_are_skipped() {
    let local = TempDir::new().unwrap();
    let source = FakeSource::builder()
        .manifest(&manifest(&[("mods", local.path(), "")]))
        .file("mods/ok.txt", b"ok")
        .file("mods/..", b"escape")
        .build();

    let tasks = tasks_for(&source).await;
    assert_eq!(tasks[0].items.len(), 1);
    assert_eq!(tasks[0].items[0].target_path(), local.path().join("ok.txt"));
}

#[tokio::test]
async fn case_variant_remote_directories_share_one_local_directory() {
    let local = TempDir::new().unwrap();
    write_local(&local.path().join("mods/a.txt"), b"a");
    write_local(&local.path().join("mods/b.txt"), b"b");
    let source = FakeSource::builder()
        .manifest(&manifest(&[("share", local.path(), "remove_extraneous: true")]))
        .file("share/Mods/a.txt", b"a")
        .file("share/mods/b.txt", b"b")
        .build();

    let tasks = tasks_for(&source).await;
    assert!(tasks[0].is_empty(), "unexpected {:?}", tasks[0].items);

    apply_all(&tasks).await;
    assert!(local.path().join("mods/a.txt").exists());
    assert!(local.path().join("mods/b.txt").exists());
}

#[tokio::test]
async fn case_variant_remote_files_claim_one_target() {
    let local = TempDir::new().unwrap();
    let source = FakeSource::builder()
        .manifest(&manifest(&[("share", local.path(), "")]))
        .file("share/A.txt", b"first")
        .file("share/a.txt", b"second!")
        .build();

    let tasks = tasks_for(&source).await;
    assert_eq!(tasks[0].items.len(), 1);
    assert_eq!(tasks[0].items[0].target_path(), local.path().join("A.txt"));
}

#[tokio::test]
async fn case_variants_in_linked_listing_are_merged_or_skipped() {
    let local = TempDir::new().unwrap();
    write_local(&local.path().join("mods/a.txt"), b"a");
    write_local(&local.path().join("mods/b.txt"), b"b");
    let yaml = manifest(&[("share", local.path(), "remove_extraneous: true")]);

    let records = vec![
        NodeRecord::directory("ROOT", "root"),
        NodeRecord::file("M", "update-manifest.yaml", yaml.len() as u64).with_parent("ROOT"),
        NodeRecord::directory("S", "share").with_parent("ROOT"),
        NodeRecord::directory("D1", "Mods").with_parent("S"),
        NodeRecord::directory("D2", "mods").with_parent("S"),
        NodeRecord::file("F1", "a.txt", 1).with_parent("D1"),
        NodeRecord::file("F2", "b.txt", 1).with_parent("D2"),
        NodeRecord::file("F3", "C.txt", 1).with_parent("D1"),
        NodeRecord::file("F4", "c.txt", 2).with_parent("D2"),
    ];
    let source = FakeSource::builder()
        .content("M", yaml.as_bytes())
        .content("F3", b"C")
        .content("F4", b"cc")
        .build_linked(records);

    let tasks = tasks_for(&source).await;
    let items = &tasks[0].items;
    assert_eq!(items.len(), 1, "unexpected {items:?}");
    assert!(items[0].is_download());
    assert_eq!(items[0].target_path(), local.path().join("mods/C.txt"));

    apply_all(&tasks).await;
    assert_eq!(std::fs::read(local.path().join("mods/C.txt")).unwrap(), b"C");
    assert!(local.path().join("mods/b.txt").exists());
}
