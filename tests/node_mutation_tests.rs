#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::os::unix::fs::PermissionsExt as _;

use bytes::Bytes;
use mirror_fs::fs::dir::RenameError;
use mirror_fs::fs::{MirrorFs, Node, SetattrRequest};

use common::{make_dir, write_file};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_write_read_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = MirrorFs::new(tmp.path());

    let file = fs
        .root()
        .create("new.txt".as_ref(), libc::O_WRONLY | libc::O_CREAT, 0o644)
        .await
        .unwrap();
    let written = file
        .write(0, Bytes::from_static(b"hello"), libc::O_WRONLY)
        .await
        .unwrap();
    assert_eq!(written, 5);

    let content = file.read_all().await.unwrap();
    assert_eq!(&content[..], b"hello");

    // The real file under the mirrored tree must hold the same bytes.
    let on_disk = std::fs::read(tmp.path().join("new.txt")).unwrap();
    assert_eq!(on_disk, b"hello");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_at_offset_merges_with_existing_content() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "f.txt", b"hello world");

    let fs = MirrorFs::new(tmp.path());
    let (node, _) = fs.root().lookup("f.txt".as_ref()).await.unwrap();
    let Node::File(file) = node else {
        panic!("expected a file node");
    };

    file.write(6, Bytes::from_static(b"rust!"), libc::O_WRONLY)
        .await
        .unwrap();

    let on_disk = std::fs::read(tmp.path().join("f.txt")).unwrap();
    assert_eq!(on_disk, b"hello rust!");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mkdir_creates_an_empty_real_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = MirrorFs::new(tmp.path());

    let dir = fs.root().mkdir("sub".as_ref(), 0o755).await.unwrap();

    let meta = std::fs::metadata(tmp.path().join("sub")).unwrap();
    assert!(meta.is_dir());

    let entries = dir.read_dir_all().await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_deletes_files_and_directories() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "f.txt", b"x");
    make_dir(tmp.path(), "d");

    let fs = MirrorFs::new(tmp.path());
    fs.root().remove("f.txt".as_ref()).await.unwrap();
    fs.root().remove("d".as_ref()).await.unwrap();

    assert!(!tmp.path().join("f.txt").exists());
    assert!(!tmp.path().join("d").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_through_a_nested_directory_targets_the_nested_path() {
    let tmp = tempfile::tempdir().unwrap();
    let sub = make_dir(tmp.path(), "sub");
    write_file(&sub, "inner.txt", b"x");
    // A same-named file at the root must survive a removal through `sub`.
    write_file(tmp.path(), "inner.txt", b"keep");

    let fs = MirrorFs::new(tmp.path());
    let (node, _) = fs.root().lookup("sub".as_ref()).await.unwrap();
    let Node::Dir(sub_dir) = node else {
        panic!("expected a directory node");
    };

    sub_dir.remove("inner.txt".as_ref()).await.unwrap();

    assert!(!sub.join("inner.txt").exists());
    assert!(tmp.path().join("inner.txt").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rename_moves_between_directories_preserving_content() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "old.txt", b"payload");
    make_dir(tmp.path(), "dest");

    let fs = MirrorFs::new(tmp.path());
    let (dest, _) = fs.root().lookup("dest".as_ref()).await.unwrap();

    fs.root()
        .rename("old.txt".as_ref(), &dest, "new.txt".as_ref())
        .await
        .unwrap();

    assert!(!tmp.path().join("old.txt").exists());
    let moved = std::fs::read(tmp.path().join("dest").join("new.txt")).unwrap();
    assert_eq!(moved, b"payload");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rename_into_a_file_node_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "old.txt", b"x");
    write_file(tmp.path(), "not-a-dir", b"y");

    let fs = MirrorFs::new(tmp.path());
    let (target, _) = fs.root().lookup("not-a-dir".as_ref()).await.unwrap();

    let err = fs
        .root()
        .rename("old.txt".as_ref(), &target, "new.txt".as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, RenameError::NotADirectory));
    assert_eq!(i32::from(err), libc::ENOTDIR);
    assert!(tmp.path().join("old.txt").exists(), "source left untouched");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn setattr_changes_permissions() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "f.txt", b"x");

    let fs = MirrorFs::new(tmp.path());
    let (node, _) = fs.root().lookup("f.txt".as_ref()).await.unwrap();

    let attr = node
        .setattr(SetattrRequest {
            mode: Some(0o644),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(attr.perm, 0o644);

    let meta = std::fs::metadata(&path).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o644);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn setattr_truncates_to_the_requested_size() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "f.txt", b"hello");

    let fs = MirrorFs::new(tmp.path());
    let (node, _) = fs.root().lookup("f.txt".as_ref()).await.unwrap();

    let attr = node
        .setattr(SetattrRequest {
            size: Some(3),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(attr.size, 3);

    let on_disk = std::fs::read(tmp.path().join("f.txt")).unwrap();
    assert_eq!(on_disk, b"hel");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_truncates_an_existing_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "f.txt", b"previous contents");

    let fs = MirrorFs::new(tmp.path());
    let file = fs
        .root()
        .create(
            "f.txt".as_ref(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        )
        .await
        .unwrap();

    let content = file.read_all().await.unwrap();
    assert!(content.is_empty());
}
