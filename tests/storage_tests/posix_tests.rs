//! POSIX Storage Tests
//!
//! Tests for the local filesystem storage.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;

use repolink::storage::TEMP_EXTENSION;
use repolink::{ErrorKind, PosixStorage, Storage, WriteOptions};
use tempfile::TempDir;

fn storage() -> (TempDir, PosixStorage) {
    let temp = TempDir::new().unwrap();
    let storage = PosixStorage::new(temp.path());
    (temp, storage)
}

fn mode(path: &std::path::Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_put_get_round_trip() {
    let (_temp, mut storage) = storage();

    storage.put("a/b/file", WriteOptions::default(), b"hello world").unwrap();

    assert!(storage.exists("a/b/file").unwrap());
    assert_eq!(storage.get("a/b/file").unwrap(), b"hello world");
}

#[test]
fn test_exists_is_false_for_path() {
    let (temp, mut storage) = storage();
    fs::create_dir(temp.path().join("dir")).unwrap();

    assert!(!storage.exists("dir").unwrap());
    assert!(storage.path_exists(Some("dir")).unwrap());
}

#[test]
fn test_write_modes_applied_exactly() {
    let (temp, mut storage) = storage();
    let options = WriteOptions {
        mode_file: Some(0o604),
        mode_path: Some(0o711),
        ..WriteOptions::default()
    };

    storage.put("sub/file", options, b"x").unwrap();

    assert_eq!(mode(&temp.path().join("sub/file")), 0o604);
    assert_eq!(mode(&temp.path().join("sub")), 0o711);
}

#[test]
fn test_default_modes() {
    let temp = TempDir::new().unwrap();
    let mut storage = PosixStorage::new(temp.path()).with_modes(0o600, 0o700);

    storage.put("sub/file", WriteOptions::default(), b"x").unwrap();

    assert_eq!(mode(&temp.path().join("sub/file")), 0o600);
    assert_eq!(mode(&temp.path().join("sub")), 0o700);
}

#[test]
fn test_abandoned_atomic_write_keeps_destination() {
    let (temp, mut storage) = storage();
    storage.put("file", WriteOptions::default(), b"old").unwrap();

    {
        let mut write = storage.open_write("file", WriteOptions::default()).unwrap();
        write.write_all(b"new content").unwrap();
    }

    assert_eq!(fs::read(temp.path().join("file")).unwrap(), b"old");
    assert_eq!(
        fs::read(temp.path().join(format!("file.{}", TEMP_EXTENSION))).unwrap(),
        b"new content"
    );
}

#[test]
fn test_non_atomic_write_goes_to_destination() {
    let (temp, mut storage) = storage();
    let options = WriteOptions {
        atomic: false,
        ..WriteOptions::default()
    };

    {
        let mut write = storage.open_write("file", options).unwrap();
        write.write_all(b"partial").unwrap();
    }

    assert_eq!(fs::read(temp.path().join("file")).unwrap(), b"partial");
}

#[test]
fn test_close_twice_and_write_after_close() {
    let (_temp, mut storage) = storage();

    let mut write = storage.open_write("file", WriteOptions::default()).unwrap();
    write.write_all(b"data").unwrap();
    write.close().unwrap();
    write.close().unwrap();

    assert!(write.write(b"more").is_err());
}

#[test]
fn test_unknown_owner_is_file_owner_fault() {
    let (_temp, mut storage) = storage();
    let options = WriteOptions {
        user: Some("repolink-no-such-user".to_string()),
        ..WriteOptions::default()
    };

    let err = match storage.open_write("file", options) {
        Ok(_) => panic!("expected ownership failure"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::FileOwner);
    assert_eq!(err.to_string(), "unable to find user 'repolink-no-such-user'");
}

#[test]
fn test_open_read_missing() {
    let (temp, mut storage) = storage();

    assert!(storage.open_read("missing", true).unwrap().is_none());

    let err = match storage.open_read("missing", false) {
        Ok(_) => panic!("expected missing file"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::FileMissing);
    assert_eq!(
        err.to_string(),
        format!(
            "unable to open '{}' for read: [2] No such file or directory",
            temp.path().join("missing").display()
        )
    );
}

#[test]
fn test_open_read_streams_content() {
    let (temp, mut storage) = storage();
    fs::write(temp.path().join("file"), b"streamed").unwrap();

    let mut read = storage.open_read("file", false).unwrap().unwrap();
    let mut buf = [0u8; 3];
    read.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"str");

    let mut rest = String::new();
    read.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "eamed");
}

#[test]
fn test_remove() {
    let (temp, mut storage) = storage();
    fs::write(temp.path().join("file"), b"x").unwrap();

    storage.remove("file", true).unwrap();
    assert!(!storage.exists("file").unwrap());

    storage.remove("file", false).unwrap();
    let err = storage.remove("file", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileRemove);
}

// =============================================================================
// Listing
// =============================================================================

#[test]
fn test_list_empty_and_entries() {
    let (temp, mut storage) = storage();

    assert_eq!(storage.list(None, true, None).unwrap(), Some(vec![]));

    fs::write(temp.path().join("a"), b"").unwrap();
    fs::create_dir(temp.path().join("b")).unwrap();

    let mut names = storage.list(None, true, None).unwrap().unwrap();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_list_missing_path() {
    let (temp, mut storage) = storage();

    assert_eq!(storage.list(Some("missing"), false, None).unwrap(), None);

    let err = storage.list(Some("missing"), true, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathMissing);
    assert_eq!(
        err.to_string(),
        format!(
            "unable to list files for missing path '{}': [2] No such file or directory",
            temp.path().join("missing").display()
        )
    );
}

#[test]
fn test_list_invalid_expression() {
    let (_temp, mut storage) = storage();

    let err = storage.list(None, true, Some("(")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

// =============================================================================
// Paths
// =============================================================================

#[test]
fn test_path_create_error_on_exists() {
    let (temp, mut storage) = storage();
    storage.path_create("dir", true, false, None).unwrap();

    // Existing is fine unless asked otherwise
    storage.path_create("dir", false, false, None).unwrap();

    let err = storage.path_create("dir", true, false, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathCreate);
    assert_eq!(
        err.to_string(),
        format!(
            "unable to create path '{}': [17] File exists",
            temp.path().join("dir").display()
        )
    );
}

#[test]
fn test_path_create_no_parent_create() {
    let (temp, mut storage) = storage();

    let err = storage
        .path_create("parent/child", false, true, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathCreate);
    assert_eq!(
        err.to_string(),
        format!(
            "unable to create path '{}': [2] No such file or directory",
            temp.path().join("parent/child").display()
        )
    );
}

#[test]
fn test_path_create_parents_with_mode() {
    let (temp, mut storage) = storage();

    storage
        .path_create("parent/child", false, false, Some(0o777))
        .unwrap();

    assert_eq!(mode(&temp.path().join("parent")), 0o777);
    assert_eq!(mode(&temp.path().join("parent/child")), 0o777);
}

#[test]
fn test_path_remove() {
    let (temp, mut storage) = storage();
    storage.put("dir/sub/file", WriteOptions::default(), b"x").unwrap();

    let err = storage.path_remove("dir", true, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathRemove);

    storage.path_remove("dir", true, true).unwrap();
    assert!(!temp.path().join("dir").exists());

    storage.path_remove("dir", false, true).unwrap();
    let err = storage.path_remove("dir", true, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathRemove);
}

#[test]
fn test_path_sync() {
    let (_temp, mut storage) = storage();
    storage.path_create("dir", false, false, None).unwrap();

    storage.path_sync("dir", false).unwrap();
    storage.path_sync("missing", true).unwrap();

    let err = storage.path_sync("missing", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathMissing);
}

#[test]
fn test_base_path_checks() {
    let (temp, mut storage) = storage();

    assert!(storage.path_exists(None).unwrap());

    let inside = temp.path().join("file");
    fs::write(&inside, b"x").unwrap();
    assert!(storage.exists(inside.to_str().unwrap()).unwrap());

    let err = storage.exists("/definitely/elsewhere").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assert);
}

#[test]
fn test_parent_components_cannot_leave_base() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("repo");
    fs::create_dir(&base).unwrap();
    fs::write(temp.path().join("outside"), b"x").unwrap();
    let mut storage = PosixStorage::new(&base);

    let err = storage.exists("../outside").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assert);
    assert_eq!(
        err.to_string(),
        format!("path '../outside' is not in base path '{}'", base.display())
    );

    let absolute = format!("{}/../outside", base.display());
    let err = storage.exists(&absolute).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assert);
    assert_eq!(
        err.to_string(),
        format!("absolute path '{}' is not in base path '{}'", absolute, base.display())
    );

    let err = match storage.open_write("sub/../../escaped", WriteOptions::default()) {
        Ok(_) => panic!("expected write outside base to fail"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::Assert);
    assert!(!temp.path().join("escaped").exists());

    assert_eq!(storage.path_remove("..", true, true).unwrap_err().kind(), ErrorKind::Assert);
    assert!(temp.path().join("outside").exists());
}

#[test]
fn test_parent_components_inside_base() {
    let (temp, mut storage) = storage();

    storage.put("a/../b/./file", WriteOptions::default(), b"x").unwrap();

    assert!(temp.path().join("b/file").exists());
    assert!(!temp.path().join("a").exists());
    assert!(storage.exists("b/../b/file").unwrap());
    assert_eq!(
        storage.resolve(Some("b/.././b/file")).unwrap(),
        temp.path().join("b/file")
    );
}
