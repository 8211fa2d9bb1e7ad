//! Driver Tests
//!
//! `Storage` calls through `RemoteStorage` against a live session.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::thread;

use repolink::network::Session;
use repolink::protocol::{Channel, Peer};
use repolink::{ErrorKind, RemoteStorage, RepoError, Storage, StorageDispatcher, WriteOptions};
use tempfile::TempDir;

use super::{connect, finish};

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// =============================================================================
// Round Trips
// =============================================================================

fn round_trip(buffer_size: usize, len: usize) {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), buffer_size);
    let data = content(len);

    remote.put("dir/file", WriteOptions::default(), &data).unwrap();
    assert_eq!(fs::read(temp.path().join("dir/file")).unwrap(), data);
    assert_eq!(remote.get("dir/file").unwrap(), data);

    finish(remote, handle);
}

#[test]
fn test_round_trip_buffer_one() {
    round_trip(1, 777);
}

#[test]
fn test_round_trip_buffer_four() {
    round_trip(4, 10_001);
}

#[test]
fn test_round_trip_buffer_4096() {
    round_trip(4096, 100_000);
}

#[test]
fn test_round_trip_buffer_larger_than_file() {
    round_trip(65536, 1234);
}

#[test]
fn test_round_trip_empty_file() {
    round_trip(16, 0);
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_exists_lifecycle() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 64);

    assert!(!remote.exists("file").unwrap());
    remote.put("file", WriteOptions::default(), b"x").unwrap();
    assert!(remote.exists("file").unwrap());
    remote.remove("file", true).unwrap();
    assert!(!remote.exists("file").unwrap());

    finish(remote, handle);
}

#[test]
fn test_list() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 64);

    remote.path_create("dir", true, false, None).unwrap();
    assert_eq!(remote.list(Some("dir"), true, None).unwrap(), Some(vec![]));

    remote.put("dir/b", WriteOptions::default(), b"").unwrap();
    remote.put("dir/a", WriteOptions::default(), b"").unwrap();
    remote.put("dir/testy", WriteOptions::default(), b"").unwrap();

    let mut names = remote.list(Some("dir"), true, None).unwrap().unwrap();
    names.sort();
    assert_eq!(names, vec!["a", "b", "testy"]);

    assert_eq!(
        remote.list(Some("dir"), true, Some("^testy$")).unwrap(),
        Some(vec!["testy".to_string()])
    );
    assert_eq!(remote.list(Some("missing"), false, None).unwrap(), None);

    finish(remote, handle);
}

#[test]
fn test_path_operations() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 64);

    assert!(remote.path_exists(None).unwrap());
    assert!(!remote.path_exists(Some("a")).unwrap());

    remote.path_create("a/b", false, false, Some(0o700)).unwrap();
    assert!(remote.path_exists(Some("a/b")).unwrap());
    remote.path_sync("a/b", false).unwrap();

    remote.path_remove("a", true, true).unwrap();
    assert!(!remote.path_exists(Some("a")).unwrap());

    finish(remote, handle);
}

// =============================================================================
// Faults
// =============================================================================

#[test]
fn test_missing_file_fault_carries_peer() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 64);

    assert!(remote.open_read("missing", true).unwrap().is_none());

    let err = match remote.open_read("missing", false) {
        Ok(_) => panic!("expected missing file"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::FileMissing);
    assert_eq!(
        err.to_string(),
        format!(
            "raised from remote protocol on 'test-host': unable to open '{}' for read: [2] No such file or directory",
            temp.path().join("missing").display()
        )
    );

    // The session survives the fault
    remote.noop().unwrap();
    finish(remote, handle);
}

#[test]
fn test_path_create_faults() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 64);

    remote.path_create("dir", true, false, None).unwrap();

    let err = remote.path_create("dir", true, false, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathCreate);
    assert!(err.to_string().ends_with("[17] File exists"));

    let err = remote.path_create("x/y", false, true, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathCreate);
    assert!(err.to_string().ends_with("[2] No such file or directory"));

    finish(remote, handle);
}

#[test]
fn test_open_write_fault() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 64);
    let options = WriteOptions {
        create_path: false,
        ..WriteOptions::default()
    };

    let err = match remote.open_write("no/parent", options) {
        Ok(_) => panic!("expected open failure"),
        Err(e) => e,
    };
    assert!(matches!(err, RepoError::Remote { kind: ErrorKind::FileOpen, .. }));

    remote.noop().unwrap();
    finish(remote, handle);
}

// =============================================================================
// Multiple Hops
// =============================================================================

#[test]
fn test_dispatcher_over_remote_storage() {
    let temp = TempDir::new().unwrap();
    let (far, far_handle) = connect(temp.path(), 8);

    // A middle session whose storage is itself a driver
    let (client, server) = UnixStream::pair().unwrap();
    let hop_handle = thread::spawn(move || {
        let reader = BufReader::new(server.try_clone().unwrap());
        let channel = Channel::new(reader, BufWriter::new(server), 8);

        Session::new(channel)
            .named("hop")
            .with_handler(StorageDispatcher::new(far))
            .serve()
    });

    let reader = BufReader::new(client.try_clone().unwrap());
    let channel = Channel::new(reader, BufWriter::new(client), 8)
        .with_peer(Peer::new("remote", "hop-host"));
    let mut near = RemoteStorage::new(channel);

    near.put("f", WriteOptions::default(), b"through two hops").unwrap();
    assert_eq!(fs::read(temp.path().join("f")).unwrap(), b"through two hops");
    assert_eq!(near.get("f").unwrap(), b"through two hops");

    let err = match near.open_read("missing", false) {
        Ok(_) => panic!("expected missing file"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::FileMissing);
    assert!(err.to_string().starts_with(
        "raised from remote protocol on 'hop-host': raised from remote protocol on 'test-host': unable to open"
    ));

    near.close().unwrap();
    hop_handle.join().unwrap().unwrap();

    // The hop's driver was dropped with its session, closing the far socket
    far_handle.join().unwrap().unwrap();
}
