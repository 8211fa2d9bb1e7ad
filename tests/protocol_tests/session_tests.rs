//! Session Tests
//!
//! Command loop behavior around the storage dispatcher.

use std::io::Cursor;

use repolink::network::Session;
use repolink::protocol::Channel;
use repolink::{PosixStorage, RepoError, StorageDispatcher};
use tempfile::TempDir;

use super::{output, serve};

#[test]
fn test_noop_and_exit() {
    let temp = TempDir::new().unwrap();

    // Nothing after exit is read
    assert_eq!(
        serve(temp.path(), "noop []\nexit []\nstorageExists [\"f\"]\n", 4),
        "{}\n{}\n"
    );
}

#[test]
fn test_invalid_command_keeps_serving() {
    let temp = TempDir::new().unwrap();

    assert_eq!(
        serve(temp.path(), "BOGUS [1,2]\nstorageExists [\"f\"]\n", 4),
        "{\"err\":41,\"out\":\"invalid command 'BOGUS'\"}\n{\"out\":false}\n"
    );
}

#[test]
fn test_fault_keeps_serving() {
    let temp = TempDir::new().unwrap();

    let output = serve(
        temp.path(),
        "storagePathSync [\"missing\",false]\nnoop []\n",
        4,
    );
    let expected_first = format!(
        "{{\"err\":73,\"out\":\"unable to open '{}' for sync: [2] No such file or directory\"}}\n",
        temp.path().join("missing").display()
    );

    assert!(output.starts_with(&expected_first), "{}", output);
    assert!(output.ends_with("\n{}\n"));
}

#[test]
fn test_empty_input_is_clean_disconnect() {
    let temp = TempDir::new().unwrap();
    assert_eq!(serve(temp.path(), "", 4), "");
}

#[test]
fn test_malformed_command_line_ends_session() {
    let temp = TempDir::new().unwrap();
    let channel = Channel::new(Cursor::new(b"nonsense\nnoop []\n".to_vec()), Vec::new(), 4);
    let mut session =
        Session::new(channel).with_handler(StorageDispatcher::new(PosixStorage::new(temp.path())));

    assert!(matches!(session.serve(), Err(RepoError::Protocol(_))));
    assert_eq!(
        output(session),
        "{\"err\":41,\"out\":\"'nonsense' is not a valid command\"}\n"
    );
}

#[test]
fn test_bad_block_header_ends_session() {
    let temp = TempDir::new().unwrap();
    let input = "storageOpenWrite [\"f\",0,0,null,null,0,true,false,false,true]\nbogus\nnoop []\n";
    let channel = Channel::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), 4);
    let mut session =
        Session::new(channel).with_handler(StorageDispatcher::new(PosixStorage::new(temp.path())));

    assert!(matches!(session.serve(), Err(RepoError::Protocol(_))));
    assert_eq!(
        output(session),
        "{}\n{\"err\":41,\"out\":\"'bogus' is not a valid block size message\"}\n"
    );
    assert!(!temp.path().join("f").exists());
}
