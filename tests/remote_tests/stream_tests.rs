//! Stream Tests
//!
//! Partial, abandoned and flushed block streams between driver and session.

use std::fs;
use std::io::{Read, Write};

use repolink::storage::TEMP_EXTENSION;
use repolink::{Storage, WriteOptions};
use tempfile::TempDir;

use super::{connect, finish};

#[test]
fn test_abandoned_write_keeps_sent_blocks() {
    let temp = TempDir::new().unwrap();
    let buffer_size = 4;
    let (mut remote, handle) = connect(temp.path(), buffer_size);
    let data = b"0123456789";

    {
        let mut write = remote.open_write("file", WriteOptions::default()).unwrap();
        write.write_all(data).unwrap();
    }

    // Only whole blocks reached the remote; the pending tail was discarded
    let sent = (data.len() / buffer_size) * buffer_size;
    let temp_file = temp.path().join(format!("file.{}", TEMP_EXTENSION));
    assert_eq!(fs::read(&temp_file).unwrap(), &data[..sent]);
    assert!(!remote.exists("file").unwrap());

    finish(remote, handle);
}

#[test]
fn test_abandoned_write_preserves_old_content() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 4);

    remote.put("file", WriteOptions::default(), b"original").unwrap();
    {
        let mut write = remote.open_write("file", WriteOptions::default()).unwrap();
        write.write_all(b"replacement").unwrap();
    }

    assert_eq!(remote.get("file").unwrap(), b"original");
    finish(remote, handle);
}

#[test]
fn test_flush_sends_short_blocks() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 1024);

    {
        let mut write = remote.open_write("file", WriteOptions::default()).unwrap();
        write.write_all(b"abc").unwrap();
        write.flush().unwrap();
        write.write_all(b"def").unwrap();
        write.close().unwrap();
    }

    assert_eq!(fs::read(temp.path().join("file")).unwrap(), b"abcdef");
    finish(remote, handle);
}

#[test]
fn test_partial_read_then_next_command() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 4);
    remote.put("file", WriteOptions::default(), b"TESTDATA and more").unwrap();

    {
        let mut read = remote.open_read("file", false).unwrap().unwrap();
        let mut head = [0u8; 6];
        read.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"TESTDA");
    }

    // The rest of the stream was drained on drop
    assert!(remote.exists("file").unwrap());
    finish(remote, handle);
}

#[test]
fn test_small_reads_across_blocks() {
    let temp = TempDir::new().unwrap();
    let (mut remote, handle) = connect(temp.path(), 3);
    remote.put("file", WriteOptions::default(), b"abcdefgh").unwrap();

    let mut collected = Vec::new();
    {
        let mut read = remote.open_read("file", false).unwrap().unwrap();
        let mut byte = [0u8; 2];
        loop {
            let n = read.read(&mut byte).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&byte[..n]);
        }
        assert_eq!(read.read(&mut byte).unwrap(), 0);
    }

    assert_eq!(collected, b"abcdefgh");
    finish(remote, handle);
}
