//! Integration tests for capture-file replay.

use std::io::Write;
use std::path::PathBuf;

use poolbus_transport::{Connection, FileConnection, TransportError};

fn capture(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "poolbus-{}-{}.bin",
        name,
        std::process::id()
    ));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(bytes).unwrap();
    path
}

#[test]
fn test_replay_in_chunks_then_empty() {
    let path = capture("chunks", &[1, 2, 3, 4, 5]);
    let mut conn = FileConnection::new(&path).with_chunk_size(2);
    assert!(!conn.is_open());
    conn.open().unwrap();
    assert!(conn.is_open());

    assert_eq!(conn.poll_read().unwrap(), vec![1, 2]);
    assert_eq!(conn.poll_read().unwrap(), vec![3, 4]);
    assert_eq!(conn.poll_read().unwrap(), vec![5]);
    assert!(conn.poll_read().unwrap().is_empty());
    assert!(conn.is_exhausted());
    assert!(conn.poll_read().unwrap().is_empty());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_replay_is_read_only() {
    let path = capture("readonly", &[1]);
    let mut conn = FileConnection::new(&path);
    conn.open().unwrap();
    assert!(matches!(conn.write(&[0xA5]), Err(TransportError::ReadOnly)));
    std::fs::remove_file(path).ok();
}

#[test]
fn test_missing_file_fails_to_open() {
    let mut conn = FileConnection::new("/nonexistent/poolbus/capture.bin");
    assert!(matches!(conn.open(), Err(TransportError::OpenFailed(_))));
    assert!(!conn.is_open());
}

#[test]
fn test_read_before_open_is_error() {
    let mut conn = FileConnection::new("/nonexistent/poolbus/capture.bin");
    assert!(matches!(conn.poll_read(), Err(TransportError::NotOpen(_))));
}
