//! Requester behavior against misbehaving or silent servers.

use getfile_core::error::WaitPoint;
use getfile_core::transfer::Requester;
use getfile_core::{AppEvent, ProtocolConfig, SessionError};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn test_config() -> ProtocolConfig {
    ProtocolConfig {
        buffer_size: 1024,
        timeout_secs: 1,
    }
}

fn requester(stream: DuplexStream, download_dir: &Path) -> Requester<DuplexStream> {
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(256);
    tokio::spawn(async move { while event_rx.recv().await.is_some() {} });
    Requester::new(
        stream,
        "fake-server",
        test_config(),
        download_dir.to_path_buf(),
        event_tx,
    )
}

/// Fake server: read one request line, reply with `reply`, then hang up or keep the stream open
fn fake_server(
    stream: DuplexStream,
    reply: Vec<u8>,
    hang_up: bool,
) -> JoinHandle<(String, Option<DuplexStream>)> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        reader.write_all(&reply).await.unwrap();
        let stream = reader.into_inner();
        if hang_up { (line, None) } else { (line, Some(stream)) }
    })
}

#[tokio::test]
async fn test_sends_raw_request_line() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);

    let mut reply = b"+OK\r\n".to_vec();
    reply.extend_from_slice(&3u32.to_be_bytes());
    reply.extend_from_slice(b"xyz");
    reply.extend_from_slice(&42u32.to_be_bytes());
    let server = fake_server(server, reply, false);

    let mut requester = requester(client, dir.path());
    let file = requester.request_file("remote/dir/x.txt").await.unwrap();

    let (line, _stream) = server.await.unwrap();
    assert_eq!(line, "GET remote/dir/x.txt\r\n");
    assert_eq!(file.local_path, dir.path().join("x.txt"));
    assert_eq!(file.metadata.size, 3);
    assert_eq!(file.metadata.modified_at, 42);
    assert_eq!(std::fs::read(dir.path().join("x.txt")).unwrap(), b"xyz");
}

#[tokio::test]
async fn test_negative_ack_is_remote_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);
    let server = fake_server(server, b"-ERR\r\n".to_vec(), true);

    let mut requester = requester(client, dir.path());
    let err = requester.request_file("nope.txt").await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, SessionError::RemoteRejection { .. }));
    assert!(!dir.path().join("nope.txt").exists());
}

#[tokio::test]
async fn test_unexpected_response_is_protocol_violation() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);
    let server = fake_server(server, b"HELLO THERE".to_vec(), false);

    let mut requester = requester(client, dir.path());
    let err = requester
        .request_all(["a.txt", "b.txt"])
        .await
        .unwrap_err();
    let _ = server.await.unwrap();

    assert!(matches!(err, SessionError::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_silent_server_times_out_at_ack() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);
    let server = fake_server(server, Vec::new(), false);

    let mut requester = requester(client, dir.path());
    let err = requester.request_file("slow.txt").await.unwrap_err();
    let _ = server.await.unwrap();

    assert!(matches!(
        err,
        SessionError::Timeout {
            phase: WaitPoint::Ack,
            ..
        }
    ));
}

#[tokio::test]
async fn test_silent_after_ack_times_out_at_size_header() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);
    let server = fake_server(server, b"+OK\r\n".to_vec(), false);

    let mut requester = requester(client, dir.path());
    let err = requester.request_file("sized.txt").await.unwrap_err();
    let _ = server.await.unwrap();

    assert!(matches!(
        err,
        SessionError::Timeout {
            phase: WaitPoint::SizeHeader,
            ..
        }
    ));
    // Destination is only opened once the size is known
    assert!(!dir.path().join("sized.txt").exists());
}

#[tokio::test]
async fn test_missing_trailer_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);

    let mut reply = b"+OK\r\n".to_vec();
    reply.extend_from_slice(&3u32.to_be_bytes());
    reply.extend_from_slice(b"abc");
    let server = fake_server(server, reply, false);

    let mut requester = requester(client, dir.path());
    let err = requester.request_file("t.txt").await.unwrap_err();
    let _ = server.await.unwrap();

    assert!(matches!(
        err,
        SessionError::Timeout {
            phase: WaitPoint::Trailer,
            ..
        }
    ));
    // Body was complete before the trailer wait
    assert_eq!(std::fs::read(dir.path().join("t.txt")).unwrap(), b"abc");
}

#[tokio::test]
async fn test_server_hanging_up_mid_body_is_a_stall() {
    let dir = tempfile::tempdir().unwrap();
    let (client, server) = tokio::io::duplex(4096);

    let mut reply = b"+OK\r\n".to_vec();
    reply.extend_from_slice(&100u32.to_be_bytes());
    reply.extend_from_slice(&[9u8; 10]);
    let server = fake_server(server, reply, true);

    let mut requester = requester(client, dir.path());
    let err = requester.request_file("partial.bin").await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(
        err,
        SessionError::PeerStalled {
            remaining: 90,
            total: 100
        }
    ));
    assert_eq!(
        std::fs::read(dir.path().join("partial.bin")).unwrap(),
        vec![9u8; 10]
    );
}

#[tokio::test]
async fn test_invalid_names_are_refused_before_sending() {
    let dir = tempfile::tempdir().unwrap();
    let (client, _server) = tokio::io::duplex(4096);

    let mut requester = requester(client, dir.path());
    assert!(matches!(
        requester.request_file("dir/").await.unwrap_err(),
        SessionError::InvalidRequest(_)
    ));
    assert!(matches!(
        requester.request_file("a\r\nGET b").await.unwrap_err(),
        SessionError::InvalidRequest(_)
    ));
}
