//! Handler over an in-memory stream.

use multicert::serve::handler::{handle, Exchange, HandlerError, ACK_MESSAGE, READ_BUF_SIZE};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn replies_once_when_data_arrives() {
    let (mut client, server) = tokio::io::duplex(4096);
    let task = tokio::spawn(handle(server, TIMEOUT));

    client.write_all(b"ping").await.unwrap();
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();

    assert_eq!(reply, ACK_MESSAGE);
    assert_eq!(task.await.unwrap().unwrap(), Exchange::Replied { received: 4 });
}

#[tokio::test]
async fn reads_at_most_one_buffer() {
    let (mut client, server) = tokio::io::duplex(8192);
    client.write_all(&[b'a'; 3000]).await.unwrap();

    let exchange = handle(server, TIMEOUT).await.unwrap();
    match exchange {
        Exchange::Replied { received } => assert!(received <= READ_BUF_SIZE && received > 0),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn closed_client_gets_nothing() {
    let (mut client, server) = tokio::io::duplex(1024);
    client.shutdown().await.unwrap();

    assert_eq!(handle(server, TIMEOUT).await.unwrap(), Exchange::Empty);
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());
}

#[tokio::test]
async fn silent_client_times_out_and_is_closed() {
    let (mut client, server) = tokio::io::duplex(1024);

    let err = handle(server, Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, HandlerError::ReadTimeout(_)), "{err}");

    // Server side is gone: the client sees EOF.
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());
}

/// Stream whose close never completes, like a peer that stopped reading.
struct StuckClose(tokio::io::DuplexStream);

impl tokio::io::AsyncRead for StuckClose {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for StuckClose {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Pending
    }
}

#[tokio::test]
async fn stuck_close_does_not_hold_the_session() {
    let (_client, server) = tokio::io::duplex(1024);
    let read_timeout = Duration::from_millis(50);

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        handle(StuckClose(server), read_timeout),
    )
    .await
    .expect("handler returned despite a close that never completes");
    assert!(matches!(outcome, Err(HandlerError::ReadTimeout(_))));
}
