//! One read, one reply, close.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest request read from a client.
pub const READ_BUF_SIZE: usize = 1024;

/// Reply sent when the client sent anything.
pub const ACK_MESSAGE: &[u8] = b"TLS Server: Connection successful!\n";

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("read: {0}")]
    Read(#[source] io::Error),
    #[error("write: {0}")]
    Write(#[source] io::Error),
    #[error("no data within {0:?}")]
    ReadTimeout(Duration),
}

/// What happened on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// Client sent `received` bytes and got the acknowledgment.
    Replied { received: usize },
    /// Client closed without sending anything.
    Empty,
}

/// Run the exchange on an established session. The stream is shut down and
/// dropped on every path.
pub async fn handle<S>(mut stream: S, read_timeout: Duration) -> Result<Exchange, HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = exchange(&mut stream, read_timeout).await;
    // Best effort close_notify; the transport closes on drop either way. A
    // peer that stopped reading must not hold the session open.
    if tokio::time::timeout(read_timeout, stream.shutdown()).await.is_err() {
        tracing::debug!(timeout = ?read_timeout, "close_notify timed out");
    }
    result
}

async fn exchange<S>(stream: &mut S, read_timeout: Duration) -> Result<Exchange, HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; READ_BUF_SIZE];
    let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
        Err(_) => return Err(HandlerError::ReadTimeout(read_timeout)),
        Ok(Ok(n)) => n,
        // Peer dropped TCP without close_notify.
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => 0,
        Ok(Err(e)) => return Err(HandlerError::Read(e)),
    };
    if n == 0 {
        return Ok(Exchange::Empty);
    }
    stream.write_all(ACK_MESSAGE).await.map_err(HandlerError::Write)?;
    stream.flush().await.map_err(HandlerError::Write)?;
    Ok(Exchange::Replied { received: n })
}
