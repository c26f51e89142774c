//! Listening socket, TLS upgrade and per-connection dispatch.

use anyhow::{Context, Result};
use rustls::crypto::CryptoProvider;
use rustls::server::ServerConfig;
use rustls::sign::CertifiedKey;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;

use crate::config::{Limits, ListenSettings};
use crate::registry::CertRegistry;
use crate::serve::handler::{self, Exchange};
use crate::serve::resolver::SniResolver;

/// Accept loop state. Owns the listener and the TLS config carrying the
/// default credential.
pub struct Acceptor {
    listener: TcpListener,
    tls: TlsAcceptor,
    limits: Limits,
    slots: Arc<Semaphore>,
}

impl Acceptor {
    /// Bind and listen. Must be called inside a tokio runtime.
    pub fn bind(
        listen: &ListenSettings,
        limits: &Limits,
        registry: Arc<CertRegistry>,
        default_key: Arc<CertifiedKey>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self> {
        limits.validate()?;

        let resolver = SniResolver::new(registry, default_key, Arc::clone(&provider));
        let server_config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("TLS protocol versions")?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(resolver));

        let addr = SocketAddr::new(listen.address, listen.port);
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("create socket")?;
        socket.set_reuseaddr(true).context("set SO_REUSEADDR")?;
        socket.bind(addr).with_context(|| format!("bind {addr}"))?;
        let listener = socket
            .listen(listen.backlog)
            .with_context(|| format!("listen on {addr}"))?;

        Ok(Self {
            listener,
            tls: TlsAcceptor::from(Arc::new(server_config)),
            limits: limits.clone(),
            slots: Arc::new(Semaphore::new(limits.max_connections)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` completes, then give in-flight sessions the
    /// grace period to finish.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Acceptor {
            listener,
            tls,
            limits,
            slots,
        } = self;
        tokio::pin!(shutdown);

        loop {
            let (tcp, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        accept_error_pause(&e).await;
                        continue;
                    }
                },
            };

            // Never wait for a slot: a full server drops the newcomer.
            let permit = match Arc::clone(&slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(
                        %peer,
                        max_connections = limits.max_connections,
                        "connection limit reached, dropping connection"
                    );
                    continue;
                }
            };

            let tls = tls.clone();
            let limits = limits.clone();
            tokio::spawn(async move {
                serve_session(tls, tcp, peer, &limits).await;
                drop(permit);
            });
        }

        drop(listener);
        tracing::info!("server shutting down");

        let total = u32::try_from(limits.max_connections).unwrap_or(u32::MAX);
        match tokio::time::timeout(limits.shutdown_grace(), slots.acquire_many(total)).await {
            Ok(_) => tracing::debug!("all sessions finished"),
            Err(_) => tracing::warn!(
                in_flight = limits.max_connections - slots.available_permits(),
                "abandoning sessions still in flight"
            ),
        }
        Ok(())
    }
}

/// Pause after a failed accept (EMFILE and friends repeat until a descriptor frees up).
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Log a failed accept and wait [`ACCEPT_ERROR_BACKOFF`].
pub async fn accept_error_pause(error: &io::Error) {
    tracing::error!(%error, backoff = ?ACCEPT_ERROR_BACKOFF, "accept error");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Handshake then exchange for one connection. Failures stay here.
async fn serve_session(tls: TlsAcceptor, tcp: TcpStream, peer: SocketAddr, limits: &Limits) {
    tracing::info!(%peer, "connection");

    let stream = match tokio::time::timeout(limits.handshake_timeout(), tls.accept(tcp)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(%peer, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            tracing::warn!(%peer, timeout = ?limits.handshake_timeout(), "TLS handshake timed out");
            return;
        }
    };
    let server_name = stream.get_ref().1.server_name().map(str::to_owned);

    match handler::handle(stream, limits.read_timeout()).await {
        Ok(Exchange::Replied { received }) => {
            tracing::debug!(%peer, server_name = ?server_name, received, "replied");
        }
        Ok(Exchange::Empty) => {
            tracing::debug!(%peer, server_name = ?server_name, "client sent nothing");
        }
        Err(e) => {
            tracing::error!(%peer, server_name = ?server_name, error = %e, "session error");
        }
    }
}
