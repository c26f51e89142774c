//! TLS server: startup, SNI resolution, accept loop, session handler.

pub mod acceptor;
pub mod handler;
pub mod resolver;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Settings;
use crate::credential::{default_provider, load_certified_key};
use crate::registry::CertRegistry;

pub use acceptor::Acceptor;

/// Load the default credential and bind. The default credential is loaded
/// before any socket exists; failing to load it is fatal.
pub fn prepare(settings: &Settings, registry: Arc<CertRegistry>) -> Result<Acceptor> {
    let provider = default_provider();
    let chain = settings.default_chain_path();
    let key = settings.default_key_path();
    let default_key = load_certified_key(&chain, &key, &provider).with_context(|| {
        format!(
            "default certificate could not be loaded; ensure {} and {} exist",
            chain.display(),
            key.display()
        )
    })?;
    tracing::info!(chain = %chain.display(), "default certificate loaded");

    Acceptor::bind(
        &settings.listen,
        &settings.limits,
        registry,
        Arc::new(default_key),
        provider,
    )
}

/// Wait for Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
