//! Per-handshake certificate selection by SNI name.

use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::fmt;
use std::sync::Arc;

use crate::credential::{load_certified_key, CredentialError};
use crate::registry::{CertRegistry, Classification};

/// Why a credential was picked for a handshake.
#[derive(Debug)]
pub enum Selection {
    /// Client sent no server name.
    NoServerName,
    /// Name is not in the registry.
    Unknown { name: String },
    /// Entry found and its files loaded.
    Matched {
        domain: String,
        classification: Classification,
    },
    /// Entry found but its files could not be loaded.
    Fallback {
        domain: String,
        classification: Classification,
        error: CredentialError,
    },
}

impl Selection {
    /// True when the default credential is being served.
    pub fn is_default(&self) -> bool {
        !matches!(self, Selection::Matched { .. })
    }
}

/// Credential chosen for one handshake.
#[derive(Debug)]
pub struct Resolved {
    pub key: Arc<CertifiedKey>,
    pub selection: Selection,
}

/// Pick the credential for `requested`. Never fails: every miss or load
/// error falls back to `default`.
pub fn resolve(
    requested: Option<&str>,
    registry: &CertRegistry,
    default: &Arc<CertifiedKey>,
    provider: &CryptoProvider,
) -> Resolved {
    let fallback = |selection| Resolved {
        key: Arc::clone(default),
        selection,
    };

    let Some(name) = requested else {
        tracing::debug!("no server name requested, using default");
        return fallback(Selection::NoServerName);
    };
    tracing::info!(server_name = name, "client requested");

    let Some(entry) = registry.lookup(name) else {
        tracing::warn!(server_name = name, "unknown server name, using default");
        return fallback(Selection::Unknown {
            name: name.to_string(),
        });
    };

    // Loaded fresh for every handshake; edits to the files apply immediately.
    match load_certified_key(&entry.chain_path, &entry.key_path, provider) {
        Ok(key) => {
            tracing::info!(
                domain = %entry.domain,
                classification = %entry.classification,
                "loaded certificate"
            );
            Resolved {
                key: Arc::new(key),
                selection: Selection::Matched {
                    domain: entry.domain.clone(),
                    classification: entry.classification.clone(),
                },
            }
        }
        Err(error) => {
            if error.is_not_found() {
                tracing::error!(
                    domain = %entry.domain,
                    classification = %entry.classification,
                    chain = %entry.chain_path.display(),
                    key = %entry.key_path.display(),
                    %error,
                    "certificate file not found, using default"
                );
            } else {
                tracing::error!(
                    domain = %entry.domain,
                    classification = %entry.classification,
                    %error,
                    "failed to load certificate, using default"
                );
            }
            fallback(Selection::Fallback {
                domain: entry.domain.clone(),
                classification: entry.classification.clone(),
                error,
            })
        }
    }
}

/// rustls hook delegating to [`resolve`].
#[derive(Clone)]
pub struct SniResolver {
    registry: Arc<CertRegistry>,
    default: Arc<CertifiedKey>,
    provider: Arc<CryptoProvider>,
}

impl SniResolver {
    pub fn new(
        registry: Arc<CertRegistry>,
        default: Arc<CertifiedKey>,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            registry,
            default,
            provider,
        }
    }

    /// Same selection rustls gets, with the reason attached.
    pub fn select(&self, requested: Option<&str>) -> Resolved {
        resolve(requested, &self.registry, &self.default, &self.provider)
    }
}

impl fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniResolver")
            .field(
                "domains",
                &self
                    .registry
                    .entries()
                    .iter()
                    .map(|e| e.domain.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.select(client_hello.server_name()).key)
    }
}
