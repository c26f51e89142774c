//! Loading chain/key PEM files into server credentials.

use anyhow::{Context, Result};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use x509_parser::prelude::FromDer;

/// Why a chain/key pair could not be turned into a credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("read certificate chain {}: {source}", .path.display())]
    ReadChain { path: PathBuf, source: io::Error },
    #[error("read private key {}: {source}", .path.display())]
    ReadKey { path: PathBuf, source: io::Error },
    #[error("parse certificate PEM {}: {source}", .path.display())]
    ParseChain { path: PathBuf, source: io::Error },
    #[error("no certificates in {}", .path.display())]
    EmptyChain { path: PathBuf },
    #[error("parse private key PEM {}: {source}", .path.display())]
    ParseKey { path: PathBuf, source: io::Error },
    #[error("no private key in {}", .path.display())]
    NoKey { path: PathBuf },
    #[error("build credential: {0}")]
    Build(#[from] rustls::Error),
}

impl CredentialError {
    /// True when one of the two files does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            CredentialError::ReadChain { source, .. } | CredentialError::ReadKey { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

/// Crypto provider used for every credential (the process default).
pub fn default_provider() -> Arc<CryptoProvider> {
    rustls::ServerConfig::builder().crypto_provider().clone()
}

/// Read and parse a chain/key pair. The key must match the leaf certificate.
pub fn load_certified_key(
    chain_path: &Path,
    key_path: &Path,
    provider: &CryptoProvider,
) -> Result<CertifiedKey, CredentialError> {
    let chain_pem = fs::read(chain_path).map_err(|source| CredentialError::ReadChain {
        path: chain_path.to_path_buf(),
        source,
    })?;
    let key_pem = fs::read(key_path).map_err(|source| CredentialError::ReadKey {
        path: key_path.to_path_buf(),
        source,
    })?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut chain_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CredentialError::ParseChain {
            path: chain_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(CredentialError::EmptyChain {
            path: chain_path.to_path_buf(),
        });
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|source| CredentialError::ParseKey {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CredentialError::NoKey {
            path: key_path.to_path_buf(),
        })?;

    Ok(CertifiedKey::from_der(certs, key, provider)?)
}

/// Leaf certificate details for status output.
#[derive(Debug, Clone)]
pub struct CertSummary {
    pub subject: String,
    pub not_after: time::OffsetDateTime,
    pub expired: bool,
}

/// Parse the first certificate of a chain file.
pub fn summarize_chain(path: &Path) -> Result<CertSummary> {
    let pem = fs::read(path).with_context(|| format!("read cert: {}", path.display()))?;
    let cert_der = rustls_pemfile::certs(&mut pem.as_slice())
        .next()
        .and_then(|r| r.ok())
        .context("parse cert PEM")?;

    let (_, cert) = x509_parser::prelude::X509Certificate::from_der(cert_der.as_ref())
        .map_err(|e| anyhow::anyhow!("parse X.509: {e:?}"))?;

    let expiry_ts = cert.validity().not_after.timestamp();
    let not_after = time::OffsetDateTime::from_unix_timestamp(expiry_ts)
        .map_err(|e| anyhow::anyhow!("invalid expiry: {e:?}"))?;

    Ok(CertSummary {
        subject: cert.subject().to_string(),
        not_after,
        expired: not_after < time::OffsetDateTime::now_utc(),
    })
}
