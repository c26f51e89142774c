//! Domain -> certificate registry, built once at startup.

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Trust state an entry is meant to simulate. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Classification {
    Valid,
    Expired,
    Revoked,
    SelfSigned,
    Other(String),
}

impl Classification {
    pub fn label(&self) -> &str {
        match self {
            Classification::Valid => "VALID",
            Classification::Expired => "EXPIRED",
            Classification::Revoked => "REVOKED",
            Classification::SelfSigned => "SELF-SIGNED",
            Classification::Other(tag) => tag,
        }
    }
}

impl From<String> for Classification {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "VALID" => Classification::Valid,
            "EXPIRED" => Classification::Expired,
            "REVOKED" => Classification::Revoked,
            "SELF-SIGNED" | "SELFSIGNED" | "SELF_SIGNED" => Classification::SelfSigned,
            _ => Classification::Other(s.trim().to_string()),
        }
    }
}

impl From<&str> for Classification {
    fn from(s: &str) -> Self {
        Classification::from(s.to_string())
    }
}

impl From<Classification> for String {
    fn from(c: Classification) -> Self {
        c.label().to_string()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One domain's chain/key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub domain: String,
    pub chain_path: PathBuf,
    pub key_path: PathBuf,
    pub classification: Classification,
}

impl CertificateEntry {
    pub fn new(
        domain: impl Into<String>,
        chain_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        classification: Classification,
    ) -> Self {
        Self {
            domain: domain.into(),
            chain_path: chain_path.into(),
            key_path: key_path.into(),
            classification,
        }
    }
}

/// Normalize a host name for lookup: trimmed, lowercase, no trailing dot.
fn normalize(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_ascii_lowercase()
}

/// Immutable, ordered domain -> entry mapping.
#[derive(Debug, Clone, Default)]
pub struct CertRegistry {
    entries: Vec<CertificateEntry>,
    index: HashMap<String, usize>,
}

impl CertRegistry {
    /// Build from entries in configured order. Fails on empty or duplicate domains.
    pub fn from_entries(entries: Vec<CertificateEntry>) -> Result<Self> {
        let mut stored = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for mut entry in entries {
            let key = normalize(&entry.domain);
            if key.is_empty() {
                anyhow::bail!("certificate entry with empty domain ({})", entry.chain_path.display());
            }
            if index.contains_key(&key) {
                anyhow::bail!("duplicate certificate entry for domain '{key}'");
            }
            entry.domain = key.clone();
            index.insert(key, stored.len());
            stored.push(entry);
        }
        Ok(Self {
            entries: stored,
            index,
        })
    }

    /// Stock test domains, with files under `base/server/`.
    pub fn builtin(base: &Path) -> Self {
        let server = base.join("server");
        let entries = vec![
            CertificateEntry::new(
                "valid.example.com",
                server.join("valid-chain.pem"),
                server.join("serverkey.pem"),
                Classification::Valid,
            ),
            CertificateEntry::new(
                "expired.example.com",
                server.join("expired-chain.pem"),
                server.join("serverkey.pem"),
                Classification::Expired,
            ),
            CertificateEntry::new(
                "revoked.example.com",
                server.join("revoked-chain.pem"),
                server.join("serverkey.pem"),
                Classification::Revoked,
            ),
            CertificateEntry::new(
                "selfsigned.example.com",
                server.join("selfsigned-chain.pem"),
                server.join("selfsignedkey.pem"),
                Classification::SelfSigned,
            ),
        ];
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.domain.clone(), i))
            .collect();
        Self { entries, index }
    }

    pub fn lookup(&self, domain: &str) -> Option<&CertificateEntry> {
        self.index
            .get(&normalize(domain))
            .and_then(|&i| self.entries.get(i))
    }

    /// Entries in configured order.
    pub fn entries(&self) -> &[CertificateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
