//! Settings file loading and path resolution.
//!
//! Supports MULTICERT_CONFIG env var override for testing.

use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::{CertRegistry, CertificateEntry, Classification};

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "multicert.toml";

pub const DEFAULT_PORT: u16 = 4443;
pub const DEFAULT_BACKLOG: u32 = 10;

/// `[listen]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    pub address: IpAddr,
    pub port: u16,
    pub backlog: u32,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

/// `[default]` section: the fallback chain/key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultCredential {
    pub chain: PathBuf,
    pub key: PathBuf,
}

impl Default for DefaultCredential {
    fn default() -> Self {
        Self {
            chain: PathBuf::from("server/valid-chain.pem"),
            key: PathBuf::from("server/serverkey.pem"),
        }
    }
}

/// `[limits]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Sessions allowed at once; connections beyond this are dropped.
    pub max_connections: usize,
    pub handshake_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// How long shutdown waits for in-flight sessions.
    pub shutdown_grace_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_connections: 256,
            handshake_timeout_secs: 10,
            read_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl Limits {
    /// Most sessions the slot semaphore can hold and drain at shutdown.
    pub const MAX_CONNECTIONS: usize = {
        let permits = tokio::sync::Semaphore::MAX_PERMITS;
        if permits < u32::MAX as usize {
            permits
        } else {
            u32::MAX as usize
        }
    };

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 || self.max_connections > Self::MAX_CONNECTIONS {
            anyhow::bail!(
                "limits.max_connections must be between 1 and {}, got {}",
                Self::MAX_CONNECTIONS,
                self.max_connections
            );
        }
        if self.handshake_timeout_secs == 0 {
            anyhow::bail!("limits.handshake_timeout_secs must be at least 1");
        }
        if self.read_timeout_secs == 0 {
            anyhow::bail!("limits.read_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// One `[[certs]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertSpec {
    pub domain: String,
    pub chain: PathBuf,
    pub key: PathBuf,
    pub classification: Classification,
}

/// multicert.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub listen: ListenSettings,
    #[serde(default)]
    pub default: DefaultCredential,
    #[serde(default)]
    pub limits: Limits,
    /// Empty means the built-in registry.
    #[serde(default)]
    pub certs: Vec<CertSpec>,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Settings {
    /// Built-in defaults with paths relative to `base_dir`.
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings from a file (with shared lock). Paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = fs::OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("open settings: {}", path.display()))?;
        fs2::FileExt::lock_shared(&file)?;
        let mut s = String::new();
        file.read_to_string(&mut s)?;
        let mut settings: Settings =
            toml::from_str(&s).with_context(|| format!("parse settings: {}", path.display()))?;
        settings
            .limits
            .validate()
            .with_context(|| format!("invalid settings: {}", path.display()))?;
        settings.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(settings)
    }

    /// Find and load settings: explicit path, MULTICERT_CONFIG, ./multicert.toml,
    /// user config dir, else built-in defaults rooted at `cwd`.
    pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var("MULTICERT_CONFIG") {
            return Self::load(Path::new(&path));
        }
        let local = cwd.join(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load(&local);
        }
        if let Some(dirs) = directories::ProjectDirs::from("com", "multicert", "multicert") {
            let user = dirs.config_dir().join(CONFIG_FILE_NAME);
            if user.is_file() {
                return Self::load(&user);
            }
        }
        Ok(Self::with_base(cwd))
    }

    /// Resolve a configured path against `base_dir`.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn default_chain_path(&self) -> PathBuf {
        self.resolve_path(&self.default.chain)
    }

    pub fn default_key_path(&self) -> PathBuf {
        self.resolve_path(&self.default.key)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen.address, self.listen.port)
    }

    /// Build the registry from `[[certs]]`, or the built-in one when none are listed.
    pub fn registry(&self) -> Result<CertRegistry> {
        if self.certs.is_empty() {
            return Ok(CertRegistry::builtin(&self.base_dir));
        }
        let entries = self
            .certs
            .iter()
            .map(|c| {
                CertificateEntry::new(
                    c.domain.clone(),
                    self.resolve_path(&c.chain),
                    self.resolve_path(&c.key),
                    c.classification.clone(),
                )
            })
            .collect();
        CertRegistry::from_entries(entries)
    }
}
