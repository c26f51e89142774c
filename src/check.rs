//! Startup checks: do the configured certificate files exist?

use std::path::Path;

use crate::config::Settings;
use crate::credential::summarize_chain;
use crate::registry::CertRegistry;

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub ok: bool,
    pub message: String,
}

impl CheckResult {
    fn ok(message: String) -> Self {
        Self { ok: true, message }
    }

    fn missing(message: String) -> Self {
        Self { ok: false, message }
    }
}

/// Leaf details appended to an ok line, or why they are unavailable.
fn describe_chain(chain: &Path) -> String {
    match summarize_chain(chain) {
        Ok(summary) => {
            let state = if summary.expired { ", already expired" } else { "" };
            format!(
                "\n     Subject: {}\n     Not after: {}{state}",
                summary.subject, summary.not_after
            )
        }
        Err(e) => format!("\n     (cannot parse certificate: {e:#})"),
    }
}

/// Run all checks: default pair first, then each registry entry in order.
pub fn run_checks(settings: &Settings, registry: &CertRegistry) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let chain = settings.default_chain_path();
    let key = settings.default_key_path();
    for (label, path) in [("certificate", &chain), ("key", &key)] {
        if !path.is_file() {
            results.push(CheckResult::missing(format!(
                "[DEFAULT] {label} file not found\n       Missing: {}",
                path.display()
            )));
        }
    }
    if chain.is_file() && key.is_file() {
        results.push(CheckResult::ok(format!(
            "[DEFAULT] {}\n     Key:  {}",
            chain.display(),
            key.display()
        )));
    }

    for entry in registry.entries() {
        let class = &entry.classification;
        let domain = &entry.domain;
        let chain_ok = entry.chain_path.is_file();
        let key_ok = entry.key_path.is_file();

        if chain_ok && key_ok {
            results.push(CheckResult::ok(format!(
                "[{class}] {domain}\n     Cert: {}\n     Key:  {}{}",
                entry.chain_path.display(),
                entry.key_path.display(),
                describe_chain(&entry.chain_path)
            )));
            continue;
        }
        if !chain_ok {
            results.push(CheckResult::missing(format!(
                "[{class}] {domain}: Certificate file not found\n       Missing: {}",
                entry.chain_path.display()
            )));
        }
        if !key_ok {
            results.push(CheckResult::missing(format!(
                "[{class}] {domain}: Key file not found\n       Missing: {}",
                entry.key_path.display()
            )));
        }
    }

    results
}
