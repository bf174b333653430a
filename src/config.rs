// SPDX-License-Identifier: MIT

//! Connection configuration and zone-list input handling.

use crate::errors::MigrateError;
use crate::retry::RetryPolicy;
use crate::zone::name_key;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default per-attempt HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default server id in the PowerDNS API path.
pub const DEFAULT_SERVER_ID: &str = "localhost";

/// Connection settings for one PowerDNS API endpoint.
///
/// Constructed once per server (source and target) and shared by every
/// zone pipeline for the lifetime of the run.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// API base URL, e.g. `https://pdns.example.net:8081`.
    pub base_url: String,

    /// Value of the `X-API-Key` header.
    pub api_key: String,

    /// Server id in the API path (default `localhost`).
    pub server_id: String,

    /// Whether to verify the server TLS certificate.
    pub verify_tls: bool,

    /// Per-attempt request timeout.
    pub timeout: Duration,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl ConnectionConfig {
    /// Build a connection with default server id, timeout and retries.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            server_id: DEFAULT_SERVER_ID.to_string(),
            verify_tls: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Validate the base URL before any request is made.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Config`] if the URL does not parse or uses
    /// a scheme other than `http`/`https`.
    pub fn validate(&self) -> Result<(), MigrateError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| MigrateError::Config(format!("invalid base URL {}: {e}", self.base_url)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(MigrateError::Config(format!(
                "unsupported URL scheme {other} in {}",
                self.base_url
            ))),
        }
    }

    /// Resolve an API path against this connection.
    ///
    /// `endpoint("/zones")` yields
    /// `{base_url}/api/v1/servers/{server_id}/zones`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v1/servers/{}{path}",
            self.base_url.trim_end_matches('/'),
            self.server_id
        )
    }
}

/// Read a newline-delimited zones file.
///
/// Blank lines and lines starting with `#` are skipped; surrounding
/// whitespace is trimmed. Duplicate names (case-insensitive, trailing-dot
/// insensitive) are dropped, keeping the first spelling.
///
/// # Errors
///
/// Returns [`MigrateError::Config`] if the file cannot be read or yields
/// no zones.
pub fn read_zones_file(path: &Path) -> Result<Vec<String>, MigrateError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| MigrateError::Config(format!("cannot read zones file {}: {e}", path.display())))?;
    let zones = dedup_zones(raw.lines());
    if zones.is_empty() {
        return Err(MigrateError::Config(format!(
            "zones file {} contains no zone names",
            path.display()
        )));
    }
    Ok(zones)
}

/// Deduplicate an iterator of zone names, preserving input order.
///
/// Comparison ignores case and the trailing dot; the first spelling of
/// each zone is the one kept and later reported in results.
pub fn dedup_zones<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut zones = Vec::new();
    for line in lines {
        let zone = line.trim();
        if zone.is_empty() || zone.starts_with('#') {
            continue;
        }
        if seen.insert(name_key(zone)) {
            zones.push(zone.to_string());
        }
    }
    zones
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
