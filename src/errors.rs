// SPDX-License-Identifier: MIT

//! Error types for PowerDNS API access and zone migration.
//!
//! Every failure surfaced by this crate is a [`MigrateError`]. The variants
//! separate the cases a caller handles differently:
//! - configuration problems are fatal before any network traffic,
//! - transport exhaustion and non-retriable HTTP statuses come from the
//!   API client,
//! - validation failures come from the sanitizer,
//! - conflicts are target-side rejections of a mutation,
//! - cancellation is an external stop signal, not a server problem.

use thiserror::Error;

/// Errors produced while migrating zones between PowerDNS servers.
#[derive(Error, Debug, Clone)]
pub enum MigrateError {
    /// Invalid or missing configuration detected before any API call.
    ///
    /// Examples: an unparseable base URL, an unreadable zones file, an
    /// empty zone list.
    #[error("configuration error: {0}")]
    Config(String),

    /// A request could not be completed after exhausting all retries.
    ///
    /// Covers connection failures, TLS failures and per-attempt timeouts.
    #[error("{method} {url} failed after {retries} retries: {reason}")]
    Transport {
        /// HTTP method of the failed request.
        method: &'static str,
        /// Full request URL.
        url: String,
        /// Number of retries performed before giving up.
        retries: u32,
        /// The transport failure from the final attempt.
        reason: String,
    },

    /// The API answered with a non-retriable error status.
    #[error("{method} {url} returned {status}: {body}")]
    Http {
        /// HTTP method of the failed request.
        method: &'static str,
        /// Full request URL.
        url: String,
        /// HTTP status code returned by the API.
        status: u16,
        /// Raw response body returned by the API.
        body: String,
    },

    /// The zone document is structurally invalid and auto-fixing was
    /// either disabled or insufficient.
    ///
    /// Examples: a CNAME record set sharing an owner with other types, or
    /// a duplicate `(name, type)` pair remaining after repairs.
    #[error("zone {zone} failed validation: {reason}")]
    Validation {
        /// The zone that failed validation.
        zone: String,
        /// What is structurally wrong.
        reason: String,
    },

    /// The target server rejected a mutation with 409 or 422.
    #[error("target rejected change for zone {zone} ({status}): {body}")]
    Conflict {
        /// The zone whose mutation was rejected.
        zone: String,
        /// HTTP status code (409 or 422).
        status: u16,
        /// Server-provided error body, usually naming the offending rrset.
        body: String,
    },

    /// The operation was aborted by an external signal or a stop policy.
    #[error("operation cancelled")]
    Cancelled,
}

impl MigrateError {
    /// True if this error is transient and repeating the whole migration
    /// might succeed.
    ///
    /// The API client already retries transient statuses internally, so a
    /// surfaced [`MigrateError::Transport`] means retries were exhausted;
    /// it is still the only variant worth repeating at a higher level.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// True if this is an HTTP 404 from the API.
    ///
    /// The existence probe turns this case into `None` instead of an
    /// error; everywhere else a 404 is a real failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }

    /// Stable label for the error kind, used in per-kind summary tallies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport { .. } => "transport",
            Self::Http { status: 404, .. } => "not-found",
            Self::Http { .. } => "http",
            Self::Validation { .. } => "validation",
            Self::Conflict { .. } => "conflict",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
