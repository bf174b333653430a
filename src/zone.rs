// SPDX-License-Identifier: MIT

//! Data model for PowerDNS zones, record sets and zone mutations.
//!
//! The types in this module mirror the JSON documents exchanged with the
//! PowerDNS Authoritative API (`/api/v1/servers/{server_id}/zones`). Fields
//! the server manages itself (`id`, `serial`, `dnssec`, ...) are accepted on
//! deserialization but never serialized back, so a fetched zone can be
//! submitted to another server without carrying server-private state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ensure a zone or owner name ends with a trailing dot.
///
/// PowerDNS requires fully qualified names everywhere; callers are allowed
/// to pass `example.com` and get `example.com.` on the wire.
///
/// # Example
///
/// ```rust
/// use pdns_migrate::zone::normalize_name;
///
/// assert_eq!(normalize_name("example.com"), "example.com.");
/// assert_eq!(normalize_name("example.com."), "example.com.");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Case-insensitive comparison key for a zone or owner name.
///
/// Names compare equal regardless of ASCII case and trailing-dot form;
/// the stored value keeps whatever form the server returned.
#[must_use]
pub fn name_key(name: &str) -> String {
    normalize_name(name).to_ascii_lowercase()
}

/// A single record within a record set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Record payload in PowerDNS presentation format (e.g. `192.0.2.1`).
    pub content: String,

    /// Whether the record is disabled (not served, but stored).
    #[serde(default)]
    pub disabled: bool,
}

/// A comment attached to a record set.
///
/// `modified_at` is set by the server and treated as read-only: it is
/// dropped on serialization and excluded from equality between servers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    /// Free-form comment text.
    #[serde(default)]
    pub content: String,

    /// Account the comment is attributed to.
    #[serde(default)]
    pub account: String,

    /// Server-side modification timestamp (seconds since epoch).
    #[serde(default, skip_serializing)]
    pub modified_at: Option<u64>,
}

/// A record set: all records sharing an owner name and a type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RrSet {
    /// Fully qualified owner name, trailing dot included.
    pub name: String,

    /// Uppercase record type token (`A`, `AAAA`, `CNAME`, `TXT`, ...).
    #[serde(rename = "type")]
    pub rtype: String,

    /// Time to live in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Records in server order. Equality treats this as a multiset.
    #[serde(default)]
    pub records: Vec<Record>,

    /// Comments in server order. Equality treats this as a multiset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

fn default_ttl() -> u32 {
    3600
}

impl RrSet {
    /// Comparison key `(name, type)` with case-insensitive name handling.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (name_key(&self.name), self.rtype.clone())
    }
}

/// A zone document as fetched from and submitted to the PowerDNS API.
///
/// Writable fields are serialized when creating the zone on the target;
/// server-managed fields are kept only so a raw fetch round-trips through
/// [`crate::sanitize::Sanitizer::sanitize_source`] losslessly until they
/// are stripped there.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Zone {
    /// Zone name, fully qualified.
    pub name: String,

    /// Zone kind: `Native`, `Master` or `Slave`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// All record sets of the zone.
    #[serde(default)]
    pub rrsets: Vec<RrSet>,

    /// Upstream masters, only meaningful for `Slave` zones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masters: Vec<String>,

    /// Nameservers for zone creation; PowerDNS rejects the field on
    /// existing zones, so it is only ever sent with a POST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,

    /// Owning account label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// `SOA-EDIT` backend setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa_edit: Option<String>,

    /// `SOA-EDIT-API` backend setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa_edit_api: Option<String>,

    // Server-managed fields below: accepted on fetch, never submitted.
    /// Opaque zone id assigned by the server.
    #[serde(default, skip_serializing)]
    pub id: Option<String>,

    /// API URL of the zone on the server it was fetched from.
    #[serde(default, skip_serializing)]
    pub url: Option<String>,

    /// SOA serial as seen by the server.
    #[serde(default, skip_serializing)]
    pub serial: Option<u64>,

    /// Serial last notified to slaves.
    #[serde(default, skip_serializing)]
    pub notified_serial: Option<u64>,

    /// Serial as edited via the API.
    #[serde(default, skip_serializing)]
    pub edited_serial: Option<u64>,

    /// Whether the server rectifies the zone after API edits.
    #[serde(default, skip_serializing)]
    pub api_rectify: Option<bool>,

    /// Whether the zone is DNSSEC-signed under server key management.
    #[serde(default, skip_serializing)]
    pub dnssec: Option<bool>,

    /// Whether the zone carries pre-signed DNSSEC data.
    #[serde(default, skip_serializing)]
    pub presigned: Option<bool>,

    /// Timestamp of the last SOA check (slave zones).
    #[serde(default, skip_serializing)]
    pub last_check: Option<u64>,
}

impl Zone {
    /// True if any server-managed field is still present.
    ///
    /// Sanitized zones must return `false` here.
    #[must_use]
    pub fn has_read_only_fields(&self) -> bool {
        self.id.is_some()
            || self.url.is_some()
            || self.serial.is_some()
            || self.notified_serial.is_some()
            || self.edited_serial.is_some()
            || self.api_rectify.is_some()
            || self.dnssec.is_some()
            || self.presigned.is_some()
            || self.last_check.is_some()
    }

    /// Clear every server-managed field in place.
    pub fn clear_read_only_fields(&mut self) {
        self.id = None;
        self.url = None;
        self.serial = None;
        self.notified_serial = None;
        self.edited_serial = None;
        self.api_rectify = None;
        self.dnssec = None;
        self.presigned = None;
        self.last_check = None;
    }
}

/// Summary entry returned by the zone listing endpoint.
///
/// The listing omits `rrsets`; use [`crate::client::PowerDnsClient::get_zone`]
/// to fetch the full document.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ZoneSummary {
    /// Zone name, fully qualified.
    pub name: String,

    /// Zone kind: `Native`, `Master` or `Slave`.
    #[serde(default)]
    pub kind: Option<String>,

    /// SOA serial as seen by the server.
    #[serde(default)]
    pub serial: Option<u64>,
}

/// Kind of record-set mutation in a zone PATCH.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// Replace the record set with the carried state, creating it if absent.
    Replace,
    /// Delete the record set identified by `(name, type)`.
    Delete,
}

/// One record-set mutation within a zone PATCH request.
///
/// `REPLACE` carries the full desired state; `DELETE` carries only the
/// identifying pair, which is why `ttl`, `records` and `comments` are
/// optional and omitted from the wire form when unset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Change {
    /// Fully qualified owner name.
    pub name: String,

    /// Uppercase record type token.
    #[serde(rename = "type")]
    pub rtype: String,

    /// The mutation kind.
    pub changetype: ChangeType,

    /// Desired TTL; only present on `REPLACE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,

    /// Desired records; only present on `REPLACE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Record>>,

    /// Desired comments; only present on `REPLACE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl Change {
    /// Build a `REPLACE` change carrying the full state of `rrset`.
    #[must_use]
    pub fn replace(rrset: &RrSet) -> Self {
        Self {
            name: normalize_name(&rrset.name),
            rtype: rrset.rtype.clone(),
            changetype: ChangeType::Replace,
            ttl: Some(rrset.ttl),
            records: Some(rrset.records.clone()),
            comments: if rrset.comments.is_empty() {
                None
            } else {
                Some(rrset.comments.clone())
            },
        }
    }

    /// Build a `DELETE` change identifying `rrset`.
    #[must_use]
    pub fn delete(rrset: &RrSet) -> Self {
        Self {
            name: normalize_name(&rrset.name),
            rtype: rrset.rtype.clone(),
            changetype: ChangeType::Delete,
            ttl: None,
            records: None,
            comments: None,
        }
    }
}

/// Action the migrator took (or would take, under dry-run) for one zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MigratorAction {
    /// Zone was absent on the target and has been created.
    CreateZone,
    /// Zone existed and received a record-set PATCH.
    PatchZone,
    /// Zone existed and was deleted, then created from source state.
    RecreateZone,
    /// Zone already matched the source; nothing was sent.
    Noop,
}

impl MigratorAction {
    /// Stable uppercase label used in logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateZone => "CREATE_ZONE",
            Self::PatchZone => "PATCH_ZONE",
            Self::RecreateZone => "RECREATE_ZONE",
            Self::Noop => "NOOP",
        }
    }
}

impl fmt::Display for MigratorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "zone_tests.rs"]
mod zone_tests;
