// SPDX-License-Identifier: MIT

//! Zone sanitization: canonical form for diffing and upload.
//!
//! A raw zone document from a server carries read-only fields, mixed-case
//! names and backend-specific TXT escaping. The [`Sanitizer`] turns it into
//! a canonical [`Zone`]:
//!
//! 1. server-managed fields are stripped,
//! 2. zone and owner names get their trailing dot, types are uppercased,
//! 3. optional TXT-escape normalization makes byte-identical TXT records
//!    from different backends compare equal,
//! 4. optional CNAME-conflict repairs drop the losing record sets,
//! 5. record sets are sorted by `(name, type)` for deterministic diffs.
//!
//! Source zones are validated after repairs: a remaining CNAME conflict,
//! a duplicate `(name, type)` pair or an out-of-zone owner is a
//! [`MigrateError::Validation`]. Target zones are sanitized for comparison
//! only and never validated; whatever is wrong on the target is expressed
//! through the diff.

use crate::errors::MigrateError;
use crate::zone::{name_key, normalize_name, RrSet, Zone};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::warn;

/// Record types subject to TXT-escape normalization.
const TXT_LIKE_TYPES: [&str; 2] = ["TXT", "SPF"];

/// Zone kind assumed when the source document omits one.
const DEFAULT_ZONE_KIND: &str = "Native";

/// Toggles for the optional sanitization steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct SanitizeOptions {
    /// Decode `\NNN` escapes in TXT/SPF records and re-serialize them in
    /// canonical quoting, so equivalent records from different backends
    /// compare equal.
    pub normalize_txt_escapes: bool,

    /// Resolve owners that carry a CNAME next to other record types:
    /// at the apex the CNAME is dropped, elsewhere the CNAME wins.
    pub auto_fix_cname_conflicts: bool,

    /// Trim CNAME record sets with more than one record to their first
    /// record.
    pub auto_fix_double_cname_conflicts: bool,
}

/// Pure transformation from raw server zones to canonical zones.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sanitizer {
    options: SanitizeOptions,
}

impl Sanitizer {
    /// Build a sanitizer with the given option set.
    #[must_use]
    pub const fn new(options: SanitizeOptions) -> Self {
        Self { options }
    }

    /// Sanitize a zone fetched from the source server.
    ///
    /// Applies every normalization step, the enabled repairs, and the
    /// structural validation. The result is safe to upload and to diff.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Validation`] when the zone still has a
    /// CNAME conflict after repairs, when two record sets share a
    /// `(name, type)` pair, or when an owner lies outside the zone.
    pub fn sanitize_source(&self, zone: &Zone) -> Result<Zone, MigrateError> {
        let mut sanitized = self.sanitize_common(zone);

        if self.options.auto_fix_double_cname_conflicts {
            for rrset in &mut sanitized.rrsets {
                trim_double_cname(rrset);
            }
        }
        if self.options.auto_fix_cname_conflicts {
            sanitized.rrsets = repair_cname_conflicts(sanitized.rrsets, &sanitized.name);
        }
        sort_rrsets(&mut sanitized.rrsets);

        validate(&sanitized)?;
        Ok(sanitized)
    }

    /// Sanitize a zone fetched from the target server, for comparison.
    ///
    /// Runs the same normalization as [`Self::sanitize_source`] but skips
    /// CNAME repairs and validation: target-side defects are corrected by
    /// the computed diff, not rejected up front.
    #[must_use]
    pub fn sanitize_target(&self, zone: &Zone) -> Zone {
        let mut sanitized = self.sanitize_common(zone);
        sort_rrsets(&mut sanitized.rrsets);
        sanitized
    }

    /// Steps shared by both sides: field stripping, name/type/TTL
    /// normalization, TXT-escape normalization.
    fn sanitize_common(&self, zone: &Zone) -> Zone {
        let mut sanitized = zone.clone();
        sanitized.clear_read_only_fields();
        sanitized.name = normalize_name(&zone.name);
        if sanitized.kind.is_none() {
            sanitized.kind = Some(DEFAULT_ZONE_KIND.to_string());
        }
        sanitized.rrsets = zone.rrsets.iter().map(|rr| self.sanitize_rrset(rr)).collect();
        sanitized
    }

    fn sanitize_rrset(&self, rrset: &RrSet) -> RrSet {
        let rtype = rrset.rtype.to_ascii_uppercase();
        let mut records = rrset.records.clone();
        if self.options.normalize_txt_escapes && TXT_LIKE_TYPES.contains(&rtype.as_str()) {
            for record in &mut records {
                record.content = normalize_txt_content(&record.content);
            }
        }
        RrSet {
            name: normalize_name(&rrset.name),
            rtype,
            ttl: rrset.ttl,
            records,
            comments: rrset.comments.clone(),
        }
    }
}

/// Sort record sets by case-insensitive `(name, type)`.
fn sort_rrsets(rrsets: &mut [RrSet]) {
    rrsets.sort_by_key(RrSet::key);
}

/// Trim a multi-record CNAME record set to its first record.
fn trim_double_cname(rrset: &mut RrSet) {
    if rrset.rtype != "CNAME" || rrset.records.len() <= 1 {
        return;
    }
    let removed: Vec<&str> = rrset.records[1..]
        .iter()
        .map(|r| r.content.as_str())
        .collect();
    warn!(
        owner = %rrset.name,
        kept = %rrset.records[0].content,
        removed = ?removed,
        "Auto-fix: trimming CNAME record set to its first record"
    );
    rrset.records.truncate(1);
}

/// Resolve owners carrying a CNAME alongside other record types.
///
/// At the zone apex a CNAME is invalid outright, so the CNAME loses and
/// the sibling record sets are kept. Anywhere else the DNS rule is that a
/// CNAME owner carries nothing else, so the CNAME wins and the siblings
/// are dropped.
fn repair_cname_conflicts(rrsets: Vec<RrSet>, zone_name: &str) -> Vec<RrSet> {
    let apex = name_key(zone_name);
    let mut by_owner: BTreeMap<String, Vec<RrSet>> = BTreeMap::new();
    for rrset in rrsets {
        by_owner.entry(name_key(&rrset.name)).or_default().push(rrset);
    }

    let mut repaired = Vec::new();
    for (owner, group) in by_owner {
        let has_cname = group.iter().any(|rr| rr.rtype == "CNAME");
        if !has_cname {
            repaired.extend(group);
            continue;
        }

        if owner == apex {
            let (dropped, kept): (Vec<RrSet>, Vec<RrSet>) =
                group.into_iter().partition(|rr| rr.rtype == "CNAME");
            warn!(
                owner = %owner,
                removed = ?record_contents(&dropped),
                kept = ?record_contents(&kept),
                "Auto-fix: dropping CNAME record set at zone apex"
            );
            repaired.extend(kept);
            continue;
        }

        let (kept, dropped): (Vec<RrSet>, Vec<RrSet>) =
            group.into_iter().partition(|rr| rr.rtype == "CNAME");
        if dropped.is_empty() {
            repaired.extend(kept);
            continue;
        }
        let removed_types: Vec<&str> = dropped.iter().map(|rr| rr.rtype.as_str()).collect();
        warn!(
            owner = %owner,
            removed_types = ?removed_types,
            removed = ?record_contents(&dropped),
            kept = ?record_contents(&kept),
            "Auto-fix: dropping record sets that conflict with a CNAME"
        );
        repaired.extend(kept);
    }
    repaired
}

fn record_contents(rrsets: &[RrSet]) -> Vec<&str> {
    rrsets
        .iter()
        .flat_map(|rr| rr.records.iter().map(|r| r.content.as_str()))
        .collect()
}

/// Structural validation of a sanitized source zone.
fn validate(zone: &Zone) -> Result<(), MigrateError> {
    let apex = name_key(&zone.name);

    let mut by_owner: BTreeMap<String, Vec<&RrSet>> = BTreeMap::new();
    for rrset in &zone.rrsets {
        by_owner.entry(name_key(&rrset.name)).or_default().push(rrset);
    }
    for (owner, group) in &by_owner {
        let has_cname = group.iter().any(|rr| rr.rtype == "CNAME");
        if has_cname && group.len() > 1 {
            let other_types: Vec<&str> = group
                .iter()
                .filter(|rr| rr.rtype != "CNAME")
                .map(|rr| rr.rtype.as_str())
                .collect();
            if !other_types.is_empty() {
                return Err(MigrateError::Validation {
                    zone: zone.name.clone(),
                    reason: format!(
                        "owner {owner} carries a CNAME alongside {other_types:?}; \
                         rerun with CNAME auto-fixing to resolve"
                    ),
                });
            }
        }
    }

    let mut keys: Vec<(String, String)> = zone.rrsets.iter().map(RrSet::key).collect();
    keys.sort();
    for pair in keys.windows(2) {
        if pair[0] == pair[1] {
            return Err(MigrateError::Validation {
                zone: zone.name.clone(),
                reason: format!("duplicate record set {}/{}", pair[0].0, pair[0].1),
            });
        }
    }

    for rrset in &zone.rrsets {
        let owner = name_key(&rrset.name);
        let in_zone = apex == "."
            || owner == apex
            || owner.ends_with(&format!(".{apex}"));
        if !in_zone {
            return Err(MigrateError::Validation {
                zone: zone.name.clone(),
                reason: format!("owner {} is outside the zone", rrset.name),
            });
        }
    }

    Ok(())
}

/// Re-serialize TXT record content in the server's canonical quoting.
///
/// Escape triplets `\NNN` are decoded to raw bytes: decimal when the value
/// fits a byte, octal when the digits are octal and the decimal reading
/// does not fit (MySQL-era backends emit octal escapes for the same
/// bytes). Undecodable triplets stay literal. The decoded bytes are then
/// re-escaped canonically: printable ASCII literal, `"` and `\`
/// backslash-escaped, everything else as three-digit decimal `\NNN`.
/// Unescaped `"` characters delimit character strings and pass through
/// untouched.
#[must_use]
pub fn normalize_txt_content(content: &str) -> String {
    let bytes = content.as_bytes();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && i + 1 < bytes.len() {
            if bytes[i + 1].is_ascii_digit() {
                // RFC 1035 quoted digits must form a full \DDD triplet; a
                // partial or unparseable one keeps its backslash literal.
                if i + 3 < bytes.len()
                    && bytes[i + 2].is_ascii_digit()
                    && bytes[i + 3].is_ascii_digit()
                {
                    if let Some(value) = decode_escape_triplet(&bytes[i + 1..i + 4]) {
                        push_canonical_byte(&mut out, value);
                        i += 4;
                        continue;
                    }
                }
                push_canonical_byte(&mut out, b'\\');
                i += 1;
                continue;
            }
            push_canonical_byte(&mut out, bytes[i + 1]);
            i += 2;
            continue;
        }
        if b == b'"' {
            out.push('"');
            i += 1;
            continue;
        }
        push_canonical_byte(&mut out, b);
        i += 1;
    }
    out
}

/// Decode a three-digit escape as decimal, falling back to octal.
fn decode_escape_triplet(digits: &[u8]) -> Option<u8> {
    let decimal: u32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    if decimal <= 255 {
        return Some(decimal as u8);
    }
    if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
        let octal = digits
            .iter()
            .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
        if octal <= 255 {
            return Some(octal as u8);
        }
    }
    None
}

/// Append one byte in canonical TXT escaping.
fn push_canonical_byte(out: &mut String, value: u8) {
    match value {
        b'"' => out.push_str("\\\""),
        b'\\' => out.push_str("\\\\"),
        0x20..=0x7E => out.push(char::from(value)),
        _ => {
            let _ = write!(out, "\\{value:03}");
        }
    }
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod sanitize_tests;
