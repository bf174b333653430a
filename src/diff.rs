// SPDX-License-Identifier: MIT

//! Record-set diffing between a sanitized source and target zone.
//!
//! The diff is the minimal list of PATCH mutations that makes the target
//! equal to the source: a `REPLACE` for every record set missing or
//! differing on the target, a `DELETE` for every record set the source no
//! longer has. `REPLACE`s are emitted before `DELETE`s, each group sorted
//! by `(name, type)`, so a replace of an owner lands before the delete of
//! a sibling and the server never sees a transiently conflicting state.

use crate::zone::{Change, RrSet};
use std::collections::BTreeMap;

/// Equivalence configuration for the diff.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiffOptions {
    /// Treat SOA record sets as equal when everything but the serial
    /// matches; emitted SOA replaces then keep the target's serial.
    pub ignore_soa_serial: bool,
}

/// Compute the mutations that reconcile `target` onto `source`.
///
/// Both slices must already be sanitized; equality is TTL plus records
/// and comments as multisets. Returns an empty list iff the zones are
/// equivalent under `options`.
#[must_use]
pub fn build_changes(source: &[RrSet], target: &[RrSet], options: DiffOptions) -> Vec<Change> {
    let source_map: BTreeMap<(String, String), &RrSet> =
        source.iter().map(|rr| (rr.key(), rr)).collect();
    let target_map: BTreeMap<(String, String), &RrSet> =
        target.iter().map(|rr| (rr.key(), rr)).collect();

    let mut changes = Vec::new();

    for (key, source_rrset) in &source_map {
        match target_map.get(key) {
            None => changes.push(Change::replace(source_rrset)),
            Some(target_rrset) => {
                if rrsets_equal(source_rrset, target_rrset, options.ignore_soa_serial) {
                    continue;
                }
                if options.ignore_soa_serial && source_rrset.rtype == "SOA" {
                    let desired = preserve_target_soa_serial(source_rrset, target_rrset);
                    changes.push(Change::replace(&desired));
                } else {
                    changes.push(Change::replace(source_rrset));
                }
            }
        }
    }

    for (key, target_rrset) in &target_map {
        if !source_map.contains_key(key) {
            changes.push(Change::delete(target_rrset));
        }
    }

    changes
}

/// Record-set equivalence: TTL, records and comments as multisets.
///
/// Comment `modified_at` timestamps are server-managed and excluded.
#[must_use]
pub fn rrsets_equal(source: &RrSet, target: &RrSet, ignore_soa_serial: bool) -> bool {
    source.ttl == target.ttl
        && normalized_records(source, ignore_soa_serial)
            == normalized_records(target, ignore_soa_serial)
        && normalized_comments(source) == normalized_comments(target)
}

fn normalized_records(rrset: &RrSet, ignore_soa_serial: bool) -> Vec<(String, bool)> {
    let neutralize = ignore_soa_serial && rrset.rtype == "SOA";
    let mut records: Vec<(String, bool)> = rrset
        .records
        .iter()
        .map(|record| {
            let content = if neutralize {
                soa_with_serial(&record.content, "0")
            } else {
                record.content.clone()
            };
            (content, record.disabled)
        })
        .collect();
    records.sort();
    records
}

fn normalized_comments(rrset: &RrSet) -> Vec<(String, String)> {
    let mut comments: Vec<(String, String)> = rrset
        .comments
        .iter()
        .map(|comment| (comment.content.clone(), comment.account.clone()))
        .collect();
    comments.sort();
    comments
}

/// Rewrite the serial field (third token) of an SOA content string.
///
/// Content with fewer than the seven SOA fields is returned unchanged.
fn soa_with_serial(content: &str, serial: &str) -> String {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 7 {
        return content.to_string();
    }
    let mut parts = parts;
    parts[2] = serial;
    parts.join(" ")
}

/// Copy the target's SOA serial into the source record set.
///
/// Used when the serial is ignored in equality but the SOA still needs a
/// replace for other fields: patching must not bump (or rewind) the
/// serial the target already has.
fn preserve_target_soa_serial(source: &RrSet, target: &RrSet) -> RrSet {
    let Some(target_content) = target.records.first().map(|r| r.content.as_str()) else {
        return source.clone();
    };
    let target_parts: Vec<&str> = target_content.split_whitespace().collect();
    if target_parts.len() < 7 {
        return source.clone();
    }
    let target_serial = target_parts[2];

    let mut desired = source.clone();
    for record in &mut desired.records {
        record.content = soa_with_serial(&record.content, target_serial);
    }
    desired
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
