// SPDX-License-Identifier: MIT

//! Per-zone migration pipeline.
//!
//! A [`ZoneMigrator`] runs one zone through a fixed sequence: fetch from
//! source, sanitize, probe the target, then branch:
//!
//! - target absent: create the zone from the sanitized source,
//! - target present and identical: no-op,
//! - target present and differing: one PATCH with the computed diff, or
//!   delete-and-create when recreate mode is on.
//!
//! Under dry-run the probe and fetch still happen but every mutation is
//! skipped; the decided action and change list are reported either way.
//! Re-running a successful migration always yields a no-op, recreate mode
//! included.

use crate::client::ZoneApi;
use crate::diff::{build_changes, DiffOptions};
use crate::errors::MigrateError;
use crate::sanitize::{SanitizeOptions, Sanitizer};
use crate::zone::{normalize_name, Change, MigratorAction, Zone};
use std::sync::Arc;
use tracing::debug;

/// Behavior switches for one migration run.
#[derive(Clone, Copy, Debug, Default)]
pub struct MigrateOptions {
    /// Delete and re-create a differing target zone instead of patching.
    pub recreate: bool,

    /// Skip every mutating call; still probe, diff and report.
    pub dry_run: bool,

    /// Ignore SOA serial drift when comparing zones.
    pub ignore_soa_serial: bool,

    /// Sanitizer toggles (TXT escapes, CNAME repairs).
    pub sanitize: SanitizeOptions,
}

/// Result of migrating a single zone.
#[derive(Clone, Debug)]
pub struct MigrationOutcome {
    /// Normalized zone name.
    pub zone: String,

    /// Action taken, or decided under dry-run.
    pub action: MigratorAction,

    /// Mutations applied (or that would be applied under dry-run). For a
    /// create or recreate this is the full sanitized record-set list as
    /// replaces.
    pub changes: Vec<Change>,

    /// The sanitized source zone that was (or would be) submitted.
    pub source_zone: Zone,

    /// Target-side document: the server's create response for
    /// create/recreate, the sanitized existing zone for a no-op. Absent
    /// under dry-run and after a patch.
    pub target_zone: Option<Zone>,
}

/// Orchestrates the fetch → sanitize → probe → decide → execute pipeline
/// for individual zones.
pub struct ZoneMigrator {
    source: Arc<dyn ZoneApi>,
    target: Arc<dyn ZoneApi>,
    sanitizer: Sanitizer,
    options: MigrateOptions,
}

impl ZoneMigrator {
    /// Build a migrator over a source and a target API client.
    #[must_use]
    pub fn new(source: Arc<dyn ZoneApi>, target: Arc<dyn ZoneApi>, options: MigrateOptions) -> Self {
        Self {
            source,
            target,
            sanitizer: Sanitizer::new(options.sanitize),
            options,
        }
    }

    /// Migrate one zone from source to target.
    ///
    /// # Errors
    ///
    /// Propagates any client, validation or cancellation error; a 409/422
    /// rejection of a mutation is reported as [`MigrateError::Conflict`]
    /// with the zone name attached.
    pub async fn migrate(&self, zone_name: &str) -> Result<MigrationOutcome, MigrateError> {
        let zone = normalize_name(zone_name);

        let raw_source = self.source.get_zone(&zone).await?;
        let sanitized = self.sanitizer.sanitize_source(&raw_source)?;
        let existing = self.target.zone_exists(&zone).await?;

        let Some(raw_target) = existing else {
            return self.create_missing(zone, sanitized).await;
        };

        let target_sanitized = self.sanitizer.sanitize_target(&raw_target);
        let changes = build_changes(
            &sanitized.rrsets,
            &target_sanitized.rrsets,
            DiffOptions {
                ignore_soa_serial: self.options.ignore_soa_serial,
            },
        );

        if changes.is_empty() {
            debug!(zone = %zone, "Zone already in sync");
            return Ok(MigrationOutcome {
                zone,
                action: MigratorAction::Noop,
                changes,
                source_zone: sanitized,
                target_zone: Some(target_sanitized),
            });
        }

        debug!(zone = %zone, pending = changes.len(), "Zone differs from source");

        if self.options.recreate {
            return self.recreate_existing(zone, sanitized).await;
        }

        if !self.options.dry_run {
            self.target
                .patch_rrsets(&zone, &changes)
                .await
                .map_err(|e| conflict_for(&zone, e))?;
        }
        debug!(zone = %zone, changes = changes.len(), "Zone patched on target");
        Ok(MigrationOutcome {
            zone,
            action: MigratorAction::PatchZone,
            changes,
            source_zone: sanitized,
            target_zone: None,
        })
    }

    /// Target does not have the zone: create it from source state.
    async fn create_missing(
        &self,
        zone: String,
        sanitized: Zone,
    ) -> Result<MigrationOutcome, MigrateError> {
        let changes = full_replace_changes(&sanitized);
        let created = if self.options.dry_run {
            None
        } else {
            Some(
                self.target
                    .create_zone(&sanitized)
                    .await
                    .map_err(|e| conflict_for(&zone, e))?,
            )
        };
        debug!(zone = %zone, rrsets = sanitized.rrsets.len(), "Zone created on target");
        Ok(MigrationOutcome {
            zone,
            action: MigratorAction::CreateZone,
            changes,
            source_zone: sanitized,
            target_zone: created,
        })
    }

    /// Target has a differing zone and recreate mode is on: replace it
    /// wholesale.
    async fn recreate_existing(
        &self,
        zone: String,
        sanitized: Zone,
    ) -> Result<MigrationOutcome, MigrateError> {
        let changes = full_replace_changes(&sanitized);
        let created = if self.options.dry_run {
            None
        } else {
            self.target.delete_zone(&zone).await?;
            Some(
                self.target
                    .create_zone(&sanitized)
                    .await
                    .map_err(|e| conflict_for(&zone, e))?,
            )
        };
        debug!(zone = %zone, rrsets = sanitized.rrsets.len(), "Zone recreated on target");
        Ok(MigrationOutcome {
            zone,
            action: MigratorAction::RecreateZone,
            changes,
            source_zone: sanitized,
            target_zone: created,
        })
    }
}

/// The full record-set list of a zone, expressed as `REPLACE` changes.
fn full_replace_changes(zone: &Zone) -> Vec<Change> {
    zone.rrsets.iter().map(Change::replace).collect()
}

/// Re-tag a 409/422 rejection with the zone it concerned.
fn conflict_for(zone: &str, error: MigrateError) -> MigrateError {
    match error {
        MigrateError::Http {
            status: status @ (409 | 422),
            body,
            ..
        } => MigrateError::Conflict {
            zone: zone.to_string(),
            status,
            body,
        },
        other => other,
    }
}

#[cfg(test)]
#[path = "migrator_tests.rs"]
mod migrator_tests;
