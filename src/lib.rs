// SPDX-License-Identifier: MIT

//! # pdns-migrate - PowerDNS Zone Migration
//!
//! Migrates authoritative DNS zones between two PowerDNS Authoritative
//! servers by speaking their HTTP management API.
//!
//! ## Overview
//!
//! Each zone runs through a linear pipeline: fetch from the source server,
//! sanitize into canonical form, probe the target, then create, patch or
//! recreate the zone so its record sets match the source. A batch driver
//! runs many of these pipelines concurrently with bounded parallelism,
//! periodic progress reporting and graceful cancellation.
//!
//! ## Modules
//!
//! - [`client`] - Typed, retrying HTTP client for the PowerDNS API
//! - [`sanitize`] - Canonical zone form: field stripping, name and TXT
//!   normalization, CNAME-conflict repair
//! - [`diff`] - Minimal record-set mutations between two zones
//! - [`migrator`] - Per-zone fetch → sanitize → probe → execute pipeline
//! - [`batch`] - Bounded worker pool, on-error policy, progress, shutdown
//! - [`config`] - Connection settings and zone-list input
//! - [`errors`] - Shared error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use pdns_migrate::batch::{BatchDriver, BatchOptions};
//! use pdns_migrate::client::PowerDnsClient;
//! use pdns_migrate::config::ConnectionConfig;
//! use pdns_migrate::migrator::{MigrateOptions, ZoneMigrator};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cancel = CancellationToken::new();
//! let source = Arc::new(PowerDnsClient::new(
//!     ConnectionConfig::new("https://old-pdns:8081", "source-key"),
//!     cancel.clone(),
//! )?);
//! let target = Arc::new(PowerDnsClient::new(
//!     ConnectionConfig::new("https://new-pdns:8081", "target-key"),
//!     cancel.clone(),
//! )?);
//!
//! let migrator = Arc::new(ZoneMigrator::new(source, target, MigrateOptions::default()));
//! let driver = BatchDriver::new(migrator, BatchOptions::default());
//! let report = driver
//!     .run(vec!["example.com".into()], &cancel, &CancellationToken::new())
//!     .await;
//! println!("{} zones migrated", report.succeeded());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod diff;
pub mod errors;
pub mod migrator;
pub mod retry;
pub mod sanitize;
pub mod zone;
