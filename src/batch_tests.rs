// SPDX-License-Identifier: MIT

//! Unit tests for the batch driver: ordering, error policy, cancellation
//! and graceful shutdown.

#[cfg(test)]
mod tests {
    use crate::batch::{BatchDriver, BatchOptions, OnError};
    use crate::client::ZoneApi;
    use crate::errors::MigrateError;
    use crate::migrator::{MigrateOptions, ZoneMigrator};
    use crate::zone::{name_key, Change, Record, RrSet, Zone};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Source-side stand-in with per-call latency, optional failing
    /// zones, and optional cancellation awareness (the real client
    /// aborts in-flight requests when the shared token fires).
    struct SlowSource {
        zones: Mutex<HashMap<String, Zone>>,
        fail: HashSet<String>,
        delay: Duration,
        delay_overrides: HashMap<String, Duration>,
        cancel: Option<CancellationToken>,
    }

    impl SlowSource {
        fn new(zone_names: &[&str], delay: Duration, cancel: Option<CancellationToken>) -> Self {
            let mut zones = HashMap::new();
            for name in zone_names {
                zones.insert(name_key(name), simple_zone(name));
            }
            Self {
                zones: Mutex::new(zones),
                fail: HashSet::new(),
                delay,
                delay_overrides: HashMap::new(),
                cancel,
            }
        }

        fn failing(mut self, zone_name: &str) -> Self {
            self.fail.insert(name_key(zone_name));
            self
        }

        fn delayed(mut self, zone_name: &str, delay: Duration) -> Self {
            self.delay_overrides.insert(name_key(zone_name), delay);
            self
        }

        async fn wait(&self, zone_name: &str) -> Result<(), MigrateError> {
            let delay = self
                .delay_overrides
                .get(&name_key(zone_name))
                .copied()
                .unwrap_or(self.delay);
            match &self.cancel {
                Some(cancel) => tokio::select! {
                    () = cancel.cancelled() => Err(MigrateError::Cancelled),
                    () = tokio::time::sleep(delay) => Ok(()),
                },
                None => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl ZoneApi for SlowSource {
        async fn get_zone(&self, zone_name: &str) -> Result<Zone, MigrateError> {
            self.wait(zone_name).await?;
            if self.fail.contains(&name_key(zone_name)) {
                return Err(MigrateError::Http {
                    method: "GET",
                    url: format!("/zones/{zone_name}"),
                    status: 500,
                    body: "backend failure".to_string(),
                });
            }
            self.zones
                .lock()
                .unwrap()
                .get(&name_key(zone_name))
                .cloned()
                .ok_or_else(|| MigrateError::Http {
                    method: "GET",
                    url: format!("/zones/{zone_name}"),
                    status: 404,
                    body: "Not Found".to_string(),
                })
        }

        async fn zone_exists(&self, zone_name: &str) -> Result<Option<Zone>, MigrateError> {
            match self.get_zone(zone_name).await {
                Ok(zone) => Ok(Some(zone)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        }

        async fn create_zone(&self, zone: &Zone) -> Result<Zone, MigrateError> {
            self.zones
                .lock()
                .unwrap()
                .insert(name_key(&zone.name), zone.clone());
            Ok(zone.clone())
        }

        async fn delete_zone(&self, zone_name: &str) -> Result<(), MigrateError> {
            self.zones.lock().unwrap().remove(&name_key(zone_name));
            Ok(())
        }

        async fn patch_rrsets(&self, _: &str, _: &[Change]) -> Result<(), MigrateError> {
            Ok(())
        }
    }

    fn simple_zone(name: &str) -> Zone {
        let owner = crate::zone::normalize_name(name);
        Zone {
            name: owner.clone(),
            kind: Some("Native".to_string()),
            rrsets: vec![RrSet {
                name: owner,
                rtype: "A".to_string(),
                ttl: 300,
                records: vec![Record {
                    content: "192.0.2.1".to_string(),
                    disabled: false,
                }],
                comments: Vec::new(),
            }],
            ..Zone::default()
        }
    }

    /// Empty target: every zone is created fresh.
    fn empty_target(cancel: Option<CancellationToken>) -> Arc<SlowSource> {
        Arc::new(SlowSource::new(&[], Duration::ZERO, cancel))
    }

    fn driver(source: Arc<SlowSource>, target: Arc<SlowSource>, options: BatchOptions) -> BatchDriver {
        let migrator = Arc::new(ZoneMigrator::new(source, target, MigrateOptions::default()));
        BatchDriver::new(migrator, options)
    }

    fn quiet_options() -> BatchOptions {
        BatchOptions {
            progress_interval: Duration::ZERO,
            ..BatchOptions::default()
        }
    }

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    // ========================================================================
    // Ordering and Aggregation Tests
    // ========================================================================

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        let input = ["c.test", "a.test", "b.test", "d.test"];
        let source = Arc::new(SlowSource::new(&input, Duration::from_millis(5), None));
        let d = driver(
            source,
            empty_target(None),
            BatchOptions {
                concurrency: 4,
                ..quiet_options()
            },
        );

        let report = d
            .run(zones(&input), &CancellationToken::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.results.len(), input.len());
        let names: Vec<&str> = report.results.iter().map(|r| r.zone.as_str()).collect();
        assert_eq!(names, input, "results must keep input order and spelling");
        assert!(report.all_succeeded());
        assert!(!report.stopped_by_policy);
        assert!(!report.interrupted);
        assert!(!report.grace_expired);
    }

    #[tokio::test]
    async fn test_concurrency_one_runs_sequentially() {
        let input = ["a.test", "b.test"];
        let source = Arc::new(SlowSource::new(&input, Duration::from_millis(1), None));
        let d = driver(
            source,
            empty_target(None),
            BatchOptions {
                concurrency: 1,
                ..quiet_options()
            },
        );

        let report = d
            .run(zones(&input), &CancellationToken::new(), &CancellationToken::new())
            .await;
        assert!(report.all_succeeded());
        assert_eq!(report.succeeded(), 2);
    }

    #[tokio::test]
    async fn test_action_totals() {
        let input = ["a.test", "b.test"];
        let source = Arc::new(SlowSource::new(&input, Duration::ZERO, None));
        let d = driver(source, empty_target(None), quiet_options());

        let report = d
            .run(zones(&input), &CancellationToken::new(), &CancellationToken::new())
            .await;
        assert_eq!(report.action_totals().get("CREATE_ZONE"), Some(&2));
    }

    // ========================================================================
    // Error Policy Tests
    // ========================================================================

    #[tokio::test]
    async fn test_continue_policy_records_and_proceeds() {
        let input = ["a.test", "bad.test", "c.test"];
        let source = Arc::new(
            SlowSource::new(&input, Duration::from_millis(1), None).failing("bad.test"),
        );
        let d = driver(source, empty_target(None), quiet_options());

        let report = d
            .run(zones(&input), &CancellationToken::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.stopped_by_policy);
        assert!(report.results[1].outcome.is_err());
        assert_eq!(report.error_totals().get("http"), Some(&1));
    }

    #[tokio::test]
    async fn test_stop_policy_cancels_remaining_zones() {
        let cancel = CancellationToken::new();
        let input = ["z1.test", "z2.test", "z3.test", "z4.test"];
        // z1 finishes well before z2 fails; z3/z4 are slow enough that the
        // stop beats them whether or not a worker picked them up.
        let source = Arc::new(
            SlowSource::new(&input, Duration::from_millis(200), Some(cancel.clone()))
                .delayed("z1.test", Duration::from_millis(1))
                .delayed("z2.test", Duration::from_millis(50))
                .failing("z2.test"),
        );
        let d = driver(
            source,
            empty_target(Some(cancel.clone())),
            BatchOptions {
                concurrency: 2,
                on_error: OnError::Stop,
                ..quiet_options()
            },
        );

        let report = d.run(zones(&input), &cancel, &CancellationToken::new()).await;

        assert!(report.stopped_by_policy);
        assert!(!report.interrupted);
        assert_eq!(report.results.len(), 4, "every input zone gets a result");
        assert!(report.results[0].outcome.is_ok(), "z1 was already in flight");
        let z2 = report.results[1].outcome.as_ref().unwrap_err();
        assert_eq!(z2.kind(), "http", "z2 carries the triggering error");
        for result in &report.results[2..] {
            let error = result.outcome.as_ref().unwrap_err();
            assert_eq!(
                error.kind(),
                "cancelled",
                "{} must be cancelled, got {error}",
                result.zone
            );
        }
    }

    // ========================================================================
    // Cancellation Tests
    // ========================================================================

    #[tokio::test]
    async fn test_interrupt_cancels_gracefully() {
        let cancel = CancellationToken::new();
        let input = ["a.test", "b.test", "c.test"];
        let source = Arc::new(SlowSource::new(
            &input,
            Duration::from_secs(30),
            Some(cancel.clone()),
        ));
        let d = driver(
            source,
            empty_target(Some(cancel.clone())),
            BatchOptions {
                concurrency: 2,
                ..quiet_options()
            },
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let report = d.run(zones(&input), &cancel, &CancellationToken::new()).await;

        assert!(report.interrupted);
        assert!(!report.grace_expired, "zones unwound within the grace period");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.results.len(), 3);
        for result in &report.results {
            assert_eq!(result.outcome.as_ref().unwrap_err().kind(), "cancelled");
        }
    }

    #[tokio::test]
    async fn test_graceful_timeout_expires_on_stuck_zone() {
        let cancel = CancellationToken::new();
        let input = ["stuck.test"];
        // No token: this source ignores cancellation entirely.
        let source = Arc::new(SlowSource::new(&input, Duration::from_secs(30), None));
        let d = driver(
            source,
            empty_target(None),
            BatchOptions {
                concurrency: 1,
                graceful_timeout: Duration::from_millis(100),
                ..quiet_options()
            },
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let report = d.run(zones(&input), &cancel, &CancellationToken::new()).await;

        assert!(report.interrupted);
        assert!(report.grace_expired);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "the stuck zone must be abandoned"
        );
        assert_eq!(report.results[0].outcome.as_ref().unwrap_err().kind(), "cancelled");
    }

    #[tokio::test]
    async fn test_second_signal_forces_abandonment() {
        let cancel = CancellationToken::new();
        let forced = CancellationToken::new();
        let input = ["stuck.test"];
        let source = Arc::new(SlowSource::new(&input, Duration::from_secs(30), None));
        let d = driver(
            source,
            empty_target(None),
            BatchOptions {
                concurrency: 1,
                graceful_timeout: Duration::ZERO,
                ..quiet_options()
            },
        );

        let first = cancel.clone();
        let second = forced.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            first.cancel();
            tokio::time::sleep(Duration::from_millis(60)).await;
            second.cancel();
        });

        let started = std::time::Instant::now();
        let report = d.run(zones(&input), &cancel, &forced).await;

        assert!(report.interrupted);
        assert!(report.grace_expired, "forced abandonment sets the flag");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let input = ["a.test", "b.test"];
        let source = Arc::new(SlowSource::new(&input, Duration::ZERO, Some(cancel.clone())));
        let d = driver(source, empty_target(Some(cancel.clone())), quiet_options());

        let report = d.run(zones(&input), &cancel, &CancellationToken::new()).await;

        assert_eq!(report.results.len(), 2);
        for result in &report.results {
            assert_eq!(result.outcome.as_ref().unwrap_err().kind(), "cancelled");
        }
    }
}
