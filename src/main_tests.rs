// SPDX-License-Identifier: MIT

//! Unit tests for argument parsing, pre-flight validation and exit codes.

#[cfg(test)]
mod tests {
    use crate::{exit_code_for, validate_args, Args};
    use clap::Parser;
    use pdns_migrate::batch::{BatchReport, OnError, ZoneResult};
    use pdns_migrate::errors::MigrateError;
    use std::time::Duration;

    fn base_args() -> Vec<&'static str> {
        vec![
            "pdns-migrate",
            "--source-url",
            "https://old:8081",
            "--source-key",
            "src-key",
            "--target-url",
            "https://new:8081",
            "--target-key",
            "tgt-key",
        ]
    }

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = base_args();
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    // ========================================================================
    // Argument Parsing Tests
    // ========================================================================

    #[test]
    fn test_zone_or_zones_file_is_required() {
        assert!(parse(&[]).is_err(), "one zone input is required");
    }

    #[test]
    fn test_zone_and_zones_file_are_exclusive() {
        let result = parse(&["--zone", "a.test", "--zones-file", "/tmp/zones"]);
        assert!(result.is_err(), "zone inputs are mutually exclusive");
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--zone", "a.test"]).unwrap();
        assert_eq!(args.source_server_id, "localhost");
        assert_eq!(args.target_server_id, "localhost");
        assert!((args.timeout - 10.0).abs() < f64::EPSILON);
        assert_eq!(args.retries, 3);
        assert!((args.retry_backoff - 0.5).abs() < f64::EPSILON);
        assert!((args.retry_max_backoff - 5.0).abs() < f64::EPSILON);
        assert!((args.retry_jitter - 0.1).abs() < f64::EPSILON);
        assert_eq!(args.on_error, OnError::Continue);
        assert_eq!(args.concurrency, 10);
        assert!((args.graceful_timeout - 0.0).abs() < f64::EPSILON);
        assert!((args.progress_interval - 30.0).abs() < f64::EPSILON);
        assert!(!args.recreate);
        assert!(!args.dry_run);
        assert!(!args.ignore_soa_serial);
    }

    #[test]
    fn test_on_error_stop_parses() {
        let args = parse(&["--zone", "a.test", "--on-error", "stop"]).unwrap();
        assert_eq!(args.on_error, OnError::Stop);
    }

    #[test]
    fn test_sanitizer_flags_parse() {
        let args = parse(&[
            "--zone",
            "a.test",
            "--auto-fix-cname-conflicts",
            "--auto-fix-double-cname-conflicts",
            "--normalize-txt-escapes",
            "--ignore-soa-serial",
        ])
        .unwrap();
        assert!(args.auto_fix_cname_conflicts);
        assert!(args.auto_fix_double_cname_conflicts);
        assert!(args.normalize_txt_escapes);
        assert!(args.ignore_soa_serial);
    }

    // ========================================================================
    // Pre-flight Validation Tests
    // ========================================================================

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let args = parse(&["--zone", "a.test", "--concurrency", "0"]).unwrap();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let args = parse(&["--zone", "a.test", "--timeout", "0"]).unwrap();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_negative_backoff_is_rejected() {
        let args = parse(&["--zone", "a.test", "--retry-backoff=-1"]).unwrap();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_valid_args_pass_preflight() {
        let args = parse(&["--zone", "a.test"]).unwrap();
        assert!(validate_args(&args).is_ok());
    }

    // ========================================================================
    // Exit Code Tests
    // ========================================================================

    fn failed_result(zone: &str) -> ZoneResult {
        ZoneResult {
            zone: zone.to_string(),
            outcome: Err(MigrateError::Cancelled),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_exit_code_success() {
        let report = BatchReport::default();
        assert_eq!(exit_code_for(&report), 0);
    }

    #[test]
    fn test_exit_code_zone_failures() {
        let report = BatchReport {
            results: vec![failed_result("a.test")],
            ..BatchReport::default()
        };
        assert_eq!(exit_code_for(&report), 1);
    }

    #[test]
    fn test_exit_code_stopped_by_policy() {
        let report = BatchReport {
            results: vec![failed_result("a.test")],
            stopped_by_policy: true,
            ..BatchReport::default()
        };
        assert_eq!(exit_code_for(&report), 2);
    }

    #[test]
    fn test_exit_code_cancelled_after_grace() {
        let report = BatchReport {
            results: vec![failed_result("a.test")],
            interrupted: true,
            grace_expired: true,
            ..BatchReport::default()
        };
        assert_eq!(exit_code_for(&report), 3);
    }

    #[test]
    fn test_exit_code_graceful_interrupt_counts_as_failure() {
        let report = BatchReport {
            results: vec![failed_result("a.test")],
            interrupted: true,
            ..BatchReport::default()
        };
        assert_eq!(exit_code_for(&report), 1, "unwound interrupts report per-zone failures");
    }
}
