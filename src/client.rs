// SPDX-License-Identifier: MIT

//! Typed HTTP client for the PowerDNS Authoritative management API.
//!
//! One [`PowerDnsClient`] is created per server (source and target). Each
//! client owns a single `reqwest` connection pool shared by every
//! concurrent zone pipeline, retries transient failures according to its
//! [`crate::retry::RetryPolicy`], and observes one cancellation token on
//! every send and every backoff sleep. Dropping the client releases the
//! pool on all exit paths.

use crate::config::ConnectionConfig;
use crate::errors::MigrateError;
use crate::retry::{is_retryable_http_status, parse_retry_after};
use crate::zone::{normalize_name, Change, Zone, ZoneSummary};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{Client as HttpClient, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Header carrying the PowerDNS API key.
const API_KEY_HEADER: &str = "X-API-Key";

/// Zone-level operations against one PowerDNS server.
///
/// The migrator and batch driver work against this trait so they can be
/// exercised with an in-memory server in tests; [`PowerDnsClient`] is the
/// production implementation.
#[async_trait]
pub trait ZoneApi: Send + Sync {
    /// Fetch a full zone document including its record sets.
    async fn get_zone(&self, zone_name: &str) -> Result<Zone, MigrateError>;

    /// Probe for a zone, returning the full document when present.
    ///
    /// A 404 is not an error here; it maps to `None`.
    async fn zone_exists(&self, zone_name: &str) -> Result<Option<Zone>, MigrateError>;

    /// Create a zone and return the document the server stored.
    async fn create_zone(&self, zone: &Zone) -> Result<Zone, MigrateError>;

    /// Delete a zone.
    async fn delete_zone(&self, zone_name: &str) -> Result<(), MigrateError>;

    /// Apply a list of record-set mutations to a zone.
    async fn patch_rrsets(&self, zone_name: &str, changes: &[Change])
        -> Result<(), MigrateError>;
}

/// HTTP client for one PowerDNS server.
pub struct PowerDnsClient {
    connection: ConnectionConfig,
    http: HttpClient,
    cancel: CancellationToken,
}

impl PowerDnsClient {
    /// Build a client for `connection`, observing `cancel` on every
    /// request and backoff sleep.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Config`] if the base URL is invalid, the
    /// API key is not a valid header value, or the TLS backend cannot be
    /// initialized.
    pub fn new(
        connection: ConnectionConfig,
        cancel: CancellationToken,
    ) -> Result<Self, MigrateError> {
        connection.validate()?;

        let mut api_key = HeaderValue::from_str(&connection.api_key)
            .map_err(|_| MigrateError::Config("API key is not a valid header value".into()))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(connection.timeout)
            .danger_accept_invalid_certs(!connection.verify_tls)
            .build()
            .map_err(|e| MigrateError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            connection,
            http,
            cancel,
        })
    }

    /// The base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.connection.base_url
    }

    /// List all zones known to the server (summaries without rrsets).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retries or the
    /// server answers with a non-retriable status.
    pub async fn list_zones(&self) -> Result<Vec<ZoneSummary>, MigrateError> {
        self.request_json(Method::GET, "/zones", None).await
    }

    /// Execute one API request with retry, returning the parsed JSON body.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, MigrateError> {
        let label = method_label(&method);
        let url = self.connection.endpoint(path);
        let response = self.execute(method, &url, body).await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| MigrateError::Http {
            method: label,
            url: url.clone(),
            status,
            body: format!("failed to read response body: {e}"),
        })?;
        serde_json::from_str(&text).map_err(|e| MigrateError::Http {
            method: label,
            url,
            status,
            body: format!("invalid JSON body: {e}"),
        })
    }

    /// Execute one API request with retry, discarding the response body.
    async fn request_ok(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), MigrateError> {
        let url = self.connection.endpoint(path);
        self.execute(method, &url, body).await.map(|_| ())
    }

    /// Retry loop around a single logical request.
    ///
    /// A request is retried when the transport fails or the server
    /// answers 429/500/502/503/504, up to `retry.retries` additional
    /// attempts. Any other error status surfaces immediately. The
    /// cancellation token preempts both in-flight sends and backoff
    /// sleeps.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, MigrateError> {
        let label = method_label(&method);
        let policy = self.connection.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let mut request = self.http.request(method.clone(), url);
            if let Some(ref payload) = body {
                request = request.json(payload);
            }

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => return Err(MigrateError::Cancelled),
                result = request.send() => result,
            };

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_http_status(status) && attempt <= policy.retries {
                        let retry_after = response
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after);
                        let delay = policy.delay(attempt, retry_after);
                        debug!(
                            method = label,
                            url = %url,
                            status = status.as_u16(),
                            attempt = attempt,
                            retry_in = ?delay,
                            "Retryable API status, will retry"
                        );
                        self.sleep(delay).await?;
                        continue;
                    }
                    if status.is_client_error() || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        return Err(MigrateError::Http {
                            method: label,
                            url: url.to_string(),
                            status: status.as_u16(),
                            body: body_text,
                        });
                    }
                    if attempt > 1 {
                        debug!(
                            method = label,
                            url = %url,
                            attempt = attempt,
                            "API call succeeded after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt <= policy.retries {
                        let delay = policy.delay(attempt, None);
                        warn!(
                            method = label,
                            url = %url,
                            attempt = attempt,
                            retry_in = ?delay,
                            error = %e,
                            "Transport error, will retry"
                        );
                        self.sleep(delay).await?;
                        continue;
                    }
                    return Err(MigrateError::Transport {
                        method: label,
                        url: url.to_string(),
                        retries: policy.retries,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Sleep for `delay`, aborting early on cancellation.
    async fn sleep(&self, delay: Duration) -> Result<(), MigrateError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(MigrateError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl ZoneApi for PowerDnsClient {
    async fn get_zone(&self, zone_name: &str) -> Result<Zone, MigrateError> {
        let zone = normalize_name(zone_name);
        self.request_json(Method::GET, &format!("/zones/{zone}"), None)
            .await
    }

    async fn zone_exists(&self, zone_name: &str) -> Result<Option<Zone>, MigrateError> {
        match self.get_zone(zone_name).await {
            Ok(zone) => Ok(Some(zone)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_zone(&self, zone: &Zone) -> Result<Zone, MigrateError> {
        let payload = serde_json::to_value(zone)
            .map_err(|e| MigrateError::Config(format!("cannot serialize zone payload: {e}")))?;
        self.request_json(Method::POST, "/zones", Some(payload))
            .await
    }

    async fn delete_zone(&self, zone_name: &str) -> Result<(), MigrateError> {
        let zone = normalize_name(zone_name);
        self.request_ok(Method::DELETE, &format!("/zones/{zone}"), None)
            .await
    }

    async fn patch_rrsets(
        &self,
        zone_name: &str,
        changes: &[Change],
    ) -> Result<(), MigrateError> {
        let zone = normalize_name(zone_name);
        self.request_ok(
            Method::PATCH,
            &format!("/zones/{zone}"),
            Some(json!({ "rrsets": changes })),
        )
        .await
    }
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PATCH => "PATCH",
        Method::DELETE => "DELETE",
        _ => "HTTP",
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
