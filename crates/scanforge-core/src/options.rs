//! Advanced scan options with typed validation.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Proxy URL schemes accepted by the scanner.
const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5"];

/// Severity names the scanner understands as a filter value.
const SEVERITIES: &[&str] = &["info", "low", "medium", "high", "critical", "unknown"];

/// Advanced options for one scan task.
///
/// Every field maps to exactly one scanner CLI flag and is omitted from the
/// command line when unset. Unknown options are unrepresentable; malformed
/// values are rejected by [`ScanOptions::validate`] before any process is
/// spawned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Requests-per-second cap passed to the scanner.
    pub rate_limit: Option<u32>,

    /// Number of parallel template executions inside the scanner.
    pub concurrency: Option<u32>,

    /// Severity filter (e.g. "high").
    pub severity: Option<String>,

    /// Outbound proxy URL (http, https or socks5).
    pub proxy: Option<String>,

    /// DNS-callback (interactsh) server address for OOB detection.
    pub interactsh_url: Option<String>,

    /// Scanner-side output file.
    pub output_path: Option<PathBuf>,
}

impl ScanOptions {
    /// Validate all set options, rejecting malformed values.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(rl) = self.rate_limit {
            if rl == 0 {
                return Err(CoreError::InvalidOption(
                    "rate_limit must be positive".into(),
                ));
            }
        }

        if let Some(c) = self.concurrency {
            if c == 0 {
                return Err(CoreError::InvalidOption(
                    "concurrency must be positive".into(),
                ));
            }
        }

        if let Some(sev) = &self.severity {
            // The scanner accepts a comma-separated severity list.
            for part in sev.split(',') {
                let part = part.trim();
                if part.is_empty() || !SEVERITIES.contains(&part) {
                    return Err(CoreError::InvalidOption(format!(
                        "unknown severity '{}'",
                        part
                    )));
                }
            }
        }

        if let Some(proxy) = &self.proxy {
            let url = Url::parse(proxy)
                .map_err(|e| CoreError::InvalidOption(format!("proxy URL: {}", e)))?;
            if !PROXY_SCHEMES.contains(&url.scheme()) {
                return Err(CoreError::InvalidOption(format!(
                    "proxy scheme '{}' not supported (expected http, https or socks5)",
                    url.scheme()
                )));
            }
        }

        if let Some(addr) = &self.interactsh_url {
            if addr.trim().is_empty() {
                return Err(CoreError::InvalidOption(
                    "interactsh_url must not be blank".into(),
                ));
            }
        }

        Ok(())
    }

    /// Builder method to set the rate limit.
    pub fn with_rate_limit(mut self, rl: u32) -> Self {
        self.rate_limit = Some(rl);
        self
    }

    /// Builder method to set the concurrency.
    pub fn with_concurrency(mut self, c: u32) -> Self {
        self.concurrency = Some(c);
        self
    }

    /// Builder method to set the severity filter.
    pub fn with_severity(mut self, sev: impl Into<String>) -> Self {
        self.severity = Some(sev.into());
        self
    }

    /// Builder method to set the proxy URL.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Builder method to set the DNS-callback server address.
    pub fn with_interactsh_url(mut self, addr: impl Into<String>) -> Self {
        self.interactsh_url = Some(addr.into());
        self
    }
}
