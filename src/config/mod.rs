//! Client configuration (layered: code > env > file).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HttpTrailError, Result};
use crate::net::{NetworkPolicy, PolicyResolver};

/// Dial timeout applied when none is configured.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefix for environment overrides, e.g. `HTTPTRAIL_PROXY`.
pub const ENV_PREFIX: &str = "HTTPTRAIL_";

/// Settings for the transport a [`crate::client::Client`] sends through.
///
/// Unset and zero values fall back to the transport defaults.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub dial_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    /// How long an idle pooled connection may live.
    pub max_conn_duration_secs: Option<u64>,
    pub max_conns_per_host: Option<i64>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    #[builder(default)]
    pub tls: TlsConfig,
    /// CIDR blocks requests may not connect to.
    #[builder(default)]
    pub blacklist_ips: Vec<String>,
    /// Exact hostnames or `*.suffix` wildcards requests may not resolve.
    #[builder(default)]
    pub block_hostnames: Vec<String>,
}

/// Client certificate and verification settings.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    #[builder(default)]
    pub insecure_skip_verify: bool,
    /// PEM-encoded client certificate chain.
    pub certificate: Option<String>,
    /// PEM-encoded private key for `certificate`.
    pub private_key: Option<String>,
}

impl TlsConfig {
    fn identity(&self) -> Result<Option<reqwest::Identity>> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        match (blank(&self.certificate), blank(&self.private_key)) {
            (true, true) => Ok(None),
            (true, false) => Err(HttpTrailError::Configuration("blank certificate".into())),
            (false, true) => Err(HttpTrailError::Configuration("blank private key".into())),
            (false, false) => {
                let mut pem = self.certificate.clone().unwrap_or_default();
                pem.push('\n');
                pem.push_str(self.private_key.as_deref().unwrap_or_default());
                reqwest::Identity::from_pem(pem.as_bytes())
                    .map(Some)
                    .map_err(|e| {
                        HttpTrailError::Configuration(format!("failed to load key/cert; {e}"))
                    })
            }
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Load from `HTTPTRAIL_*` environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, keyed by the full variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };
        let list = |name: &str| {
            var(name)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Self {
            dial_timeout_secs: parse_var("DIAL_TIMEOUT_SECS", var("DIAL_TIMEOUT_SECS"))?,
            read_timeout_secs: parse_var("READ_TIMEOUT_SECS", var("READ_TIMEOUT_SECS"))?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"))?,
            max_conn_duration_secs: parse_var(
                "MAX_CONN_DURATION_SECS",
                var("MAX_CONN_DURATION_SECS"),
            )?,
            max_conns_per_host: parse_var("MAX_CONNS_PER_HOST", var("MAX_CONNS_PER_HOST"))?,
            user_agent: var("USER_AGENT"),
            proxy: var("PROXY"),
            tls: TlsConfig {
                insecure_skip_verify: parse_var::<bool>(
                    "INSECURE_SKIP_VERIFY",
                    var("INSECURE_SKIP_VERIFY"),
                )?
                .unwrap_or(false),
                certificate: None,
                private_key: None,
            },
            blacklist_ips: list("BLACKLIST_IPS"),
            block_hostnames: list("BLOCK_HOSTNAMES"),
        })
    }

    /// File settings (when `path` is given) overridden by the environment.
    ///
    /// Apply code-level settings on top with [`ClientConfig::merge`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.merge(Self::from_env()?))
    }

    /// Overlay every value `over` sets onto `self`.
    pub fn merge(self, over: Self) -> Self {
        Self {
            dial_timeout_secs: over.dial_timeout_secs.or(self.dial_timeout_secs),
            read_timeout_secs: over.read_timeout_secs.or(self.read_timeout_secs),
            request_timeout_secs: over.request_timeout_secs.or(self.request_timeout_secs),
            max_conn_duration_secs: over.max_conn_duration_secs.or(self.max_conn_duration_secs),
            max_conns_per_host: over.max_conns_per_host.or(self.max_conns_per_host),
            user_agent: over.user_agent.or(self.user_agent),
            proxy: over.proxy.or(self.proxy),
            tls: TlsConfig {
                insecure_skip_verify: over.tls.insecure_skip_verify
                    || self.tls.insecure_skip_verify,
                certificate: over.tls.certificate.or(self.tls.certificate),
                private_key: over.tls.private_key.or(self.tls.private_key),
            },
            blacklist_ips: if over.blacklist_ips.is_empty() {
                self.blacklist_ips
            } else {
                over.blacklist_ips
            },
            block_hostnames: if over.block_hostnames.is_empty() {
                self.block_hostnames
            } else {
                over.block_hostnames
            },
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        match self.dial_timeout_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn max_conns_per_host(&self) -> usize {
        match self.max_conns_per_host {
            Some(n) if n > 0 => n as usize,
            _ => 1,
        }
    }

    pub fn network_policy(&self) -> Result<NetworkPolicy> {
        NetworkPolicy::new(&self.blacklist_ips, &self.block_hostnames)
    }

    /// Build the transport, validating TLS and policy settings on the way.
    pub fn build_transport(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.dial_timeout())
            .pool_max_idle_per_host(self.max_conns_per_host());

        if let Some(secs) = positive(self.read_timeout_secs) {
            builder = builder.read_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = positive(self.request_timeout_secs) {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = positive(self.max_conn_duration_secs) {
            builder = builder.pool_idle_timeout(Duration::from_secs(secs));
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.as_str());
        }
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                HttpTrailError::Configuration(format!("invalid proxy `{proxy}`: {e}"))
            })?;
            builder = builder.proxy(proxy);
        }
        if self.tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(identity) = self.tls.identity()? {
            builder = builder.identity(identity);
        }

        let policy = self.network_policy()?;
        if !policy.is_empty() {
            debug!(
                blacklist = self.blacklist_ips.len(),
                blocked_hostnames = self.block_hostnames.len(),
                "installing policy resolver"
            );
            builder = builder.dns_resolver(Arc::new(PolicyResolver::new(Arc::new(policy))));
        }

        Ok(builder.build()?)
    }
}

fn positive(value: Option<u64>) -> Option<u64> {
    value.filter(|v| *v > 0)
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|v| {
        v.trim().parse::<T>().map_err(|_| {
            HttpTrailError::Configuration(format!("invalid value `{v}` for {ENV_PREFIX}{name}"))
        })
    })
    .transpose()
}
