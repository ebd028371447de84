//! Network policy: blacklisted address ranges and blocked hostnames.
//!
//! Enforced at name resolution by [`PolicyResolver`], and by the client for
//! hosts written as IP literals (those never reach a resolver).

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::debug;

use crate::error::{BlockedHostnameError, BlockedIpError, HttpTrailError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A CIDR block such as `10.0.0.0/8` or `fd00::/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        p => u128::MAX << (128 - u32::from(p)),
    }
}

impl FromStr for IpNetwork {
    type Err = HttpTrailError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HttpTrailError::Configuration(format!("invalid IP network `{s}`"));
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// An exact hostname or a `*.suffix` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnamePattern {
    raw: String,
    suffix: Option<String>,
}

impl HostnamePattern {
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        match &self.suffix {
            Some(suffix) => host.len() > suffix.len() && host.ends_with(suffix.as_str()),
            None => host == self.raw,
        }
    }
}

impl FromStr for HostnamePattern {
    type Err = HttpTrailError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = normalize_host(s);
        if raw.is_empty() || raw.chars().skip(1).any(|c| c == '*') {
            return Err(HttpTrailError::Configuration(format!(
                "invalid hostname pattern `{s}`"
            )));
        }
        let suffix = match raw.strip_prefix('*') {
            Some(rest) if rest.starts_with('.') => Some(rest.to_string()),
            Some(_) => {
                return Err(HttpTrailError::Configuration(format!(
                    "invalid hostname pattern `{s}`"
                )))
            }
            None => None,
        };
        Ok(Self { raw, suffix })
    }
}

impl fmt::Display for HostnamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Address ranges and hostnames requests may not reach.
#[derive(Debug, Clone, Default)]
pub struct NetworkPolicy {
    blacklist: Vec<IpNetwork>,
    blocked_hostnames: Vec<HostnamePattern>,
}

impl NetworkPolicy {
    pub fn new(blacklist: &[String], blocked_hostnames: &[String]) -> Result<Self> {
        Ok(Self {
            blacklist: blacklist
                .iter()
                .map(|s| s.parse::<IpNetwork>())
                .collect::<Result<_>>()?,
            blocked_hostnames: blocked_hostnames
                .iter()
                .map(|s| s.parse::<HostnamePattern>())
                .collect::<Result<_>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty() && self.blocked_hostnames.is_empty()
    }

    pub fn check_ip(&self, ip: IpAddr) -> std::result::Result<(), BlockedIpError> {
        match self.blacklist.iter().find(|net| net.contains(ip)) {
            Some(net) => Err(BlockedIpError {
                ip,
                network: net.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn check_hostname(&self, host: &str) -> std::result::Result<(), BlockedHostnameError> {
        match self.blocked_hostnames.iter().find(|p| p.matches(host)) {
            Some(pattern) => Err(BlockedHostnameError {
                hostname: host.to_string(),
                pattern: pattern.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// System resolver that refuses blocked hostnames and blacklisted addresses.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    policy: Arc<NetworkPolicy>,
}

impl PolicyResolver {
    pub fn new(policy: Arc<NetworkPolicy>) -> Self {
        Self { policy }
    }
}

impl Resolve for PolicyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let policy = self.policy.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            if let Err(blocked) = policy.check_hostname(&host) {
                debug!(host = %host, "resolver refused blocked hostname");
                return Err(Box::new(blocked) as BoxError);
            }

            let mut allowed: Vec<SocketAddr> = Vec::new();
            let mut first_blocked = None;
            let resolved = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| Box::new(e) as BoxError)?;
            for addr in resolved {
                match policy.check_ip(addr.ip()) {
                    Ok(()) => allowed.push(addr),
                    Err(blocked) => {
                        first_blocked.get_or_insert(blocked);
                    }
                }
            }

            if allowed.is_empty() {
                if let Some(blocked) = first_blocked {
                    debug!(host = %host, ip = %blocked.ip, "resolver refused blacklisted address");
                    return Err(Box::new(blocked) as BoxError);
                }
            }
            Ok(Box::new(allowed.into_iter()) as Addrs)
        })
    }
}
