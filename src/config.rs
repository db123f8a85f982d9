//! Configuration for the memcached UDP client.
//!
//! Configuration can be built programmatically through
//! [`ClientBuilder`](crate::ClientBuilder) or deserialized from YAML/JSON and
//! handed to [`ClientBuilder::from_config()`](crate::ClientBuilder::from_config).
//!
//! # Quick Start
//!
//! ```rust
//! use memcached_udp::config::{ClientConfig, GroupConfig};
//! use memcached_udp::GroupRole;
//!
//! let config = ClientConfig {
//!     groups: vec![
//!         GroupConfig::for_testing("dc-east", GroupRole::ReadWrite, &["10.0.0.1:11211"]),
//!         GroupConfig::for_testing("dc-west", GroupRole::WriteOnly, &["10.1.0.1:11211"]),
//!     ],
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ClientConfig
//! ├── groups: Vec<GroupConfig>
//! │   ├── name: String               # unique, e.g. a datacenter
//! │   ├── role: read-write | write-only
//! │   └── mirrors: Vec<Vec<String>>  # each mirror is a list of "host:port" shards
//! ├── read_group: Option<String>     # default: first read-write group
//! ├── timeout: "50ms"                # per-call timeout
//! ├── retry_on_fail: Option<RetryOnFailConfig>
//! │   ├── retries: u32
//! │   └── interval: "25ms"
//! └── bind_address: "0.0.0.0:0"
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! groups:
//!   - name: "dc-east"
//!     role: read-write
//!     mirrors:
//!       - ["cache-e1:11211", "cache-e2:11211"]
//!       - ["cache-e3:11211", "cache-e4:11211"]
//!   - name: "dc-west"
//!     role: write-only
//!     mirrors:
//!       - ["cache-w1:11211", "cache-w2:11211"]
//!
//! timeout: "50ms"
//! retry_on_fail:
//!   retries: 3
//!   interval: "25ms"
//! ```

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::topology::GroupRole;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

/// Default delay between retry-on-fail resends.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config: passed to ClientBuilder::from_config()
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything needed to build a [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server groups, in fan-out order.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    /// Group serving reads. Defaults to the first read-write group.
    #[serde(default)]
    pub read_group: Option<String>,

    /// Per-call timeout as a duration string (e.g., "50ms").
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Resend unanswered reads to the other mirrors. Disabled when absent.
    #[serde(default)]
    pub retry_on_fail: Option<RetryOnFailConfig>,

    /// Local address of the client socket.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_timeout() -> String {
    "50ms".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:0".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            read_group: None,
            timeout: default_timeout(),
            retry_on_fail: None,
            bind_address: default_bind_address(),
        }
    }
}

impl ClientConfig {
    /// Parse the timeout string to a Duration.
    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Resolve the bind address.
    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        resolve_address(&self.bind_address)
    }

    /// Single read-write group on loopback, generous timeout.
    pub fn for_testing(shards: &[&str]) -> Self {
        Self {
            groups: vec![GroupConfig::for_testing("read-write", GroupRole::ReadWrite, shards)],
            timeout: "500ms".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GroupConfig: one named set of mirrors
// ═══════════════════════════════════════════════════════════════════════════════

/// A server group as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Unique group name.
    pub name: String,

    /// Whether the group serves reads.
    #[serde(default = "default_role")]
    pub role: GroupRole,

    /// Mirrors of the group; each one is a non-empty list of "host:port" shards.
    pub mirrors: Vec<Vec<String>>,
}

fn default_role() -> GroupRole {
    GroupRole::ReadWrite
}

impl GroupConfig {
    /// Group with a single mirror.
    pub fn for_testing(name: &str, role: GroupRole, shards: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            role,
            mirrors: vec![shards.iter().map(|s| s.to_string()).collect()],
        }
    }

    /// Resolve every shard address, mirror by mirror.
    pub fn resolve_mirrors(&self) -> Result<Vec<Vec<SocketAddr>>> {
        self.mirrors
            .iter()
            .map(|shards| shards.iter().map(|s| resolve_address(s)).collect())
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetryOnFailConfig: resend schedule for reads
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry-on-fail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOnFailConfig {
    /// Maximum resends after the initial send.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before each resend as a duration string (e.g., "25ms").
    #[serde(default = "default_retry_interval")]
    pub interval: String,
}

fn default_retries() -> u32 {
    3
}

fn default_retry_interval() -> String {
    "25ms".to_string()
}

impl Default for RetryOnFailConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            interval: default_retry_interval(),
        }
    }
}

impl RetryOnFailConfig {
    /// Parse the interval string to a Duration.
    pub fn interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(DEFAULT_RETRY_INTERVAL)
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.interval_duration())
    }
}

/// Resolve a "host:port" string to its first socket address.
pub fn resolve_address(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|e| ClientError::Config(format!("cannot resolve '{}': {}", address, e)))?
        .next()
        .ok_or_else(|| ClientError::Config(format!("'{}' resolved to no addresses", address)))
}
