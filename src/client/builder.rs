//! Programmatic construction of a [`Client`].

use super::Client;
use crate::config::{ClientConfig, DEFAULT_TIMEOUT};
use crate::correlator::RequestCorrelator;
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::routing::{Router, RoutingStrategy};
use crate::topology::{GroupRole, Mirror, MirrorGroup, ServerAddress, Topology};
use crate::transport::UdpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

/// Group that [`ClientBuilder::add_read_write_mirror`] appends to.
pub const DEFAULT_READ_WRITE_GROUP: &str = "read-write";

/// Group that [`ClientBuilder::add_write_only_mirror`] appends to.
pub const DEFAULT_WRITE_ONLY_GROUP: &str = "write-only";

struct GroupEntry {
    name: String,
    role: GroupRole,
    mirrors: Vec<Vec<ServerAddress>>,
}

/// Builder for [`Client`].
///
/// ```rust,no_run
/// # async fn example() -> memcached_udp::Result<()> {
/// use memcached_udp::Client;
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .add_read_write_mirror(vec!["10.0.0.1:11211".parse().unwrap()])
///     .add_read_write_mirror(vec!["10.0.0.2:11211".parse().unwrap()])
///     .add_write_only_mirror(vec!["10.1.0.1:11211".parse().unwrap()])
///     .retry_on_fail(3, Duration::from_millis(25))
///     .build()?;
///
/// client.set("greeting", 0, "hello").await?;
/// assert_eq!(client.get("greeting").await?, "hello");
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    groups: Vec<GroupEntry>,
    read_group: Option<String>,
    timeout: Duration,
    retry: Option<RetryPolicy>,
    bind_address: SocketAddr,
    runtime: Option<Handle>,
    /// First misuse found while collecting groups, reported by `build`.
    conflict: Option<String>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            read_group: None,
            timeout: DEFAULT_TIMEOUT,
            retry: None,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            runtime: None,
            conflict: None,
        }
    }

    /// Builder preloaded from deserialized configuration.
    ///
    /// Shard addresses are resolved here. Group names must be unique.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        for (i, group) in config.groups.iter().enumerate() {
            if config.groups[..i].iter().any(|g| g.name == group.name) {
                return Err(ClientError::Config(format!(
                    "duplicate group name '{}'",
                    group.name
                )));
            }
        }

        let mut builder = Self::new()
            .timeout(config.timeout_duration())
            .bind_address(config.bind_socket_addr()?);
        if let Some(retry) = &config.retry_on_fail {
            let policy = retry.policy();
            builder = builder.retry_on_fail(policy.max_retries, policy.interval);
        }
        if let Some(name) = &config.read_group {
            builder = builder.read_group(name.clone());
        }
        for group in &config.groups {
            builder = builder.add_group(group.name.clone(), group.role, group.resolve_mirrors()?);
        }
        Ok(builder)
    }

    /// Add a group with its mirrors, each mirror a list of shards.
    ///
    /// Adding to an existing group name appends its mirrors. The role must
    /// match the existing group's; a mismatch fails `build`.
    pub fn add_group(
        mut self,
        name: impl Into<String>,
        role: GroupRole,
        mirrors: Vec<Vec<ServerAddress>>,
    ) -> Self {
        let name = name.into();
        match self.groups.iter_mut().find(|g| g.name == name) {
            Some(existing) if existing.role == role => existing.mirrors.extend(mirrors),
            Some(existing) => {
                if self.conflict.is_none() {
                    self.conflict = Some(format!(
                        "group '{}' is {:?}, cannot add {:?} mirrors to it",
                        name, existing.role, role
                    ));
                }
            }
            None => self.groups.push(GroupEntry {
                name,
                role,
                mirrors,
            }),
        }
        self
    }

    /// Append a mirror to the default read-write group.
    pub fn add_read_write_mirror(self, shards: Vec<ServerAddress>) -> Self {
        self.add_group(DEFAULT_READ_WRITE_GROUP, GroupRole::ReadWrite, vec![shards])
    }

    /// Append a mirror to the default write-only group.
    pub fn add_write_only_mirror(self, shards: Vec<ServerAddress>) -> Self {
        self.add_group(DEFAULT_WRITE_ONLY_GROUP, GroupRole::WriteOnly, vec![shards])
    }

    /// Serve reads from the named group.
    pub fn read_group(mut self, name: impl Into<String>) -> Self {
        self.read_group = Some(name.into());
        self
    }

    /// Per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resend unanswered reads to the next mirror every `interval`, at most
    /// `retries` times.
    pub fn retry_on_fail(mut self, retries: u32, interval: Duration) -> Self {
        self.retry = Some(RetryPolicy::new(retries, interval));
        self
    }

    pub fn bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Runtime for the reactor and timers. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate the configuration, bind the socket and start the reactor.
    pub fn build(self) -> Result<Client> {
        if let Some(conflict) = self.conflict {
            return Err(ClientError::Config(conflict));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be non-zero".to_string()));
        }
        if let Some(policy) = &self.retry {
            if policy.interval.is_zero() {
                return Err(ClientError::Config("retry interval must be non-zero".to_string()));
            }
        }

        let groups = self
            .groups
            .into_iter()
            .map(|entry| {
                let mirrors = entry
                    .mirrors
                    .into_iter()
                    .map(Mirror::new)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| ClientError::Config(format!("group '{}': {}", entry.name, e)))?;
                MirrorGroup::new(entry.name, entry.role, mirrors)
            })
            .collect::<Result<Vec<_>>>()?;
        let topology = Arc::new(Topology::new(groups, self.read_group.as_deref())?);

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                ClientError::Config("no tokio runtime; call from one or set runtime()".to_string())
            })?,
        };

        let correlator = Arc::new(RequestCorrelator::new(self.timeout));
        let transport = Arc::new(UdpTransport::bind(
            self.bind_address,
            Arc::clone(&correlator),
            &runtime,
        )?);

        let read_strategy = match self.retry {
            Some(policy) => RoutingStrategy::RetryOnFail(policy),
            None => RoutingStrategy::Shard,
        };
        let router = Arc::new(Router::new(
            Arc::clone(&topology),
            transport.clone(),
            read_strategy,
        ));

        info!(
            local_addr = %transport.local_addr(),
            groups = topology.groups().len(),
            read_group = topology.read_group().name(),
            fan_out = topology.write_fan_out(),
            timeout_ms = self.timeout.as_millis() as u64,
            retry = ?self.retry,
            "Memcached UDP client started"
        );

        Ok(Client::from_parts(router, correlator, transport, runtime))
    }
}
