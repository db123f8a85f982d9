// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client facade: the memcached operations.
//!
//! # Call Paths
//!
//! ```text
//! get ──────────► register id ─► encode ─► read strategy ──► read group
//!                      │                    (shard / retry-on-fail)
//!                      └─ timeout timer
//!
//! set/add/replace/delete/incr/decr
//!                ─► register id ─► encode ─► fan-out ──► every group
//!                                   (+ quiet twin for write-only groups)
//!
//! *_quiet        ─► fresh id ─────► encode ─► fan-out ──► every group
//!                   (nothing registered, nothing reported)
//! ```
//!
//! Awaited calls return a [`Response`] future that resolves exactly once.
//! Every method returns immediately; none of them touch the socket.

mod builder;
mod response;

pub use builder::{ClientBuilder, DEFAULT_READ_WRITE_GROUP, DEFAULT_WRITE_ONLY_GROUP};
pub use response::{FromReply, Response};

use crate::correlator::{Completion, Registration, RequestCorrelator};
use crate::error::{ClientError, Result};
use crate::metrics;
use crate::protocol::{encode_request, Opcode, Request};
use crate::retry::spawn_retries;
use crate::routing::{Outgoing, Router, RoutingStrategy};
use crate::topology::Topology;
use crate::transport::UdpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Defaults for increment/decrement when none are given.
const DEFAULT_DELTA: u64 = 1;
const DEFAULT_INITIAL: u64 = 0;

/// Asynchronous memcached client over UDP.
///
/// Cheap to clone; clones share the socket, the pending-call table and the
/// topology. Safe to use from many threads at once.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    router: Arc<Router>,
    correlator: Arc<RequestCorrelator>,
    transport: Arc<UdpTransport>,
    runtime: Handle,
}

impl Client {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        router: Arc<Router>,
        correlator: Arc<RequestCorrelator>,
        transport: Arc<UdpTransport>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                router,
                correlator,
                transport,
                runtime,
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &str) -> Response<String> {
        self.read(Request::Key {
            opcode: Opcode::Get,
            key,
        })
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Store `value` under `key` unconditionally.
    pub fn set(&self, key: &str, expiry: u32, value: &str) -> Response<()> {
        self.write(store(Opcode::Set, key, expiry, value))
    }

    pub fn set_quiet(&self, key: &str, expiry: u32, value: &str) {
        self.write_quiet(store(Opcode::SetQ, key, expiry, value))
    }

    /// Store only if `key` does not exist.
    pub fn add(&self, key: &str, expiry: u32, value: &str) -> Response<()> {
        self.write(store(Opcode::Add, key, expiry, value))
    }

    pub fn add_quiet(&self, key: &str, expiry: u32, value: &str) {
        self.write_quiet(store(Opcode::AddQ, key, expiry, value))
    }

    /// Store only if `key` already exists.
    pub fn replace(&self, key: &str, expiry: u32, value: &str) -> Response<()> {
        self.write(store(Opcode::Replace, key, expiry, value))
    }

    pub fn replace_quiet(&self, key: &str, expiry: u32, value: &str) {
        self.write_quiet(store(Opcode::ReplaceQ, key, expiry, value))
    }

    pub fn delete(&self, key: &str) -> Response<()> {
        self.write(Request::Key {
            opcode: Opcode::Delete,
            key,
        })
    }

    pub fn delete_quiet(&self, key: &str) {
        self.write_quiet(Request::Key {
            opcode: Opcode::DeleteQ,
            key,
        })
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Add 1 to the counter under `key`, creating it at 0 if missing.
    pub fn increment(&self, key: &str, expiry: u32) -> Response<u64> {
        self.increment_by(key, expiry, DEFAULT_DELTA, DEFAULT_INITIAL)
    }

    /// Add `delta` to the counter under `key`, creating it at `initial` if missing.
    pub fn increment_by(&self, key: &str, expiry: u32, delta: u64, initial: u64) -> Response<u64> {
        self.write(counter(Opcode::Increment, key, expiry, delta, initial))
    }

    pub fn increment_quiet(&self, key: &str, expiry: u32, delta: u64, initial: u64) {
        self.write_quiet(counter(Opcode::IncrementQ, key, expiry, delta, initial))
    }

    /// Subtract 1 from the counter under `key`, creating it at 0 if missing.
    ///
    /// The server clamps at zero.
    pub fn decrement(&self, key: &str, expiry: u32) -> Response<u64> {
        self.decrement_by(key, expiry, DEFAULT_DELTA, DEFAULT_INITIAL)
    }

    pub fn decrement_by(&self, key: &str, expiry: u32, delta: u64, initial: u64) -> Response<u64> {
        self.write(counter(Opcode::Decrement, key, expiry, delta, initial))
    }

    pub fn decrement_quiet(&self, key: &str, expiry: u32, delta: u64, initial: u64) {
        self.write_quiet(counter(Opcode::DecrementQ, key, expiry, delta, initial))
    }

    // =========================================================================
    // Introspection and lifecycle
    // =========================================================================

    /// Number of calls awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }

    pub fn topology(&self) -> &Topology {
        self.inner.router.topology()
    }

    /// Address of the client's socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.transport.local_addr()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.transport.is_shutdown()
    }

    /// Stop the reactor and fail every pending call with
    /// [`ClientError::Shutdown`]. Later calls fail the same way.
    pub fn shutdown(&self) {
        if self.inner.transport.is_shutdown() {
            return;
        }
        self.inner.transport.shutdown();
        let failed = self.inner.correlator.fail_all(|| ClientError::Shutdown);
        info!(failed, "Client shut down");
    }

    // =========================================================================
    // Call paths
    // =========================================================================

    fn read<T: FromReply>(&self, request: Request<'_>) -> Response<T> {
        let strategy = self.inner.router.read_strategy();
        self.awaited(request, strategy)
    }

    fn write<T: FromReply>(&self, request: Request<'_>) -> Response<T> {
        self.awaited(request, RoutingStrategy::CommonFanOut)
    }

    fn awaited<T: FromReply>(&self, request: Request<'_>, strategy: RoutingStrategy) -> Response<T> {
        let opcode = request.opcode();
        if let Err(e) = self.admit(&request) {
            debug!(opcode = %opcode, error = %e, "Request rejected");
            metrics::record_request_rejected(e.kind());
            return Response::failed(e);
        }

        let inner = &self.inner;
        let (registration, completion) = match self.register(opcode) {
            Ok(registered) => registered,
            Err(e) => {
                metrics::record_request_rejected(e.kind());
                return Response::failed(e);
            }
        };
        let response = Response::pending(completion, Arc::clone(&inner.correlator), registration);

        let packets = match self.encode(registration.id, &request, strategy) {
            Ok(packets) => packets,
            Err(e) => {
                // Dropping `response` releases the registration.
                drop(response);
                metrics::record_request_rejected(e.kind());
                return Response::failed(e);
            }
        };

        inner.correlator.arm_timeout(registration, &inner.runtime);
        metrics::record_request(opcode.name());

        let retry = strategy.retry_policy().map(|policy| (policy, packets.primary.clone()));
        inner.router.dispatch(strategy, request.key(), packets);
        if let Some((policy, packet)) = retry {
            spawn_retries(
                Arc::clone(&inner.router),
                Arc::clone(&inner.correlator),
                registration,
                request.key().to_string(),
                packet,
                policy,
                &inner.runtime,
            );
        }

        response
    }

    /// Fire-and-forget: one shared buffer to every destination, errors logged.
    fn write_quiet(&self, request: Request<'_>) {
        let opcode = request.opcode();
        let sent = self.admit(&request).and_then(|()| {
            let id = self.inner.correlator.next_id();
            encode_request(id, &request)
        });
        match sent {
            Ok(packet) => {
                metrics::record_quiet_request(opcode.name());
                self.inner.router.dispatch(
                    RoutingStrategy::CommonFanOut,
                    request.key(),
                    Outgoing::single(packet),
                );
            }
            Err(e) => {
                warn!(opcode = %opcode, key = request.key(), error = %e, "Dropping quiet request");
                metrics::record_request_rejected(e.kind());
            }
        }
    }

    /// Checks that need no id: liveness, key and datagram limits.
    fn admit(&self, request: &Request<'_>) -> Result<()> {
        if self.inner.transport.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        request.validate()
    }

    /// Take a correlation id for an awaited call.
    ///
    /// A shutdown that lands after `admit` has already run `fail_all`, so
    /// the flag is checked again once the entry is in the table.
    fn register(&self, opcode: Opcode) -> Result<(Registration, Completion)> {
        let correlator = &self.inner.correlator;
        let registered = correlator.register(opcode).inspect_err(|_| {
            warn!(opcode = %opcode, pending = correlator.len(), "No free correlation id");
        })?;
        if self.inner.transport.is_shutdown() {
            correlator.cancel(registered.0);
            return Err(ClientError::Shutdown);
        }
        Ok(registered)
    }

    /// Encode the primary datagram, plus the quiet twin when a fanned-out
    /// write reaches write-only groups.
    fn encode(&self, id: u16, request: &Request<'_>, strategy: RoutingStrategy) -> Result<Outgoing> {
        let primary = encode_request(id, request)?;
        let opcode = request.opcode();
        let needs_twin = strategy == RoutingStrategy::CommonFanOut
            && !opcode.is_quiet()
            && self.inner.router.topology().has_write_only_groups();
        let replica = if needs_twin {
            Some(encode_request(id, &request.with_opcode(opcode.quiet()))?)
        } else {
            None
        };
        Ok(Outgoing { primary, replica })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("local_addr", &self.local_addr())
            .field("groups", &self.topology().groups().len())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

fn store<'a>(opcode: Opcode, key: &'a str, expiry: u32, value: &'a str) -> Request<'a> {
    Request::Store {
        opcode,
        key,
        expiry,
        value: value.as_bytes(),
    }
}

fn counter(opcode: Opcode, key: &str, expiry: u32, delta: u64, initial: u64) -> Request<'_> {
    Request::Counter {
        opcode,
        key,
        delta,
        initial,
        expiry,
    }
}
