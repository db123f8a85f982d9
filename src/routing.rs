// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Routing: deciding which servers receive a datagram.
//!
//! | Strategy        | Destinations                                        |
//! |-----------------|-----------------------------------------------------|
//! | `Shard`         | key's shard on the read group's first mirror        |
//! | `RetryOnFail`   | as `Shard`, then resends rotate through the mirrors |
//! | `CommonFanOut`  | key's shard on every mirror of every group          |
//!
//! Reads use the configured read strategy; writes always fan out.
//!
//! # Buffer sharing
//!
//! A call's datagram is encoded once into a [`Bytes`]. Each destination gets
//! a clone of the handle (a reference count bump, no copy) and the reactor
//! drops it once the write is issued. The router drops its own handles before
//! returning, so the buffer lives exactly as long as the last scheduled send.

use crate::metrics;
use crate::retry::RetryPolicy;
use crate::topology::{GroupRole, Topology};
use crate::transport::DatagramSink;
use bytes::Bytes;
use std::sync::Arc;

/// How a call picks its destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// One shard of the read group's first mirror.
    Shard,
    /// As `Shard`, with resends to the other mirrors while unanswered.
    RetryOnFail(RetryPolicy),
    /// One shard per mirror across every group.
    CommonFanOut,
}

impl RoutingStrategy {
    /// Retry schedule of this strategy, if any.
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        match self {
            Self::RetryOnFail(policy) => Some(*policy),
            Self::Shard | Self::CommonFanOut => None,
        }
    }
}

/// Encoded datagrams of one call.
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// Sent to read-write groups, and to everyone when `replica` is absent.
    pub primary: Bytes,
    /// Quiet twin sent to write-only groups.
    pub replica: Option<Bytes>,
}

impl Outgoing {
    pub fn single(packet: Bytes) -> Self {
        Self {
            primary: packet,
            replica: None,
        }
    }
}

/// Maps keys to servers and schedules the sends.
pub struct Router {
    topology: Arc<Topology>,
    sink: Arc<dyn DatagramSink>,
    read_strategy: RoutingStrategy,
}

impl Router {
    pub fn new(
        topology: Arc<Topology>,
        sink: Arc<dyn DatagramSink>,
        read_strategy: RoutingStrategy,
    ) -> Self {
        Self {
            topology,
            sink,
            read_strategy,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Strategy used for reads.
    pub fn read_strategy(&self) -> RoutingStrategy {
        self.read_strategy
    }

    /// Schedule `packets` for `key` under `strategy`.
    ///
    /// Returns the number of datagrams scheduled.
    pub fn dispatch(&self, strategy: RoutingStrategy, key: &str, packets: Outgoing) -> usize {
        let scheduled = match strategy {
            RoutingStrategy::Shard | RoutingStrategy::RetryOnFail(_) => {
                self.send_to_read_mirror(0, key, packets.primary);
                1
            }
            RoutingStrategy::CommonFanOut => self.fan_out(key, packets),
        };
        metrics::record_datagrams_scheduled(scheduled);
        scheduled
    }

    /// Send `packet` to `key`'s shard on a read mirror (index wraps).
    pub fn send_to_read_mirror(&self, mirror: usize, key: &str, packet: Bytes) {
        let mirrors = self.topology.read_mirrors();
        let dest = mirrors[mirror % mirrors.len()].shard_for(key);
        self.sink.send(packet, dest);
    }

    fn fan_out(&self, key: &str, packets: Outgoing) -> usize {
        let Outgoing { primary, replica } = packets;
        let mut scheduled = 0;
        for (role, dest) in self.topology.write_targets(key) {
            let packet = match (role, &replica) {
                (GroupRole::WriteOnly, Some(quiet)) => quiet.clone(),
                _ => primary.clone(),
            };
            self.sink.send(packet, dest);
            scheduled += 1;
        }
        scheduled
    }
}
