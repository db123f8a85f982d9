// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request correlation: matching asynchronous replies to pending calls.
//!
//! # Lifecycle of a pending call
//!
//! ```text
//! register() ──► pending ──┬── matching reply ──► complete()  ─┐
//!    │                     ├── timeout timer  ──► expire()    ─┼─► finished (once)
//!    │                     └── handle dropped ──► cancel()    ─┘
//!    └─ inserted before the first datagram is sent
//! ```
//!
//! Every path out of `pending` is a single `DashMap` removal, so exactly one
//! of them wins and the others find nothing to do. Removal aborts every timer
//! attached to the entry (timeout, retry schedule), which in turn drops any
//! packet buffer those timers were holding.
//!
//! # Correlation ids
//!
//! Ids are 16 bits because they travel in the UDP frame's request id as well
//! as the opaque field. The counter wraps; allocation skips ids that are still
//! pending, so a reply can never be attributed to a call it was not sent for.
//! Each entry also carries a unique 64-bit ticket, and timers only act on the
//! ticket they were armed for: a stale timer cannot fail a newer call that
//! happens to reuse the same id.

use crate::error::{ClientError, Result};
use crate::metrics;
use crate::protocol::{decode_response, Inbound, Opcode, Reply};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

/// Id echoed by the server in the opaque field.
pub type CorrelationId = u16;

/// Number of distinct correlation ids.
const ID_SPACE: usize = 1 << 16;

/// Completion channel of one call.
pub type Completion = oneshot::Receiver<Result<Reply>>;

/// Identifies one registration of a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration {
    pub id: CorrelationId,
    ticket: u64,
}

struct PendingRequest {
    ticket: u64,
    opcode: Opcode,
    created_at: Instant,
    completion: oneshot::Sender<Result<Reply>>,
    /// Timeout and retry tasks to cancel on completion.
    timers: Vec<AbortHandle>,
}

/// Table of calls awaiting a reply.
///
/// Safe to share between caller threads and the reactor task.
pub struct RequestCorrelator {
    pending: DashMap<CorrelationId, PendingRequest>,
    next_id: AtomicU32,
    next_ticket: AtomicU64,
    timeout: Duration,
}

impl RequestCorrelator {
    /// Create a correlator whose ids start at a time-derived seed.
    pub fn new(timeout: Duration) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
            .unwrap_or(0);
        Self::with_seed(timeout, seed as u16)
    }

    /// Create a correlator whose first id is `seed`.
    pub fn with_seed(timeout: Duration, seed: CorrelationId) -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU32::new(seed as u32),
            next_ticket: AtomicU64::new(1),
            timeout,
        }
    }

    /// Overall per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Next id from the wrapping counter, without reserving it.
    ///
    /// Quiet calls use this: nobody waits for their reply.
    pub fn next_id(&self) -> CorrelationId {
        self.next_id.fetch_add(1, Ordering::Relaxed) as CorrelationId
    }

    /// Number of calls awaiting a reply.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Reserve a free id and insert a pending entry for it.
    ///
    /// Must be called before the request is sent.
    pub fn register(&self, opcode: Opcode) -> Result<(Registration, Completion)> {
        for _ in 0..ID_SPACE {
            let id = self.next_id();
            if let Entry::Vacant(slot) = self.pending.entry(id) {
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingRequest {
                    ticket,
                    opcode,
                    created_at: Instant::now(),
                    completion: tx,
                    timers: Vec::new(),
                });
                metrics::set_pending_requests(self.pending.len());
                return Ok((Registration { id, ticket }, rx));
            }
            debug!(id, "Correlation id still pending, skipping");
        }
        Err(ClientError::TooManyPending)
    }

    /// Spawn the timeout timer of a registration on `runtime`.
    pub fn arm_timeout(self: &Arc<Self>, registration: Registration, runtime: &Handle) {
        let correlator = Arc::clone(self);
        let timeout = self.timeout;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            correlator.expire(registration);
        });
        self.attach_timer(registration, timer.abort_handle());
    }

    /// Tie a timer task to a registration so completion cancels it.
    ///
    /// If the call already finished, the timer is cancelled right away.
    pub fn attach_timer(&self, registration: Registration, timer: AbortHandle) {
        match self.pending.get_mut(&registration.id) {
            Some(mut entry) if entry.ticket == registration.ticket => entry.timers.push(timer),
            _ => timer.abort(),
        }
    }

    /// Check whether a registration is still awaiting its reply.
    pub fn is_pending(&self, registration: Registration) -> bool {
        self.pending
            .get(&registration.id)
            .is_some_and(|entry| entry.ticket == registration.ticket)
    }

    /// Complete the call pending under `id`. Returns false if none was pending.
    pub fn complete(&self, id: CorrelationId, outcome: Result<Reply>) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                self.finish(entry, outcome);
                true
            }
            None => false,
        }
    }

    /// Fail a registration with a timeout if it is still pending.
    pub fn expire(&self, registration: Registration) -> bool {
        let Some((_, entry)) = self.remove_registration(registration) else {
            return false;
        };
        let opcode = entry.opcode;
        debug!(
            id = registration.id,
            opcode = %opcode,
            timeout_ms = self.timeout.as_millis() as u64,
            "Request timed out"
        );
        metrics::record_timeout(opcode.name());
        self.finish(
            entry,
            Err(ClientError::Timeout {
                opcode: opcode.code(),
                after: self.timeout,
            }),
        );
        true
    }

    /// Drop a registration without resolving it (the caller gave up).
    pub fn cancel(&self, registration: Registration) -> bool {
        match self.remove_registration(registration) {
            Some((_, entry)) => {
                for timer in &entry.timers {
                    timer.abort();
                }
                metrics::set_pending_requests(self.pending.len());
                true
            }
            None => false,
        }
    }

    /// Fail every pending call with the error produced by `error`.
    pub fn fail_all(&self, error: impl Fn() -> ClientError) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter(|id| self.complete(*id, Err(error())))
            .count()
    }

    /// Decode an inbound datagram and complete the call it answers.
    ///
    /// A reply only matches a pending call with the same id *and* the same
    /// opcode, so error replies from quiet sends (to write-only replicas, or
    /// from fire-and-forget calls) never resolve an unrelated call.
    pub fn on_datagram(&self, datagram: &[u8], from: SocketAddr) {
        match decode_response(datagram) {
            Inbound::Noise(reason) => {
                debug!(%from, reason, len = datagram.len(), "Discarding datagram");
                metrics::record_discarded_datagram(reason);
            }
            Inbound::Response {
                opaque,
                opcode,
                status,
                outcome,
            } => {
                let matched = CorrelationId::try_from(opaque).ok().and_then(|id| {
                    self.pending.remove_if(&id, |_, entry| match Opcode::from_u8(opcode) {
                        Some(op) => op == entry.opcode,
                        None => true, // surfaces as an unsupported response
                    })
                });
                match matched {
                    Some((_, entry)) => {
                        metrics::record_response(status);
                        self.finish(entry, outcome);
                    }
                    None => {
                        debug!(
                            %from,
                            opaque,
                            opcode,
                            status,
                            "Response with no pending request (late, duplicate or quiet)"
                        );
                        metrics::record_unmatched_response();
                    }
                }
            }
        }
    }

    fn remove_registration(
        &self,
        registration: Registration,
    ) -> Option<(CorrelationId, PendingRequest)> {
        self.pending
            .remove_if(&registration.id, |_, entry| entry.ticket == registration.ticket)
    }

    fn finish(&self, entry: PendingRequest, outcome: Result<Reply>) {
        for timer in &entry.timers {
            timer.abort();
        }
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_call_latency(entry.opcode.name(), label, entry.created_at.elapsed());
        metrics::set_pending_requests(self.pending.len());
        // Receiver may be gone if the caller dropped its handle.
        let _ = entry.completion.send(outcome);
    }
}
