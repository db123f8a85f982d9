//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Requests issued per opcode (awaited and quiet)
//! - Datagrams sent and send failures per destination
//! - Responses per status, unmatched and discarded datagrams
//! - Timeouts, retry-on-fail resends and exhaustion
//! - In-flight request count and call latency
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `memcached_udp_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! The crate never installs a recorder; without one these calls are no-ops.

use metrics::{counter, gauge, histogram};
use std::net::SocketAddr;
use std::time::Duration;

/// Record a call that awaits a response.
pub fn record_request(opcode: &'static str) {
    counter!("memcached_udp_requests_total", "opcode" => opcode).increment(1);
}

/// Record a fire-and-forget call.
pub fn record_quiet_request(opcode: &'static str) {
    counter!("memcached_udp_quiet_requests_total", "opcode" => opcode).increment(1);
}

/// Record a call rejected before anything was sent.
pub fn record_request_rejected(reason: &'static str) {
    counter!("memcached_udp_requests_rejected_total", "reason" => reason).increment(1);
}

/// Record datagrams handed to the reactor for one routing decision.
pub fn record_datagrams_scheduled(count: usize) {
    counter!("memcached_udp_datagrams_scheduled_total").increment(count as u64);
}

/// Record a datagram written to the socket.
pub fn record_datagram_sent(bytes: usize) {
    counter!("memcached_udp_datagrams_sent_total").increment(1);
    counter!("memcached_udp_bytes_sent_total").increment(bytes as u64);
}

/// Record a socket write failure.
pub fn record_send_error(dest: SocketAddr) {
    counter!("memcached_udp_send_errors_total", "dest" => dest.to_string()).increment(1);
}

/// Record a socket read failure.
pub fn record_recv_error() {
    counter!("memcached_udp_recv_errors_total").increment(1);
}

/// Record a response matched to a pending call.
pub fn record_response(status: u16) {
    let status = if status == 0 { "ok".to_string() } else { format!("{:#04x}", status) };
    counter!("memcached_udp_responses_total", "status" => status).increment(1);
}

/// Record a response nobody was waiting for (late, duplicate or quiet).
pub fn record_unmatched_response() {
    counter!("memcached_udp_unmatched_responses_total").increment(1);
}

/// Record a datagram dropped before correlation.
pub fn record_discarded_datagram(reason: &'static str) {
    counter!("memcached_udp_discarded_datagrams_total", "reason" => reason).increment(1);
}

/// Record a call failed by its timeout.
pub fn record_timeout(opcode: &'static str) {
    counter!("memcached_udp_timeouts_total", "opcode" => opcode).increment(1);
}

/// Record a retry-on-fail resend.
pub fn record_retry(mirror: usize) {
    counter!("memcached_udp_retries_total", "mirror" => mirror.to_string()).increment(1);
}

/// Record a retry schedule that ran out of attempts.
pub fn record_retries_exhausted() {
    counter!("memcached_udp_retries_exhausted_total").increment(1);
}

/// Gauge for in-flight calls.
pub fn set_pending_requests(count: usize) {
    gauge!("memcached_udp_pending_requests").set(count as f64);
}

/// Record time from send to completion of an awaited call.
pub fn record_call_latency(opcode: &'static str, outcome: &'static str, duration: Duration) {
    histogram!(
        "memcached_udp_call_duration_seconds",
        "opcode" => opcode,
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());
}
