//! UDP transport: one socket, one reactor task.
//!
//! Callers never touch the socket. They hand `(packet, destination)` pairs
//! to a [`DatagramSink`], which queues them for the reactor without blocking.
//! The reactor multiplexes three things on the runtime:
//!
//! - outbound packets, written in the order they were scheduled
//! - inbound datagrams, decoded and handed to the [`RequestCorrelator`]
//! - the shutdown signal
//!
//! A packet handle is dropped as soon as its write has been issued, so a
//! buffer shared by several destinations is freed after the last of them.

use crate::correlator::RequestCorrelator;
use crate::error::{ClientError, Result};
use crate::metrics;
use crate::topology::ServerAddress;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Largest datagram the reactor reads.
const RECV_BUFFER_LEN: usize = 65_536;

/// Accepts datagrams for asynchronous delivery.
pub trait DatagramSink: Send + Sync {
    /// Schedule `packet` for `dest`. Must not block.
    fn send(&self, packet: Bytes, dest: ServerAddress);
}

struct Outbound {
    packet: Bytes,
    dest: ServerAddress,
}

/// Handle to the client's socket and its reactor task.
pub struct UdpTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind `bind_address` and start the reactor on `runtime`.
    ///
    /// Inbound datagrams are delivered to `correlator`.
    pub fn bind(
        bind_address: SocketAddr,
        correlator: Arc<RequestCorrelator>,
        runtime: &Handle,
    ) -> Result<Self> {
        let bind_error = |source| ClientError::Bind {
            address: bind_address,
            source,
        };

        let std_socket = std::net::UdpSocket::bind(bind_address).map_err(bind_error)?;
        std_socket.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = std_socket.local_addr().map_err(bind_error)?;
        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(std_socket).map_err(bind_error)?
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        runtime.spawn(run_reactor(socket, outbound_rx, shutdown_rx, correlator));

        info!(%local_addr, "UDP transport bound");
        Ok(Self {
            outbound,
            shutdown_tx,
            local_addr,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the reactor. Packets still queued are dropped.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl DatagramSink for UdpTransport {
    fn send(&self, packet: Bytes, dest: ServerAddress) {
        if self.outbound.send(Outbound { packet, dest }).is_err() {
            debug!(%dest, "Reactor stopped, dropping datagram");
        }
    }
}

async fn run_reactor(
    socket: UdpSocket,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown: watch::Receiver<bool>,
    correlator: Arc<RequestCorrelator>,
) {
    let mut recv_buf = vec![0u8; RECV_BUFFER_LEN];

    loop {
        tokio::select! {
            biased;

            // Also fires when the transport handle is dropped.
            _ = shutdown.changed() => break,

            Some(Outbound { packet, dest }) = outbound.recv() => {
                match socket.send_to(&packet, dest).await {
                    Ok(written) => metrics::record_datagram_sent(written),
                    Err(e) => {
                        warn!(%dest, error = %e, len = packet.len(), "Failed to send datagram");
                        metrics::record_send_error(dest);
                    }
                }
                drop(packet);
            }

            received = socket.recv_from(&mut recv_buf) => match received {
                Ok((len, from)) => correlator.on_datagram(&recv_buf[..len], from),
                Err(e) => {
                    // ICMP errors from earlier sends surface here on some platforms.
                    debug!(error = %e, "Failed to receive datagram");
                    metrics::record_recv_error();
                }
            },
        }
    }

    debug!("UDP reactor stopped");
}
