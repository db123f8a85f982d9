//! # Memcached UDP
//!
//! An asynchronous memcached client speaking the binary protocol over UDP,
//! with mirrored and sharded server groups.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              memcached-udp                                │
//! │                                                                           │
//! │  ┌──────────┐   ┌─────────────┐   ┌──────────┐   ┌─────────────────────┐  │
//! │  │ Client   │──►│ Correlator  │   │ Router   │──►│ UdpTransport        │  │
//! │  │ (facade) │   │ (ids,       │   │ (shard,  │   │ (reactor task:      │  │
//! │  │          │──►│  timeouts)  │◄──│  fan-out,│   │  send queue, recv,  │  │
//! │  └──────────┘   └─────────────┘   │  retry)  │   │  decode)            │  │
//! │                        ▲          └──────────┘   └─────────┬───────────┘  │
//! │                        └───────── inbound responses ───────┘              │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Topology
//!
//! Servers are organised as **groups** (typically datacenters) of
//! **mirrors** (interchangeable copies) of **shards** (a key lives on one
//! shard per mirror). Writes reach the key's shard on every mirror of every
//! group; write-only groups receive the quiet variant so they never answer.
//! Reads go to the read group's first mirror and, with retry-on-fail, rotate
//! through its other mirrors until one answers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use memcached_udp::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> memcached_udp::Result<()> {
//!     let client = Client::builder()
//!         .add_read_write_mirror(vec!["10.0.0.1:11211".parse().unwrap()])
//!         .add_write_only_mirror(vec!["10.1.0.1:11211".parse().unwrap()])
//!         .timeout(Duration::from_millis(50))
//!         .build()?;
//!
//!     client.set("visits", 0, "0").await?;
//!     let visits = client.increment("visits", 0).await?;
//!     client.delete_quiet("stale-key");
//!
//!     println!("visits: {}", visits);
//!     client.shutdown();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod correlator;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod retry;
pub mod routing;
pub mod topology;
pub mod transport;

// Re-exports for convenience
pub use client::{Client, ClientBuilder, FromReply, Response};
pub use config::{ClientConfig, GroupConfig, RetryOnFailConfig};
pub use error::{ClientError, OperationError, Result, StatusCategory};
pub use protocol::Opcode;
pub use retry::RetryPolicy;
pub use routing::RoutingStrategy;
pub use topology::{GroupRole, Mirror, MirrorGroup, ServerAddress, Topology};
