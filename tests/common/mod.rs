//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - A fake memcached UDP server
//! - Client construction helpers for loopback topologies

#![allow(dead_code)]

pub mod mock_server;

pub use mock_server::*;

use memcached_udp::{Client, ClientBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Builder bound to loopback with a timeout generous enough for CI.
pub fn loopback_builder() -> ClientBuilder {
    Client::builder()
        .bind_address("127.0.0.1:0".parse().unwrap())
        .timeout(Duration::from_millis(500))
}

/// Client reading from and writing to a single one-shard mirror.
pub fn single_server_client(server: SocketAddr) -> Client {
    loopback_builder()
        .add_read_write_mirror(vec![server])
        .build()
        .expect("build client")
}

/// Address nothing listens on.
pub fn dead_address() -> SocketAddr {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
