// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chaos tests: hostile networks and misbehaving servers.
//!
//! These tests verify the client never panics, never attributes a reply to
//! the wrong call, and never leaks pending calls.
//!
//! Run with: cargo test --test chaos_tests -- --nocapture

mod common;

use bytes::Buf;
use common::{eventually, loopback_builder, single_server_client, MockServer};
use memcached_udp::protocol::{encode_response, CommandHeader, FrameHeader};
use memcached_udp::{Client, ClientError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A server socket the test drives by hand.
async fn rogue_server() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

/// Receive one request and return (request id, opaque, opcode, client address).
async fn next_request(socket: &UdpSocket) -> (u16, u32, u8, SocketAddr) {
    let mut buf = vec![0u8; 65_536];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("request within 2s")
        .unwrap();
    let mut datagram = &buf[..len];
    let frame = FrameHeader::decode(&mut datagram).unwrap();
    let header = CommandHeader::decode(&mut datagram).unwrap();
    assert_eq!(datagram.remaining(), header.total_body_len as usize);
    (frame.request_id, header.opaque, header.opcode, from)
}

fn client_for(server: SocketAddr, timeout: Duration) -> Client {
    loopback_builder()
        .add_read_write_mirror(vec![server])
        .timeout(timeout)
        .build()
        .unwrap()
}

// =============================================================================
// Garbage Input
// =============================================================================

/// Test: garbage datagrams sent to the client socket don't disturb it
#[tokio::test]
async fn garbage_datagrams_are_ignored() {
    let server = MockServer::start().await;
    let client = single_server_client(server.addr());
    let attacker = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut payloads: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x00],
        vec![0xff; 7],
        vec![0x00; 31],
        vec![0x00; 32],
        // Request magic instead of response magic.
        {
            let mut v = vec![0u8; 32];
            v[8] = 0x80;
            v
        },
        // Response header claiming a 4 GiB body.
        {
            let mut v = vec![0u8; 32];
            v[8] = 0x81;
            v[16..20].copy_from_slice(&u32::MAX.to_be_bytes());
            v
        },
        // Multi-datagram frame.
        {
            let mut v = vec![0u8; 40];
            v[4..6].copy_from_slice(&3u16.to_be_bytes());
            v[8] = 0x81;
            v
        },
    ];
    payloads.extend((0..50).map(|i| (0..(i * 13 % 97)).map(|b| (b * 31 + i) as u8).collect()));

    for payload in &payloads {
        attacker.send_to(payload, client.local_addr()).await.unwrap();
    }

    client.set("k", 0, "still works").await.unwrap();
    assert_eq!(client.get("k").await.unwrap(), "still works");
    assert_eq!(client.pending_requests(), 0);
}

/// Test: a malformed reply fails only the call it names
#[tokio::test]
async fn malformed_reply_fails_matching_call() {
    let (server, addr) = rogue_server().await;
    let client = client_for(addr, Duration::from_secs(1));

    let response = client.increment("n", 0);
    let (id, opaque, opcode, from) = next_request(&server).await;

    // Counter reply with a 3-byte value.
    let reply = encode_response(id, opcode, 0, opaque, &[], &[1, 2, 3]);
    server.send_to(&reply, from).await.unwrap();

    assert!(matches!(
        response.await,
        Err(ClientError::MalformedResponse(_))
    ));
    assert_eq!(client.pending_requests(), 0);
}

// =============================================================================
// Late, Duplicate and Misattributed Replies
// =============================================================================

/// Test: a reply arriving after the timeout is dropped
#[tokio::test]
async fn late_reply_after_timeout_is_dropped() {
    let (server, addr) = rogue_server().await;
    let client = client_for(addr, Duration::from_millis(50));

    let response = client.get("k");
    let (id, opaque, opcode, from) = next_request(&server).await;
    assert!(response.await.unwrap_err().is_timeout());

    let late = encode_response(id, opcode, 0, opaque, &[0; 4], b"too late");
    server.send_to(&late, from).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Next call gets its own reply, not the stale one.
    let response = client.get("k2");
    let (id2, opaque2, opcode2, from2) = next_request(&server).await;
    assert_ne!(id2, id);
    let fresh = encode_response(id2, opcode2, 0, opaque2, &[0; 4], b"fresh");
    server.send_to(&fresh, from2).await.unwrap();
    assert_eq!(response.await.unwrap(), "fresh");
}

/// Test: duplicate replies resolve a call once
#[tokio::test]
async fn duplicate_replies_resolve_once() {
    let (server, addr) = rogue_server().await;
    let client = client_for(addr, Duration::from_secs(1));

    let response = client.get("k");
    let (id, opaque, opcode, from) = next_request(&server).await;
    for value in [&b"first"[..], &b"second"[..], &b"third"[..]] {
        let reply = encode_response(id, opcode, 0, opaque, &[0; 4], value);
        server.send_to(&reply, from).await.unwrap();
    }

    assert_eq!(response.await.unwrap(), "first");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.pending_requests(), 0);
}

/// Test: a reply for an unknown id never resolves a pending call
#[tokio::test]
async fn reply_with_wrong_opaque_is_ignored() {
    let (server, addr) = rogue_server().await;
    let client = client_for(addr, Duration::from_millis(100));

    let response = client.get("k");
    let (id, opaque, opcode, from) = next_request(&server).await;

    let wrong = encode_response(id, opcode, 0, opaque.wrapping_add(1), &[0; 4], b"not yours");
    server.send_to(&wrong, from).await.unwrap();

    assert!(response.await.unwrap_err().is_timeout());
}

/// Test: a reply carrying another opcode never resolves a pending call
#[tokio::test]
async fn reply_with_wrong_opcode_is_ignored() {
    let (server, addr) = rogue_server().await;
    let client = client_for(addr, Duration::from_millis(100));

    let response = client.set("k", 0, "v");
    let (id, opaque, _opcode, from) = next_request(&server).await;

    // SETQ error reply (as a write-only replica would send) for the same id.
    let quiet_error = encode_response(id, 0x11, 0x05, opaque, &[], b"Not stored");
    server.send_to(&quiet_error, from).await.unwrap();

    assert!(response.await.unwrap_err().is_timeout());
}

// =============================================================================
// Concurrency
// =============================================================================

/// Test: many tasks sharing one client all get their own answers
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_burst_from_many_tasks() {
    let server = MockServer::start().await;
    let client = single_server_client(server.addr());

    let mut handles = Vec::new();
    for task in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let key = format!("t{}-k{}", task, i);
                let value = format!("t{}-v{}", task, i);
                client.set(&key, 0, &value).await.unwrap();
                assert_eq!(client.get(&key).await.unwrap(), value);
                client.set_quiet(&format!("{}-q", key), 0, "quiet");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(client.pending_requests(), 0);
    assert!(eventually(|| server.value("t7-k24-q").is_some()).await);
}

/// Test: abandoning a burst of calls leaks nothing
#[tokio::test]
async fn abandoned_calls_do_not_leak() {
    let server = MockServer::start().await;
    server.mute();
    let client = single_server_client(server.addr());

    let responses: Vec<_> = (0..500).map(|i| client.get(&format!("k{}", i))).collect();
    assert_eq!(client.pending_requests(), 500);
    drop(responses);
    assert_eq!(client.pending_requests(), 0);

    server.unmute();
    server.insert("k", "v");
    assert_eq!(client.get("k").await.unwrap(), "v");
}

/// Test: shutdown in the middle of a burst fails everything cleanly
#[tokio::test]
async fn shutdown_during_burst() {
    let server = MockServer::start().await;
    server.mute();
    let client = single_server_client(server.addr());

    let responses: Vec<_> = (0..100).map(|i| client.get(&format!("k{}", i))).collect();
    client.shutdown();
    client.shutdown(); // idempotent

    for result in futures::future::join_all(responses).await {
        assert!(matches!(result, Err(ClientError::Shutdown)));
    }
    client.set_quiet("after", 0, "ignored");
    assert_eq!(client.pending_requests(), 0);
}

/// Test: timeouts under load are independent per call
#[tokio::test]
async fn mixed_answered_and_silent_calls() {
    let alive = MockServer::start().await;
    let silent = MockServer::start().await;
    silent.mute();
    alive.insert("k", "v");

    let answered = single_server_client(alive.addr());
    let ignored = client_for(silent.addr(), Duration::from_millis(50));

    let slow: Vec<_> = (0..20).map(|i| ignored.get(&format!("k{}", i))).collect();
    let fast: Vec<_> = (0..20).map(|_| answered.get("k")).collect();

    for result in futures::future::join_all(fast).await {
        assert_eq!(result.unwrap(), "v");
    }
    for result in futures::future::join_all(slow).await {
        assert!(result.unwrap_err().is_timeout());
    }
}
