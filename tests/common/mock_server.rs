//! In-process fake memcached speaking the binary protocol over UDP.
//!
//! Keeps an in-memory store, answers like a real server (quiet opcodes stay
//! silent on success), records every opcode it receives, and can be muted
//! to play a dead mirror.

use bytes::Buf;
use memcached_udp::protocol::{encode_response, CommandHeader, FrameHeader, Opcode, REQUEST_MAGIC};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const STATUS_OK: u16 = 0x00;
const STATUS_KEY_NOT_FOUND: u16 = 0x01;
const STATUS_KEY_EXISTS: u16 = 0x02;
const STATUS_NON_NUMERIC: u16 = 0x06;
const STATUS_UNKNOWN_COMMAND: u16 = 0x81;

#[derive(Default)]
struct MockState {
    store: Mutex<HashMap<String, String>>,
    received: Mutex<Vec<Opcode>>,
    muted: AtomicBool,
}

/// A fake memcached server bound to a loopback port.
///
/// # Example
/// ```rust,ignore
/// let server = MockServer::start().await;
/// let client = Client::builder().add_read_write_mirror(vec![server.addr()]).build()?;
///
/// client.set("k", 0, "v").await?;
/// assert_eq!(server.value("k").as_deref(), Some("v"));
///
/// server.mute(); // now every request times out
/// ```
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = socket.local_addr().expect("mock server address");
        let state = Arc::new(MockState::default());
        let task = tokio::spawn(serve(socket, Arc::clone(&state)));
        Self { addr, state, task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop replying. Requests are still recorded.
    pub fn mute(&self) {
        self.state.muted.store(true, Ordering::SeqCst);
    }

    pub fn unmute(&self) {
        self.state.muted.store(false, Ordering::SeqCst);
    }

    /// Opcodes received so far, in arrival order.
    pub fn received(&self) -> Vec<Opcode> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_count(&self, opcode: Opcode) -> usize {
        self.received().iter().filter(|op| **op == opcode).count()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.store.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.state
            .store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) -> bool {
        for _ in 0..200 {
            if self.state.received.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: UdpSocket, state: Arc<MockState>) {
    let mut buf = vec![0u8; 65_536];
    loop {
        let Ok((len, from)) = socket.recv_from(&mut buf).await else {
            continue;
        };
        let Some(request) = ParsedRequest::parse(&buf[..len]) else {
            continue;
        };
        state.received.lock().unwrap().push(request.opcode);
        if state.muted.load(Ordering::SeqCst) {
            continue;
        }
        if let Some(reply) = handle(&state, &request) {
            let _ = socket.send_to(&reply, from).await;
        }
    }
}

struct ParsedRequest {
    request_id: u16,
    opaque: u32,
    opcode: Opcode,
    extras: Vec<u8>,
    key: String,
    value: Vec<u8>,
}

impl ParsedRequest {
    fn parse(datagram: &[u8]) -> Option<Self> {
        let mut buf = datagram;
        let frame = FrameHeader::decode(&mut buf)?;
        let header = CommandHeader::decode(&mut buf)?;
        if header.magic != REQUEST_MAGIC || buf.remaining() < header.total_body_len as usize {
            return None;
        }
        let opcode = Opcode::from_u8(header.opcode)?;
        let extras = buf.copy_to_bytes(header.extras_len as usize).to_vec();
        let key = String::from_utf8(buf.copy_to_bytes(header.key_len as usize).to_vec()).ok()?;
        let value = buf.copy_to_bytes(header.value_len()?).to_vec();
        Some(Self {
            request_id: frame.request_id,
            opaque: header.opaque,
            opcode,
            extras,
            key,
            value,
        })
    }

    fn reply(&self, status: u16, extras: &[u8], value: &[u8]) -> Option<bytes::Bytes> {
        // Quiet opcodes only answer on error.
        if self.opcode.is_quiet() && status == STATUS_OK {
            return None;
        }
        Some(encode_response(
            self.request_id,
            self.opcode.code(),
            status,
            self.opaque,
            extras,
            value,
        ))
    }

    fn error(&self, status: u16, message: &str) -> Option<bytes::Bytes> {
        self.reply(status, &[], message.as_bytes())
    }
}

fn handle(state: &MockState, request: &ParsedRequest) -> Option<bytes::Bytes> {
    let mut store = state.store.lock().unwrap();
    let key = request.key.clone();

    match request.opcode.quiet() {
        Opcode::GetQ => match store.get(&key) {
            Some(value) => request.reply(STATUS_OK, &[0, 0, 0, 0], value.as_bytes()),
            // GETQ misses are silent; GET misses are not.
            None if request.opcode.is_quiet() => None,
            None => request.error(STATUS_KEY_NOT_FOUND, "Not found"),
        },
        Opcode::SetQ => {
            store.insert(key, String::from_utf8_lossy(&request.value).into_owned());
            request.reply(STATUS_OK, &[], &[])
        }
        Opcode::AddQ => {
            if store.contains_key(&key) {
                return request.error(STATUS_KEY_EXISTS, "Data exists for key.");
            }
            store.insert(key, String::from_utf8_lossy(&request.value).into_owned());
            request.reply(STATUS_OK, &[], &[])
        }
        Opcode::ReplaceQ => {
            if !store.contains_key(&key) {
                return request.error(STATUS_KEY_NOT_FOUND, "Not found");
            }
            store.insert(key, String::from_utf8_lossy(&request.value).into_owned());
            request.reply(STATUS_OK, &[], &[])
        }
        Opcode::DeleteQ => match store.remove(&key) {
            Some(_) => request.reply(STATUS_OK, &[], &[]),
            None => request.error(STATUS_KEY_NOT_FOUND, "Not found"),
        },
        Opcode::IncrementQ | Opcode::DecrementQ => {
            let mut extras = request.extras.as_slice();
            if extras.len() < 20 {
                return request.error(0x04, "Invalid arguments");
            }
            let delta = extras.get_u64();
            let initial = extras.get_u64();
            let next = match store.get(&key) {
                None => initial,
                Some(current) => match current.parse::<u64>() {
                    Ok(n) if request.opcode.quiet() == Opcode::IncrementQ => n.wrapping_add(delta),
                    Ok(n) => n.saturating_sub(delta),
                    Err(_) => {
                        return request.error(STATUS_NON_NUMERIC, "Non-numeric server-side value")
                    }
                },
            };
            store.insert(key, next.to_string());
            request.reply(STATUS_OK, &[], &next.to_be_bytes())
        }
        _ => request.error(STATUS_UNKNOWN_COMMAND, "Unknown command"),
    }
}
