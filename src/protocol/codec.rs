// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request encoding and response decoding.
//!
//! Pure functions: no socket, no state. Requests are encoded straight into a
//! frozen [`Bytes`] so the routing layer can hand one buffer to several
//! destinations without copying.

use super::opcode::{Opcode, ReplyKind};
use crate::error::{ClientError, OperationError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic byte of a request command header.
pub const REQUEST_MAGIC: u8 = 0x80;
/// Magic byte of a response command header.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// UDP frame header length.
pub const FRAME_HEADER_LEN: usize = 8;
/// Command header length.
pub const COMMAND_HEADER_LEN: usize = 24;
/// Bytes before the body of every datagram.
pub const HEADERS_LEN: usize = FRAME_HEADER_LEN + COMMAND_HEADER_LEN;

/// Extras of SET/ADD/REPLACE: flags(4) + expiry(4).
pub const STORE_EXTRAS_LEN: u8 = 8;
/// Extras of INCREMENT/DECREMENT: delta(8) + initial(8) + expiry(4).
pub const COUNTER_EXTRAS_LEN: u8 = 20;

/// Longest key the server accepts.
pub const MAX_KEY_LEN: usize = 250;
/// Largest payload of one IPv4 UDP datagram.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// UDP frame header: four big-endian 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub request_id: u16,
    pub sequence: u16,
    pub total_datagrams: u16,
}

impl FrameHeader {
    /// Header of a request that fits one datagram.
    pub fn single(request_id: u16) -> Self {
        Self {
            request_id,
            sequence: 0,
            total_datagrams: 1,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.request_id);
        buf.put_u16(self.sequence);
        buf.put_u16(self.total_datagrams);
        buf.put_u16(0); // reserved
    }

    /// Read a frame header. Returns `None` if `buf` is too short.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < FRAME_HEADER_LEN {
            return None;
        }
        let request_id = buf.get_u16();
        let sequence = buf.get_u16();
        let total_datagrams = buf.get_u16();
        let _reserved = buf.get_u16();
        Some(Self {
            request_id,
            sequence,
            total_datagrams,
        })
    }
}

/// Command header shared by requests and responses.
///
/// ```text
///  Byte/     0       |       1       |       2       |       3       |
///    +---------------+---------------+---------------+---------------+
///   0| Magic         | Opcode        | Key length                    |
///   4| Extras length | Data type     | Reserved / Status             |
///   8| Total body length                                             |
///  12| Opaque                                                        |
///  16| CAS                                                           |
///    +---------------+---------------+---------------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub magic: u8,
    pub opcode: u8,
    pub key_len: u16,
    pub extras_len: u8,
    pub data_type: u8,
    /// Reserved (zero) in requests, status in responses.
    pub status: u16,
    pub total_body_len: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl CommandHeader {
    pub fn request(opcode: Opcode, opaque: u32, key_len: u16, extras_len: u8, value_len: usize) -> Self {
        Self {
            magic: REQUEST_MAGIC,
            opcode: opcode.code(),
            key_len,
            extras_len,
            data_type: 0,
            status: 0,
            total_body_len: (extras_len as usize + key_len as usize + value_len) as u32,
            opaque,
            cas: 0,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.magic);
        buf.put_u8(self.opcode);
        buf.put_u16(self.key_len);
        buf.put_u8(self.extras_len);
        buf.put_u8(self.data_type);
        buf.put_u16(self.status);
        buf.put_u32(self.total_body_len);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// Read a command header. Returns `None` if `buf` is too short.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < COMMAND_HEADER_LEN {
            return None;
        }
        Some(Self {
            magic: buf.get_u8(),
            opcode: buf.get_u8(),
            key_len: buf.get_u16(),
            extras_len: buf.get_u8(),
            data_type: buf.get_u8(),
            status: buf.get_u16(),
            total_body_len: buf.get_u32(),
            opaque: buf.get_u32(),
            cas: buf.get_u64(),
        })
    }

    /// Value length implied by the header, `None` if the lengths are inconsistent.
    pub fn value_len(&self) -> Option<usize> {
        (self.total_body_len as usize)
            .checked_sub(self.extras_len as usize)?
            .checked_sub(self.key_len as usize)
    }
}

/// One request to encode.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    /// Key only, no extras (get/delete).
    Key { opcode: Opcode, key: &'a str },
    /// Flags + expiry extras, key, value (set/add/replace).
    Store {
        opcode: Opcode,
        key: &'a str,
        expiry: u32,
        value: &'a [u8],
    },
    /// Delta + initial + expiry extras, key (increment/decrement).
    Counter {
        opcode: Opcode,
        key: &'a str,
        delta: u64,
        initial: u64,
        expiry: u32,
    },
}

impl<'a> Request<'a> {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Key { opcode, .. } | Self::Store { opcode, .. } | Self::Counter { opcode, .. } => {
                *opcode
            }
        }
    }

    pub fn key(&self) -> &'a str {
        match self {
            Self::Key { key, .. } | Self::Store { key, .. } | Self::Counter { key, .. } => *key,
        }
    }

    /// Same request with another opcode (used for the quiet twin of a write).
    pub fn with_opcode(self, opcode: Opcode) -> Self {
        match self {
            Self::Key { key, .. } => Self::Key { opcode, key },
            Self::Store {
                key, expiry, value, ..
            } => Self::Store {
                opcode,
                key,
                expiry,
                value,
            },
            Self::Counter {
                key,
                delta,
                initial,
                expiry,
                ..
            } => Self::Counter {
                opcode,
                key,
                delta,
                initial,
                expiry,
            },
        }
    }

    fn extras_len(&self) -> u8 {
        match self {
            Self::Key { .. } => 0,
            Self::Store { .. } => STORE_EXTRAS_LEN,
            Self::Counter { .. } => COUNTER_EXTRAS_LEN,
        }
    }

    fn value(&self) -> &'a [u8] {
        match self {
            Self::Store { value, .. } => *value,
            _ => &[],
        }
    }

    /// Encoded size of the full datagram.
    pub fn encoded_len(&self) -> usize {
        HEADERS_LEN + self.extras_len() as usize + self.key().len() + self.value().len()
    }

    /// Check the key and the datagram size against protocol limits.
    pub fn validate(&self) -> Result<()> {
        validate_key(self.key())?;
        let size = self.encoded_len();
        if size > MAX_DATAGRAM_LEN {
            return Err(ClientError::PacketTooLarge {
                size,
                max: MAX_DATAGRAM_LEN,
            });
        }
        Ok(())
    }
}

/// Check a key against the server's limits.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(ClientError::InvalidKey("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ClientError::InvalidKey(format!(
            "key is {} bytes, max {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// Encode a single-datagram request carrying `request_id` in both the frame
/// header and the opaque field.
pub fn encode_request(request_id: u16, request: &Request<'_>) -> Result<Bytes> {
    request.validate()?;
    let size = request.encoded_len();

    let key = request.key().as_bytes();
    let value = request.value();
    let mut buf = BytesMut::with_capacity(size);

    FrameHeader::single(request_id).encode(&mut buf);
    CommandHeader::request(
        request.opcode(),
        request_id as u32,
        key.len() as u16,
        request.extras_len(),
        value.len(),
    )
    .encode(&mut buf);

    match *request {
        Request::Key { .. } => {}
        Request::Store { expiry, .. } => {
            buf.put_u32(0); // flags
            buf.put_u32(expiry);
        }
        Request::Counter {
            delta,
            initial,
            expiry,
            ..
        } => {
            buf.put_u64(delta);
            buf.put_u64(initial);
            buf.put_u32(expiry);
        }
    }
    buf.put_slice(key);
    buf.put_slice(value);

    debug_assert_eq!(buf.len(), size);
    Ok(buf.freeze())
}

/// Decoded payload of a successful reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Value(String),
    Done,
    Counter(u64),
}

/// Result of decoding one inbound datagram.
#[derive(Debug)]
pub enum Inbound {
    /// Not something the client can attribute to a call; dropped.
    Noise(&'static str),
    /// A response for the call whose correlation id is `opaque`.
    Response {
        opaque: u32,
        opcode: u8,
        status: u16,
        outcome: Result<Reply>,
    },
}

/// Decode one inbound datagram.
///
/// Never panics: short datagrams, foreign magic bytes and multi-datagram
/// responses are [`Inbound::Noise`]. Once the opaque is known, every other
/// problem is reported through the response's `outcome`.
pub fn decode_response(datagram: &[u8]) -> Inbound {
    let mut buf = datagram;

    let Some(frame) = FrameHeader::decode(&mut buf) else {
        return Inbound::Noise("datagram shorter than frame header");
    };
    if frame.total_datagrams > 1 {
        return Inbound::Noise("multi-datagram response");
    }
    let Some(header) = CommandHeader::decode(&mut buf) else {
        return Inbound::Noise("datagram shorter than command header");
    };
    if header.magic != RESPONSE_MAGIC {
        return Inbound::Noise("not a response packet");
    }

    let outcome = decode_body(&header, buf);
    Inbound::Response {
        opaque: header.opaque,
        opcode: header.opcode,
        status: header.status,
        outcome,
    }
}

fn decode_body(header: &CommandHeader, mut body: &[u8]) -> Result<Reply> {
    if header.status != 0 {
        return Err(OperationError::new(header.status).into());
    }

    let value_len = header.value_len().ok_or_else(|| {
        ClientError::MalformedResponse(format!(
            "body length {} smaller than extras {} + key {}",
            header.total_body_len, header.extras_len, header.key_len
        ))
    })?;
    if body.len() < header.total_body_len as usize {
        return Err(ClientError::MalformedResponse(format!(
            "body is {} bytes, header declares {}",
            body.len(),
            header.total_body_len
        )));
    }

    body.advance(header.extras_len as usize + header.key_len as usize);
    let value = &body[..value_len];

    let opcode = Opcode::from_u8(header.opcode).ok_or(ClientError::UnsupportedResponse {
        opcode: header.opcode,
    })?;
    match opcode.reply_kind() {
        ReplyKind::Value => Ok(Reply::Value(String::from_utf8_lossy(value).into_owned())),
        ReplyKind::Done => Ok(Reply::Done),
        ReplyKind::Counter => {
            let bytes: [u8; 8] = value.try_into().map_err(|_| {
                ClientError::MalformedResponse(format!(
                    "counter value is {} bytes, expected 8",
                    value.len()
                ))
            })?;
            Ok(Reply::Counter(u64::from_be_bytes(bytes)))
        }
    }
}

/// Encode a response datagram. Used by test servers and fuzzers.
pub fn encode_response(
    request_id: u16,
    opcode: u8,
    status: u16,
    opaque: u32,
    extras: &[u8],
    value: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADERS_LEN + extras.len() + value.len());
    FrameHeader::single(request_id).encode(&mut buf);
    CommandHeader {
        magic: RESPONSE_MAGIC,
        opcode,
        key_len: 0,
        extras_len: extras.len() as u8,
        data_type: 0,
        status,
        total_body_len: (extras.len() + value.len()) as u32,
        opaque,
        cas: 0,
    }
    .encode(&mut buf);
    buf.put_slice(extras);
    buf.put_slice(value);
    buf.freeze()
}
