//! Memcached binary protocol over UDP.
//!
//! Every datagram is an 8-byte UDP frame header followed by a 24-byte command
//! header and a body of extras, key and value:
//!
//! ```text
//! ┌──────────────┬──────────────────┬────────┬─────┬───────┐
//! │ frame (8)    │ command (24)     │ extras │ key │ value │
//! │ id/seq/total │ magic/op/lengths │        │     │       │
//! └──────────────┴──────────────────┴────────┴─────┴───────┘
//! ```
//!
//! The client only sends single-datagram requests and only accepts
//! single-datagram responses.

mod codec;
mod opcode;

pub use codec::{
    decode_response, encode_request, encode_response, validate_key, CommandHeader, FrameHeader,
    Inbound, Reply, Request, COMMAND_HEADER_LEN, COUNTER_EXTRAS_LEN, FRAME_HEADER_LEN,
    HEADERS_LEN, MAX_DATAGRAM_LEN, MAX_KEY_LEN, REQUEST_MAGIC, RESPONSE_MAGIC, STORE_EXTRAS_LEN,
};
pub use opcode::{Opcode, ReplyKind};
