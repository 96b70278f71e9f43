//! Wire framing for protocol messages
//!
//! One JSON document per line in both directions. Decoding is tolerant:
//! anything that is not a known message is dropped so a single bad line
//! never ends a conversation.

mod parser;

pub use parser::{decode_line, encode_line, parse_message};
