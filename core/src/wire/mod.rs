//! The Bitcoin p2p wire format (§4.2): varint/primitive codecs and the
//! full message set with frame-level validation.

pub mod message;
pub mod primitives;
pub mod varint;

pub use message::Message;
pub use primitives::{Decode, Encode};
