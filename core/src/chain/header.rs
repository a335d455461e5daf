//! The 80-byte Bitcoin block header and its derived identity (§3).

use std::io::{self, Read, Write};

use crate::crypto::hash::{sha256d, Hash256};
use crate::wire::primitives::{Decode, Encode};

/// A block header as it appears on the wire: exactly 80 bytes, no
/// transaction count. [`super::index::HeaderRecord`] adds the derived
/// height and cumulative work fields that only make sense once a header
/// has been linked into the chain index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// Length of a header on the wire; also the record stride used to
/// detect a torn write at the tail of `headers.dat` (§4.1).
pub const HEADER_LEN: usize = 80;

/// All-zero hash used as `prev_hash` for the genesis header of either
/// network.
pub const GENESIS_PREV_HASH: Hash256 = [0u8; 32];

impl BlockHeader {
    /// Double-SHA-256 of the 80-byte serialization. This is both the
    /// header's identity and, compared against `target(bits)`, its
    /// proof-of-work evidence.
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        self.encode(&mut buf).expect("encoding to a Vec cannot fail");
        sha256d(&buf)
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        self.encode(&mut buf).expect("encoding to a Vec cannot fail");
        buf
    }
}

impl Encode for BlockHeader {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(&self.prev_hash)?;
        w.write_all(&self.merkle_root)?;
        w.write_all(&self.time.to_le_bytes())?;
        w.write_all(&self.bits.to_le_bytes())?;
        w.write_all(&self.nonce.to_le_bytes())
    }
}

impl Decode for BlockHeader {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut version = [0u8; 4];
        r.read_exact(&mut version)?;
        let mut prev_hash = [0u8; 32];
        r.read_exact(&mut prev_hash)?;
        let mut merkle_root = [0u8; 32];
        r.read_exact(&mut merkle_root)?;
        let mut time = [0u8; 4];
        r.read_exact(&mut time)?;
        let mut bits = [0u8; 4];
        r.read_exact(&mut bits)?;
        let mut nonce = [0u8; 4];
        r.read_exact(&mut nonce)?;
        Ok(BlockHeader {
            version: i32::from_le_bytes(version),
            prev_hash,
            merkle_root,
            time: u32::from_le_bytes(time),
            bits: u32::from_le_bytes(bits),
            nonce: u32::from_le_bytes(nonce),
        })
    }
}
