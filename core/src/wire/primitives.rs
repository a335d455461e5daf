//! Core (de)serialization traits and the small fixed-size wire types
//! shared across message bodies: network addresses, inventory vectors.
//!
//! `Encode`/`Decode` mirror the teacher workspace's preference for small,
//! focused traits over one do-everything serializer; every message type
//! in [`crate::wire::message`] is built out of these primitives plus the
//! varint helpers in [`crate::wire::varint`].

use std::io::{self, Read, Write};
use std::net::Ipv6Addr;

use crate::wire::varint::{read_varint, write_varint};

pub trait Encode {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()>;
}

pub trait Decode: Sized {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self>;
}

macro_rules! impl_int_codec {
    ($t:ty) => {
        impl Encode for $t {
            fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
                w.write_all(&self.to_le_bytes())
            }
        }
        impl Decode for $t {
            fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                r.read_exact(&mut buf)?;
                Ok(<$t>::from_le_bytes(buf))
            }
        }
    };
}

impl_int_codec!(u8);
impl_int_codec!(u16);
impl_int_codec!(u32);
impl_int_codec!(u64);
impl_int_codec!(i32);
impl_int_codec!(i64);

impl Encode for [u8; 32] {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(self)
    }
}

impl Decode for [u8; 32] {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 32];
        r.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_varint(w, self.len() as u64)?;
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let count = read_varint(r)?;
        let mut out = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            out.push(T::decode(r)?);
        }
        Ok(out)
    }
}

/// A peer or address-book network endpoint: services bitmap, 16-byte
/// (v4-mapped or native) IPv6 address, and port in *network byte order*
/// (big-endian) as the wire protocol requires — the one field in the
/// message layer that is not little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetAddr {
    pub services: u64,
    pub ip: Ipv6Addr,
    pub port: u16,
}

impl NetAddr {
    pub fn new_v4(services: u64, ip: std::net::Ipv4Addr, port: u16) -> Self {
        NetAddr { services, ip: ip.to_ipv6_mapped(), port }
    }
}

impl Encode for NetAddr {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.services.to_le_bytes())?;
        w.write_all(&self.ip.octets())?;
        w.write_all(&self.port.to_be_bytes())
    }
}

impl Decode for NetAddr {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut services = [0u8; 8];
        r.read_exact(&mut services)?;
        let mut ip = [0u8; 16];
        r.read_exact(&mut ip)?;
        let mut port = [0u8; 2];
        r.read_exact(&mut port)?;
        Ok(NetAddr {
            services: u64::from_le_bytes(services),
            ip: Ipv6Addr::from(ip),
            port: u16::from_be_bytes(port),
        })
    }
}

/// A timestamped variant of [`NetAddr`] used in the `addr` message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedAddr {
    pub timestamp: u32,
    pub addr: NetAddr,
}

impl Encode for TimestampedAddr {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.timestamp.to_le_bytes())?;
        self.addr.encode(w)
    }
}

impl Decode for TimestampedAddr {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut ts = [0u8; 4];
        r.read_exact(&mut ts)?;
        Ok(TimestampedAddr { timestamp: u32::from_le_bytes(ts), addr: NetAddr::decode(r)? })
    }
}

/// Inventory item types as used in `inv`/`getdata`/`notfound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InvType {
    Error = 0,
    Tx = 1,
    Block = 2,
    FilteredBlock = 3,
}

impl InvType {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(InvType::Error),
            1 => Some(InvType::Tx),
            2 => Some(InvType::Block),
            3 => Some(InvType::FilteredBlock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryVector {
    pub inv_type: u32,
    pub hash: [u8; 32],
}

impl InventoryVector {
    pub fn new(kind: InvType, hash: [u8; 32]) -> Self {
        InventoryVector { inv_type: kind as u32, hash }
    }

    pub fn kind(&self) -> Option<InvType> {
        InvType::from_u32(self.inv_type)
    }
}

impl Encode for InventoryVector {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.inv_type.to_le_bytes())?;
        w.write_all(&self.hash)
    }
}

impl Decode for InventoryVector {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut inv_type = [0u8; 4];
        r.read_exact(&mut inv_type)?;
        let mut hash = [0u8; 32];
        r.read_exact(&mut hash)?;
        Ok(InventoryVector { inv_type: u32::from_le_bytes(inv_type), hash })
    }
}
