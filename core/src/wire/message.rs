//! The Bitcoin p2p message set and frame codec (§4.2): magic bytes,
//! 12-byte NUL-padded command, checksum, and the per-command bodies the
//! peer group and wallet exchange.

use std::io::{self, Cursor, Read, Write};

use crate::chain::header::BlockHeader;
use crate::config::Network;
use crate::crypto::hash::{sha256d, Hash256};
use crate::error::{Error, Result};
use crate::wire::primitives::{Decode, Encode, InventoryVector, NetAddr, TimestampedAddr};
use crate::wire::varint::{read_var_bytes, read_var_str, read_varint, write_var_bytes, write_var_str, write_varint};

/// Frames larger than this are rejected and the sending peer disconnected.
pub const MAX_MESSAGE_PAYLOAD: usize = 32 * 1024 * 1024;

/// Longest a command name may be before NUL-padding to 12 bytes.
const COMMAND_LEN: usize = 12;

/// Bounds on individual var-length reads so a malicious peer cannot
/// force unbounded allocation from a single field.
const MAX_STRING_LEN: u64 = 1024;
const MAX_SCRIPT_LEN: u64 = 10_000;
const MAX_VECTOR_LEN: u64 = 50_000;

fn command_bytes(name: &str) -> [u8; COMMAND_LEN] {
    let mut buf = [0u8; COMMAND_LEN];
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn command_name(buf: &[u8; COMMAND_LEN]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(COMMAND_LEN);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// An outpoint: the transaction and output index an input spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl Encode for OutPoint {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.txid)?;
        w.write_all(&self.vout.to_le_bytes())
    }
}

impl Decode for OutPoint {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut txid = [0u8; 32];
        r.read_exact(&mut txid)?;
        let mut vout = [0u8; 4];
        r.read_exact(&mut vout)?;
        Ok(OutPoint { txid, vout: u32::from_le_bytes(vout) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl Encode for TxIn {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.previous_output.encode(w)?;
        write_var_bytes(w, &self.script_sig)?;
        w.write_all(&self.sequence.to_le_bytes())
    }
}

impl Decode for TxIn {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let previous_output = OutPoint::decode(r)?;
        let script_sig = read_var_bytes(r, MAX_SCRIPT_LEN)?;
        let mut sequence = [0u8; 4];
        r.read_exact(&mut sequence)?;
        Ok(TxIn { previous_output, script_sig, sequence: u32::from_le_bytes(sequence) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value_sat: u64,
    pub script_pubkey: Vec<u8>,
}

impl Encode for TxOut {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.value_sat.to_le_bytes())?;
        write_var_bytes(w, &self.script_pubkey)
    }
}

impl Decode for TxOut {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut value = [0u8; 8];
        r.read_exact(&mut value)?;
        let script_pubkey = read_var_bytes(r, MAX_SCRIPT_LEN)?;
        Ok(TxOut { value_sat: u64::from_le_bytes(value), script_pubkey })
    }
}

/// A legacy (pre-SegWit) transaction, the only form the wallet
/// constructs or needs to parse (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf).expect("encoding to a Vec cannot fail");
        buf
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.encode_to_vec())
    }
}

impl Encode for Transaction {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version.to_le_bytes())?;
        self.inputs.encode(w)?;
        self.outputs.encode(w)?;
        w.write_all(&self.lock_time.to_le_bytes())
    }
}

impl Decode for Transaction {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut version = [0u8; 4];
        r.read_exact(&mut version)?;
        let inputs = bounded_vec_decode(r, MAX_VECTOR_LEN)?;
        let outputs = bounded_vec_decode(r, MAX_VECTOR_LEN)?;
        let mut lock_time = [0u8; 4];
        r.read_exact(&mut lock_time)?;
        Ok(Transaction {
            version: i32::from_le_bytes(version),
            inputs,
            outputs,
            lock_time: u32::from_le_bytes(lock_time),
        })
    }
}

fn bounded_vec_decode<R: Read, T: Decode>(r: &mut R, max: u64) -> io::Result<Vec<T>> {
    let count = read_varint(r)?;
    if count > max {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "vector length exceeds max"));
    }
    let mut out = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        out.push(T::decode(r)?);
    }
    Ok(out)
}

/// The handshake's `version` message body.
#[derive(Debug, Clone)]
pub struct VersionPayload {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddr,
    pub sender: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

#[derive(Debug, Clone)]
pub struct AddrPayload {
    pub addresses: Vec<TimestampedAddr>,
}

#[derive(Debug, Clone)]
pub struct InvPayload {
    pub items: Vec<InventoryVector>,
}

#[derive(Debug, Clone)]
pub struct GetHeadersPayload {
    pub version: i32,
    pub locator_hashes: Vec<Hash256>,
    pub stop_hash: Hash256,
}

#[derive(Debug, Clone)]
pub struct HeadersPayload {
    pub headers: Vec<BlockHeader>,
}

#[derive(Debug, Clone)]
pub struct BlockPayload {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct MerkleBlockPayload {
    pub header: BlockHeader,
    pub total_transactions: u32,
    pub hashes: Vec<Hash256>,
    pub flag_bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FilterLoadPayload {
    pub filter_bytes: Vec<u8>,
    pub hash_funcs: u32,
    pub tweak: u32,
    pub flags: u8,
}

#[derive(Debug, Clone)]
pub struct RejectPayload {
    pub message: String,
    pub code: u8,
    pub reason: String,
    pub data: Vec<u8>,
}

/// One parsed p2p message. Unknown commands decode to [`Message::Unknown`]
/// and are logged, not fatal (§4.2).
#[derive(Debug, Clone)]
pub enum Message {
    Version(VersionPayload),
    Verack,
    Ping { nonce: u64 },
    Pong { nonce: u64 },
    Addr(AddrPayload),
    GetAddr,
    Inv(InvPayload),
    GetData(InvPayload),
    NotFound(InvPayload),
    GetHeaders(GetHeadersPayload),
    Headers(HeadersPayload),
    Tx(Transaction),
    Block(BlockPayload),
    MerkleBlock(MerkleBlockPayload),
    FilterLoad(FilterLoadPayload),
    FilterAdd { data: Vec<u8> },
    FilterClear,
    Reject(RejectPayload),
    SendHeaders,
    Unknown { command: String, payload: Vec<u8> },
}

impl Message {
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Addr(_) => "addr",
            Message::GetAddr => "getaddr",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::NotFound(_) => "notfound",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::Tx(_) => "tx",
            Message::Block(_) => "block",
            Message::MerkleBlock(_) => "merkleblock",
            Message::FilterLoad(_) => "filterload",
            Message::FilterAdd { .. } => "filteradd",
            Message::FilterClear => "filterclear",
            Message::Reject(_) => "reject",
            Message::SendHeaders => "sendheaders",
            Message::Unknown { command, .. } => command,
        }
    }

    fn encode_payload(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Message::Version(v) => {
                buf.write_all(&v.version.to_le_bytes())?;
                buf.write_all(&v.services.to_le_bytes())?;
                buf.write_all(&v.timestamp.to_le_bytes())?;
                v.receiver.encode(&mut buf)?;
                v.sender.encode(&mut buf)?;
                buf.write_all(&v.nonce.to_le_bytes())?;
                write_var_str(&mut buf, &v.user_agent)?;
                buf.write_all(&v.start_height.to_le_bytes())?;
                buf.write_all(&[v.relay as u8])?;
            }
            Message::Verack | Message::GetAddr | Message::FilterClear | Message::SendHeaders => {}
            Message::Ping { nonce } | Message::Pong { nonce } => {
                buf.write_all(&nonce.to_le_bytes())?;
            }
            Message::Addr(a) => a.addresses.encode(&mut buf)?,
            Message::Inv(i) | Message::GetData(i) | Message::NotFound(i) => i.items.encode(&mut buf)?,
            Message::GetHeaders(g) => {
                buf.write_all(&g.version.to_le_bytes())?;
                g.locator_hashes.encode(&mut buf)?;
                buf.write_all(&g.stop_hash)?;
            }
            Message::Headers(h) => {
                write_varint(&mut buf, h.headers.len() as u64)?;
                for header in &h.headers {
                    header.encode(&mut buf)?;
                    // A zero transaction count follows every header in
                    // the `headers` message, matching the wire format
                    // even though this client never relays full blocks.
                    write_varint(&mut buf, 0)?;
                }
            }
            Message::Tx(tx) => tx.encode(&mut buf)?,
            Message::Block(b) => {
                b.header.encode(&mut buf)?;
                b.transactions.encode(&mut buf)?;
            }
            Message::MerkleBlock(m) => {
                m.header.encode(&mut buf)?;
                buf.write_all(&m.total_transactions.to_le_bytes())?;
                m.hashes.encode(&mut buf)?;
                write_var_bytes(&mut buf, &m.flag_bytes)?;
            }
            Message::FilterLoad(f) => {
                write_var_bytes(&mut buf, &f.filter_bytes)?;
                buf.write_all(&f.hash_funcs.to_le_bytes())?;
                buf.write_all(&f.tweak.to_le_bytes())?;
                buf.write_all(&[f.flags])?;
            }
            Message::FilterAdd { data } => write_var_bytes(&mut buf, data)?,
            Message::Reject(r) => {
                write_var_str(&mut buf, &r.message)?;
                buf.write_all(&[r.code])?;
                write_var_str(&mut buf, &r.reason)?;
                buf.write_all(&r.data)?;
            }
            Message::Unknown { payload, .. } => buf.write_all(payload)?,
        }
        Ok(buf)
    }

    fn decode_payload(command: &str, payload: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(payload);
        let msg = match command {
            "version" => {
                let mut version = [0u8; 4];
                r.read_exact(&mut version).map_err(err_decode)?;
                let mut services = [0u8; 8];
                r.read_exact(&mut services).map_err(err_decode)?;
                let mut timestamp = [0u8; 8];
                r.read_exact(&mut timestamp).map_err(err_decode)?;
                let receiver = NetAddr::decode(&mut r).map_err(err_decode)?;
                let sender = NetAddr::decode(&mut r).map_err(err_decode)?;
                let mut nonce = [0u8; 8];
                r.read_exact(&mut nonce).map_err(err_decode)?;
                let user_agent = read_var_str(&mut r, MAX_STRING_LEN).map_err(err_decode)?;
                let mut start_height = [0u8; 4];
                r.read_exact(&mut start_height).map_err(err_decode)?;
                let mut relay = [0u8; 1];
                let relay = r.read_exact(&mut relay).map(|_| relay[0] != 0).unwrap_or(true);
                Message::Version(VersionPayload {
                    version: i32::from_le_bytes(version),
                    services: u64::from_le_bytes(services),
                    timestamp: i64::from_le_bytes(timestamp),
                    receiver,
                    sender,
                    nonce: u64::from_le_bytes(nonce),
                    user_agent,
                    start_height: i32::from_le_bytes(start_height),
                    relay,
                })
            }
            "verack" => Message::Verack,
            "ping" => Message::Ping { nonce: read_u64(&mut r)? },
            "pong" => Message::Pong { nonce: read_u64(&mut r)? },
            "addr" => Message::Addr(AddrPayload {
                addresses: bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?,
            }),
            "getaddr" => Message::GetAddr,
            "inv" => Message::Inv(InvPayload {
                items: bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?,
            }),
            "getdata" => Message::GetData(InvPayload {
                items: bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?,
            }),
            "notfound" => Message::NotFound(InvPayload {
                items: bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?,
            }),
            "getheaders" => {
                let mut version = [0u8; 4];
                r.read_exact(&mut version).map_err(err_decode)?;
                let locator_hashes = bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?;
                let mut stop_hash = [0u8; 32];
                r.read_exact(&mut stop_hash).map_err(err_decode)?;
                Message::GetHeaders(GetHeadersPayload {
                    version: i32::from_le_bytes(version),
                    locator_hashes,
                    stop_hash,
                })
            }
            "headers" => {
                let count = read_varint(&mut r).map_err(err_decode)?;
                if count > 2_000 {
                    return Err(Error::Decode("headers message exceeds 2000 entries"));
                }
                let mut headers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    headers.push(BlockHeader::decode(&mut r).map_err(err_decode)?);
                    let tx_count = read_varint(&mut r).map_err(err_decode)?;
                    if tx_count != 0 {
                        return Err(Error::Decode("headers message entry had nonzero tx count"));
                    }
                }
                Message::Headers(HeadersPayload { headers })
            }
            "tx" => Message::Tx(Transaction::decode(&mut r).map_err(err_decode)?),
            "block" => Message::Block(BlockPayload {
                header: BlockHeader::decode(&mut r).map_err(err_decode)?,
                transactions: bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?,
            }),
            "merkleblock" => {
                let header = BlockHeader::decode(&mut r).map_err(err_decode)?;
                let mut total = [0u8; 4];
                r.read_exact(&mut total).map_err(err_decode)?;
                let hashes = bounded_vec_decode(&mut r, MAX_VECTOR_LEN).map_err(err_decode)?;
                let flag_bytes = read_var_bytes(&mut r, MAX_SCRIPT_LEN).map_err(err_decode)?;
                Message::MerkleBlock(MerkleBlockPayload {
                    header,
                    total_transactions: u32::from_le_bytes(total),
                    hashes,
                    flag_bytes,
                })
            }
            "filterload" => {
                let filter_bytes = read_var_bytes(&mut r, MAX_SCRIPT_LEN).map_err(err_decode)?;
                let mut hash_funcs = [0u8; 4];
                r.read_exact(&mut hash_funcs).map_err(err_decode)?;
                let mut tweak = [0u8; 4];
                r.read_exact(&mut tweak).map_err(err_decode)?;
                let mut flags = [0u8; 1];
                r.read_exact(&mut flags).map_err(err_decode)?;
                Message::FilterLoad(FilterLoadPayload {
                    filter_bytes,
                    hash_funcs: u32::from_le_bytes(hash_funcs),
                    tweak: u32::from_le_bytes(tweak),
                    flags: flags[0],
                })
            }
            "filteradd" => {
                Message::FilterAdd { data: read_var_bytes(&mut r, MAX_SCRIPT_LEN).map_err(err_decode)? }
            }
            "filterclear" => Message::FilterClear,
            "reject" => Message::Reject(RejectPayload {
                message: read_var_str(&mut r, MAX_STRING_LEN).map_err(err_decode)?,
                code: {
                    let mut b = [0u8; 1];
                    r.read_exact(&mut b).map_err(err_decode)?;
                    b[0]
                },
                reason: read_var_str(&mut r, MAX_STRING_LEN).map_err(err_decode)?,
                data: {
                    let mut rest = Vec::new();
                    r.read_to_end(&mut rest).map_err(err_decode)?;
                    rest
                },
            }),
            "sendheaders" => Message::SendHeaders,
            other => Message::Unknown { command: other.to_string(), payload: payload.to_vec() },
        };
        Ok(msg)
    }

    /// Encodes the full wire frame: magic, command, length, checksum,
    /// payload (§4.2).
    pub fn encode_frame(&self, network: Network) -> io::Result<Vec<u8>> {
        let payload = self.encode_payload()?;
        let mut frame = Vec::with_capacity(24 + payload.len());
        frame.write_all(&network.magic())?;
        frame.write_all(&command_bytes(self.command()))?;
        frame.write_all(&(payload.len() as u32).to_le_bytes())?;
        frame.write_all(&checksum(&payload))?;
        frame.write_all(&payload)?;
        Ok(frame)
    }

    /// Reads exactly one frame from `r`, validating magic, payload size,
    /// and checksum before dispatching to the per-command decoder.
    pub fn decode_frame<R: Read>(r: &mut R, network: Network) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(err_decode)?;
        if magic != network.magic() {
            return Err(Error::BadMagic);
        }

        let mut command_buf = [0u8; COMMAND_LEN];
        r.read_exact(&mut command_buf).map_err(err_decode)?;
        let command = command_name(&command_buf);

        let mut length_buf = [0u8; 4];
        r.read_exact(&mut length_buf).map_err(err_decode)?;
        let length = u32::from_le_bytes(length_buf) as usize;
        if length > MAX_MESSAGE_PAYLOAD {
            return Err(Error::PayloadTooLarge(length));
        }

        let mut expected_checksum = [0u8; 4];
        r.read_exact(&mut expected_checksum).map_err(err_decode)?;

        let mut payload = vec![0u8; length];
        r.read_exact(&mut payload).map_err(err_decode)?;
        if checksum(&payload) != expected_checksum {
            return Err(Error::BadChecksum);
        }

        Self::decode_payload(&command, &payload)
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(err_decode)?;
    Ok(u64::from_le_bytes(buf))
}

fn err_decode(_: io::Error) -> Error {
    Error::Decode("unexpected end of message payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_version() -> Message {
        Message::Version(VersionPayload {
            version: 70016,
            services: 0,
            timestamp: 1_700_000_000,
            receiver: NetAddr::new_v4(0, Ipv4Addr::new(1, 2, 3, 4), 8333),
            sender: NetAddr::new_v4(0, Ipv4Addr::UNSPECIFIED, 0),
            nonce: 0xDEAD_BEEF_0000_0001,
            user_agent: "/bitc:0.1.0/".to_string(),
            start_height: 100,
            relay: true,
        })
    }

    #[test]
    fn version_message_round_trips_through_a_frame() {
        let msg = sample_version();
        let frame = msg.encode_frame(Network::Mainnet).unwrap();
        let mut cursor = Cursor::new(frame);
        let decoded = Message::decode_frame(&mut cursor, Network::Mainnet).unwrap();
        match decoded {
            Message::Version(v) => {
                assert_eq!(v.version, 70016);
                assert_eq!(v.user_agent, "/bitc:0.1.0/");
                assert_eq!(v.start_height, 100);
            }
            other => panic!("expected Version, got {other:?}"),
        }
    }

    #[test]
    fn ping_pong_round_trip() {
        let msg = Message::Ping { nonce: 12345 };
        let frame = msg.encode_frame(Network::Mainnet).unwrap();
        let mut cursor = Cursor::new(frame);
        let decoded = Message::decode_frame(&mut cursor, Network::Mainnet).unwrap();
        assert!(matches!(decoded, Message::Ping { nonce: 12345 }));
    }

    #[test]
    fn wrong_network_magic_is_rejected() {
        let msg = Message::Verack;
        let frame = msg.encode_frame(Network::Mainnet).unwrap();
        let mut cursor = Cursor::new(frame);
        let result = Message::decode_frame(&mut cursor, Network::Testnet3);
        assert!(matches!(result, Err(Error::BadMagic)));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let msg = Message::Ping { nonce: 1 };
        let mut frame = msg.encode_frame(Network::Mainnet).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut cursor = Cursor::new(frame);
        let result = Message::decode_frame(&mut cursor, Network::Mainnet);
        assert!(matches!(result, Err(Error::BadChecksum)));
    }

    #[test]
    fn oversize_payload_length_is_rejected_before_reading_it() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&Network::Mainnet.magic());
        frame.extend_from_slice(&command_bytes("ping"));
        frame.extend_from_slice(&((MAX_MESSAGE_PAYLOAD as u32) + 1).to_le_bytes());
        frame.extend_from_slice(&[0u8; 4]); // checksum, never reached
        let mut cursor = Cursor::new(frame);
        let result = Message::decode_frame(&mut cursor, Network::Mainnet);
        assert!(matches!(result, Err(Error::PayloadTooLarge(_))));
    }

    #[test]
    fn unknown_command_decodes_without_error() {
        let msg = Message::Unknown { command: "foobar".to_string(), payload: vec![1, 2, 3] };
        let frame = msg.encode_frame(Network::Mainnet).unwrap();
        let mut cursor = Cursor::new(frame);
        let decoded = Message::decode_frame(&mut cursor, Network::Mainnet).unwrap();
        match decoded {
            Message::Unknown { command, payload } => {
                assert_eq!(command, "foobar");
                assert_eq!(payload, vec![1, 2, 3]);
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn transaction_round_trips() {
        let tx = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint { txid: [1u8; 32], vout: 0 },
                script_sig: vec![0xAA, 0xBB],
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOut { value_sat: 50_000, script_pubkey: vec![0x76, 0xA9] }],
            lock_time: 0,
        };
        let encoded = tx.encode_to_vec();
        let mut cursor = Cursor::new(encoded);
        let decoded = Transaction::decode(&mut cursor).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn headers_message_round_trips() {
        let msg = Message::Headers(HeadersPayload {
            headers: vec![crate::chain::genesis::mainnet_genesis()],
        });
        let frame = msg.encode_frame(Network::Mainnet).unwrap();
        let mut cursor = Cursor::new(frame);
        let decoded = Message::decode_frame(&mut cursor, Network::Mainnet).unwrap();
        match decoded {
            Message::Headers(h) => assert_eq!(h.headers.len(), 1),
            other => panic!("expected Headers, got {other:?}"),
        }
    }
}
