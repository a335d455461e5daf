//! Bitcoin's variable-length integer and variable-length byte-string
//! encodings (§4.2): a 1/3/5/9-byte prefix selected by magnitude.

use std::io::{self, Read, Write};

/// Writes `n` as a CompactSize varint.
pub fn write_varint<W: Write>(w: &mut W, n: u64) -> io::Result<()> {
    if n < 0xFD {
        w.write_all(&[n as u8])
    } else if n <= 0xFFFF {
        w.write_all(&[0xFD])?;
        w.write_all(&(n as u16).to_le_bytes())
    } else if n <= 0xFFFF_FFFF {
        w.write_all(&[0xFE])?;
        w.write_all(&(n as u32).to_le_bytes())
    } else {
        w.write_all(&[0xFF])?;
        w.write_all(&n.to_le_bytes())
    }
}

/// Reads a CompactSize varint.
pub fn read_varint<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut prefix = [0u8; 1];
    r.read_exact(&mut prefix)?;
    match prefix[0] {
        0xFD => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            Ok(u16::from_le_bytes(buf) as u64)
        }
        0xFE => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        0xFF => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        }
        n => Ok(n as u64),
    }
}

/// Writes a length-prefixed byte string (varint length + raw bytes).
pub fn write_var_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_varint(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

/// Reads a length-prefixed byte string, rejecting lengths above `max`
/// so a malicious peer cannot force an unbounded allocation.
pub fn read_var_bytes<R: Read>(r: &mut R, max: u64) -> io::Result<Vec<u8>> {
    let len = read_varint(r)?;
    if len > max {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "var_bytes length exceeds max"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes a length-prefixed ASCII string.
pub fn write_var_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_var_bytes(w, s.as_bytes())
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_var_str<R: Read>(r: &mut R, max: u64) -> io::Result<String> {
    let bytes = read_var_bytes(r, max)?;
    String::from_utf8(bytes).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-utf8 var_str"))
}
