//! `headers.dat`: the append-only on-disk record of every header ever
//! accepted into any branch (§4.1, §6). Records are fixed-size so a
//! torn write at the tail (crash mid-append) is detectable by truncating
//! to the last whole record and re-validating its linkage.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use num_bigint::BigUint;

use crate::chain::header::{BlockHeader, HEADER_LEN};
use crate::chain::pow::{work_from_bytes, work_to_bytes};
use crate::error::{Error, Result};
use crate::wire::primitives::{Decode, Encode};

/// 80-byte header + 4-byte height + 32-byte cumulative work.
pub const RECORD_LEN: usize = HEADER_LEN + 4 + 32;

/// One persisted header plus the chain-relative data computed when it
/// was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub header: BlockHeader,
    pub height: u32,
    pub cumulative_work: BigUint,
}

impl HeaderRecord {
    fn encode_to(&self, w: &mut impl Write) -> io::Result<()> {
        self.header.encode(w)?;
        w.write_all(&self.height.to_le_bytes())?;
        w.write_all(&work_to_bytes(&self.cumulative_work))
    }

    fn decode_from(r: &mut impl Read) -> io::Result<Self> {
        let header = BlockHeader::decode(r)?;
        let mut height = [0u8; 4];
        r.read_exact(&mut height)?;
        let mut work = [0u8; 32];
        r.read_exact(&mut work)?;
        Ok(HeaderRecord {
            header,
            height: u32::from_le_bytes(height),
            cumulative_work: work_from_bytes(&work),
        })
    }
}

/// Append-only file handle over `headers.dat`.
pub struct HeaderStore {
    file: File,
}

impl HeaderStore {
    /// Opens (creating if absent) `<dir>/headers.dat`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join("headers.dat"))?;
        Ok(HeaderStore { file })
    }

    /// Reads every whole record from the start of the file. If the file
    /// length is not a multiple of [`RECORD_LEN`] (a torn write), the
    /// trailing partial record is discarded and the file truncated to
    /// the last consistent boundary — the tail-truncate recovery named
    /// in §4.1 and §7 kind 3.
    pub fn load_all(&mut self) -> Result<Vec<HeaderRecord>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;

        let whole_records = buf.len() / RECORD_LEN;
        let consistent_len = whole_records * RECORD_LEN;
        if consistent_len != buf.len() {
            tracing::warn!(
                on_disk = buf.len(),
                truncated_to = consistent_len,
                "headers.dat has a torn tail record, truncating"
            );
            self.file.set_len(consistent_len as u64)?;
        }

        let mut records = Vec::with_capacity(whole_records);
        let mut cursor = io::Cursor::new(&buf[..consistent_len]);
        for _ in 0..whole_records {
            let record = HeaderRecord::decode_from(&mut cursor)
                .map_err(|e| Error::StoreCorrupt(e.to_string()))?;
            records.push(record);
        }
        self.file.seek(SeekFrom::End(0))?;
        Ok(records)
    }

    /// Appends one record and fsyncs, so a crash immediately after
    /// `accept_header` returns cannot lose the write.
    pub fn append(&mut self, record: &HeaderRecord) -> Result<()> {
        let mut buf = Vec::with_capacity(RECORD_LEN);
        record.encode_to(&mut buf)?;
        debug_assert_eq!(buf.len(), RECORD_LEN);
        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::genesis::mainnet_genesis;
    use crate::chain::pow::work_for_bits;

    fn sample_record(height: u32) -> HeaderRecord {
        let genesis = mainnet_genesis();
        HeaderRecord { header: genesis, height, cumulative_work: work_for_bits(genesis.bits) }
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HeaderStore::open(dir.path()).unwrap();
        let r0 = sample_record(0);
        let r1 = sample_record(1);
        store.append(&r0).unwrap();
        store.append(&r1).unwrap();

        let mut reopened = HeaderStore::open(dir.path()).unwrap();
        let loaded = reopened.load_all().unwrap();
        assert_eq!(loaded, vec![r0, r1]);
    }

    #[test]
    fn torn_tail_is_truncated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = HeaderStore::open(dir.path()).unwrap();
            store.append(&sample_record(0)).unwrap();
        }
        // Simulate a crash mid-append: append a few extra garbage bytes.
        {
            let path = dir.path().join("headers.dat");
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xAA; 10]).unwrap();
        }
        let mut store = HeaderStore::open(dir.path()).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);

        let on_disk_len = std::fs::metadata(dir.path().join("headers.dat")).unwrap().len();
        assert_eq!(on_disk_len as usize, RECORD_LEN);
    }

    #[test]
    fn empty_store_loads_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HeaderStore::open(dir.path()).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
