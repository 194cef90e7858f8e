//! Streaming WAL record iterator.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::{
    compute_crc32, WalRecord, WalRecordType, CRC_SIZE, HEADER_SIZE, WAL_MAGIC, WAL_VERSION,
};
use karobar_storage::StorageBackend;

/// Reads WAL records one by one from a backend.
///
/// Yields `(offset, record)` pairs. A header or payload cut short by the
/// end of the log is a torn tail from an interrupted commit and ends the
/// iteration cleanly; [`WalRecordIterator::valid_end`] then reports where
/// the last complete record stopped. Bad magic, an unknown type or a CRC
/// mismatch are corruption and yield an error.
pub struct WalRecordIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> WalRecordIterator<'a> {
    /// Creates an iterator starting at `start_offset`.
    pub fn new(backend: &'a dyn StorageBackend, start_offset: u64) -> CoreResult<Self> {
        Ok(Self {
            total_size: backend.size()?,
            backend,
            offset: start_offset,
            finished: false,
        })
    }

    /// End offset of the last complete record read so far.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, WalRecord)>> {
        let start = self.offset;
        let remaining = self.total_size.saturating_sub(start);
        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != WAL_MAGIC {
            return Err(CoreError::wal_corruption(format!(
                "invalid magic at offset {start}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > WAL_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }
        let type_byte = header[6];
        let record_type = WalRecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::wal_corruption(format!(
                "unknown record type {type_byte} at offset {start}"
            ))
        })?;
        let payload_len =
            u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let total_len = (HEADER_SIZE + payload_len + CRC_SIZE) as u64;
        if remaining < total_len {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(start + HEADER_SIZE as u64, payload_len + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut covered = header;
        covered.extend_from_slice(payload);
        let computed = compute_crc32(&covered);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let record = WalRecord::decode_payload(record_type, payload)?;
        self.offset = start + total_len;
        Ok(Some((start, record)))
    }
}

impl Iterator for WalRecordIterator<'_> {
    type Item = CoreResult<(u64, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
