//! WAL record types and framing.
//!
//! Each record is framed as:
//!
//! ```text
//! magic (4) | version (2) | type (1) | len (4) | payload (len) | crc32 (4)
//! ```
//!
//! The payload is the CBOR encoding of the record. The CRC covers header
//! and payload.

use crate::error::{CoreError, CoreResult};
use crate::types::{Document, Key};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"KWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Header size: magic + version + type + length.
pub const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Type of WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Transaction start.
    Begin = 1,
    /// Document insert or overwrite.
    Put = 2,
    /// Document removal.
    Delete = 3,
    /// Auto-increment high-water mark.
    Counter = 4,
    /// Transaction end; everything since the matching Begin is durable.
    Commit = 5,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Counter),
            5 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A logged store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    /// Transaction start.
    Begin {
        /// Transaction id.
        txid: u64,
    },
    /// Insert or overwrite a document.
    Put {
        /// Transaction id.
        txid: u64,
        /// Target collection.
        collection: String,
        /// Primary key.
        key: Key,
        /// Full document.
        document: Document,
    },
    /// Remove a document.
    Delete {
        /// Transaction id.
        txid: u64,
        /// Target collection.
        collection: String,
        /// Primary key.
        key: Key,
    },
    /// Next auto-increment value for a collection.
    Counter {
        /// Transaction id.
        txid: u64,
        /// Target collection.
        collection: String,
        /// Next key to hand out.
        next: u64,
    },
    /// Transaction end.
    Commit {
        /// Transaction id.
        txid: u64,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Counter { .. } => WalRecordType::Counter,
            Self::Commit { .. } => WalRecordType::Commit,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn txid(&self) -> u64 {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Counter { txid, .. }
            | Self::Commit { txid } => *txid,
        }
    }

    /// Appends the framed record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> CoreResult<()> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| CoreError::encoding(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("WAL record payload too large"))?;

        let start = out.len();
        out.extend_from_slice(&WAL_MAGIC);
        out.extend_from_slice(&WAL_VERSION.to_le_bytes());
        out.push(self.record_type().as_byte());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = compute_crc32(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    /// Decodes a payload whose header announced `record_type`.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let record: Self = ciborium::from_reader(payload)
            .map_err(|e| CoreError::wal_corruption(format!("undecodable payload: {e}")))?;
        if record.record_type() != record_type {
            return Err(CoreError::wal_corruption(format!(
                "header says {record_type:?}, payload is {:?}",
                record.record_type()
            )));
        }
        Ok(record)
    }
}

/// CRC-32 (IEEE) of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}
