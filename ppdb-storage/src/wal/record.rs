//! WAL record encoding (§4.4, §6 — bit-exact on-disk layout).
//!
//! A record is a 12-byte little-endian header (`type`, `key_size`,
//! `value_size`) followed by `key_size` bytes of key and `value_size` bytes
//! of value. `CommitMarker` carries no key (`key_size = 0`) and a 16-byte
//! value holding `txn_id` then `commit_ts`, both little-endian u64.
//!
//! The wire format's 12-byte header has no field for the writing
//! transaction's id or the owning table name, yet recovery (§4.4) buffers
//! `Put`/`Delete` records into a pending set keyed by txn-id and needs to
//! know which table's version chain to materialize them into. Both are
//! folded into the key area as a short composite prefix — `txn_id:u64`,
//! then a `u16` table-name length, then the table name, then the real key —
//! so the 12-byte header and overall record layout stay bit-exact to §6
//! while recovery still has what it needs.

use bytes::{Buf, BufMut, BytesMut};
use ppdb_core::{CommitTimestamp, Error, Key, Result, TxnId, Value};

pub const RECORD_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordType {
    Put = 1,
    Delete = 2,
    CommitMarker = 3,
}

impl RecordType {
    fn from_u32(v: u32) -> Result<Self> {
        match v {
            1 => Ok(RecordType::Put),
            2 => Ok(RecordType::Delete),
            3 => Ok(RecordType::CommitMarker),
            other => Err(Error::Corrupted(format!("unknown record type {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Put {
        txn_id: TxnId,
        table: String,
        key: Key,
        value: Value,
    },
    Delete {
        txn_id: TxnId,
        table: String,
        key: Key,
    },
    CommitMarker {
        txn_id: TxnId,
        commit_ts: CommitTimestamp,
    },
}

struct KeyPrefix {
    txn_id: TxnId,
    table: String,
}

impl Record {
    fn composite_key(txn_id: TxnId, table: &str, key: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(8 + 2 + table.len() + key.len());
        buf.put_u64_le(txn_id);
        buf.put_u16_le(table.len() as u16);
        buf.put_slice(table.as_bytes());
        buf.put_slice(key);
        buf.to_vec()
    }

    fn split_composite_key(mut data: &[u8]) -> Result<(KeyPrefix, Key)> {
        if data.len() < 10 {
            return Err(Error::Corrupted("record key missing txn/table prefix".into()));
        }
        let txn_id = data.get_u64_le();
        let table_len = data.get_u16_le() as usize;
        if data.len() < table_len {
            return Err(Error::Corrupted("record table name truncated".into()));
        }
        let table = String::from_utf8(data[..table_len].to_vec())
            .map_err(|e| Error::Corrupted(format!("invalid table name: {e}")))?;
        let key = data[table_len..].to_vec();
        Ok((KeyPrefix { txn_id, table }, key))
    }

    pub fn encode(&self) -> Vec<u8> {
        let (record_type, key_bytes, value_bytes): (RecordType, Vec<u8>, Vec<u8>) = match self {
            Record::Put {
                txn_id,
                table,
                key,
                value,
            } => (
                RecordType::Put,
                Self::composite_key(*txn_id, table, key),
                value.clone(),
            ),
            Record::Delete { txn_id, table, key } => (
                RecordType::Delete,
                Self::composite_key(*txn_id, table, key),
                Vec::new(),
            ),
            Record::CommitMarker { txn_id, commit_ts } => {
                let mut payload = BytesMut::with_capacity(16);
                payload.put_u64_le(*txn_id);
                payload.put_u64_le(*commit_ts);
                (RecordType::CommitMarker, Vec::new(), payload.to_vec())
            }
        };

        let mut buf =
            BytesMut::with_capacity(RECORD_HEADER_SIZE + key_bytes.len() + value_bytes.len());
        buf.put_u32_le(record_type as u32);
        buf.put_u32_le(key_bytes.len() as u32);
        buf.put_u32_le(value_bytes.len() as u32);
        buf.put_slice(&key_bytes);
        buf.put_slice(&value_bytes);
        buf.to_vec()
    }

    /// Decodes a header-plus-body buffer. The caller is responsible for
    /// sanity-checking `key_size`/`value_size` against the remaining segment
    /// length before calling this (see `SegmentReader`).
    pub fn decode(header: &[u8], body: &[u8]) -> Result<Self> {
        if header.len() < RECORD_HEADER_SIZE {
            return Err(Error::Corrupted("record header truncated".into()));
        }
        let mut cursor = header;
        let record_type = RecordType::from_u32(cursor.get_u32_le())?;
        let key_size = cursor.get_u32_le() as usize;
        let value_size = cursor.get_u32_le() as usize;

        if body.len() != key_size + value_size {
            return Err(Error::Corrupted("record body size mismatch".into()));
        }
        let (key_bytes, value_bytes) = body.split_at(key_size);

        match record_type {
            RecordType::Put => {
                let (prefix, key) = Self::split_composite_key(key_bytes)?;
                Ok(Record::Put {
                    txn_id: prefix.txn_id,
                    table: prefix.table,
                    key,
                    value: value_bytes.to_vec(),
                })
            }
            RecordType::Delete => {
                let (prefix, key) = Self::split_composite_key(key_bytes)?;
                Ok(Record::Delete {
                    txn_id: prefix.txn_id,
                    table: prefix.table,
                    key,
                })
            }
            RecordType::CommitMarker => {
                if value_bytes.len() != 16 {
                    return Err(Error::Corrupted(
                        "commit marker payload must be 16 bytes".into(),
                    ));
                }
                let mut v = value_bytes;
                let txn_id = v.get_u64_le();
                let commit_ts = v.get_u64_le();
                Ok(Record::CommitMarker { txn_id, commit_ts })
            }
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.encode().len()
    }
}
