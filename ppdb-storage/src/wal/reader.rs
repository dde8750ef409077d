//! Segment reading and crash recovery replay (§4.4 Recovery).

use super::record::{Record, RECORD_HEADER_SIZE};
use super::segment::{parse_segment_id, segment_filename, SegmentHeader, SEGMENT_HEADER_SIZE};
use bytes::Buf;
use log::warn;
use ppdb_core::{CommitTimestamp, Error, Key, Result, TxnId, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Field sizes above this are treated as corruption rather than "maybe
/// there's just more data to read" — real keys/values are bounded by
/// `DEFAULT_MAX_KEY_LEN`/`DEFAULT_MAX_VALUE_LEN` orders of magnitude below
/// this, so a value this large can only be a torn or corrupted header.
const MAX_PLAUSIBLE_FIELD_SIZE: u32 = 64 * 1024 * 1024;

pub struct SegmentReader {
    reader: BufReader<File>,
}

impl SegmentReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut header_buf = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        SegmentHeader::decode(&header_buf)?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Reads the next record. `Ok(None)` means either a clean end of file or
    /// a torn tail (a truncated header or body) — both are handled
    /// identically by the caller: stop reading this segment.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        let read = read_up_to(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < RECORD_HEADER_SIZE {
            return Ok(None); // torn tail mid-header
        }

        let mut cursor = &header[4..];
        let key_size = cursor.get_u32_le();
        let value_size = cursor.get_u32_le();

        if key_size > MAX_PLAUSIBLE_FIELD_SIZE || value_size > MAX_PLAUSIBLE_FIELD_SIZE {
            return Err(Error::Corrupted(format!(
                "implausible record field sizes: key={key_size} value={value_size}"
            )));
        }

        let body_len = key_size as usize + value_size as usize;
        let mut body = vec![0u8; body_len];
        let body_read = read_up_to(&mut self.reader, &mut body)?;
        if body_read < body_len {
            return Ok(None); // torn tail mid-body
        }

        Ok(Some(Record::decode(&header, &body)?))
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

/// Reads every record in a single segment file, stopping (without error) at
/// a torn tail. Used directly by tests and by `replay` per-segment.
pub fn read_segment(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let mut reader = SegmentReader::open(path)?;
    let mut records = Vec::new();
    while let Some(record) = reader.read_record()? {
        records.push(record);
    }
    Ok(records)
}

/// One materialized mutation reconstructed from a committed transaction's
/// WAL records. `value = None` represents a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredWrite {
    pub table: String,
    pub key: Key,
    pub value: Option<Value>,
    pub commit_ts: CommitTimestamp,
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryResult {
    pub writes: Vec<RecoveredWrite>,
    /// Highest txn-id observed in any commit marker, used to reseed the
    /// transaction manager's monotonic counter (§4.3).
    pub max_txn_id: TxnId,
    /// Highest commit timestamp observed in any commit marker, used to
    /// reseed the commit-timestamp counter so recovered versions stay
    /// visible under RepeatableRead/Serializable after reopen (§4.3).
    pub max_commit_ts: CommitTimestamp,
}

enum PendingOp {
    Put { table: String, key: Key, value: Value },
    Delete { table: String, key: Key },
}

/// Replays every segment in `dir_path` in ascending id order, materializing
/// writes for every transaction whose `CommitMarker` was found. Writes whose
/// transaction never committed are silently discarded — an implicit abort of
/// whatever was in flight at crash time (§4.4).
///
/// A corrupted segment header stops recovery entirely (subsequent segments
/// are not processed, since they may depend on state this segment would
/// have rebuilt); a torn tail or mid-record corruption stops only the
/// current segment and moves on to the next one.
pub fn replay(dir_path: &Path) -> Result<RecoveryResult> {
    let mut ids: Vec<u64> = std::fs::read_dir(dir_path)?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(parse_segment_id))
        .collect();
    ids.sort_unstable();

    let mut pending: HashMap<TxnId, Vec<PendingOp>> = HashMap::new();
    let mut result = RecoveryResult::default();

    'segments: for id in ids {
        let path = dir_path.join(segment_filename(id));
        let mut reader = match SegmentReader::open(&path) {
            Ok(r) => r,
            Err(Error::Corrupted(msg)) => {
                warn!("segment {id} header corrupted ({msg}); stopping recovery here");
                break 'segments;
            }
            Err(e) => return Err(e),
        };

        loop {
            match reader.read_record() {
                Ok(Some(Record::Put {
                    txn_id,
                    table,
                    key,
                    value,
                })) => {
                    pending
                        .entry(txn_id)
                        .or_default()
                        .push(PendingOp::Put { table, key, value });
                }
                Ok(Some(Record::Delete { txn_id, table, key })) => {
                    pending
                        .entry(txn_id)
                        .or_default()
                        .push(PendingOp::Delete { table, key });
                }
                Ok(Some(Record::CommitMarker { txn_id, commit_ts })) => {
                    result.max_txn_id = result.max_txn_id.max(txn_id);
                    result.max_commit_ts = result.max_commit_ts.max(commit_ts);
                    if let Some(ops) = pending.remove(&txn_id) {
                        for op in ops {
                            let (table, key, value) = match op {
                                PendingOp::Put { table, key, value } => (table, key, Some(value)),
                                PendingOp::Delete { table, key } => (table, key, None),
                            };
                            result.writes.push(RecoveredWrite {
                                table,
                                key,
                                value,
                                commit_ts,
                            });
                        }
                    }
                }
                Ok(None) => break,
                Err(Error::Corrupted(msg)) => {
                    warn!("segment {id} corrupted mid-record ({msg}); stopping recovery here");
                    break 'segments;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(result)
}
