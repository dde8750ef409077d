//! Write-Ahead Log (§4.4).
//!
//! A WAL is a directory of segment files. Every mutation is appended as a
//! `Record` before it becomes visible on commit; a `CommitMarker` record
//! finalizes a transaction. On startup, [`replay`] rebuilds the set of
//! committed writes from whatever segments are present.
//!
//! # Example
//!
//! ```no_run
//! use ppdb_storage::wal::{Wal, Record};
//!
//! let wal = Wal::open("path/to/wal", 64 * 1024 * 1024, true)?;
//! wal.append(&Record::Put { txn_id: 1, table: "t".into(), key: b"k".to_vec(), value: b"v".to_vec() })?;
//! wal.append(&Record::CommitMarker { txn_id: 1, commit_ts: 1 })?;
//! # Ok::<(), ppdb_core::Error>(())
//! ```

mod reader;
mod record;
mod segment;
mod writer;

pub use reader::{read_segment, replay, RecoveredWrite, RecoveryResult, SegmentReader};
pub use record::{Record, RecordType, RECORD_HEADER_SIZE};
pub use segment::{
    parse_segment_id, segment_filename, SegmentHeader, MAGIC, MAX_PATH_LEN, MAX_SEGMENT_ID,
    SEGMENT_HEADER_SIZE, WAL_FORMAT_VERSION,
};
pub use writer::Wal;
