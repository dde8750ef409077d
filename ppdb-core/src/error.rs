//! Error types for PPDB
//!
//! The variants mirror the error taxonomy of the storage core: invalid use,
//! resource exhaustion, not-found/conflict, durability, and system failures.

use thiserror::Error;

/// The main error type for PPDB operations.
#[derive(Error, Debug)]
pub enum Error {
    // --- Invalid use ---
    /// An argument failed validation (e.g. an empty key, an oversized value).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required pointer/handle was null or already released.
    #[error("null pointer")]
    NullPointer,

    /// A caller-supplied buffer was too small to hold the result.
    #[error("buffer too small")]
    BufferTooSmall,

    /// The operation is recognized but not implemented by this backend.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The operation is invalid for the handle's current state (e.g. commit
    /// on an already-committed transaction).
    #[error("invalid state: {0}")]
    InvalidState(String),

    // --- Resource ---
    /// Allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// The configured `memory_limit` would be exceeded.
    #[error("memory limit exceeded")]
    MemoryLimit,

    /// A resource is contended; retry after back-off.
    #[error("resource busy")]
    Busy,

    /// A bounded resource (e.g. a WAL segment) is at capacity.
    #[error("resource full")]
    Full,

    /// An operation exceeded its configured timeout.
    #[error("operation timed out")]
    Timeout,

    // --- Not-found / conflict ---
    /// The requested key, table, or file was not found.
    #[error("not found")]
    NotFound,

    /// The entity (table, segment) already exists.
    #[error("already exists")]
    Exists,

    /// A write-write conflict or serializable validation failure.
    #[error("conflict")]
    Conflict,

    /// The transaction is terminally aborted; no further operations are
    /// permitted.
    #[error("transaction aborted")]
    Aborted,

    // --- Durability ---
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data corruption was detected (bad checksum, impossible field sizes).
    #[error("corrupted: {0}")]
    Corrupted(String),

    /// A path exceeded the maximum length the core will accept.
    #[error("path too long")]
    PathTooLong,

    /// A hard-coded limit was exceeded (e.g. segment id overflow).
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    // --- System ---
    /// An error from the underlying OS/runtime not covered above.
    #[error("system error: {0}")]
    System(String),

    /// An error that does not fit any other category.
    #[error("unknown error")]
    Unknown,
}

/// A specialized `Result` type for PPDB operations.
pub type Result<T> = std::result::Result<T, Error>;
