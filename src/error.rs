//! Error taxonomy shared by the transaction log and the ack processor.
//!
//! One enum for the whole crate, in the spirit of the single per-concern
//! error type the donor codec layer used (`Message`/`TooLarge`/`NegativeValue`/
//! `Eof`): callers match on variants instead of string-sniffing.

use crate::zxid::Zxid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// `append` received a zxid that does not strictly increase the log.
    #[error("append out of order: attempted {attempted}, last seen {last_seen}")]
    OutOfOrder { attempted: Zxid, last_seen: Zxid },

    /// The reader hit EOF before a full record (header or body) could be read.
    #[error("unexpected end of file while reading a record")]
    UnexpectedEof,

    /// The record header describes an impossible record (e.g. negative body length).
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Underlying device or filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// `trim` is not implemented; reserved for a future compaction design.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A second reconfiguration (JOIN/REMOVE) arrived while one was already pending.
    #[error("concurrent reconfiguration: a reconfig is already pending")]
    ConcurrentReconfig,

    /// Normal termination via the shutdown sentinel.
    #[error("processor shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, CoreError>;
