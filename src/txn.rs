//! The unit of replication: an immutable, identified, opaque-payload record.

use crate::error::{CoreError, Result};
use crate::zxid::Zxid;

/// An immutable transaction: an identifier, a type tag, and an opaque body.
///
/// Compared to the donor `Txn { header, op }` (which carries a strongly-typed
/// ZooKeeper operation), this core treats the body as opaque bytes, decoding
/// the application-level operation is the concern of the writer/applier
/// layers above this crate, not of the log itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub zxid: Zxid,
    pub kind: i32,
    pub body: Vec<u8>,
}

impl Transaction {
    /// Builds a transaction, rejecting bodies too large to fit the
    /// `i32` length prefix used by the on-disk record format.
    pub fn new(zxid: Zxid, kind: i32, body: Vec<u8>) -> Result<Self> {
        if body.len() > i32::MAX as usize {
            return Err(CoreError::Malformed(format!(
                "body length {} exceeds i32::MAX",
                body.len()
            )));
        }
        Ok(Transaction { zxid, kind, body })
    }
}
