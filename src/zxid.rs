//! The composite transaction identifier.
//!
//! See [`Zxid`]; this mirrors the donor `Zxid(pub i64)` newtype, but keeps
//! epoch and xid as separate fields since the core operates on them
//! independently (the reconfiguration barrier subtracts 1 from the xid half
//! only, never touching the epoch).

/// A 128-bit `(epoch, xid)` pair, totally ordered lexicographically.
///
/// Field declaration order matters: the derived `Ord`/`PartialOrd` compare
/// `epoch` first, then `xid`, which is exactly the order required by spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Zxid {
    pub epoch: i64,
    pub xid: i64,
}

impl Zxid {
    pub const fn new(epoch: i64, xid: i64) -> Self {
        Zxid { epoch, xid }
    }
}

/// Sentinel that compares strictly less than every real zxid a log can contain.
pub const ZXID_NOT_EXIST: Zxid = Zxid::new(-1, -1);

impl Default for Zxid {
    fn default() -> Self {
        ZXID_NOT_EXIST
    }
}

impl std::fmt::Display for Zxid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.epoch, self.xid)
    }
}
