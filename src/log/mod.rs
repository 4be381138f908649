//! The append-only, crash-safe transaction journal.
//!
//! Shape follows the donor `TxnlogFile`: a struct owning a deserializer/reader
//! pair plus an `Iterator` impl for scanning, generalized here to also own the
//! writer side (append/sync) since this core is written from the leader's
//! perspective, not just a log-reading tool.

mod iterator;

pub use iterator::LogIterator;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{CoreError, Result};
use crate::txn::Transaction;
use crate::zxid::{Zxid, ZXID_NOT_EXIST};

/// Options controlling how a [`TransactionLog`] is opened.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub path: PathBuf,
    /// If known, skips the full-file scan normally needed to recover
    /// `last_seen_zxid` on open.
    pub last_seen_zxid: Option<Zxid>,
}

impl LogOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LogOptions {
            path: path.into(),
            last_seen_zxid: None,
        }
    }

    pub fn with_last_seen_zxid(mut self, zxid: Zxid) -> Self {
        self.last_seen_zxid = Some(zxid);
        self
    }
}

/// An append-only on-disk journal of totally-ordered transactions.
///
/// Single-writer: concurrent `append` calls from multiple threads are not
/// supported, callers must serialize them (see spec concurrency model).
pub struct TransactionLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    last_seen_zxid: Zxid,
}

impl TransactionLog {
    /// Opens `options.path` in append mode, preserving any existing content.
    ///
    /// If `options.last_seen_zxid` is `None`, scans the file once to recover
    /// it. A partial trailing record found during that scan fails with
    /// [`CoreError::UnexpectedEof`], callers can repair the file via
    /// `truncate` rather than have it silently dropped.
    pub fn open(options: LogOptions) -> Result<Self> {
        // Ensure the file exists before scanning/appending.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&options.path)?;

        let last_seen_zxid = match options.last_seen_zxid {
            Some(zxid) => zxid,
            None => Self::scan_last_zxid(&options.path)?,
        };

        let file = OpenOptions::new().append(true).open(&options.path)?;

        log::info!(
            "opened transaction log at {:?}, last_seen_zxid={}",
            options.path,
            last_seen_zxid
        );

        Ok(TransactionLog {
            path: options.path,
            writer: Some(BufWriter::new(file)),
            last_seen_zxid,
        })
    }

    fn scan_last_zxid(path: &Path) -> Result<Zxid> {
        let mut iter = LogIterator::open(path, 0)?;
        let mut last = ZXID_NOT_EXIST;
        while iter.has_next() {
            last = iter.next()?.zxid;
        }
        Ok(last)
    }

    /// Appends `txn`, requiring `txn.zxid` to strictly exceed every zxid
    /// already in the log. Does not fsync; call [`Self::sync`] for durability.
    pub fn append(&mut self, txn: &Transaction) -> Result<()> {
        if txn.zxid <= self.last_seen_zxid {
            return Err(CoreError::OutOfOrder {
                attempted: txn.zxid,
                last_seen: self.last_seen_zxid,
            });
        }

        let writer = self.writer.as_mut().ok_or_else(Self::closed_writer_err)?;
        if let Err(err) = codec::encode(txn, writer) {
            // Mid-record I/O failure: the log is corrupt at the suffix.
            // Surface the error and stop accepting further writes rather
            // than silently continuing against a broken stream.
            self.writer = None;
            return Err(err);
        }

        self.last_seen_zxid = txn.zxid;
        Ok(())
    }

    /// Flushes user-space buffers and data-syncs the file. After this
    /// returns `Ok`, every record appended so far is durable.
    pub fn sync(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(Self::closed_writer_err)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Returns the cached last-seen zxid (no scan performed here; the scan,
    /// if needed, happened at `open`).
    pub fn get_latest_zxid(&self) -> Zxid {
        self.last_seen_zxid
    }

    /// Returns an iterator positioned so its next record has zxid >= `zxid`.
    pub fn get_iterator(&self, zxid: Zxid) -> Result<LogIterator> {
        let mut iter = LogIterator::open(&self.path, 0)?;
        while iter.has_next() {
            let txn = iter.next()?;
            if txn.zxid >= zxid {
                iter.backward()?;
                break;
            }
        }
        Ok(iter)
    }

    /// Removes every record whose zxid > `zxid`, setting the file length
    /// accordingly. Not crash-atomic; callers use this only as an
    /// offline/recovery operation while appends are quiesced.
    pub fn truncate(&mut self, zxid: Zxid) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }

        let mut iter = LogIterator::open(&self.path, 0)?;
        let mut last_kept = ZXID_NOT_EXIST;
        while iter.has_next() {
            let txn = iter.next()?;
            if txn.zxid == zxid {
                last_kept = txn.zxid;
                break;
            }
            if txn.zxid > zxid {
                iter.backward()?;
                break;
            }
            last_kept = txn.zxid;
        }

        let new_length = iter.position();
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(new_length)?;

        self.last_seen_zxid = last_kept;

        // The append writer's buffered position tracks the OS file offset in
        // append mode, so it keeps working correctly once the file has
        // shrunk underneath it.
        log::info!(
            "truncated transaction log at {:?} to {} bytes, last_seen_zxid={}",
            self.path,
            new_length,
            last_kept
        );
        Ok(())
    }

    /// Unsupported: reserved for a future log-compaction design.
    pub fn trim(&mut self, _zxid: Zxid) -> Result<()> {
        Err(CoreError::Unsupported("trim"))
    }

    /// Current length of the underlying file in bytes.
    pub fn length(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Closes the log. Flushes no data, call `sync` first if durability matters.
    pub fn close(mut self) {
        self.writer = None;
    }

    fn closed_writer_err() -> CoreError {
        CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "transaction log writer is closed after a previous I/O failure",
        ))
    }
}
