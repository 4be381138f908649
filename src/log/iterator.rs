//! A one-record-at-a-time cursor over a transaction log file.
//!
//! Snapshot-at-open: `file_len` is captured when the iterator is created and
//! never re-queried, so `has_next` doesn't observe writes made through the
//! log's own append handle afterwards (see spec design notes on why the
//! donor's call-time `hasNext()` was rejected in favor of this).

use std::fs::File;
use std::io::{BufReader, Seek as _, SeekFrom};
use std::path::Path;

use crate::codec;
use crate::error::{CoreError, Result};
use crate::txn::Transaction;

pub struct LogIterator {
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
    last_record_length: u64,
}

impl LogIterator {
    /// Opens a fresh read handle on `path`, positioned at `start_position`.
    pub(crate) fn open(path: &Path, start_position: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(start_position))?;
        Ok(LogIterator {
            reader: BufReader::new(file),
            position: start_position,
            file_len,
            last_record_length: 0,
        })
    }

    /// Current byte offset, i.e. where the next `next()` will start reading.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether another record can be read without hitting EOF, as of
    /// iterator-open time.
    pub fn has_next(&self) -> bool {
        self.position < self.file_len
    }

    /// Decodes the next record, advancing `position` past it.
    pub fn next(&mut self) -> Result<Transaction> {
        if !self.has_next() {
            return Err(CoreError::UnexpectedEof);
        }
        let (txn, record_len) = codec::decode(&mut self.reader)?;
        self.last_record_length = record_len as u64;
        self.position += record_len as u64;
        Ok(txn)
    }

    /// Steps back by the length of the record most recently returned by
    /// `next()`. Only one step back is supported per `next()` call; calling
    /// `backward()` twice in a row without an intervening `next()` is a no-op
    /// on the second call (see spec: undefined behavior, implemented here as
    /// harmless rather than panicking).
    pub fn backward(&mut self) -> Result<()> {
        if self.last_record_length == 0 {
            return Ok(());
        }
        self.position -= self.last_record_length;
        self.reader.seek(SeekFrom::Start(self.position))?;
        self.last_record_length = 0;
        Ok(())
    }
}
