//! Bit-exact encode/decode of one on-disk transaction record.
//!
//! Record layout (big-endian, no padding, no magic, no checksum):
//! `epoch:i64 xid:i64 type:i32 body_len:i32 body:body_len bytes`
//!
//! Mirrors the donor `TxnlogFile::next`'s header-then-body reading style
//! (`read_i32::<BigEndian>`, EOF detection via `io::ErrorKind`), minus the
//! CRC/length-prefix framing ZooKeeper's own txnlog format layers on top;
//! that framing belongs to the wire format this crate does not reproduce.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CoreError, Result};
use crate::txn::Transaction;
use crate::zxid::Zxid;

/// Fixed-size record prefix: epoch(8) + xid(8) + type(4) + body_len(4).
pub const HEADER_LEN: usize = 24;

fn map_read_err(err: io::Error) -> CoreError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => CoreError::UnexpectedEof,
        _ => CoreError::Io(err),
    }
}

/// Encodes `txn` onto `writer`. Returns the number of bytes written
/// (`HEADER_LEN + body.len()`).
pub fn encode<W: Write>(txn: &Transaction, writer: &mut W) -> Result<usize> {
    writer.write_i64::<BigEndian>(txn.zxid.epoch)?;
    writer.write_i64::<BigEndian>(txn.zxid.xid)?;
    writer.write_i32::<BigEndian>(txn.kind)?;
    writer.write_i32::<BigEndian>(txn.body.len() as i32)?;
    writer.write_all(&txn.body)?;
    Ok(HEADER_LEN + txn.body.len())
}

/// Decodes one record from `reader`.
///
/// Returns the transaction and the total record length (`HEADER_LEN + body_len`).
/// Fails with [`CoreError::UnexpectedEof`] if the reader runs out before the
/// header or the body is fully read, and with [`CoreError::Malformed`] if
/// `body_len` is negative.
pub fn decode<R: Read>(reader: &mut R) -> Result<(Transaction, usize)> {
    let epoch = reader.read_i64::<BigEndian>().map_err(map_read_err)?;
    let xid = reader.read_i64::<BigEndian>().map_err(map_read_err)?;
    let kind = reader.read_i32::<BigEndian>().map_err(map_read_err)?;
    let body_len = reader.read_i32::<BigEndian>().map_err(map_read_err)?;

    if body_len < 0 {
        return Err(CoreError::Malformed(format!(
            "negative body length {body_len}"
        )));
    }

    let mut body = vec![0u8; body_len as usize];
    reader.read_exact(&mut body).map_err(map_read_err)?;

    let txn = Transaction {
        zxid: Zxid::new(epoch, xid),
        kind,
        body,
    };
    Ok((txn, HEADER_LEN + body_len as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let txn = Transaction::new(Zxid::new(0, 1), 7, b"hello".to_vec()).unwrap();
        let mut buf = Vec::new();
        let written = encode(&txn, &mut buf).unwrap();
        assert_eq!(written, HEADER_LEN + 5);
        assert_eq!(buf.len(), written);

        let mut cursor = io::Cursor::new(buf);
        let (decoded, len) = decode(&mut cursor).unwrap();
        assert_eq!(decoded, txn);
        assert_eq!(len, written);
    }

    #[test]
    fn empty_body_encodes_to_header_only() {
        let txn = Transaction::new(Zxid::new(0, 1), 0, Vec::new()).unwrap();
        let mut buf = Vec::new();
        encode(&txn, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
    }

    #[test]
    fn truncated_header_is_unexpected_eof() {
        let mut cursor = io::Cursor::new(vec![0u8; 10]);
        let err = decode(&mut cursor).unwrap_err();
        assert!(matches!(err, CoreError::UnexpectedEof));
    }

    #[test]
    fn truncated_body_is_unexpected_eof() {
        let txn = Transaction::new(Zxid::new(0, 1), 0, vec![1, 2, 3, 4]).unwrap();
        let mut buf = Vec::new();
        encode(&txn, &mut buf).unwrap();
        buf.truncate(buf.len() - 2); // drop the last two body bytes
        let mut cursor = io::Cursor::new(buf);
        let err = decode(&mut cursor).unwrap_err();
        assert!(matches!(err, CoreError::UnexpectedEof));
    }

    #[test]
    fn negative_body_length_is_malformed() {
        let mut buf = Vec::new();
        buf.write_i64::<BigEndian>(0).unwrap();
        buf.write_i64::<BigEndian>(1).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        buf.write_i32::<BigEndian>(-1).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let err = decode(&mut cursor).unwrap_err();
        assert!(matches!(err, CoreError::Malformed(_)));
    }
}
