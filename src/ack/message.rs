//! The inbound event envelope consumed by [`super::AckProcessor`].

use crate::config::ServerId;
use crate::zxid::Zxid;

/// A recognized inbound event type. Decoding of the wire envelope this is
/// extracted from is external to this crate; the core only inspects the
/// already-decoded type and its zxid, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ack,
    Join,
    AckEpoch,
    Disconnected,
    Remove,
    /// Anything the core doesn't recognize; logged and ignored.
    Unknown(String),
}

/// One event deposited into the processor's inbound queue by a peer I/O thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTuple {
    pub server_id: ServerId,
    pub message: Message,
    pub zxid: Option<Zxid>,
}

impl MessageTuple {
    pub fn new(server_id: impl Into<ServerId>, message: Message, zxid: Option<Zxid>) -> Self {
        MessageTuple {
            server_id: server_id.into(),
            message,
            zxid,
        }
    }
}
