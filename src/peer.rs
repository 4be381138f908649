//! The external `PeerHandler` contract the ack processor consumes.
//!
//! Peers are owned by the external orchestrator (the network/transport layer
//! and the `PeerHandler` thread it runs); the processor only ever holds
//! non-owning references, passed through this trait. Never implement peer
//! lifecycle management in this crate.

use crate::zxid::Zxid;

/// A single outbound message the processor can ask a peer handler to queue.
///
/// Only `Commit` is produced by this core; the rest of the `Message` wire
/// envelope (proposals, pings, session management, ...) is built by layers
/// above this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage {
    Commit(Zxid),
}

/// The subset of a peer connection the ack processor needs: its identity,
/// its latest acknowledged zxid, and a way to hand it an outbound message.
///
/// Implementations must be safe to share across threads: the processor
/// thread and the owning orchestrator both hold references concurrently.
pub trait PeerHandler: Send + Sync {
    fn server_id(&self) -> &str;

    /// `None` until the peer has produced its first ACK.
    fn last_acked_zxid(&self) -> Option<Zxid>;

    fn set_last_acked_zxid(&self, zxid: Zxid);

    fn queue_message(&self, message: OutboundMessage);
}
