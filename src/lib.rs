//! Leader-side commit core for a ZAB-style (ZooKeeper Atomic Broadcast)
//! replicated state machine.
//!
//! Two tightly-coupled pieces live here:
//!
//! - [`log`]: an append-only, crash-safe transaction journal, identified by
//!   [`Zxid`] and addressed through [`log::TransactionLog`].
//! - [`ack`]: the leader's commit-decision loop, [`ack::AckProcessorHandle`],
//!   which tracks per-peer acknowledgments and drives single-step
//!   reconfiguration under a safety barrier.
//!
//! Everything else (network transport, the message envelope's wire
//! encoding, leader election, authentication) is an external collaborator;
//! this crate only specifies the contracts it consumes from them, via
//! [`peer::PeerHandler`].

pub mod ack;
pub mod codec;
pub mod config;
pub mod error;
pub mod log;
pub mod peer;
pub mod txn;
pub mod zxid;

pub use config::ClusterConfiguration;
pub use error::CoreError;
pub use log::{LogOptions, TransactionLog};
pub use peer::{OutboundMessage, PeerHandler};
pub use txn::Transaction;
pub use zxid::{Zxid, ZXID_NOT_EXIST};
