//! The leader's commit-decision loop.
//!
//! A single-consumer event loop, in the same spirit as the donor's
//! `TxnlogFile: Iterator` being driven by one consumer at a time: here the
//! "iterator" is an unbounded channel of inbound events and the loop runs on
//! a dedicated worker thread rather than being pulled by `for`.

mod message;

pub use message::{Message, MessageTuple};

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;

use crate::config::{ClusterConfiguration, ServerId};
use crate::error::{CoreError, Result};
use crate::peer::{OutboundMessage, PeerHandler};
use crate::zxid::Zxid;

/// The externally-mutated map of all known peers. Populated by the
/// orchestrator; the processor only ever reads from it.
pub type QuorumSetOriginal = Arc<RwLock<HashMap<ServerId, Arc<dyn PeerHandler>>>>;

/// Internal sentinel carried on the processor's channel: either a real event
/// or the "request of death" that ends the loop.
enum Event {
    Process(MessageTuple),
    Shutdown,
}

/// Owned processor state, mutated only by the worker thread that runs
/// [`AckProcessor::handle_event`] in a loop. No internal locking: this type
/// is not `Sync` by construction (it's never shared, only owned by the
/// worker).
struct AckProcessor {
    quorum_set_original: QuorumSetOriginal,
    quorum_set: HashMap<ServerId, Arc<dyn PeerHandler>>,
    cluster_config: ClusterConfiguration,
    pending_config: Option<ClusterConfiguration>,
    last_committed_zxid: Zxid,
}

impl AckProcessor {
    fn new(quorum_set_original: QuorumSetOriginal, cluster_config: ClusterConfiguration) -> Self {
        let quorum_set = quorum_set_original.read().clone();
        AckProcessor {
            quorum_set_original,
            quorum_set,
            cluster_config,
            pending_config: None,
            last_committed_zxid: crate::zxid::ZXID_NOT_EXIST,
        }
    }

    fn handle_event(&mut self, tuple: MessageTuple) -> Result<()> {
        match tuple.message {
            Message::Ack => self.on_ack(tuple.server_id, tuple.zxid),
            Message::Join => self.on_join(tuple.server_id, tuple.zxid)?,
            Message::AckEpoch => self.on_ack_epoch(tuple.server_id),
            Message::Disconnected => self.on_disconnected(&tuple.server_id),
            Message::Remove => self.on_remove(tuple.server_id, tuple.zxid)?,
            Message::Unknown(kind) => {
                log::warn!("ignoring unknown message type {kind:?} from {}", tuple.server_id);
            }
        }
        Ok(())
    }

    fn lift_peer(&mut self, server_id: &str) {
        if self.quorum_set.contains_key(server_id) {
            return;
        }
        if let Some(peer) = self.quorum_set_original.read().get(server_id) {
            self.quorum_set.insert(server_id.to_string(), peer.clone());
        }
    }

    fn on_ack(&mut self, server_id: ServerId, zxid: Option<Zxid>) {
        let zxid = match zxid {
            Some(zxid) => zxid,
            None => {
                log::warn!("ACK from {server_id} carried no zxid, ignoring");
                return;
            }
        };
        match self.quorum_set.get(&server_id) {
            Some(peer) => peer.set_last_acked_zxid(zxid),
            None => {
                log::warn!("ACK from untracked peer {server_id}, ignoring");
                return;
            }
        }
        self.recompute_commit();
    }

    fn on_join(&mut self, server_id: ServerId, zxid: Option<Zxid>) -> Result<()> {
        if self.pending_config.is_some() {
            return Err(CoreError::ConcurrentReconfig);
        }
        let zxid = match zxid {
            Some(zxid) => zxid,
            None => {
                log::warn!("JOIN from {server_id} carried no zxid, ignoring");
                return Ok(());
            }
        };
        self.lift_peer(&server_id);
        let new_config = self.cluster_config.add_peer(server_id.clone(), zxid);
        log::info!("JOIN {server_id}: pending reconfiguration to version {zxid}");
        self.pending_config = Some(new_config);
        Ok(())
    }

    fn on_ack_epoch(&mut self, server_id: ServerId) {
        self.lift_peer(&server_id);
    }

    fn on_disconnected(&mut self, server_id: &str) {
        if self.quorum_set.remove(server_id).is_some() {
            log::warn!("peer {server_id} disconnected, removed from working set");
        }
    }

    fn on_remove(&mut self, server_id: ServerId, zxid: Option<Zxid>) -> Result<()> {
        if self.pending_config.is_some() {
            return Err(CoreError::ConcurrentReconfig);
        }
        let zxid = match zxid {
            Some(zxid) => zxid,
            None => {
                log::warn!("REMOVE for {server_id} carried no zxid, ignoring");
                return Ok(());
            }
        };
        let new_config = self.cluster_config.remove_peer(&server_id, zxid);
        log::info!("REMOVE {server_id}: pending reconfiguration to version {zxid}");
        self.pending_config = Some(new_config);
        Ok(())
    }

    /// The quorum commit-point function: the `quorum_size`-th largest
    /// last-acked zxid among tracked peers that belong to `cfg`, or
    /// `last_committed_zxid` if fewer than `quorum_size` such peers have acked.
    fn committed_zxid(&self, cfg: &ClusterConfiguration) -> Zxid {
        let mut acked: Vec<Zxid> = self
            .quorum_set
            .values()
            .filter(|peer| cfg.contains(peer.server_id()))
            .filter_map(|peer| peer.last_acked_zxid())
            .collect();

        if acked.len() < cfg.quorum_size() {
            return self.last_committed_zxid;
        }

        acked.sort();
        acked[acked.len() - cfg.quorum_size()]
    }

    fn recompute_commit(&mut self) {
        let z = if let Some(pending) = self.pending_config.clone() {
            let candidate = self.committed_zxid(&pending);
            if candidate >= pending.version() {
                // The reconfiguration transaction itself reached quorum under
                // the new configuration: it's now committed.
                self.cluster_config = pending;
                self.pending_config = None;
                candidate
            } else {
                // COP safety barrier: don't let the old quorum commit past
                // the point where membership is about to change.
                let mut candidate = self.committed_zxid(&self.cluster_config);
                if candidate >= pending.version() {
                    candidate = Zxid::new(pending.version().epoch, pending.version().xid - 1);
                }
                candidate
            }
        } else {
            self.committed_zxid(&self.cluster_config)
        };

        if z > self.last_committed_zxid {
            self.broadcast_commit(z);
            self.last_committed_zxid = z;
        }
    }

    fn broadcast_commit(&self, zxid: Zxid) {
        log::debug!("broadcasting COMMIT({zxid})");
        for peer in self.quorum_set.values() {
            peer.queue_message(OutboundMessage::Commit(zxid));
        }
    }
}

/// A handle to a running ack processor worker.
///
/// All processor state is touched only by the dedicated worker thread;
/// `process_request` just enqueues, and `shutdown` enqueues the sentinel and
/// joins the worker, surfacing any fatal error it returned.
pub struct AckProcessorHandle {
    sender: crossbeam_channel::Sender<Event>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl AckProcessorHandle {
    /// Spawns the worker thread and returns a handle to it.
    pub fn spawn(
        quorum_set_original: QuorumSetOriginal,
        initial_config: ClusterConfiguration,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Event>();

        let worker = thread::Builder::new()
            .name("ack-processor".into())
            .spawn(move || {
                let mut processor = AckProcessor::new(quorum_set_original, initial_config);
                loop {
                    match receiver.recv() {
                        Ok(Event::Process(tuple)) => processor.handle_event(tuple)?,
                        Ok(Event::Shutdown) | Err(_) => return Ok(()),
                    }
                }
            })
            .expect("failed to spawn ack-processor thread");

        AckProcessorHandle {
            sender,
            worker: Some(worker),
        }
    }

    /// Enqueues an inbound event. Never blocks the caller on processing.
    pub fn process_request(&self, tuple: MessageTuple) {
        // The worker only ever disappears after `shutdown` consumes `self`,
        // so a send failure here would indicate a caller bug, not a runtime
        // condition worth propagating.
        let _ = self.sender.send(Event::Process(tuple));
    }

    /// Enqueues the shutdown sentinel and blocks until the worker exits,
    /// propagating any fatal error (e.g. [`CoreError::ConcurrentReconfig`])
    /// it encountered.
    pub fn shutdown(mut self) -> Result<()> {
        let _ = self.sender.send(Event::Shutdown);
        match self.worker.take().expect("shutdown called twice").join() {
            Ok(result) => result,
            Err(_) => Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "ack processor thread panicked",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct TestPeer {
        id: String,
        last_acked: Mutex<Option<Zxid>>,
        commits: Mutex<Vec<Zxid>>,
    }

    impl TestPeer {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(TestPeer {
                id: id.to_string(),
                last_acked: Mutex::new(None),
                commits: Mutex::new(Vec::new()),
            })
        }
    }

    impl PeerHandler for TestPeer {
        fn server_id(&self) -> &str {
            &self.id
        }
        fn last_acked_zxid(&self) -> Option<Zxid> {
            *self.last_acked.lock()
        }
        fn set_last_acked_zxid(&self, zxid: Zxid) {
            *self.last_acked.lock() = Some(zxid);
        }
        fn queue_message(&self, message: OutboundMessage) {
            let OutboundMessage::Commit(zxid) = message;
            self.commits.lock().push(zxid);
        }
    }

    fn quorum_set_original(peers: &[Arc<TestPeer>]) -> QuorumSetOriginal {
        let mut map: HashMap<ServerId, Arc<dyn PeerHandler>> = HashMap::new();
        for p in peers {
            map.insert(p.id.clone(), p.clone() as Arc<dyn PeerHandler>);
        }
        Arc::new(RwLock::new(map))
    }

    fn ack_epoch(handle: &AckProcessorHandle, server_id: &str) {
        handle.process_request(MessageTuple::new(server_id, Message::AckEpoch, None));
    }

    fn ack(handle: &AckProcessorHandle, server_id: &str, zxid: Zxid) {
        handle.process_request(MessageTuple::new(server_id, Message::Ack, Some(zxid)));
    }

    // Gives the worker thread a moment to process enqueued events before assertions.
    fn settle() {
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn s3_quorum_of_three_commits_third_largest_exactly_once() {
        let _ = env_logger::try_init();
        let peers: Vec<_> = ["p1", "p2", "p3", "p4", "p5"].iter().map(|id| TestPeer::new(id)).collect();
        let cfg = ClusterConfiguration::new(
            peers.iter().map(|p| p.id.clone()),
            Zxid::new(0, 0),
        );
        let handle = AckProcessorHandle::spawn(quorum_set_original(&peers), cfg);

        for p in &peers {
            ack_epoch(&handle, &p.id);
        }

        let acks = [(1, 10), (1, 8), (1, 12), (1, 7), (1, 10)];
        for (peer, (epoch, xid)) in peers.iter().zip(acks.iter()) {
            ack(&handle, &peer.id, Zxid::new(*epoch, *xid));
        }
        settle();

        for p in &peers {
            assert_eq!(*p.commits.lock(), vec![Zxid::new(1, 10)]);
        }

        // Further low/equal acks produce no additional COMMIT.
        ack(&handle, &peers[1].id, Zxid::new(1, 9));
        settle();
        for p in &peers {
            assert_eq!(p.commits.lock().len(), 1);
        }

        handle.shutdown().unwrap();
    }

    #[test]
    fn s4_join_caps_commit_at_cop_barrier_then_advances() {
        // Old configuration {p1,p2,p3}, quorum_size = 2.
        let p1 = TestPeer::new("p1");
        let p2 = TestPeer::new("p2");
        let p3 = TestPeer::new("p3");
        let p4 = TestPeer::new("p4");
        let all = vec![p1.clone(), p2.clone(), p3.clone(), p4.clone()];

        let cfg = ClusterConfiguration::new(
            ["p1", "p2", "p3"].iter().map(|s| s.to_string()),
            Zxid::new(1, 0),
        );
        let handle = AckProcessorHandle::spawn(quorum_set_original(&all), cfg);

        for id in ["p1", "p2", "p3"] {
            ack_epoch(&handle, id);
        }
        // Old quorum (2 of 3) reaches (1,5): seeds last_committed_zxid.
        ack(&handle, "p1", Zxid::new(1, 5));
        ack(&handle, "p2", Zxid::new(1, 5));
        settle();
        assert_eq!(*p1.commits.lock().last().unwrap(), Zxid::new(1, 5));

        handle.process_request(MessageTuple::new(
            "p4",
            Message::Join,
            Some(Zxid::new(1, 7)),
        ));
        settle();

        // Pending config {p1,p2,p3,p4} has quorum_size 3. Only p1,p2 (old
        // quorum) ack up to (1,9): that's 2 acks under the 4-member pending
        // config, short of its quorum_size 3, so the old config's quorum
        // (still satisfied by p1,p2) is used and capped one below the
        // reconfig point.
        ack(&handle, "p1", Zxid::new(1, 9));
        ack(&handle, "p2", Zxid::new(1, 9));
        settle();
        assert_eq!(*p1.commits.lock().last().unwrap(), Zxid::new(1, 6));

        // Now a genuine quorum of the new (4-member) configuration acks >=
        // (1,7): the reconfiguration commits and the commit point advances.
        ack_epoch(&handle, "p3");
        ack_epoch(&handle, "p4");
        ack(&handle, "p3", Zxid::new(1, 9));
        ack(&handle, "p4", Zxid::new(1, 9));
        settle();
        assert_eq!(*p1.commits.lock().last().unwrap(), Zxid::new(1, 9));

        handle.shutdown().unwrap();
    }

    #[test]
    fn s5_disconnected_peer_stops_contributing_but_config_unchanged() {
        let p1 = TestPeer::new("p1");
        let p2 = TestPeer::new("p2");
        let p3 = TestPeer::new("p3");
        let all = vec![p1.clone(), p2.clone(), p3.clone()];
        let cfg = ClusterConfiguration::new(
            ["p1", "p2", "p3"].iter().map(|s| s.to_string()),
            Zxid::new(0, 0),
        );
        let handle = AckProcessorHandle::spawn(quorum_set_original(&all), cfg);

        for id in ["p1", "p2", "p3"] {
            ack_epoch(&handle, id);
        }
        ack(&handle, "p2", Zxid::new(1, 50));
        handle.process_request(MessageTuple::new("p2", Message::Disconnected, None));
        settle();

        // Now only p1, p3 remain tracked: need both (quorum_size=2 of 3) to commit.
        ack(&handle, "p1", Zxid::new(1, 10));
        settle();
        assert!(p1.commits.lock().is_empty());

        ack(&handle, "p3", Zxid::new(1, 10));
        settle();
        assert_eq!(*p1.commits.lock().last().unwrap(), Zxid::new(1, 10));

        handle.shutdown().unwrap();
    }

    #[test]
    fn s6_double_reconfig_is_fatal_and_surfaced_by_shutdown() {
        let p1 = TestPeer::new("p1");
        let p2 = TestPeer::new("p2");
        let all = vec![p1.clone(), p2.clone()];
        let cfg = ClusterConfiguration::new(
            ["p1", "p2"].iter().map(|s| s.to_string()),
            Zxid::new(0, 0),
        );
        let handle = AckProcessorHandle::spawn(quorum_set_original(&all), cfg);

        handle.process_request(MessageTuple::new("p3", Message::Join, Some(Zxid::new(1, 1))));
        handle.process_request(MessageTuple::new("p4", Message::Join, Some(Zxid::new(1, 2))));
        settle();

        let err = handle.shutdown().unwrap_err();
        assert!(matches!(err, CoreError::ConcurrentReconfig));
    }

    #[test]
    fn last_committed_zxid_never_decreases() {
        let p1 = TestPeer::new("p1");
        let p2 = TestPeer::new("p2");
        let p3 = TestPeer::new("p3");
        let all = vec![p1.clone(), p2.clone(), p3.clone()];
        let cfg = ClusterConfiguration::new(
            ["p1", "p2", "p3"].iter().map(|s| s.to_string()),
            Zxid::new(0, 0),
        );
        let handle = AckProcessorHandle::spawn(quorum_set_original(&all), cfg);
        for id in ["p1", "p2", "p3"] {
            ack_epoch(&handle, id);
        }

        let mut seen = Vec::new();
        for xid in [10, 5, 20, 15, 30] {
            ack(&handle, "p1", Zxid::new(1, xid));
            ack(&handle, "p2", Zxid::new(1, xid));
            settle();
            if let Some(last) = p1.commits.lock().last() {
                seen.push(*last);
            }
        }
        for w in seen.windows(2) {
            assert!(w[1] >= w[0]);
        }

        handle.shutdown().unwrap();
    }

    #[test]
    fn unknown_message_type_is_ignored() {
        let done = Arc::new(AtomicBool::new(false));
        let p1 = TestPeer::new("p1");
        let all = vec![p1.clone()];
        let cfg = ClusterConfiguration::new(["p1".to_string()], Zxid::new(0, 0));
        let handle = AckProcessorHandle::spawn(quorum_set_original(&all), cfg);

        handle.process_request(MessageTuple::new(
            "p1",
            Message::Unknown("FROBNICATE".into()),
            None,
        ));
        settle();
        done.store(true, Ordering::SeqCst);
        assert!(done.load(Ordering::SeqCst));

        // The worker must still be alive and responsive after an unknown event.
        handle.shutdown().unwrap();
    }
}
