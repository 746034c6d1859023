//! Fan-out coordinator
//!
//! Stateless glue between host producers and viewer sessions: a new
//! producer is pushed to every viewer whose receive transport is
//! connected, and a newly ready viewer pulls every producer the host
//! already created. Viewers that are not yet connected get their notices
//! queued and drained, in insertion order, when their transport connects.
//!
//! A `(viewer, producer)` pair is notified at most once per viewer
//! session lifetime; the bookkeeping is dropped when either side dies.

use std::collections::{HashMap, HashSet};

use mediasoup::prelude::*;
use parking_lot::Mutex;
use tracing::debug;

use crate::models::{PeerId, RoomId};
use crate::registry::Registry;
use crate::signal::{ServerMessage, SessionEvent};

#[derive(Debug, Clone, Copy)]
struct PendingNotice {
    producer_id: ProducerId,
    kind: MediaKind,
}

#[derive(Default)]
struct FanoutState {
    notified: HashSet<(PeerId, ProducerId)>,
    pending: HashMap<PeerId, Vec<PendingNotice>>,
}

#[derive(Default)]
pub struct FanoutCoordinator {
    state: Mutex<FanoutState>,
}

impl FanoutCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A host created a producer: notify connected viewers, queue the
    /// rest.
    pub fn on_new_producer(
        &self,
        registry: &Registry,
        room_id: &RoomId,
        producer_id: ProducerId,
        kind: MediaKind,
    ) {
        let viewers = registry.viewers_of(room_id);
        let mut state = self.state.lock();

        for viewer in viewers {
            let key = (viewer.peer_id.clone(), producer_id);
            if state.notified.contains(&key) {
                continue;
            }
            if viewer.recv_connected {
                let sent = viewer
                    .outbound
                    .send(SessionEvent::Frame(ServerMessage::NewProducer {
                        producer_id,
                        kind,
                    }))
                    .is_ok();
                if sent {
                    state.notified.insert(key);
                }
            } else {
                let queue = state.pending.entry(viewer.peer_id).or_default();
                if !queue.iter().any(|n| n.producer_id == producer_id) {
                    queue.push(PendingNotice { producer_id, kind });
                }
            }
        }

        debug!(room_id = %room_id, producer_id = %producer_id, "Fanned out producer");
    }

    /// A viewer's receive transport connected: replay the host's
    /// existing producers in creation order, then drain this viewer's
    /// pending queue.
    pub fn on_viewer_ready(&self, registry: &Registry, peer_id: &PeerId) {
        let Some(target) = registry.viewer_target(peer_id) else {
            return;
        };
        if !target.recv_connected {
            return;
        }
        let Some(snapshot) = registry.peer_snapshot(peer_id) else {
            return;
        };
        let producers = registry.host_producers(&snapshot.room_id);

        let mut state = self.state.lock();
        let pending = state.pending.remove(peer_id).unwrap_or_default();
        let notices = producers
            .into_iter()
            .chain(pending.into_iter().map(|n| (n.producer_id, n.kind)));

        for (producer_id, kind) in notices {
            let key = (peer_id.clone(), producer_id);
            if state.notified.contains(&key) {
                continue;
            }
            let sent = target
                .outbound
                .send(SessionEvent::Frame(ServerMessage::NewProducer {
                    producer_id,
                    kind,
                }))
                .is_ok();
            if sent {
                state.notified.insert(key);
            }
        }
    }

    /// Drop bookkeeping for a departed viewer.
    pub fn forget_peer(&self, peer_id: &PeerId) {
        let mut state = self.state.lock();
        state.pending.remove(peer_id);
        state.notified.retain(|(viewer, _)| viewer != peer_id);
    }

    /// Drop bookkeeping for a closed producer.
    pub fn forget_producer(&self, producer_id: &ProducerId) {
        let mut state = self.state.lock();
        state.notified.retain(|(_, p)| p != producer_id);
        for queue in state.pending.values_mut() {
            queue.retain(|n| &n.producer_id != producer_id);
        }
        state.pending.retain(|_, queue| !queue.is_empty());
    }
}
