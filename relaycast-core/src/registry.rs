//! Room registry
//!
//! Single owner of all room and peer state. Rooms and peers live in two
//! maps keyed by opaque ids; peers reference their room by `RoomId`
//! value, never by handle, so destruction is idempotent and there are no
//! reference cycles. All mutations go through one mutex; registry
//! operations never suspend, and every media-worker call clones the
//! cheap engine handles out, runs outside the lock, then re-locks to
//! record the result.
//!
//! Teardown ordering is part of the contract: producers, then consumers,
//! then transports, then removal from the room; a departing host
//! cascades into full room destruction, and the router is dropped only
//! after every peer is gone.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mediasoup::prelude::*;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::WorkerPool;
use crate::models::{PeerId, Role, RoomId, TransportDirection};
use crate::signal::{ServerMessage, SessionEvent, TransportInfo};
use crate::SERVER_START_TIME;

/// A peer's signaling progress. Strictly forward; any state may jump to
/// `Closed`.
///
/// Crossing `TransportsConnected` is what makes a peer ready: produce,
/// consume and fan-out delivery all gate on it. Since a peer owns
/// exactly one transport (send for hosts, recv for viewers), this
/// threshold is equivalent to "my transport is connected".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    Registered,
    CapabilitiesReady,
    TransportsRequested,
    TransportsConnected,
    Streaming,
    Closed,
}

struct Room {
    post_id: String,
    host_user_id: String,
    created_at: Instant,
    created_at_wall: DateTime<Utc>,
    viewer_cap: usize,
    router: Router,
    host_peer_id: Option<PeerId>,
    viewer_count: usize,
}

struct Peer {
    room_id: RoomId,
    user_id: String,
    username: String,
    role: Role,
    state: SignalingState,
    send_transport: Option<WebRtcTransport>,
    recv_transport: Option<WebRtcTransport>,
    /// Creation order is preserved so fan-out replays audio/video in the
    /// order the host produced them.
    producers: Vec<Producer>,
    consumers: HashMap<ConsumerId, Consumer>,
    consumed: HashSet<ProducerId>,
    outbound: mpsc::UnboundedSender<SessionEvent>,
}

impl Peer {
    fn transport(&self, direction: TransportDirection) -> Option<&WebRtcTransport> {
        match direction {
            TransportDirection::Send => self.send_transport.as_ref(),
            TransportDirection::Recv => self.recv_transport.as_ref(),
        }
    }

    fn advance(&mut self, state: SignalingState) {
        if state > self.state {
            self.state = state;
        }
    }

    fn transport_connected(&self) -> bool {
        self.state >= SignalingState::TransportsConnected
    }
}

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<RoomId, Room>,
    peers: HashMap<PeerId, Peer>,
}

impl RegistryInner {
    fn recompute_viewer_count(&mut self, room_id: &RoomId) {
        let viewers = self
            .peers
            .values()
            .filter(|p| &p.room_id == room_id && p.role == Role::Viewer)
            .count();
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.viewer_count = viewers;
        }
    }
}

/// Immutable view of one room, served by the stats endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub post_id: String,
    pub host_user_id: String,
    pub is_active: bool,
    pub has_host: bool,
    pub viewer_count: usize,
    pub created_at: DateTime<Utc>,
    // Worker stats are not polled synchronously; counters stay zero.
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Aggregate server statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    pub total_rooms: usize,
    pub active_rooms: usize,
    pub total_peers: usize,
    pub total_hosts: usize,
    pub total_viewers: usize,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub uptime_seconds: u64,
    pub rooms: Vec<RoomSnapshot>,
}

/// Immutable view of one peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub room_id: RoomId,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub state: SignalingState,
}

/// What a session needs to know after its peer was unregistered.
#[derive(Debug)]
pub struct PeerDeparture {
    pub room_id: RoomId,
    pub role: Role,
    pub username: String,
    pub producer_ids: Vec<ProducerId>,
    pub room_stopped: bool,
}

/// Fan-out view of one viewer.
pub struct ViewerTarget {
    pub peer_id: PeerId,
    pub recv_connected: bool,
    pub outbound: mpsc::UnboundedSender<SessionEvent>,
}

/// Reply to a successful `consume`.
#[derive(Debug, Clone)]
pub struct ConsumedInfo {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

pub struct Registry {
    inner: Mutex<RegistryInner>,
    pool: Arc<WorkerPool>,
    max_rooms: usize,
    viewer_cap: usize,
}

impl Registry {
    #[must_use]
    pub fn new(config: &Config, pool: Arc<WorkerPool>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            pool,
            max_rooms: config.rooms.max_rooms,
            viewer_cap: config.rooms.max_viewers_per_room,
        }
    }

    /// Create a room and allocate its router.
    pub async fn create_room(&self, post_id: String, host_user_id: String) -> Result<RoomId> {
        if self.inner.lock().rooms.len() >= self.max_rooms {
            return Err(Error::Capacity(format!(
                "room limit reached ({})",
                self.max_rooms
            )));
        }

        let router = self.pool.create_router().await?;
        let room_id = RoomId::new();

        {
            let mut inner = self.inner.lock();
            // The capacity check reruns after the suspension point; a
            // racing create may have filled the last slot.
            if inner.rooms.len() >= self.max_rooms {
                return Err(Error::Capacity(format!(
                    "room limit reached ({})",
                    self.max_rooms
                )));
            }
            inner.rooms.insert(
                room_id.clone(),
                Room {
                    post_id: post_id.clone(),
                    host_user_id,
                    created_at: Instant::now(),
                    created_at_wall: Utc::now(),
                    viewer_cap: self.viewer_cap,
                    router,
                    host_peer_id: None,
                    viewer_count: 0,
                },
            );
        }

        info!(room_id = %room_id, post_id = %post_id, "Room created");
        Ok(room_id)
    }

    /// Destroy a room: every peer is torn down first, the router last.
    ///
    /// Idempotent against already-destroyed rooms (second call reports
    /// not-found without side effects).
    pub fn stop_room(&self, room_id: &RoomId) -> Result<()> {
        let (room, peers) = {
            let mut inner = self.inner.lock();
            let Some(room) = inner.rooms.remove(room_id) else {
                return Err(Error::NotFound(format!("room {room_id}")));
            };
            let peer_ids: Vec<PeerId> = inner
                .peers
                .iter()
                .filter(|(_, p)| &p.room_id == room_id)
                .map(|(id, _)| id.clone())
                .collect();
            let peers: Vec<Peer> = peer_ids
                .iter()
                .filter_map(|id| inner.peers.remove(id))
                .collect();
            (room, peers)
        };

        let peer_count = peers.len();
        for peer in peers {
            close_peer_resources(peer, crate::signal::CLOSE_INTERNAL_ERROR, "room closed");
        }

        // All peers are gone; releasing the router handle closes it in
        // the worker.
        drop(room);

        info!(room_id = %room_id, peers = peer_count, "Room stopped");
        Ok(())
    }

    /// Register a connected client as a peer of a room.
    pub fn register_peer(
        &self,
        room_id: &RoomId,
        user_id: String,
        username: String,
        role: Role,
        outbound: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<PeerId> {
        let mut inner = self.inner.lock();

        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| Error::NoRoom(format!("room {room_id}")))?;

        match role {
            Role::Host => {
                if room.host_peer_id.is_some() {
                    return Err(Error::HostPresent(format!(
                        "room {room_id} already has a host"
                    )));
                }
            }
            Role::Viewer => {
                if room.viewer_count >= room.viewer_cap {
                    return Err(Error::RoomFull(format!(
                        "room {room_id} is at its viewer cap ({})",
                        room.viewer_cap
                    )));
                }
            }
        }

        let peer_id = PeerId::new();
        inner.peers.insert(
            peer_id.clone(),
            Peer {
                room_id: room_id.clone(),
                user_id,
                username,
                role,
                state: SignalingState::Registered,
                send_transport: None,
                recv_transport: None,
                producers: Vec::new(),
                consumers: HashMap::new(),
                consumed: HashSet::new(),
                outbound,
            },
        );
        if role == Role::Host {
            if let Some(room) = inner.rooms.get_mut(room_id) {
                room.host_peer_id = Some(peer_id.clone());
            }
        }
        inner.recompute_viewer_count(room_id);

        info!(room_id = %room_id, peer_id = %peer_id, role = %role, "Peer registered");
        Ok(peer_id)
    }

    /// Tear down a peer. A departing host cascades to `stop_room`.
    ///
    /// Returns `None` (no-op) when the peer is already gone.
    pub fn unregister_peer(&self, peer_id: &PeerId) -> Option<PeerDeparture> {
        let peer = self.inner.lock().peers.remove(peer_id)?;

        let room_id = peer.room_id.clone();
        let role = peer.role;
        let username = peer.username.clone();
        let producer_ids: Vec<ProducerId> = peer.producers.iter().map(Producer::id).collect();

        close_peer_resources(peer, crate::signal::CLOSE_INTERNAL_ERROR, "peer closed");

        let room_stopped = match role {
            Role::Host => {
                // Host departure ends the broadcast for everyone.
                self.stop_room(&room_id).is_ok()
            }
            Role::Viewer => {
                let mut inner = self.inner.lock();
                inner.recompute_viewer_count(&room_id);
                false
            }
        };

        debug!(peer_id = %peer_id, room_id = %room_id, role = %role, "Peer unregistered");
        Some(PeerDeparture {
            room_id,
            role,
            username,
            producer_ids,
            room_stopped,
        })
    }

    /// Mark the welcome/capability exchange as acknowledged.
    pub fn acknowledge_capabilities(&self, peer_id: &PeerId) -> Result<()> {
        let mut inner = self.inner.lock();
        let peer = inner
            .peers
            .get_mut(peer_id)
            .ok_or_else(|| Error::NotFound(format!("peer {peer_id}")))?;
        peer.advance(SignalingState::CapabilitiesReady);
        Ok(())
    }

    /// Allocate the peer's transport of the given direction, or return
    /// the already-allocated one (idempotent; repeated requests see the
    /// same parameters).
    pub async fn ensure_transport(
        &self,
        peer_id: &PeerId,
        direction: TransportDirection,
    ) -> Result<TransportInfo> {
        enum Plan {
            Existing(TransportInfo),
            Create(Router),
        }

        let plan = {
            let inner = self.inner.lock();
            let peer = inner
                .peers
                .get(peer_id)
                .ok_or_else(|| Error::NotFound(format!("peer {peer_id}")))?;

            let allowed = TransportDirection::allowed_for(peer.role);
            if direction != allowed {
                return Err(Error::RoleMismatch(format!(
                    "a {} may only allocate a {} transport",
                    peer.role, allowed
                )));
            }

            match peer.transport(direction) {
                Some(existing) => Plan::Existing(transport_info(existing)),
                None => {
                    let room = inner
                        .rooms
                        .get(&peer.room_id)
                        .ok_or_else(|| Error::NoRoom(format!("room {}", peer.room_id)))?;
                    Plan::Create(room.router.clone())
                }
            }
        };

        let router = match plan {
            Plan::Existing(info) => return Ok(info),
            Plan::Create(router) => router,
        };

        let transport = self.pool.create_webrtc_transport(&router).await?;
        let info = transport_info(&transport);

        let mut inner = self.inner.lock();
        let Some(peer) = inner.peers.get_mut(peer_id) else {
            // Peer vanished while the transport was being created; the
            // dropped handle closes it.
            return Err(Error::NotFound(format!("peer {peer_id}")));
        };
        let slot = match direction {
            TransportDirection::Send => &mut peer.send_transport,
            TransportDirection::Recv => &mut peer.recv_transport,
        };
        if let Some(existing) = slot.as_ref() {
            return Ok(transport_info(existing));
        }
        *slot = Some(transport);
        peer.advance(SignalingState::TransportsRequested);

        debug!(peer_id = %peer_id, direction = %direction, "Transport created");
        Ok(info)
    }

    /// Connect a transport with the client's DTLS parameters.
    pub async fn connect_transport(
        &self,
        peer_id: &PeerId,
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        let transport = {
            let inner = self.inner.lock();
            let peer = inner
                .peers
                .get(peer_id)
                .ok_or_else(|| Error::NotFound(format!("peer {peer_id}")))?;
            if direction != TransportDirection::allowed_for(peer.role) {
                return Err(Error::RoleMismatch(format!(
                    "a {} has no {} transport",
                    peer.role, direction
                )));
            }
            peer.transport(direction)
                .cloned()
                .ok_or_else(|| Error::State(format!("{direction} transport not allocated")))?
        };

        transport
            .connect(WebRtcTransportRemoteParameters { dtls_parameters })
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to connect transport: {e}")))?;

        let mut inner = self.inner.lock();
        if let Some(peer) = inner.peers.get_mut(peer_id) {
            peer.advance(SignalingState::TransportsConnected);
        }
        Ok(())
    }

    /// Host only: create a producer for one incoming track.
    pub async fn produce(
        &self,
        peer_id: &PeerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        let transport = {
            let inner = self.inner.lock();
            let peer = inner
                .peers
                .get(peer_id)
                .ok_or_else(|| Error::NotFound(format!("peer {peer_id}")))?;
            if peer.role != Role::Host {
                return Err(Error::RoleMismatch("produce is host-only".to_string()));
            }
            if !peer.transport_connected() {
                return Err(Error::TransportNotReady(
                    "send transport is not connected".to_string(),
                ));
            }
            peer.send_transport
                .clone()
                .ok_or_else(|| Error::State("send transport not allocated".to_string()))?
        };

        let producer = transport
            .produce(ProducerOptions::new(kind, rtp_parameters))
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to produce: {e}")))?;
        let producer_id = producer.id();

        let mut inner = self.inner.lock();
        let Some(peer) = inner.peers.get_mut(peer_id) else {
            return Err(Error::NotFound(format!("peer {peer_id}")));
        };
        peer.producers.push(producer);
        peer.advance(SignalingState::Streaming);

        info!(peer_id = %peer_id, producer_id = %producer_id, kind = ?kind, "Producer created");
        Ok(producer_id)
    }

    /// Viewer only: create a consumer forwarding one host producer.
    ///
    /// The consumer is created paused; the client resumes it once its
    /// receiving side is wired up.
    pub async fn consume(
        &self,
        peer_id: &PeerId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumedInfo> {
        let (transport, router) = {
            let inner = self.inner.lock();
            let peer = inner
                .peers
                .get(peer_id)
                .ok_or_else(|| Error::NotFound(format!("peer {peer_id}")))?;
            if peer.role != Role::Viewer {
                return Err(Error::RoleMismatch("consume is viewer-only".to_string()));
            }
            if !peer.transport_connected() {
                return Err(Error::TransportNotReady(
                    "recv transport is not connected".to_string(),
                ));
            }
            if peer.consumed.contains(&producer_id) {
                return Err(Error::AlreadyConsuming(format!(
                    "producer {producer_id} already consumed"
                )));
            }
            let transport = peer
                .recv_transport
                .clone()
                .ok_or_else(|| Error::State("recv transport not allocated".to_string()))?;
            let room = inner
                .rooms
                .get(&peer.room_id)
                .ok_or_else(|| Error::NoRoom(format!("room {}", peer.room_id)))?;
            (transport, room.router.clone())
        };

        if !router.can_consume(&producer_id, &rtp_capabilities) {
            return Err(Error::NotConsumable(format!(
                "producer {producer_id} cannot be consumed with the given capabilities"
            )));
        }

        let mut options = ConsumerOptions::new(producer_id, rtp_capabilities);
        options.paused = true;

        let consumer = transport
            .consume(options)
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to consume: {e}")))?;

        let consumed = ConsumedInfo {
            id: consumer.id(),
            producer_id,
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters().clone(),
        };

        let mut inner = self.inner.lock();
        let Some(peer) = inner.peers.get_mut(peer_id) else {
            return Err(Error::NotFound(format!("peer {peer_id}")));
        };
        if !peer.consumed.insert(producer_id) {
            return Err(Error::AlreadyConsuming(format!(
                "producer {producer_id} already consumed"
            )));
        }
        peer.consumers.insert(consumer.id(), consumer);
        peer.advance(SignalingState::Streaming);

        info!(peer_id = %peer_id, consumer_id = %consumed.id, kind = ?consumed.kind, "Consumer created");
        Ok(consumed)
    }

    /// Unpause a previously created consumer.
    pub async fn resume_consumer(&self, peer_id: &PeerId, consumer_id: ConsumerId) -> Result<()> {
        let consumer = {
            let inner = self.inner.lock();
            let peer = inner
                .peers
                .get(peer_id)
                .ok_or_else(|| Error::NotFound(format!("peer {peer_id}")))?;
            peer.consumers
                .get(&consumer_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("consumer {consumer_id}")))?
        };

        consumer
            .resume()
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to resume consumer: {e}")))
    }

    /// RTP capabilities of the room's router, for the welcome frame.
    pub fn router_rtp_capabilities(&self, room_id: &RoomId) -> Result<RtpCapabilitiesFinalized> {
        let inner = self.inner.lock();
        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| Error::NoRoom(format!("room {room_id}")))?;
        Ok(room.router.rtp_capabilities().clone())
    }

    #[must_use]
    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.inner.lock().rooms.contains_key(room_id)
    }

    /// Host producers of a room in creation order (for fan-out replay).
    #[must_use]
    pub fn host_producers(&self, room_id: &RoomId) -> Vec<(ProducerId, MediaKind)> {
        let inner = self.inner.lock();
        let Some(room) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        let Some(host_peer_id) = &room.host_peer_id else {
            return Vec::new();
        };
        inner
            .peers
            .get(host_peer_id)
            .map(|host| {
                host.producers
                    .iter()
                    .map(|p| (p.id(), p.kind()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fan-out view of a room's viewers.
    #[must_use]
    pub fn viewers_of(&self, room_id: &RoomId) -> Vec<ViewerTarget> {
        let inner = self.inner.lock();
        inner
            .peers
            .iter()
            .filter(|(_, p)| &p.room_id == room_id && p.role == Role::Viewer)
            .map(|(id, p)| ViewerTarget {
                peer_id: id.clone(),
                recv_connected: p.transport_connected(),
                outbound: p.outbound.clone(),
            })
            .collect()
    }

    /// Fan-out view of one viewer, if it still exists and is a viewer.
    #[must_use]
    pub fn viewer_target(&self, peer_id: &PeerId) -> Option<ViewerTarget> {
        let inner = self.inner.lock();
        inner
            .peers
            .get(peer_id)
            .filter(|p| p.role == Role::Viewer)
            .map(|p| ViewerTarget {
                peer_id: peer_id.clone(),
                recv_connected: p.transport_connected(),
                outbound: p.outbound.clone(),
            })
    }

    /// The room a peer belongs to, with its signaling progress.
    #[must_use]
    pub fn peer_snapshot(&self, peer_id: &PeerId) -> Option<PeerSnapshot> {
        let inner = self.inner.lock();
        inner.peers.get(peer_id).map(|p| PeerSnapshot {
            peer_id: peer_id.clone(),
            room_id: p.room_id.clone(),
            user_id: p.user_id.clone(),
            username: p.username.clone(),
            role: p.role,
            state: p.state,
        })
    }

    /// Send a frame to every peer of a room, optionally skipping one.
    pub fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        except: Option<&PeerId>,
        frame: &ServerMessage,
    ) {
        let inner = self.inner.lock();
        for (id, peer) in &inner.peers {
            if &peer.room_id != room_id || Some(id) == except {
                continue;
            }
            let _ = peer.outbound.send(SessionEvent::Frame(frame.clone()));
        }
    }

    pub fn room_stats(&self, room_id: &RoomId) -> Result<RoomSnapshot> {
        let inner = self.inner.lock();
        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        Ok(snapshot_room(room_id, room))
    }

    #[must_use]
    pub fn server_stats(&self) -> ServerStats {
        let inner = self.inner.lock();

        let rooms: Vec<RoomSnapshot> = inner
            .rooms
            .iter()
            .map(|(id, room)| snapshot_room(id, room))
            .collect();

        let total_hosts = inner
            .peers
            .values()
            .filter(|p| p.role == Role::Host)
            .count();
        let total_viewers = inner.peers.len() - total_hosts;

        ServerStats {
            total_rooms: inner.rooms.len(),
            active_rooms: rooms.iter().filter(|r| r.has_host).count(),
            total_peers: inner.peers.len(),
            total_hosts,
            total_viewers,
            total_bytes_sent: 0,
            total_bytes_received: 0,
            uptime_seconds: SERVER_START_TIME.elapsed().as_secs(),
            rooms,
        }
    }

    /// (rooms, peers) counts for the periodic stats log line.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.rooms.len(), inner.peers.len())
    }

    /// Evict rooms older than `timeout` that are hostless or viewerless.
    ///
    /// Runs concurrently with peer disconnects; `stop_room` is
    /// idempotent, so a race at worst reports an already-gone room.
    pub fn reap_idle(&self, timeout: Duration) -> Vec<RoomId> {
        let victims: Vec<RoomId> = {
            let inner = self.inner.lock();
            inner
                .rooms
                .iter()
                .filter(|(_, room)| {
                    room.created_at.elapsed() > timeout
                        && (room.host_peer_id.is_none() || room.viewer_count == 0)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for room_id in &victims {
            if self.stop_room(room_id).is_ok() {
                info!(room_id = %room_id, "Reaped idle room");
            }
        }
        victims
    }

    /// Close every room; used on graceful shutdown.
    pub fn shutdown(&self) {
        let room_ids: Vec<RoomId> = self.inner.lock().rooms.keys().cloned().collect();
        for room_id in room_ids {
            let _ = self.stop_room(&room_id);
        }
    }
}

fn snapshot_room(room_id: &RoomId, room: &Room) -> RoomSnapshot {
    RoomSnapshot {
        room_id: room_id.clone(),
        post_id: room.post_id.clone(),
        host_user_id: room.host_user_id.clone(),
        is_active: room.host_peer_id.is_some(),
        has_host: room.host_peer_id.is_some(),
        viewer_count: room.viewer_count,
        created_at: room.created_at_wall,
        bytes_sent: 0,
        bytes_received: 0,
    }
}

fn transport_info(transport: &WebRtcTransport) -> TransportInfo {
    TransportInfo {
        id: transport.id(),
        ice_parameters: transport.ice_parameters().clone(),
        ice_candidates: transport.ice_candidates().clone(),
        dtls_parameters: transport.dtls_parameters(),
    }
}

/// Release a peer's media resources in the contractual order, then tell
/// its session to close.
fn close_peer_resources(mut peer: Peer, code: u16, reason: &str) {
    drop(std::mem::take(&mut peer.producers));
    drop(std::mem::take(&mut peer.consumers));
    drop(peer.send_transport.take());
    drop(peer.recv_transport.take());
    let _ = peer.outbound.send(SessionEvent::Close {
        code,
        reason: reason.to_string(),
    });
}
