// Integration tests for the room registry and fan-out coordinator.
//
// These spin up a real (single) media worker; everything else runs
// against the public crate API the signaling layer uses.

use std::num::{NonZeroU32, NonZeroU8};
use std::sync::Arc;
use std::time::Duration;

use mediasoup::prelude::*;
use tokio::sync::mpsc;

use relaycast_core::config::Config;
use relaycast_core::fanout::FanoutCoordinator;
use relaycast_core::media::WorkerPool;
use relaycast_core::models::{PeerId, Role, RoomId, TransportDirection};
use relaycast_core::registry::{Registry, SignalingState};
use relaycast_core::signal::{ServerMessage, SessionEvent};
use relaycast_core::Error;

async fn setup(max_rooms: usize, max_viewers: usize) -> Arc<Registry> {
    let mut config = Config::default();
    config.rooms.max_rooms = max_rooms;
    config.rooms.max_viewers_per_room = max_viewers;

    let (dead_tx, _dead_rx) = mpsc::unbounded_channel();
    let pool = Arc::new(
        WorkerPool::with_size(&config, 1, dead_tx)
            .await
            .expect("worker pool"),
    );
    Arc::new(Registry::new(&config, pool))
}

fn outbound() -> (
    mpsc::UnboundedSender<SessionEvent>,
    mpsc::UnboundedReceiver<SessionEvent>,
) {
    mpsc::unbounded_channel()
}

fn client_dtls_parameters() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint::Sha256 { value: [0x11; 32] }],
    }
}

/// Audio RTP parameters a browser would send for an Opus track.
fn audio_rtp_parameters(ssrc: u32) -> RtpParameters {
    RtpParameters {
        mid: Some("0".to_string()),
        codecs: vec![RtpCodecParameters::Audio {
            mime_type: MimeTypeAudio::Opus,
            payload_type: 111,
            clock_rate: NonZeroU32::new(48000).unwrap(),
            channels: NonZeroU8::new(2).unwrap(),
            parameters: RtpCodecParametersParameters::from([("useinbandfec", 1_u32.into())]),
            rtcp_feedback: vec![RtcpFeedback::TransportCc],
        }],
        header_extensions: vec![],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(ssrc),
            ..RtpEncodingParameters::default()
        }],
        rtcp: RtcpParameters::default(),
    }
}

/// Device capabilities matching the router (what a compatible client
/// would advertise).
fn viewer_rtp_capabilities(registry: &Registry, room_id: &RoomId) -> RtpCapabilities {
    let finalized = registry.router_rtp_capabilities(room_id).unwrap();
    let value = serde_json::to_value(&finalized).unwrap();
    serde_json::from_value(value).unwrap()
}

fn drain_new_producers(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<ProducerId> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SessionEvent::Frame(ServerMessage::NewProducer { producer_id, .. }) = event {
            seen.push(producer_id);
        }
    }
    seen
}

#[tokio::test]
async fn test_room_capacity_enforced() {
    let registry = setup(1, 10).await;

    let first = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    let second = registry
        .create_room("p2".to_string(), "u2".to_string())
        .await;
    assert!(matches!(second, Err(Error::Capacity(_))));

    registry.stop_room(&first).unwrap();

    registry
        .create_room("p3".to_string(), "u3".to_string())
        .await
        .expect("capacity freed after stop");
}

#[tokio::test]
async fn test_stop_room_is_idempotent() {
    let registry = setup(10, 10).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    assert!(registry.stop_room(&room_id).is_ok());
    assert!(matches!(
        registry.stop_room(&room_id),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        registry.room_stats(&room_id),
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_register_peer_constraints() {
    let registry = setup(10, 1).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    let missing = registry.register_peer(
        &RoomId::from("nope00000000"),
        "u".to_string(),
        "n".to_string(),
        Role::Viewer,
        outbound().0,
    );
    assert!(matches!(missing, Err(Error::NoRoom(_))));

    registry
        .register_peer(
            &room_id,
            "host".to_string(),
            "Host".to_string(),
            Role::Host,
            outbound().0,
        )
        .unwrap();
    let second_host = registry.register_peer(
        &room_id,
        "host2".to_string(),
        "Host2".to_string(),
        Role::Host,
        outbound().0,
    );
    assert!(matches!(second_host, Err(Error::HostPresent(_))));

    registry
        .register_peer(
            &room_id,
            "v1".to_string(),
            "V1".to_string(),
            Role::Viewer,
            outbound().0,
        )
        .unwrap();
    let over_cap = registry.register_peer(
        &room_id,
        "v2".to_string(),
        "V2".to_string(),
        Role::Viewer,
        outbound().0,
    );
    assert!(matches!(over_cap, Err(Error::RoomFull(_))));

    let stats = registry.room_stats(&room_id).unwrap();
    assert_eq!(stats.viewer_count, 1);
    assert!(stats.has_host);
}

#[tokio::test]
async fn test_host_departure_cascades() {
    let registry = setup(10, 10).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    let host = registry
        .register_peer(
            &room_id,
            "host".to_string(),
            "Host".to_string(),
            Role::Host,
            outbound().0,
        )
        .unwrap();
    let (viewer_tx, mut viewer_rx) = outbound();
    let viewer = registry
        .register_peer(
            &room_id,
            "v1".to_string(),
            "V1".to_string(),
            Role::Viewer,
            viewer_tx,
        )
        .unwrap();

    let departure = registry.unregister_peer(&host).expect("first unregister");
    assert_eq!(departure.role, Role::Host);
    assert!(departure.room_stopped);

    // Everything under the room is gone, and the viewer session was told
    // to close.
    assert!(!registry.room_exists(&room_id));
    assert!(registry.peer_snapshot(&viewer).is_none());
    let mut saw_close = false;
    while let Ok(event) = viewer_rx.try_recv() {
        if matches!(event, SessionEvent::Close { .. }) {
            saw_close = true;
        }
    }
    assert!(saw_close);

    // Second unregister of either peer is a no-op.
    assert!(registry.unregister_peer(&host).is_none());
    assert!(registry.unregister_peer(&viewer).is_none());
}

#[tokio::test]
async fn test_viewer_count_tracks_departures() {
    let registry = setup(10, 10).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    let v1 = registry
        .register_peer(&room_id, "v1".into(), "V1".into(), Role::Viewer, outbound().0)
        .unwrap();
    let _v2 = registry
        .register_peer(&room_id, "v2".into(), "V2".into(), Role::Viewer, outbound().0)
        .unwrap();
    assert_eq!(registry.room_stats(&room_id).unwrap().viewer_count, 2);

    let departure = registry.unregister_peer(&v1).unwrap();
    assert!(!departure.room_stopped);
    assert_eq!(registry.room_stats(&room_id).unwrap().viewer_count, 1);
}

#[tokio::test]
async fn test_reaper_evicts_hostless_room() {
    let registry = setup(10, 10).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    // Fresh room survives a long-timeout pass.
    assert!(registry.reap_idle(Duration::from_secs(3600)).is_empty());
    assert!(registry.room_exists(&room_id));

    // With a zero timeout the hostless room is eligible immediately.
    let reaped = registry.reap_idle(Duration::ZERO);
    assert_eq!(reaped, vec![room_id.clone()]);
    assert!(!registry.room_exists(&room_id));
}

#[tokio::test]
async fn test_signaling_order_and_transport_idempotence() {
    let registry = setup(10, 10).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();
    let host = registry
        .register_peer(&room_id, "h".into(), "H".into(), Role::Host, outbound().0)
        .unwrap();
    let state = |registry: &Registry| registry.peer_snapshot(&host).unwrap().state;
    assert_eq!(state(&registry), SignalingState::Registered);

    registry.acknowledge_capabilities(&host).unwrap();
    assert_eq!(state(&registry), SignalingState::CapabilitiesReady);

    // Wrong direction for the role.
    let wrong = registry
        .ensure_transport(&host, TransportDirection::Recv)
        .await;
    assert!(matches!(wrong, Err(Error::RoleMismatch(_))));
    assert_eq!(state(&registry), SignalingState::CapabilitiesReady);

    let first = registry
        .ensure_transport(&host, TransportDirection::Send)
        .await
        .unwrap();
    let second = registry
        .ensure_transport(&host, TransportDirection::Send)
        .await
        .unwrap();
    assert_eq!(state(&registry), SignalingState::TransportsRequested);

    // Duplicate requests return the same transport, parameters included.
    assert_eq!(first.id, second.id);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    // Produce before connect is rejected without side effects.
    let early_produce = registry
        .produce(&host, MediaKind::Audio, audio_rtp_parameters(1111))
        .await;
    assert!(matches!(early_produce, Err(Error::TransportNotReady(_))));
    assert_eq!(state(&registry), SignalingState::TransportsRequested);

    registry
        .connect_transport(&host, TransportDirection::Send, client_dtls_parameters())
        .await
        .unwrap();
    assert_eq!(state(&registry), SignalingState::TransportsConnected);

    registry
        .produce(&host, MediaKind::Audio, audio_rtp_parameters(1111))
        .await
        .unwrap();
    assert_eq!(state(&registry), SignalingState::Streaming);

    // Strictly forward: replaying an earlier transition never regresses
    // the machine.
    registry.acknowledge_capabilities(&host).unwrap();
    registry
        .ensure_transport(&host, TransportDirection::Send)
        .await
        .unwrap();
    assert_eq!(state(&registry), SignalingState::Streaming);
}

async fn connected_host(registry: &Arc<Registry>, room_id: &RoomId) -> PeerId {
    let host = registry
        .register_peer(room_id, "h".into(), "Host".into(), Role::Host, outbound().0)
        .unwrap();
    registry.acknowledge_capabilities(&host).unwrap();
    registry
        .ensure_transport(&host, TransportDirection::Send)
        .await
        .unwrap();
    registry
        .connect_transport(&host, TransportDirection::Send, client_dtls_parameters())
        .await
        .unwrap();
    host
}

async fn connected_viewer(
    registry: &Arc<Registry>,
    room_id: &RoomId,
    user: &str,
) -> (PeerId, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = outbound();
    let viewer = registry
        .register_peer(room_id, user.into(), user.into(), Role::Viewer, tx)
        .unwrap();
    registry.acknowledge_capabilities(&viewer).unwrap();
    registry
        .ensure_transport(&viewer, TransportDirection::Recv)
        .await
        .unwrap();
    registry
        .connect_transport(&viewer, TransportDirection::Recv, client_dtls_parameters())
        .await
        .unwrap();
    (viewer, rx)
}

#[tokio::test]
async fn test_fanout_notifies_each_pair_exactly_once() {
    let registry = setup(10, 10).await;
    let fanout = FanoutCoordinator::new();
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    let host = connected_host(&registry, &room_id).await;

    // Early viewer is connected before anything is produced.
    let (early_viewer, mut early_rx) = connected_viewer(&registry, &room_id, "early").await;
    fanout.on_viewer_ready(&registry, &early_viewer);
    assert!(drain_new_producers(&mut early_rx).is_empty());

    let audio = registry
        .produce(&host, MediaKind::Audio, audio_rtp_parameters(1111))
        .await
        .unwrap();
    fanout.on_new_producer(&registry, &room_id, audio, MediaKind::Audio);

    let notified = drain_new_producers(&mut early_rx);
    assert_eq!(notified, vec![audio]);

    // A late viewer pulls the existing producer on readiness.
    let (late_viewer, mut late_rx) = connected_viewer(&registry, &room_id, "late").await;
    fanout.on_viewer_ready(&registry, &late_viewer);
    assert_eq!(drain_new_producers(&mut late_rx), vec![audio]);

    // Retries and replays never duplicate a (viewer, producer) pair.
    fanout.on_viewer_ready(&registry, &early_viewer);
    fanout.on_viewer_ready(&registry, &late_viewer);
    fanout.on_new_producer(&registry, &room_id, audio, MediaKind::Audio);
    assert!(drain_new_producers(&mut early_rx).is_empty());
    assert!(drain_new_producers(&mut late_rx).is_empty());
}

#[tokio::test]
async fn test_consume_flow_and_duplicate_rejection() {
    let registry = setup(10, 10).await;
    let room_id = registry
        .create_room("p1".to_string(), "u1".to_string())
        .await
        .unwrap();

    let host = connected_host(&registry, &room_id).await;
    let audio = registry
        .produce(&host, MediaKind::Audio, audio_rtp_parameters(2222))
        .await
        .unwrap();

    let (viewer, _rx) = connected_viewer(&registry, &room_id, "v1").await;
    let caps = viewer_rtp_capabilities(&registry, &room_id);

    let consumed = registry
        .consume(&viewer, audio, caps.clone())
        .await
        .unwrap();
    assert_eq!(consumed.producer_id, audio);
    assert_eq!(consumed.kind, MediaKind::Audio);

    let duplicate = registry.consume(&viewer, audio, caps.clone()).await;
    assert!(matches!(duplicate, Err(Error::AlreadyConsuming(_))));

    registry
        .resume_consumer(&viewer, consumed.id)
        .await
        .expect("paused consumer resumes");

    // Consuming with empty capabilities is rejected by the router.
    let (viewer2, _rx2) = connected_viewer(&registry, &room_id, "v2").await;
    let unusable = registry
        .consume(&viewer2, audio, RtpCapabilities::default())
        .await;
    assert!(matches!(unusable, Err(Error::NotConsumable(_))));
}
