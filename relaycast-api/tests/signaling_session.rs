// End-to-end signaling tests: a real listener, a real media worker, and
// a WebSocket client driving the protocol the way a browser would.

use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU8};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mediasoup::prelude::*;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use relaycast_api::{ws, AppState};
use relaycast_core::config::Config;
use relaycast_core::fanout::FanoutCoordinator;
use relaycast_core::media::WorkerPool;
use relaycast_core::models::{PeerId, RoomId};
use relaycast_core::registry::{Registry, SignalingState};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    state: AppState,
    ws_addr: SocketAddr,
}

async fn spawn_server() -> TestServer {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();

    let (dead_tx, _dead_rx) = tokio::sync::mpsc::unbounded_channel();
    let pool = Arc::new(
        WorkerPool::with_size(&config, 1, dead_tx)
            .await
            .expect("worker pool"),
    );
    let config = Arc::new(config);
    let registry = Arc::new(Registry::new(&config, pool));
    let state = AppState::new(config, registry, Arc::new(FanoutCoordinator::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = listener.local_addr().unwrap();
    let router = ws::create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer { state, ws_addr }
}

impl TestServer {
    async fn create_room(&self) -> RoomId {
        self.state
            .registry
            .create_room("p1".to_string(), "u1".to_string())
            .await
            .unwrap()
    }
}

struct Client {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    async fn connect(addr: SocketAddr, room_id: &RoomId, role: &str) -> Self {
        let url = format!("ws://{addr}/room/{room_id}/{role}");
        let (stream, _) = connect_async(url).await.expect("websocket connect");
        Self { stream }
    }

    async fn send(&mut self, frame: serde_json::Value) {
        self.stream
            .send(WsMessage::Text(frame.to_string()))
            .await
            .unwrap();
    }

    /// Read frames until one with the wanted `type` arrives; panics on
    /// timeout or socket close.
    async fn recv_type(&mut self, wanted: &str) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
                .unwrap_or_else(|| panic!("socket closed waiting for {wanted}"))
                .unwrap();
            if let WsMessage::Text(text) = message {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                if frame["type"] == wanted {
                    return frame;
                }
            }
        }
    }

    /// Wait for the server to close the socket.
    async fn expect_close(&mut self) {
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for close")
            {
                None | Some(Err(_)) => return,
                Some(Ok(WsMessage::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    }
}

fn dtls_frame(direction: &str) -> serde_json::Value {
    let dtls = DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint::Sha256 { value: [0x22; 32] }],
    };
    serde_json::json!({
        "type": "connect_transport",
        "data": {
            "direction": direction,
            "dtls_parameters": serde_json::to_value(&dtls).unwrap(),
        }
    })
}

fn audio_produce_frame() -> serde_json::Value {
    let rtp_parameters = RtpParameters {
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
            ssrc: Some(1111),
            ..RtpEncodingParameters::default()
        }],
        rtcp: RtcpParameters::default(),
    };
    serde_json::json!({
        "type": "produce",
        "data": {
            "kind": "audio",
            "rtp_parameters": serde_json::to_value(&rtp_parameters).unwrap(),
        }
    })
}

fn video_produce_frame() -> serde_json::Value {
    let rtp_parameters = RtpParameters {
        mid: Some("1".to_string()),
        codecs: vec![RtpCodecParameters::Video {
            mime_type: MimeTypeVideo::Vp8,
            payload_type: 96,
            clock_rate: NonZeroU32::new(90000).unwrap(),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![RtcpFeedback::Nack, RtcpFeedback::NackPli],
        }],
        header_extensions: vec![],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(2222),
            ..RtpEncodingParameters::default()
        }],
        rtcp: RtcpParameters::default(),
    };
    serde_json::json!({
        "type": "produce",
        "data": {
            "kind": "video",
            "rtp_parameters": serde_json::to_value(&rtp_parameters).unwrap(),
        }
    })
}

fn peer_id_of(welcome: &serde_json::Value) -> PeerId {
    PeerId::from(welcome["data"]["peer_id"].as_str().unwrap())
}

/// Drive a host through welcome, transport setup and both produces.
async fn publishing_host(server: &TestServer, room_id: &RoomId) -> (Client, PeerId) {
    let mut host = Client::connect(server.ws_addr, room_id, "host").await;
    let welcome = host.recv_type("welcome").await;
    assert_eq!(welcome["data"]["role"], "host");
    assert!(welcome["data"]["router_rtp_capabilities"]["codecs"].is_array());
    assert!(welcome["data"]["ice_servers"].is_array());
    let peer_id = peer_id_of(&welcome);

    host.send(serde_json::json!({"type": "get_router_rtp_capabilities"}))
        .await;
    host.recv_type("router_rtp_capabilities").await;

    host.send(serde_json::json!({"type": "get_transport", "data": {"direction": "send"}}))
        .await;
    let created = host.recv_type("transport_created").await;
    assert_eq!(created["data"]["direction"], "send");
    assert!(created["data"]["ice_candidates"].is_array());
    assert!(created["data"]["dtls_parameters"].is_object());

    host.send(dtls_frame("send")).await;
    host.recv_type("transport_connected").await;

    host.send(audio_produce_frame()).await;
    host.recv_type("produced").await;
    host.send(video_produce_frame()).await;
    host.recv_type("produced").await;

    (host, peer_id)
}

/// Drive a viewer through welcome and receive-transport setup, then
/// collect `new_producer` notifications until both tracks are seen.
async fn receiving_viewer(
    server: &TestServer,
    room_id: &RoomId,
) -> (Client, PeerId, Vec<serde_json::Value>) {
    let mut viewer = Client::connect(server.ws_addr, room_id, "viewer").await;
    let welcome = viewer.recv_type("welcome").await;
    assert_eq!(welcome["data"]["role"], "viewer");
    let peer_id = peer_id_of(&welcome);
    let caps = welcome["data"]["router_rtp_capabilities"].clone();

    viewer
        .send(serde_json::json!({"type": "get_transport", "data": {"direction": "recv"}}))
        .await;
    viewer.recv_type("transport_created").await;
    viewer.send(dtls_frame("recv")).await;
    viewer.recv_type("transport_connected").await;

    let mut producers = Vec::new();
    for _ in 0..2 {
        let notice = viewer.recv_type("new_producer").await;
        producers.push(serde_json::json!({
            "producer_id": notice["data"]["producer_id"],
            "kind": notice["data"]["kind"],
            "rtp_capabilities": caps,
        }));
    }
    (viewer, peer_id, producers)
}

fn peer_state(server: &TestServer, peer_id: &PeerId) -> SignalingState {
    server.state.registry.peer_snapshot(peer_id).unwrap().state
}

#[tokio::test]
async fn test_happy_path_host_publishes_viewer_consumes() {
    let server = spawn_server().await;
    let room_id = server.create_room().await;

    let (_host, host_peer) = publishing_host(&server, &room_id).await;
    assert_eq!(peer_state(&server, &host_peer), SignalingState::Streaming);

    let (mut viewer, viewer_peer, producers) = receiving_viewer(&server, &room_id).await;
    assert_eq!(
        peer_state(&server, &viewer_peer),
        SignalingState::TransportsConnected
    );

    let kinds: Vec<&str> = producers
        .iter()
        .map(|p| p["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"audio"));
    assert!(kinds.contains(&"video"));

    let mut consumer_ids = Vec::new();
    for producer in &producers {
        viewer
            .send(serde_json::json!({
                "type": "consume",
                "data": {
                    "producer_id": producer["producer_id"],
                    "rtp_capabilities": producer["rtp_capabilities"],
                }
            }))
            .await;
        let consumed = viewer.recv_type("consumed").await;
        assert_eq!(consumed["data"]["producer_id"], producer["producer_id"]);
        consumer_ids.push(consumed["data"]["id"].clone());

        viewer
            .send(serde_json::json!({
                "type": "resume_consumer",
                "data": {"consumer_id": consumed["data"]["id"]}
            }))
            .await;
        viewer.recv_type("consumer_resumed").await;
    }
    assert_ne!(consumer_ids[0], consumer_ids[1]);
    assert_eq!(peer_state(&server, &viewer_peer), SignalingState::Streaming);

    // The same producer a second time is a duplicate.
    viewer
        .send(serde_json::json!({
            "type": "consume",
            "data": {
                "producer_id": producers[0]["producer_id"],
                "rtp_capabilities": producers[0]["rtp_capabilities"],
            }
        }))
        .await;
    let error = viewer.recv_type("error").await;
    assert_eq!(error["data"]["code"], "ALREADY_CONSUMING");
}

#[tokio::test]
async fn test_host_disconnect_cascades_to_viewers() {
    let server = spawn_server().await;
    let room_id = server.create_room().await;

    let (host, _host_peer) = publishing_host(&server, &room_id).await;
    let (mut viewer, _viewer_peer, _producers) = receiving_viewer(&server, &room_id).await;

    drop(host);

    viewer.expect_close().await;
    assert!(server.state.registry.room_stats(&room_id).is_err());
}

#[tokio::test]
async fn test_role_mismatch_keeps_session_alive() {
    let server = spawn_server().await;
    let room_id = server.create_room().await;

    let mut viewer = Client::connect(server.ws_addr, &room_id, "viewer").await;
    viewer.recv_type("welcome").await;

    viewer.send(audio_produce_frame()).await;
    let error = viewer.recv_type("error").await;
    assert_eq!(error["data"]["code"], "ROLE_MISMATCH");

    // The session survived the error frame.
    viewer
        .send(serde_json::json!({"type": "get_transport", "data": {"direction": "recv"}}))
        .await;
    let created = viewer.recv_type("transport_created").await;
    assert_eq!(created["data"]["direction"], "recv");
}

#[tokio::test]
async fn test_late_viewers_each_get_every_producer_once() {
    let server = spawn_server().await;
    let room_id = server.create_room().await;

    let (_host, _host_peer) = publishing_host(&server, &room_id).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let (first, _, first_producers) = receiving_viewer(&server, &room_id).await;
    let (second, _, second_producers) = receiving_viewer(&server, &room_id).await;

    // Two notifications per viewer, four in total, no duplicates within
    // a viewer.
    assert_eq!(first_producers.len(), 2);
    assert_eq!(second_producers.len(), 2);
    assert_ne!(
        first_producers[0]["producer_id"],
        first_producers[1]["producer_id"]
    );
    assert_ne!(
        second_producers[0]["producer_id"],
        second_producers[1]["producer_id"]
    );

    drop(first);
    drop(second);
}

#[tokio::test]
async fn test_missing_room_closes_with_policy_violation() {
    let server = spawn_server().await;

    let room_id = RoomId::from("missing000000");
    let mut client = Client::connect(server.ws_addr, &room_id, "viewer").await;
    client.expect_close().await;
}

#[tokio::test]
async fn test_unknown_message_gets_error_frame() {
    let server = spawn_server().await;
    let room_id = server.create_room().await;

    let mut host = Client::connect(server.ws_addr, &room_id, "host").await;
    host.recv_type("welcome").await;

    host.send(serde_json::json!({"type": "subscribe"})).await;
    let error = host.recv_type("error").await;
    assert_eq!(error["data"]["code"], "VALIDATION");
}
