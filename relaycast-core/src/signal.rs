//! Signaling protocol frames
//!
//! Wire format is JSON: `{"type": "<kind>", "data": {...}}`. Frames are
//! decoded once at the session boundary into these closed enums and
//! dispatched exhaustively; RTP/DTLS/ICE payloads are the media worker's
//! own serde types, so capability and parameter blobs round-trip without
//! hand-written field lists.

use mediasoup::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::IceServerConfig;
use crate::models::{PeerId, Role, TransportDirection};

/// WebSocket close code for an invalid path or missing room.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// WebSocket close code for a server-side fatal error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Client -> server frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the router's RTP capabilities; also acknowledges the
    /// welcome frame and unlocks transport allocation.
    GetRouterRtpCapabilities,
    /// Allocate (or re-fetch) the transport of the given direction.
    GetTransport { direction: TransportDirection },
    /// Provide client DTLS parameters for the given transport.
    ConnectTransport {
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    },
    /// Host only: publish one audio or video track.
    Produce {
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        #[serde(default)]
        app_data: Option<serde_json::Value>,
    },
    /// Viewer only: subscribe to a host producer.
    Consume {
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    },
    /// Viewer only: unpause a consumer once the client side is wired.
    ResumeConsumer { consumer_id: ConsumerId },
    /// Close the session.
    Leave,
}

/// Transport parameters the client needs to build its side of the
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportInfo {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// Server -> client frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after registration succeeds.
    Welcome {
        peer_id: PeerId,
        role: Role,
        router_rtp_capabilities: RtpCapabilitiesFinalized,
        ice_servers: Vec<IceServerConfig>,
    },
    RouterRtpCapabilities {
        router_rtp_capabilities: RtpCapabilitiesFinalized,
    },
    TransportCreated {
        direction: TransportDirection,
        id: TransportId,
        ice_parameters: IceParameters,
        ice_candidates: Vec<IceCandidate>,
        dtls_parameters: DtlsParameters,
    },
    TransportConnected { direction: TransportDirection },
    Produced { id: ProducerId },
    Consumed {
        id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },
    ConsumerResumed { id: ConsumerId },
    /// Fan-out notification: a host producer this viewer can consume.
    NewProducer {
        producer_id: ProducerId,
        kind: MediaKind,
    },
    ViewerJoined {
        peer_id: PeerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    ViewerLeft { peer_id: PeerId },
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Build an `error` frame from a core error.
    #[must_use]
    pub fn from_error(err: &crate::Error) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Events delivered to a session's outbound queue.
///
/// Fan-out, room broadcasts, and registry-driven eviction all talk to a
/// session exclusively through this queue; the writer task owns the
/// socket.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame(ServerMessage),
    Close { code: u16, reason: String },
}
