//! Per-connection signaling session
//!
//! One sequential read loop per peer serializes every mutation of that
//! peer; one writer task owns the socket sink and drains the outbound
//! queue, which is also where fan-out and registry eviction deliver
//! their frames. Protocol errors produce a single `error` frame and the
//! session keeps running; media-worker failures close the session with
//! 1011 and unregister the peer (cascading if it was the host).

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relaycast_core::models::{generate_id, PeerId, Role, RoomId, TransportDirection};
use relaycast_core::signal::{
    ClientMessage, ServerMessage, SessionEvent, CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION,
};
use relaycast_core::Error;

use super::WsQuery;
use crate::http::AppState;

/// Close a socket that never became a session.
pub(crate) async fn close_early(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

pub(crate) async fn run(
    state: AppState,
    socket: WebSocket,
    room_id: RoomId,
    role: Role,
    query: WsQuery,
) {
    use std::sync::atomic::Ordering;

    state.connections.fetch_add(1, Ordering::Relaxed);
    drive(&state, socket, room_id, role, query).await;
    state.connections.fetch_sub(1, Ordering::Relaxed);
}

async fn drive(state: &AppState, socket: WebSocket, room_id: RoomId, role: Role, query: WsQuery) {
    let user_id = query.user_id.filter(|v| !v.is_empty()).unwrap_or_else(generate_id);
    let username = query
        .username
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "Anonymous".to_string());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();

    let peer_id = match state.registry.register_peer(
        &room_id,
        user_id,
        username.clone(),
        role,
        event_tx.clone(),
    ) {
        Ok(peer_id) => peer_id,
        Err(err) => {
            let code = match err {
                Error::NoRoom(_) => CLOSE_POLICY_VIOLATION,
                _ => CLOSE_INTERNAL_ERROR,
            };
            debug!(room_id = %room_id, role = %role, error = %err, "Rejected signaling connection");
            close_early(socket, code, &err.to_string()).await;
            return;
        }
    };

    let router_rtp_capabilities = match state.registry.router_rtp_capabilities(&room_id) {
        Ok(caps) => caps,
        Err(err) => {
            state.registry.unregister_peer(&peer_id);
            close_early(socket, CLOSE_INTERNAL_ERROR, &err.to_string()).await;
            return;
        }
    };

    let _ = event_tx.send(SessionEvent::Frame(ServerMessage::Welcome {
        peer_id: peer_id.clone(),
        role,
        router_rtp_capabilities,
        ice_servers: state.config.webrtc.ice_servers.clone(),
    }));

    if role == Role::Viewer {
        state.registry.broadcast_to_room(
            &room_id,
            Some(&peer_id),
            &ServerMessage::ViewerJoined {
                peer_id: peer_id.clone(),
                username: Some(username),
            },
        );
    }

    info!(room_id = %room_id, peer_id = %peer_id, role = %role, "Signaling session started");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: sole owner of the sink. Ends on a Close event or a
    // dead socket; the channel itself closes once the registry entry and
    // the read loop have dropped their senders.
    let mut writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::Frame(frame) => {
                    let Ok(text) = serde_json::to_string(&frame) else {
                        continue;
                    };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                SessionEvent::Close { code, reason } => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });
    let mut writer_done = false;

    let idle_timeout = Duration::from_secs(state.config.rooms.idle_timeout_seconds);

    loop {
        // The writer finishing means the session was closed from the
        // outside (registry eviction, room stop) or the socket died; do
        // not keep reading from a peer that is already gone.
        let incoming = tokio::select! {
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                break;
            }
            incoming = tokio::time::timeout(idle_timeout, ws_rx.next()) => incoming,
        };

        let message = match incoming {
            Err(_) => {
                debug!(peer_id = %peer_id, "Session idle timeout");
                let _ = event_tx.send(SessionEvent::Close {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: "idle timeout".to_string(),
                });
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Leave) => {
                    let _ = event_tx.send(SessionEvent::Close {
                        code: 1000,
                        reason: "leave".to_string(),
                    });
                    break;
                }
                Ok(message) => {
                    if let Err(err) =
                        handle_message(state, &peer_id, &room_id, &event_tx, message).await
                    {
                        if err.is_session_fatal() {
                            warn!(peer_id = %peer_id, error = %err, "Session closed on media-worker error");
                            let _ = event_tx.send(SessionEvent::Close {
                                code: CLOSE_INTERNAL_ERROR,
                                reason: err.to_string(),
                            });
                            break;
                        }
                        let _ = event_tx.send(SessionEvent::Frame(ServerMessage::from_error(&err)));
                    }
                }
                Err(parse_err) => {
                    let err = Error::Validation(format!("unrecognized message: {parse_err}"));
                    let _ = event_tx.send(SessionEvent::Frame(ServerMessage::from_error(&err)));
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the socket layer; binary frames are
            // not part of the protocol.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    if let Some(departure) = state.registry.unregister_peer(&peer_id) {
        state.fanout.forget_peer(&peer_id);
        for producer_id in &departure.producer_ids {
            state.fanout.forget_producer(producer_id);
        }
        if departure.role == Role::Viewer && !departure.room_stopped {
            state.registry.broadcast_to_room(
                &departure.room_id,
                None,
                &ServerMessage::ViewerLeft {
                    peer_id: peer_id.clone(),
                },
            );
        }
    }

    // Dropping the last sender lets the writer drain queued frames (the
    // close frame included) and exit.
    drop(event_tx);
    if !writer_done {
        let _ = writer.await;
    }

    info!(room_id = %room_id, peer_id = %peer_id, "Signaling session ended");
}

async fn handle_message(
    state: &AppState,
    peer_id: &PeerId,
    room_id: &RoomId,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
    message: ClientMessage,
) -> Result<(), Error> {
    match message {
        ClientMessage::GetRouterRtpCapabilities => {
            let router_rtp_capabilities = state.registry.router_rtp_capabilities(room_id)?;
            state.registry.acknowledge_capabilities(peer_id)?;
            let _ = event_tx.send(SessionEvent::Frame(ServerMessage::RouterRtpCapabilities {
                router_rtp_capabilities,
            }));
        }
        ClientMessage::GetTransport { direction } => {
            let info = state.registry.ensure_transport(peer_id, direction).await?;
            let _ = event_tx.send(SessionEvent::Frame(ServerMessage::TransportCreated {
                direction,
                id: info.id,
                ice_parameters: info.ice_parameters,
                ice_candidates: info.ice_candidates,
                dtls_parameters: info.dtls_parameters,
            }));
        }
        ClientMessage::ConnectTransport {
            direction,
            dtls_parameters,
        } => {
            state
                .registry
                .connect_transport(peer_id, direction, dtls_parameters)
                .await?;
            let _ = event_tx.send(SessionEvent::Frame(ServerMessage::TransportConnected {
                direction,
            }));
            if direction == TransportDirection::Recv {
                // The viewer can receive now; replay existing producers
                // and drain anything queued while it was connecting.
                state.fanout.on_viewer_ready(&state.registry, peer_id);
            }
        }
        ClientMessage::Produce {
            kind,
            rtp_parameters,
            app_data: _,
        } => {
            let producer_id = state.registry.produce(peer_id, kind, rtp_parameters).await?;
            let _ = event_tx.send(SessionEvent::Frame(ServerMessage::Produced {
                id: producer_id,
            }));
            state
                .fanout
                .on_new_producer(&state.registry, room_id, producer_id, kind);
        }
        ClientMessage::Consume {
            producer_id,
            rtp_capabilities,
        } => {
            let consumed = state
                .registry
                .consume(peer_id, producer_id, rtp_capabilities)
                .await?;
            let _ = event_tx.send(SessionEvent::Frame(ServerMessage::Consumed {
                id: consumed.id,
                producer_id: consumed.producer_id,
                kind: consumed.kind,
                rtp_parameters: consumed.rtp_parameters,
            }));
        }
        ClientMessage::ResumeConsumer { consumer_id } => {
            state.registry.resume_consumer(peer_id, consumer_id).await?;
            let _ = event_tx.send(SessionEvent::Frame(ServerMessage::ConsumerResumed {
                id: consumer_id,
            }));
        }
        // Handled by the read loop before dispatch.
        ClientMessage::Leave => {}
    }
    Ok(())
}
