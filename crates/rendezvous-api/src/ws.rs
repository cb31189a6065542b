//! WebSocket transport for peer sessions.
//!
//! Each socket is split: a writer task drains the connection's outbound
//! queue, and the read loop feeds frames to the [`Connection`]. When the
//! socket ends, for any reason, the connection is closed before the handler
//! returns so its identity is demoted immediately.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;

use rendezvous_core::protocol::MAX_FRAME_BYTES;
use rendezvous_core::{RendezvousError, ServerMessage};
use rendezvous_services::Connection;

use crate::handlers::ApiState;

/// Transport cap, well above the protocol limit. Oversized frames still reach
/// the decoder and are answered with `malformed_message`.
const MAX_TRANSPORT_FRAME_BYTES: usize = 64 << 20;

const _: () = assert!(MAX_TRANSPORT_FRAME_BYTES > MAX_FRAME_BYTES);

pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    ws.max_message_size(MAX_TRANSPORT_FRAME_BYTES)
        .max_frame_size(MAX_TRANSPORT_FRAME_BYTES)
        .on_upgrade(move |socket| run_session(socket, state, remote))
}

async fn run_session(socket: WebSocket, state: ApiState, remote: SocketAddr) {
    let (mut connection, outbound) = state.manager.open(Some(remote));
    tracing::info!(connection = %connection.id(), %remote, "peer session opened");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_frame(text.as_str()).await,
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => connection.handle_frame(text).await,
                Err(e) => connection.reject(RendezvousError::malformed(e)),
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the protocol layer.
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(connection = %connection.id(), error = %e, "websocket read failed");
                break;
            }
        }
    }

    close(connection).await;
    writer.abort();
}

async fn close(connection: Connection) {
    let id = connection.id();
    let device_id = connection.device_id().map(str::to_string);
    connection.close().await;
    tracing::info!(connection = %id, device_id = ?device_id, "peer session closed");
}

async fn write_loop(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            tracing::debug!(error = %e, "websocket write failed");
            break;
        }
    }
    // Dropping `outbound` here closes the link; later pushes report LinkClosed.
}
