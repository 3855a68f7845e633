//! WebSocket relay route.
//!
//! Each socket gets a fresh [`ConnectionId`] and an outbox. Inbound frames
//! are decoded and handed to the session coordinator; a writer task drains
//! the outbox into the socket until either side goes away.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use chess_core::{ClientMessage, ServerMessage};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::seats::{ConnectionId, ConnectionIds};
use crate::session::{Outbox, SessionHandle};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(session): Extension<SessionHandle>,
    Extension(ids): Extension<ConnectionIds>,
) -> impl IntoResponse {
    let conn = ids.next();
    ws.on_upgrade(move |socket| handle_socket(socket, session, conn))
}

async fn handle_socket(socket: WebSocket, session: SessionHandle, conn: ConnectionId) {
    let (sender, mut receiver) = socket.split();
    let (outbox, pending) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(forward_outbox(sender, pending, conn));

    if let Err(e) = session.connect(conn, outbox.clone()) {
        tracing::error!(connection = %conn, "Cannot join session: {e}");
        writer.abort();
        return;
    }

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(connection = %conn, "Socket error: {e}");
                break;
            }
        };

        match decode(text.as_str()) {
            Ok(ClientMessage::Move(request)) => {
                if let Err(e) = session.submit_move(conn, request) {
                    tracing::error!(connection = %conn, "Dropping connection: {e}");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(connection = %conn, "{e}");
                reply_error(&outbox, conn, &e);
            }
        }
    }

    if let Err(e) = session.disconnect(conn) {
        tracing::warn!(connection = %conn, "Disconnect not delivered: {e}");
    }
    // The writer exits once the coordinator has dropped its copy of the outbox.
    drop(outbox);
    let _ = writer.await;
}

fn decode(text: &str) -> Result<ClientMessage, RelayError> {
    Ok(serde_json::from_str(text)?)
}

/// Answer a bad frame to its sender only. False if the writer is gone.
fn reply_error(outbox: &Outbox, conn: ConnectionId, err: &RelayError) -> bool {
    let reply = ServerMessage::Error {
        message: err.to_string(),
    };
    if outbox.send(reply).is_err() {
        tracing::debug!(connection = %conn, "Outbox closed, error reply dropped");
        return false;
    }
    true
}

async fn forward_outbox(
    mut sender: SplitSink<WebSocket, Message>,
    mut pending: mpsc::UnboundedReceiver<ServerMessage>,
    conn: ConnectionId,
) {
    while let Some(msg) = pending.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(connection = %conn, "Failed to encode {msg:?}: {e}");
                continue;
            }
        };
        if let Err(e) = sender.send(Message::Text(json.into())).await {
            tracing::debug!(connection = %conn, "Send failed, closing writer: {e}");
            break;
        }
    }
}
