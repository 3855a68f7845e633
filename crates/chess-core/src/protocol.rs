//! JSON messages exchanged over the relay WebSocket.

use serde::{Deserialize, Serialize};

use crate::types::{MoveRequest, Side};

/// Server → Client messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Seat assigned to this connection.
    PlayerRole { role: Side },
    /// No seat left; this connection only watches.
    SpectatorRole,
    /// An accepted move, sent to everyone.
    Move(MoveRequest),
    /// Position after the last accepted move.
    BoardState { fen: String },
    /// Rejected move, echoed back to the requester only.
    InvalidMove(MoveRequest),
    Error { message: String },
}

/// Client → Server messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Move(MoveRequest),
}
