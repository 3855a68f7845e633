//! Seat registry: who plays White, who plays Black.
//!
//! Occupancy follows live connections only. A disconnect frees the seat
//! for whoever connects next; there is no reservation for the old player.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chess_core::{ServerMessage, Side};

/// Transport-level identity of one WebSocket. Not stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Id allocator owned by one router. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct ConnectionIds(Arc<AtomicU64>);

impl ConnectionIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids start at 1 and never repeat for this allocator.
    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player(Side),
    Spectator,
}

impl Role {
    /// Message telling a fresh connection what it got.
    pub fn announcement(self) -> ServerMessage {
        match self {
            Role::Player(role) => ServerMessage::PlayerRole { role },
            Role::Spectator => ServerMessage::SpectatorRole,
        }
    }
}

#[derive(Debug, Default)]
pub struct SeatRegistry {
    white: Option<ConnectionId>,
    black: Option<ConnectionId>,
}

impl SeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// White if vacant, else Black if vacant, else spectator.
    pub fn assign(&mut self, conn: ConnectionId) -> Role {
        if let Some(side) = self.seat_of(conn) {
            return Role::Player(side);
        }
        if self.white.is_none() {
            self.white = Some(conn);
            Role::Player(Side::White)
        } else if self.black.is_none() {
            self.black = Some(conn);
            Role::Player(Side::Black)
        } else {
            Role::Spectator
        }
    }

    /// Vacate whatever seat `conn` holds. Returns the freed side, if any.
    pub fn release(&mut self, conn: ConnectionId) -> Option<Side> {
        let side = self.seat_of(conn)?;
        *self.slot_mut(side) = None;
        Some(side)
    }

    pub fn seat_of(&self, conn: ConnectionId) -> Option<Side> {
        if self.white == Some(conn) {
            Some(Side::White)
        } else if self.black == Some(conn) {
            Some(Side::Black)
        } else {
            None
        }
    }

    pub fn occupant(&self, side: Side) -> Option<ConnectionId> {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<ConnectionId> {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }
}
