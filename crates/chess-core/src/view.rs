//! Client-side board model.
//!
//! Mirrors the authoritative position from server events only, turns drag
//! gestures into move requests, and pre-checks them on a throwaway copy of
//! the mirror before they are sent. The browser page in `public/` follows
//! the same rules.

use crate::protocol::ServerMessage;
use crate::rules::{RulesEngine, ShakmatyEngine};
use crate::types::{MoveRequest, Piece, Side};

/// A board cell in engine orientation: row 0 is rank 8, col 0 is file a.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: u8,
    pub col: u8,
}

impl Cell {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Algebraic name, e.g. `Cell::new(6, 4)` is `e2`.
    pub fn square_name(self) -> String {
        format!("{}{}", (b'a' + self.col) as char, 8 - self.row)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSquare {
    pub cell: Cell,
    pub name: String,
    pub light: bool,
    pub piece: Option<Piece>,
    pub draggable: bool,
}

impl RenderedSquare {
    pub fn glyph(&self) -> Option<char> {
        self.piece.map(Piece::glyph)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardView<E = ShakmatyEngine> {
    mirror: E,
    role: Option<Side>,
}

impl<E: RulesEngine> BoardView<E> {
    pub fn new() -> Self {
        Self {
            mirror: E::default(),
            role: None,
        }
    }

    /// Assigned seat, `None` for spectators and before assignment.
    pub fn role(&self) -> Option<Side> {
        self.role
    }

    pub fn fen(&self) -> String {
        self.mirror.fen()
    }

    /// Second-mover sees the board upside down so their pieces sit at the bottom.
    pub fn is_flipped(&self) -> bool {
        self.role == Some(Side::Black)
    }

    /// Fold a server event into the local mirror.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::PlayerRole { role } => self.role = Some(*role),
            ServerMessage::SpectatorRole => self.role = None,
            ServerMessage::BoardState { fen } => match E::from_fen(fen) {
                Ok(engine) => self.mirror = engine,
                Err(e) => tracing::error!("Discarding board state from server: {e}"),
            },
            ServerMessage::Move(request) => {
                if let Err(e) = self.mirror.apply(request) {
                    tracing::error!("Server move {request} rejected by local mirror: {e}");
                }
            }
            ServerMessage::InvalidMove(request) => {
                tracing::debug!("Server rejected {request}");
            }
            ServerMessage::Error { message } => {
                tracing::warn!("Server error: {message}");
            }
        }
    }

    /// All 64 squares in display order (top-left first).
    pub fn squares(&self) -> Vec<RenderedSquare> {
        let board = self.mirror.board();
        let mut squares = Vec::with_capacity(64);
        for (row, cells) in board.iter().enumerate() {
            for (col, piece) in cells.iter().enumerate() {
                let cell = Cell::new(row as u8, col as u8);
                squares.push(RenderedSquare {
                    cell,
                    name: cell.square_name(),
                    light: (row + col) % 2 == 0,
                    piece: *piece,
                    draggable: self.can_drag(*piece),
                });
            }
        }
        if self.is_flipped() {
            squares.reverse();
        }
        squares
    }

    /// Drag gesture to move request. Promotion is always to a queen.
    pub fn gesture(from: Cell, to: Cell) -> MoveRequest {
        MoveRequest::new(from.square_name(), to.square_name()).with_promotion("q")
    }

    /// Move request worth sending for this gesture, if any.
    ///
    /// The candidate is tried on a scratch copy of the mirror which is
    /// dropped right after; the server stays the only authority.
    pub fn propose(&self, from: Cell, to: Cell) -> Option<MoveRequest> {
        let piece = self
            .mirror
            .board()
            .get(from.row as usize)
            .and_then(|r| r.get(from.col as usize))
            .copied()
            .flatten();
        if !self.can_drag(piece) {
            return None;
        }

        let request = Self::gesture(from, to);
        let mut scratch = self.mirror.clone();
        match scratch.apply(&request) {
            Ok(()) => Some(request),
            Err(e) => {
                tracing::debug!("Not sending {request}: {e}");
                None
            }
        }
    }

    fn can_drag(&self, piece: Option<Piece>) -> bool {
        match (piece, self.role) {
            (Some(p), Some(role)) => p.side == role,
            _ => false,
        }
    }
}
