//! Rules engine seam.
//!
//! The relay never interprets chess itself. Everything it needs from the
//! rules (whose turn it is, whether a move is legal, the resulting FEN) goes
//! through [`RulesEngine`]; [`ShakmatyEngine`] is the production
//! implementation on top of shakmaty.

use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode, File, Move, Position, Rank, Role, Square};
use thiserror::Error;

use crate::types::{MoveRequest, Piece, Side};

/// Errors surfaced by the rules engine when applying a move request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("invalid square: {0:?}")]
    InvalidSquare(String),

    #[error("invalid promotion piece: {0:?}")]
    InvalidPromotion(String),

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("invalid FEN: {0}")]
    InvalidFen(String),
}

impl RulesError {
    /// True when the request could not even be interpreted, as opposed to a
    /// well-formed move that the position does not allow.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, RulesError::IllegalMove(_))
    }
}

/// 8x8 grid indexed `[row][col]`, row 0 being rank 8 and col 0 file a.
pub type Grid = [[Option<Piece>; 8]; 8];

/// Narrow interface onto a chess rules implementation.
///
/// `Default` is the standard initial arrangement. `Clone` gives a scratch
/// copy that can be mutated and thrown away.
pub trait RulesEngine: Clone + Default + Send + 'static {
    fn from_fen(fen: &str) -> Result<Self, RulesError>;

    /// Side to move.
    fn turn(&self) -> Side;

    /// Snapshot of the position in FEN.
    fn fen(&self) -> String;

    fn board(&self) -> Grid;

    /// Apply a move request. On error the position is untouched.
    fn apply(&mut self, request: &MoveRequest) -> Result<(), RulesError>;
}

#[derive(Debug, Clone, Default)]
pub struct ShakmatyEngine {
    position: Chess,
}

impl ShakmatyEngine {
    fn find_legal(&self, request: &MoveRequest) -> Result<Move, RulesError> {
        let from = parse_square(&request.from)?;
        let to = parse_square(&request.to)?;
        let promotion = request
            .promotion
            .as_deref()
            .map(parse_promotion)
            .transpose()?;

        // A promotion letter on a non-promotion move is ignored; a promotion
        // move without one matches nothing.
        self.position
            .legal_moves()
            .into_iter()
            .find(|m| {
                m.from() == Some(from)
                    && destination(m) == to
                    && (m.promotion().is_none() || m.promotion() == promotion)
            })
            .ok_or_else(|| RulesError::IllegalMove(request.to_string()))
    }
}

impl RulesEngine for ShakmatyEngine {
    fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let fen: Fen = fen
            .parse()
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        Ok(Self { position })
    }

    fn turn(&self) -> Side {
        self.position.turn().into()
    }

    fn fen(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    fn board(&self) -> Grid {
        let mut grid: Grid = [[None; 8]; 8];
        for (row, cells) in grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                let sq = Square::from_coords(File::new(col as u32), Rank::new(7 - row as u32));
                *cell = self.position.board().piece_at(sq).map(Piece::from);
            }
        }
        grid
    }

    fn apply(&mut self, request: &MoveRequest) -> Result<(), RulesError> {
        let mv = self.find_legal(request)?;
        self.position.play_unchecked(mv);
        Ok(())
    }
}

/// Square the moving piece lands on. shakmaty encodes castling as king
/// takes rook; clients ask for the king's two-square hop.
fn destination(m: &Move) -> Square {
    match *m {
        Move::Castle { king, rook } => {
            let to_file = if rook.file() > king.file() { 6u32 } else { 2u32 };
            Square::from_coords(File::new(to_file), king.rank())
        }
        _ => m.to(),
    }
}

fn parse_square(s: &str) -> Result<Square, RulesError> {
    s.parse::<Square>()
        .map_err(|_| RulesError::InvalidSquare(s.to_string()))
}

fn parse_promotion(s: &str) -> Result<Role, RulesError> {
    let mut chars = s.chars();
    let role = match (chars.next(), chars.next()) {
        (Some(c), None) => Role::from_char(c.to_ascii_lowercase()),
        _ => None,
    };
    match role {
        Some(r @ (Role::Queen | Role::Rook | Role::Bishop | Role::Knight)) => Ok(r),
        _ => Err(RulesError::InvalidPromotion(s.to_string())),
    }
}
