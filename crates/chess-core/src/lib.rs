pub mod protocol;
pub mod rules;
pub mod types;
pub mod view;

pub use protocol::{ClientMessage, ServerMessage};
pub use rules::{RulesEngine, RulesError, ShakmatyEngine};
pub use types::{MoveRequest, Piece, PieceKind, Side};
