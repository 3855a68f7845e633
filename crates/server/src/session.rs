//! Session coordinator.
//!
//! One [`Session`] owns the authoritative position, the seat registry and
//! every connection's outbox. It is driven by a single task (see
//! [`SessionHandle::spawn`]) that handles one [`Command`] at a time, so
//! connect, disconnect and move events never interleave.

use std::collections::BTreeMap;

use chess_core::{MoveRequest, RulesEngine, ServerMessage, Side};
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::seats::{ConnectionId, Role, SeatRegistry};

/// Per-connection queue of outgoing messages, drained by the transport.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// What became of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Applied and broadcast.
    Accepted,
    /// Refused by the rules engine; requester notified.
    Rejected,
    /// Requester does not hold the seat to move. Nobody is told.
    Ignored,
}

pub struct Session<E> {
    engine: E,
    seats: SeatRegistry,
    outboxes: BTreeMap<ConnectionId, Outbox>,
}

impl<E: RulesEngine> Session<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            seats: SeatRegistry::new(),
            outboxes: BTreeMap::new(),
        }
    }

    pub fn fen(&self) -> String {
        self.engine.fen()
    }

    pub fn turn(&self) -> Side {
        self.engine.turn()
    }

    pub fn seats(&self) -> &SeatRegistry {
        &self.seats
    }

    /// Register the connection, give it a seat if one is free and tell it
    /// which. The current position is not sent.
    pub fn handle_connect(&mut self, conn: ConnectionId, outbox: Outbox) -> Role {
        self.outboxes.insert(conn, outbox);
        let role = self.seats.assign(conn);
        match role {
            Role::Player(side) => tracing::info!(connection = %conn, "Connected as {side}"),
            Role::Spectator => tracing::info!(connection = %conn, "Connected as spectator"),
        }
        self.send_to(conn, role.announcement());
        role
    }

    pub fn handle_disconnect(&mut self, conn: ConnectionId) {
        self.outboxes.remove(&conn);
        match self.seats.release(conn) {
            Some(side) => tracing::info!(connection = %conn, "Disconnected, {side} seat is free"),
            None => tracing::info!(connection = %conn, "Disconnected"),
        }
    }

    pub fn handle_move(&mut self, conn: ConnectionId, request: MoveRequest) -> MoveOutcome {
        let to_move = self.engine.turn();
        if self.seats.seat_of(conn) != Some(to_move) {
            tracing::debug!(connection = %conn, "Dropping {request}: {to_move} to move");
            return MoveOutcome::Ignored;
        }

        match self.engine.apply(&request) {
            Ok(()) => {
                let fen = self.engine.fen();
                tracing::info!(connection = %conn, "{to_move} played {request}");
                self.broadcast(ServerMessage::Move(request));
                self.broadcast(ServerMessage::BoardState { fen });
                MoveOutcome::Accepted
            }
            Err(e) => {
                if e.is_malformed() {
                    tracing::warn!(connection = %conn, "Malformed move request: {e}");
                } else {
                    tracing::info!(connection = %conn, "Rejected: {e}");
                }
                self.send_to(conn, ServerMessage::InvalidMove(request));
                MoveOutcome::Rejected
            }
        }
    }

    fn send_to(&self, conn: ConnectionId, msg: ServerMessage) {
        if let Some(outbox) = self.outboxes.get(&conn) {
            if outbox.send(msg).is_err() {
                tracing::warn!(connection = %conn, "Outbox closed, message dropped");
            }
        }
    }

    /// Fire-and-forget to every connection. A closed outbox only loses its
    /// own copy.
    fn broadcast(&self, msg: ServerMessage) {
        for (conn, outbox) in &self.outboxes {
            if outbox.send(msg.clone()).is_err() {
                tracing::warn!(connection = %conn, "Outbox closed, broadcast skipped");
            }
        }
    }
}

/// Events fed to the coordinator task.
#[derive(Debug)]
pub enum Command {
    Connect { conn: ConnectionId, outbox: Outbox },
    Disconnect { conn: ConnectionId },
    Move { conn: ConnectionId, request: MoveRequest },
}

/// Cloneable front door to the coordinator task.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Start the coordinator on the current tokio runtime.
    pub fn spawn<E: RulesEngine>(engine: E) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run(Session::new(engine), inbox));
        Self { commands }
    }

    pub fn connect(&self, conn: ConnectionId, outbox: Outbox) -> Result<(), RelayError> {
        self.send(Command::Connect { conn, outbox })
    }

    pub fn disconnect(&self, conn: ConnectionId) -> Result<(), RelayError> {
        self.send(Command::Disconnect { conn })
    }

    pub fn submit_move(&self, conn: ConnectionId, request: MoveRequest) -> Result<(), RelayError> {
        self.send(Command::Move { conn, request })
    }

    fn send(&self, command: Command) -> Result<(), RelayError> {
        self.commands
            .send(command)
            .map_err(|_| RelayError::SessionClosed)
    }
}

async fn run<E: RulesEngine>(mut session: Session<E>, mut inbox: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = inbox.recv().await {
        match command {
            Command::Connect { conn, outbox } => {
                session.handle_connect(conn, outbox);
            }
            Command::Disconnect { conn } => session.handle_disconnect(conn),
            Command::Move { conn, request } => {
                session.handle_move(conn, request);
            }
        }
    }
    tracing::info!("Session coordinator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::ShakmatyEngine;
    use tokio::sync::mpsc::UnboundedReceiver;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    struct Client {
        conn: ConnectionId,
        inbox: UnboundedReceiver<ServerMessage>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.inbox.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn join(session: &mut Session<ShakmatyEngine>, n: u64) -> Client {
        let conn = ConnectionId::new(n);
        let (outbox, inbox) = mpsc::unbounded_channel();
        session.handle_connect(conn, outbox);
        Client { conn, inbox }
    }

    /// White, Black and one spectator, with their role messages consumed.
    fn table() -> (Session<ShakmatyEngine>, Client, Client, Client) {
        let mut session = Session::new(ShakmatyEngine::default());
        let mut white = join(&mut session, 1);
        let mut black = join(&mut session, 2);
        let mut watcher = join(&mut session, 3);
        white.drain();
        black.drain();
        watcher.drain();
        (session, white, black, watcher)
    }

    #[test]
    fn test_roles_on_connect() {
        let mut session = Session::new(ShakmatyEngine::default());
        let mut a = join(&mut session, 1);
        let mut b = join(&mut session, 2);
        let mut c = join(&mut session, 3);

        assert_eq!(a.drain(), vec![ServerMessage::PlayerRole { role: Side::White }]);
        assert_eq!(b.drain(), vec![ServerMessage::PlayerRole { role: Side::Black }]);
        assert_eq!(c.drain(), vec![ServerMessage::SpectatorRole]);
    }

    #[test]
    fn test_opening_move_broadcast_to_all() {
        let (mut session, mut white, mut black, mut watcher) = table();
        let e4 = MoveRequest::new("e2", "e4");

        assert_eq!(session.handle_move(white.conn, e4.clone()), MoveOutcome::Accepted);
        assert_eq!(session.turn(), Side::Black);

        let expected = vec![
            ServerMessage::Move(e4),
            ServerMessage::BoardState {
                fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".into(),
            },
        ];
        assert_eq!(white.drain(), expected);
        assert_eq!(black.drain(), expected);
        assert_eq!(watcher.drain(), expected);
    }

    #[test]
    fn test_out_of_turn_move_is_silent() {
        let (mut session, mut white, mut black, mut watcher) = table();

        let outcome = session.handle_move(black.conn, MoveRequest::new("e7", "e5"));
        assert_eq!(outcome, MoveOutcome::Ignored);
        assert_eq!(session.fen(), START_FEN);
        assert!(white.drain().is_empty());
        assert!(black.drain().is_empty());
        assert!(watcher.drain().is_empty());
    }

    #[test]
    fn test_spectator_move_is_silent() {
        let (mut session, mut white, _black, mut watcher) = table();

        let outcome = session.handle_move(watcher.conn, MoveRequest::new("e2", "e4"));
        assert_eq!(outcome, MoveOutcome::Ignored);
        assert_eq!(session.fen(), START_FEN);
        assert!(white.drain().is_empty());
        assert!(watcher.drain().is_empty());
    }

    #[test]
    fn test_illegal_move_only_reaches_requester() {
        let (mut session, mut white, mut black, mut watcher) = table();
        session.handle_move(white.conn, MoveRequest::new("e2", "e4"));
        session.handle_move(black.conn, MoveRequest::new("e7", "e5"));
        white.drain();
        black.drain();
        watcher.drain();
        let before = session.fen();

        let backwards = MoveRequest::new("e4", "e3").with_promotion("q");
        let outcome = session.handle_move(white.conn, backwards.clone());

        assert_eq!(outcome, MoveOutcome::Rejected);
        assert_eq!(session.fen(), before);
        assert_eq!(white.drain(), vec![ServerMessage::InvalidMove(backwards)]);
        assert!(black.drain().is_empty());
        assert!(watcher.drain().is_empty());
    }

    #[test]
    fn test_malformed_request_degrades_to_invalid_move() {
        let (mut session, mut white, mut black, _watcher) = table();
        let garbage = MoveRequest::new("e9", "");

        assert_eq!(session.handle_move(white.conn, garbage.clone()), MoveOutcome::Rejected);
        assert_eq!(white.drain(), vec![ServerMessage::InvalidMove(garbage)]);
        assert!(black.drain().is_empty());
        assert_eq!(session.turn(), Side::White);
    }

    #[test]
    fn test_broadcast_fen_tracks_engine() {
        let (mut session, white, black, mut watcher) = table();
        let line = [("e2", "e4"), ("c7", "c5"), ("g1", "f3"), ("d7", "d6"), ("d2", "d4")];

        let mut reference = ShakmatyEngine::default();
        for (i, (from, to)) in line.iter().enumerate() {
            let request = MoveRequest::new(*from, *to);
            let mover = if i % 2 == 0 { white.conn } else { black.conn };
            assert_eq!(session.handle_move(mover, request.clone()), MoveOutcome::Accepted);
            reference.apply(&request).unwrap();
        }

        let fens: Vec<String> = watcher
            .drain()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::BoardState { fen } => Some(fen),
                _ => None,
            })
            .collect();
        assert_eq!(fens.len(), line.len());
        assert_eq!(fens.last(), Some(&reference.fen()));
        assert_eq!(session.fen(), reference.fen());
    }

    #[test]
    fn test_vacated_seat_is_taken_by_next_connection() {
        let (mut session, white, mut black, _watcher) = table();
        session.handle_move(white.conn, MoveRequest::new("d2", "d4"));
        black.drain();

        session.handle_disconnect(black.conn);
        assert_eq!(session.seats().occupant(Side::Black), None);

        let mut newcomer = join(&mut session, 4);
        assert_eq!(newcomer.drain(), vec![ServerMessage::PlayerRole { role: Side::Black }]);

        // the newcomer now plays Black mid-game
        assert_eq!(
            session.handle_move(newcomer.conn, MoveRequest::new("d7", "d5")),
            MoveOutcome::Accepted
        );
        // the old connection no longer counts
        assert_eq!(
            session.handle_move(black.conn, MoveRequest::new("g8", "f6")),
            MoveOutcome::Ignored
        );
    }

    #[test]
    fn test_closed_outbox_does_not_block_others() {
        let (mut session, mut white, black, mut watcher) = table();
        drop(black.inbox);

        assert_eq!(
            session.handle_move(white.conn, MoveRequest::new("e2", "e4")),
            MoveOutcome::Accepted
        );
        assert_eq!(white.drain().len(), 2);
        assert_eq!(watcher.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_drives_session_in_order() {
        let handle = SessionHandle::spawn(ShakmatyEngine::default());
        let (a_out, mut a_in) = mpsc::unbounded_channel();
        let (b_out, mut b_in) = mpsc::unbounded_channel();
        let a = ConnectionId::new(10);
        let b = ConnectionId::new(11);

        handle.connect(a, a_out).unwrap();
        handle.connect(b, b_out).unwrap();
        handle.submit_move(b, MoveRequest::new("e7", "e5")).unwrap();
        handle.submit_move(a, MoveRequest::new("e2", "e4")).unwrap();

        assert_eq!(a_in.recv().await, Some(ServerMessage::PlayerRole { role: Side::White }));
        assert_eq!(b_in.recv().await, Some(ServerMessage::PlayerRole { role: Side::Black }));
        assert_eq!(b_in.recv().await, Some(ServerMessage::Move(MoveRequest::new("e2", "e4"))));
        assert!(matches!(b_in.recv().await, Some(ServerMessage::BoardState { .. })));

        handle.disconnect(a).unwrap();
        // the coordinator dropped its sender; nothing else was queued for a
        assert_eq!(a_in.recv().await, Some(ServerMessage::Move(MoveRequest::new("e2", "e4"))));
        assert!(matches!(a_in.recv().await, Some(ServerMessage::BoardState { .. })));
        assert_eq!(a_in.recv().await, None);
    }
}
