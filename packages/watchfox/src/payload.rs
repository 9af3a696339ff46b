//! Typed payloads for the minifox match events.
//!
//! Payloads are only produced by [`SchemaRegistry`](crate::SchemaRegistry)
//! decoding. Decoding is all-or-nothing: a handler never sees a partially
//! populated payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// Side length of the board minifox streams.
pub const BOARD_SIZE: i64 = 19;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub avatar: String,
    pub country: String,
    pub nick: String,
    pub rank: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub board_size: u32,
    pub chinese_rules: bool,
    pub handicap: u32,
    pub komi: f64,
}

/// Time control, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeControl {
    pub byoyomi_periods: u32,
    pub byoyomi_time: u32,
    pub main_time: u32,
}

/// One player's clock, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub byoyomi: u32,
    pub byoyomi_time: u32,
    pub connected: bool,
    pub disconnected_time: u32,
    pub main_time: u32,
}

/// Whose turn a move was played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Turn {
    B,
    W,
}

/// A board move.
///
/// On the wire a move is a `[row, col]` pair; `[-1, -1]` is a pass. Any other
/// pair must lie inside the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(i64, i64)", into = "(i64, i64)")]
pub enum Move {
    Pass,
    Play { row: u8, col: u8 },
}

impl Move {
    pub const PASS_COORDINATES: (i64, i64) = (-1, -1);

    pub fn is_pass(&self) -> bool {
        matches!(self, Move::Pass)
    }

    /// `(row, col)` as sent by minifox, with a pass as `(-1, -1)`.
    pub fn coordinates(&self) -> (i64, i64) {
        (*self).into()
    }
}

impl TryFrom<(i64, i64)> for Move {
    type Error = String;

    fn try_from((row, col): (i64, i64)) -> Result<Self, Self::Error> {
        if (row, col) == Self::PASS_COORDINATES {
            return Ok(Move::Pass);
        }
        let on_board = |v: i64| (0..BOARD_SIZE).contains(&v);
        if !on_board(row) || !on_board(col) {
            return Err(format!(
                "move ({}, {}) is outside the {}x{} board",
                row, col, BOARD_SIZE, BOARD_SIZE
            ));
        }
        Ok(Move::Play {
            row: row as u8,
            col: col as u8,
        })
    }
}

impl From<Move> for (i64, i64) {
    fn from(mv: Move) -> Self {
        match mv {
            Move::Pass => Move::PASS_COORDINATES,
            Move::Play { row, col } => (row as i64, col as i64),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Pass => f.write_str("pass"),
            Move::Play { row, col } => write!(f, "({}, {})", row, col),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStart {
    pub id: String,
    pub black: Player,
    pub white: Player,
    pub settings: Settings,
    pub time_control: TimeControl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTime {
    pub id: String,
    pub black_time: Clock,
    pub white_time: Clock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMove {
    pub id: String,
    #[serde(rename = "move")]
    pub mv: Move,
    pub move_number: u32,
    pub turn: Turn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchChat {
    pub id: String,
    pub country: String,
    pub nick: String,
    pub rank: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEnd {
    pub id: String,
    /// Result as minifox formats it, e.g. `B+ Resign`. See [`crate::go::parse_result`].
    pub result: String,
}

/// A decoded feed event.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    MatchStart(MatchStart),
    MatchTime(MatchTime),
    MatchMove(MatchMove),
    MatchChat(MatchChat),
    MatchEnd(MatchEnd),
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::MatchStart(_) => EventKind::MatchStart,
            Payload::MatchTime(_) => EventKind::MatchTime,
            Payload::MatchMove(_) => EventKind::MatchMove,
            Payload::MatchChat(_) => EventKind::MatchChat,
            Payload::MatchEnd(_) => EventKind::MatchEnd,
        }
    }

    /// The match id every feed event carries.
    pub fn match_id(&self) -> &str {
        match self {
            Payload::MatchStart(p) => &p.id,
            Payload::MatchTime(p) => &p.id,
            Payload::MatchMove(p) => &p.id,
            Payload::MatchChat(p) => &p.id,
            Payload::MatchEnd(p) => &p.id,
        }
    }
}

/// A payload type bound to exactly one event kind.
///
/// Implemented for each of the five feed payloads; handlers are registered
/// against these types.
pub trait EventPayload:
    serde::de::DeserializeOwned + Clone + Send + Sync + fmt::Debug + 'static
{
    const KIND: EventKind;

    fn into_payload(self) -> Payload;

    fn from_payload(payload: &Payload) -> Option<&Self>;
}

macro_rules! event_payload {
    ($($ty:ident),* $(,)?) => {
        $(
            impl EventPayload for $ty {
                const KIND: EventKind = EventKind::$ty;

                fn into_payload(self) -> Payload {
                    Payload::$ty(self)
                }

                fn from_payload(payload: &Payload) -> Option<&Self> {
                    match payload {
                        Payload::$ty(p) => Some(p),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Payload {
                fn from(p: $ty) -> Self {
                    Payload::$ty(p)
                }
            }
        )*
    };
}

event_payload!(MatchStart, MatchTime, MatchMove, MatchChat, MatchEnd);
