//! Go helpers for handlers: colors, coordinate labels, results.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ResultParseError;
use crate::payload::{MatchStart, Move, Turn, BOARD_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::White => "white",
        }
    }

    pub fn opponent(&self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

impl From<Turn> for Color {
    fn from(turn: Turn) -> Self {
        match turn {
            Turn::B => Color::Black,
            Turn::W => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a server labels board coordinates.
///
/// Fox uses the letters `A`-`S` for columns and numbers rows 1-19 from the
/// top. OGS and KGS skip `I` and number rows 19-1 from the top.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSystem {
    #[default]
    Fox,
    Ogs,
    Kgs,
}

const FOX_COLUMNS: &str = "ABCDEFGHIJKLMNOPQRS";
const GO_COLUMNS: &str = "ABCDEFGHJKLMNOPQRST";

impl CoordinateSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinateSystem::Fox => "fox",
            CoordinateSystem::Ogs => "ogs",
            CoordinateSystem::Kgs => "kgs",
        }
    }

    /// Column letter for a 0-based column index.
    pub fn column_label(&self, col: u8) -> Option<char> {
        let letters = match self {
            CoordinateSystem::Fox => FOX_COLUMNS,
            CoordinateSystem::Ogs | CoordinateSystem::Kgs => GO_COLUMNS,
        };
        letters.chars().nth(col as usize)
    }

    /// Row number for a 0-based row index.
    pub fn row_label(&self, row: u8) -> Option<u8> {
        if i64::from(row) >= BOARD_SIZE {
            return None;
        }
        Some(match self {
            CoordinateSystem::Fox => row + 1,
            CoordinateSystem::Ogs | CoordinateSystem::Kgs => BOARD_SIZE as u8 - row,
        })
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoordinateSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fox" => Ok(CoordinateSystem::Fox),
            "ogs" => Ok(CoordinateSystem::Ogs),
            "kgs" => Ok(CoordinateSystem::Kgs),
            other => Err(format!("unknown coordinate system `{}`", other)),
        }
    }
}

/// Spoken form of a move, e.g. `black plays C 4` or `white passes`.
///
/// The letter `A` is written `hay` so text-to-speech reads it as a letter.
pub fn announce_move(color: Color, mv: Move, system: CoordinateSystem) -> String {
    let Move::Play { row, col } = mv else {
        return format!("{} passes", color);
    };
    let (Some(letter), Some(number)) = (system.column_label(col), system.row_label(row)) else {
        return format!("{} plays {}", color, mv);
    };

    let letter = match letter {
        'A' => "hay".to_string(),
        other => other.to_string(),
    };
    format!("{} plays {} {}", color, letter, number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Black,
    White,
    Draw,
}

impl From<Color> for Winner {
    fn from(color: Color) -> Self {
        match color {
            Color::Black => Winner::Black,
            Color::White => Winner::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultReason {
    Resign,
    Time,
    Points,
}

/// A parsed match result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameResult {
    pub winner: Winner,
    pub reason: Option<ResultReason>,
    pub points: Option<f64>,
}

impl GameResult {
    pub fn draw() -> Self {
        Self {
            winner: Winner::Draw,
            reason: None,
            points: None,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let winner = match self.winner {
            Winner::Draw => return f.write_str("draw"),
            Winner::Black => "black",
            Winner::White => "white",
        };
        match (self.reason, self.points) {
            (Some(ResultReason::Points), Some(points)) => {
                write!(f, "{} wins by {} points", winner, points)
            }
            (Some(ResultReason::Resign), _) => write!(f, "{} wins by resignation", winner),
            (Some(ResultReason::Time), _) => write!(f, "{} wins on time", winner),
            _ => write!(f, "{} wins", winner),
        }
    }
}

static RE_DRAW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Draw$").unwrap());
static RE_WIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(B|W)\+ ?(?:(Resign|R)|(Time|T)|(\d+(?:\.\d+)?))$").unwrap()
});

/// Parse a minifox result string: `Draw`, `B+ Resign`, `W+ Time`, `B+ 3.5`.
pub fn parse_result(result: &str) -> Result<GameResult, ResultParseError> {
    let result = result.trim();
    if RE_DRAW.is_match(result) {
        return Ok(GameResult::draw());
    }

    let caps = RE_WIN
        .captures(result)
        .ok_or_else(|| ResultParseError(result.to_string()))?;
    let winner = match &caps[1] {
        "B" => Winner::Black,
        _ => Winner::White,
    };

    if caps.get(2).is_some() {
        return Ok(GameResult {
            winner,
            reason: Some(ResultReason::Resign),
            points: None,
        });
    }
    if caps.get(3).is_some() {
        return Ok(GameResult {
            winner,
            reason: Some(ResultReason::Time),
            points: None,
        });
    }

    let points = caps
        .get(4)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| ResultParseError(result.to_string()))?;
    Ok(GameResult {
        winner,
        reason: Some(ResultReason::Points),
        points: Some(points),
    })
}

impl FromStr for GameResult {
    type Err = ResultParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_result(s)
    }
}

/// Which color `nick` plays in the match, if either.
pub fn nick_color(start: &MatchStart, nick: &str) -> Option<Color> {
    let color = if start.black.nick == nick {
        Some(Color::Black)
    } else if start.white.nick == nick {
        Some(Color::White)
    } else {
        None
    };
    info!(nick, color = ?color, match_id = %start.id, "resolved nick color");
    color
}
