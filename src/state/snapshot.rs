//! Game state snapshot decoded from a `screenshot_with_state` payload.

use std::fmt;

use crate::transport::{ProtocolError, WireMessage};

/// Which way the player character is facing.
///
/// Unrecognized direction tokens decode to `Unknown`; that is a valid,
/// if degenerate, game state and never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    Unknown,
}

impl Direction {
    fn from_token(token: &str) -> Self {
        match token {
            "UP" => Self::Up,
            "DOWN" => Self::Down,
            "LEFT" => Self::Left,
            "RIGHT" => Self::Right,
            _ => Self::Unknown,
        }
    }

    /// Compass word for prompt text ("facing north").
    pub fn compass(self) -> &'static str {
        match self {
            Self::Up => "north",
            Self::Down => "south",
            Self::Left => "west",
            Self::Right => "east",
            Self::Unknown => "an unknown direction",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Immutable value decoded from one incoming state report.
/// Created once per turn, superseded by the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateSnapshot {
    pub direction: Direction,
    pub x: u16,
    pub y: u16,
    pub map_id: u32,
    pub textbox_active: bool,
    /// Path of the screenshot captured alongside this state.
    pub screenshot_path: String,
}

impl GameStateSnapshot {
    /// Decode the six-field payload of a `screenshot_with_state` message.
    ///
    /// The emulator is untrusted input: every numeric field is validated
    /// and a non-numeric value is a `ProtocolError` (the control loop
    /// skips the turn rather than terminating).
    pub fn decode(msg: &WireMessage) -> Result<Self, ProtocolError> {
        let WireMessage::ScreenshotWithState {
            path,
            direction,
            x,
            y,
            map_id,
            textmode,
        } = msg
        else {
            return Err(ProtocolError::MissingSeparator(format!("{msg:?}")));
        };

        Ok(Self {
            direction: Direction::from_token(direction),
            x: parse_field("x", x)?,
            y: parse_field("y", y)?,
            map_id: parse_field("mapId", map_id)?,
            textbox_active: parse_field::<u8>("textmode", textmode)? != 0,
            screenshot_path: path.clone(),
        })
    }

    /// One-line summary for the short-term log and debug output.
    pub fn summary(&self) -> String {
        format!(
            "facing {} at ({}, {}) in {}{}",
            self.direction,
            self.x,
            self.y,
            map_name(self.map_id),
            if self.textbox_active {
                ", textbox open"
            } else {
                ""
            }
        )
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|_| ProtocolError::NonNumericField {
            field: name.to_string(),
            raw: value.to_string(),
        })
}

/// Human-readable map name for a Gen-1 map id, with a fallback for areas
/// not in the table.
pub fn map_name(map_id: u32) -> String {
    let known = match map_id {
        0 => "Pallet Town",
        1 => "Viridian City",
        2 => "Pewter City",
        3 => "Cerulean City",
        12 => "Route 1",
        13 => "Route 2",
        14 => "Route 3",
        15 => "Route 4",
        37 => "Player's House 1F",
        38 => "Player's House 2F",
        39 => "Rival's House",
        40 => "Oak's Lab",
        _ => return format!("Unknown Area (Map ID: {map_id})"),
    };
    known.to_string()
}
