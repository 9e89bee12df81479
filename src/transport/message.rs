//! Wire grammar for the emulator protocol.
//!
//! Messages are newline-terminated lines with `||`-delimited fields:
//!
//! - `ready||true` (emulator -> controller): a new command can be accepted.
//! - `request_screenshot` (controller -> emulator): bare literal.
//! - `screenshot_with_state||path||DIRECTION||x||y||mapId||textmode`
//!   (emulator -> controller): screenshot path plus the four game fields.
//! - A bare decimal `0`-`9` (controller -> emulator): the button code.

use thiserror::Error;

/// Literal sent to the emulator to ask for a fresh screenshot.
pub const REQUEST_SCREENSHOT: &str = "request_screenshot";

/// A single message line that is malformed at the framing level.
///
/// Carries the raw line so the failure is diagnosable; never dropped
/// silently. Recoverable: the control loop skips the turn.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("missing '||' separator in message: {0:?}")]
    MissingSeparator(String),
    #[error("unknown message type {kind:?} in line {raw:?}")]
    UnknownType { kind: String, raw: String },
    #[error("screenshot_with_state payload has {got} fields, expected 6: {raw:?}")]
    FieldCount { got: usize, raw: String },
    #[error("non-numeric field {field:?} in payload: {raw:?}")]
    NonNumericField { field: String, raw: String },
    #[error("screenshot unreadable at {path:?}: {reason}")]
    Screenshot { path: String, reason: String },
}

/// A decoded inbound message from the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// `ready||true`: the emulator is accepting a new command.
    Ready,
    /// `screenshot_with_state` with its six raw payload fields, in order:
    /// path, direction token, x, y, map id, textmode flag.
    ScreenshotWithState {
        path: String,
        direction: String,
        x: String,
        y: String,
        map_id: String,
        textmode: String,
    },
}

impl WireMessage {
    /// Parse one inbound line. The line is expected to be already stripped
    /// of its trailing newline.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let mut parts = line.split("||");
        let kind = parts.next().unwrap_or_default();
        let fields: Vec<&str> = parts.collect();

        match kind {
            "ready" => {
                if fields.is_empty() {
                    return Err(ProtocolError::MissingSeparator(line.to_string()));
                }
                Ok(Self::Ready)
            }
            "screenshot_with_state" => {
                if fields.len() != 6 {
                    return Err(ProtocolError::FieldCount {
                        got: fields.len(),
                        raw: line.to_string(),
                    });
                }
                Ok(Self::ScreenshotWithState {
                    path: fields[0].to_string(),
                    direction: fields[1].to_string(),
                    x: fields[2].to_string(),
                    y: fields[3].to_string(),
                    map_id: fields[4].to_string(),
                    textmode: fields[5].to_string(),
                })
            }
            _ if fields.is_empty() => Err(ProtocolError::MissingSeparator(line.to_string())),
            _ => Err(ProtocolError::UnknownType {
                kind: kind.to_string(),
                raw: line.to_string(),
            }),
        }
    }
}
