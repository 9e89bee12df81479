//! Button command vocabulary shared by the wire protocol and the decision engine.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// The ten Game Boy buttons the emulator understands, in wire-code order.
///
/// The numeric codes are part of the emulator protocol and must not change:
/// the controller sends the bare decimal code as a line and the emulator
/// holds the mapped button for a fixed number of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
    R = 8,
    L = 9,
}

/// Button names in wire-code order. Index equals `Button::code()`.
pub static BUTTON_NAMES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "A", "B", "SELECT", "START", "RIGHT", "LEFT", "UP", "DOWN", "R", "L",
    ]
});

/// Safe no-progress command used when a decision cannot be parsed
/// or the backend is exhausted. First button in priority order.
pub const FALLBACK_BUTTON: Button = Button::A;

impl Button {
    /// The wire code (0-9) sent to the emulator.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a button by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::Select),
            3 => Some(Self::Start),
            4 => Some(Self::Right),
            5 => Some(Self::Left),
            6 => Some(Self::Up),
            7 => Some(Self::Down),
            8 => Some(Self::R),
            9 => Some(Self::L),
            _ => None,
        }
    }

    /// Look up a button by name, tolerating case and stray quotes from
    /// model output (e.g. `"'UP'"` or `a`).
    pub fn from_name(name: &str) -> Option<Self> {
        let cleaned = name.trim().trim_matches(|c| c == '\'' || c == '"').to_uppercase();
        BUTTON_NAMES
            .iter()
            .position(|&n| n == cleaned)
            .and_then(|idx| Self::from_code(idx as u8))
    }

    /// Canonical uppercase name.
    pub fn name(self) -> &'static str {
        BUTTON_NAMES[self.code() as usize]
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static PRESS_BUTTON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"press_button\(\s*([^)\s]+)\s*\)").expect("valid regex"));

/// Extract a button from free-form model text of the shape `press_button(UP)`.
///
/// Some backends answer with plain text instead of a structured tool call;
/// this salvages exactly one such call. More than one match is ambiguous
/// and yields `None`.
pub fn extract_button_from_text(text: &str) -> Option<Button> {
    let mut matches = PRESS_BUTTON_RE.captures_iter(text);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Button::from_name(first.get(1)?.as_str())
}
