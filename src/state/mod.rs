//! Typed decoding of the emulator's per-turn state report.

mod screenshot;
mod snapshot;

pub use screenshot::{load_screenshot, Screenshot};
pub use snapshot::{map_name, Direction, GameStateSnapshot};
