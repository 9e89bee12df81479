//! Framed TCP transport between the controller and the emulator agent.

mod message;
mod session;

pub use message::{ProtocolError, WireMessage, REQUEST_SCREENSHOT};
pub use session::{BridgeListener, EmulatorSession, Received, TransportError};
