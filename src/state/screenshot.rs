//! Screenshot resolution: turn a path from the wire payload into image bytes.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::transport::ProtocolError;

/// A decoded screenshot ready for prompt assembly.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
}

/// Load and validate the screenshot file the emulator reported.
///
/// Missing or corrupt files are a `ProtocolError`, handled like a
/// malformed state payload: the turn is skipped.
pub fn load_screenshot(path: &str) -> Result<Screenshot, ProtocolError> {
    let bytes = std::fs::read(Path::new(path)).map_err(|e| ProtocolError::Screenshot {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    let img = image::load_from_memory(&bytes).map_err(|e| ProtocolError::Screenshot {
        path: path.to_string(),
        reason: format!("not a decodable image: {e}"),
    })?;

    Ok(Screenshot {
        base64_data: STANDARD.encode(&bytes),
        width: img.width(),
        height: img.height(),
    })
}
