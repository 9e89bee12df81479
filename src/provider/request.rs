//! Decision request/response types, prompt assembly, and tool schemas.

use serde_json::{json, Value};

use crate::command::Button;
use crate::config::ProviderKind;
use crate::state::{map_name, GameStateSnapshot, Screenshot};

/// System prompt fixing the agent's role: press buttons, keep the notepad.
pub const SYSTEM_PROMPT: &str = "\
You are an AI playing a Game Boy Pokemon game. Your ONLY job is to press buttons to control the game.\n\
\n\
IMPORTANT: You MUST use the press_button function with every response to specify which button to press.\n\
\n\
Always select the appropriate button based on the context:\n\
- A: To confirm, advance text, talk, or select\n\
- B: To cancel or go back\n\
- UP, DOWN, LEFT, RIGHT: To move or navigate menus\n\
- START: To open the menu\n\
- SELECT: Rarely used special function\n\
\n\
Use update_notepad to fully rewrite your long-term memory each turn. Keep what still matters, drop what does not.";

/// Everything the backend needs to make one decision.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub snapshot: GameStateSnapshot,
    pub screenshot: Screenshot,
    /// Rendered memory context: short-term log plus notepad.
    pub context: String,
    /// Current notepad text, echoed back unchanged when the model does
    /// not rewrite it.
    pub notepad: String,
}

/// Exactly one command plus the replacement notepad text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionResponse {
    pub button: Button,
    /// Full replacement for the notepad (may equal the previous text).
    pub notepad: String,
    /// Free-text reasoning from the model, for logging only.
    pub thinking: String,
    /// True when this response is the safe fallback rather than a
    /// parsed model decision.
    pub is_fallback: bool,
}

impl DecisionResponse {
    /// The designated safe no-progress response for a request.
    pub fn fallback(request: &DecisionRequest) -> Self {
        Self {
            button: crate::command::FALLBACK_BUTTON,
            notepad: request.notepad.clone(),
            thinking: String::new(),
            is_fallback: true,
        }
    }
}

/// Assemble the per-turn user prompt from snapshot and memory context.
pub fn build_prompt(request: &DecisionRequest) -> String {
    let snap = &request.snapshot;
    let textbox_note = if snap.textbox_active {
        "\n- A text box is currently open: your character cannot move, press A to advance it."
    } else {
        ""
    };

    format!(
        "Look at this screenshot and choose ONE button to press.\n\
         \n\
         ## Current Location\n\
         You are in {map}\n\
         Position: X={x}, Y={y}\n\
         \n\
         ## Current Direction\n\
         You are facing: {direction} (facing {compass})\n\
         \n\
         ## Navigation Tips:\n\
         - To INTERACT with objects or NPCs, you MUST be FACING them and then press A\n\
         - If you need to face a different direction, press the appropriate directional button first\n\
         - You must be directly on top of exits (mats, doors, stairs) to use them{textbox_note}\n\
         \n\
         {context}\n\
         \n\
         When you enter a new area or learn something important, rewrite the notepad with update_notepad.\n\
         Choose the appropriate button for this situation and use the press_button function to execute it.",
        map = map_name(snap.map_id),
        x = snap.x,
        y = snap.y,
        direction = snap.direction,
        compass = snap.direction.compass(),
        context = request.context,
    )
}

/// JSON schema shared by every provider's tool format.
fn press_button_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "button": {
                "type": "string",
                "description": "Button to press (A, B, START, SELECT, UP, DOWN, LEFT, RIGHT, R, L)",
                "enum": ["A", "B", "SELECT", "START", "RIGHT", "LEFT", "UP", "DOWN", "R", "L"]
            }
        },
        "required": ["button"]
    })
}

fn update_notepad_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "Full replacement text for the notepad. Include game progress, objectives, and status."
            }
        },
        "required": ["content"]
    })
}

/// The two tools in the target provider's expected format.
pub fn tool_definitions(kind: ProviderKind) -> Value {
    let tools = [
        (
            "press_button",
            "Press a button on the Game Boy emulator to control the game",
            press_button_schema(),
        ),
        (
            "update_notepad",
            "Replace the AI's long-term memory with updated information about the game state",
            update_notepad_schema(),
        ),
    ];

    match kind {
        ProviderKind::Anthropic => Value::Array(
            tools
                .iter()
                .map(|(name, description, schema)| {
                    json!({
                        "name": name,
                        "description": description,
                        "input_schema": schema
                    })
                })
                .collect(),
        ),
        ProviderKind::OpenAi => Value::Array(
            tools
                .iter()
                .map(|(name, description, schema)| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": name,
                            "description": description,
                            "parameters": schema
                        }
                    })
                })
                .collect(),
        ),
        ProviderKind::Google => json!([{
            "function_declarations": tools
                .iter()
                .map(|(name, description, schema)| {
                    json!({
                        "name": name,
                        "description": description,
                        "parameters": schema
                    })
                })
                .collect::<Vec<_>>()
        }]),
    }
}
