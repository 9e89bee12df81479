//! # Emu Agent
//!
//! Turn-based control bridge that lets a vision-language model play a
//! Game Boy game through an emulator. The emulator side connects over a
//! loopback TCP socket, reports screenshots plus a small typed game state,
//! and executes the button codes this controller sends back.
//!
//! One turn is: wait for `ready` -> request a screenshot -> decode the
//! state report -> ask the decision backend for exactly one button and a
//! notepad rewrite -> update memory -> send the button code. Recoverable
//! failures (malformed messages, unreadable screenshots, exhausted
//! backend retries) skip the turn; connection loss and credential
//! failures terminate the session.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use emu_agent::{
//!     BridgeConfig, BridgeListener, ControlLoop, DecisionAdapter, MemoryStore,
//!     ProviderClient, ProviderConfig, ProviderKind,
//! };
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::default().with_provider(
//!         ProviderKind::Anthropic,
//!         ProviderConfig::default()
//!             .with_api_key("sk-...")
//!             .with_model_name("claude-sonnet-4-5"),
//!     );
//!
//!     let listener = BridgeListener::bind(&config.host, config.port).await?;
//!     let client = ProviderClient::new(config.llm_provider, config.active_provider()?.clone())?;
//!     let engine = DecisionAdapter::from_config(client, config.active_provider()?);
//!     let memory = MemoryStore::open(&config.notepad_path, config.short_term_capacity);
//!
//!     let (_stop_tx, stop_rx) = watch::channel(false);
//!     let control = ControlLoop::new(
//!         listener,
//!         engine,
//!         memory,
//!         Duration::from_secs_f64(config.decision_cooldown_secs),
//!         config.max_reconnects,
//!     );
//!     control.run(stop_rx).await?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod control;
pub mod memory;
pub mod provider;
pub mod state;
pub mod transport;

pub use command::{extract_button_from_text, Button, FALLBACK_BUTTON};
pub use config::{BridgeConfig, ConfigError, ProviderConfig, ProviderKind};
pub use control::{BridgeError, ControlLoop, LoopState, RateLimiter};
pub use memory::{MemoryStore, PersistenceError, ShortTermEntry};
pub use provider::{
    DecisionAdapter, DecisionEngine, DecisionRequest, DecisionResponse, ProviderClient,
    ProviderError,
};
pub use state::{Direction, GameStateSnapshot, Screenshot};
pub use transport::{
    BridgeListener, EmulatorSession, ProtocolError, Received, TransportError, WireMessage,
};
