//! Decision engine: uniform interface over pluggable LLM backends.

mod adapter;
mod client;
mod request;

pub use adapter::{DecisionAdapter, DecisionEngine};
pub use client::{ProviderClient, ProviderError, RawDecision};
pub use request::{build_prompt, tool_definitions, DecisionRequest, DecisionResponse, SYSTEM_PROMPT};
