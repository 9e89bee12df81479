//! Short-term action log and persistent long-term notepad.

mod store;

pub use store::{MemoryStore, PersistenceError, ShortTermEntry, DEFAULT_SHORT_TERM_CAPACITY};
