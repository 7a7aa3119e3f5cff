//! Storage abstraction for chat history and the live match feed

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, SharedStore};
pub use traits::{Match, MatchEvent, MatchStatus, Store, StoredMessage};
