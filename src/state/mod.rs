//! State management module
//!
//! This module handles conversation state and its persistence

pub mod context;
pub mod storage;

pub use context::ConversationState;
pub use storage::{MemoryStateStore, RedisStateStore, StateStore};
