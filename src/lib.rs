//! Waterfall Step Engine
//!
//! A transport-agnostic engine for multi-turn conversational flows. A flow
//! is an ordered sequence of steps; steps suspend on registered prompts and
//! resume when the next inbound message arrives, with per-conversation
//! state persisted between messages instead of a long-lived call stack.

pub mod config;
pub mod engine;
pub mod flows;
pub mod profile;
pub mod prompts;
pub mod state;
pub mod steps;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::{EngineConfig, Settings};
pub use engine::DialogEngine;
pub use profile::{MemoryProfileStore, ProfileFinalizer, ProfileStore, UserProfile};
pub use prompts::{PromptDefinition, PromptKind, PromptRegistry, ReplyValue};
pub use state::{ConversationState, MemoryStateStore, RedisStateStore, StateStore};
pub use steps::{FinalOutcome, StepContext, StepOutcome, StepSequence};
pub use transport::{Attachment, OutboundMessage};
pub use utils::errors::{Result, WaterfallError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
