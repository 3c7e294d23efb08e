//! Conversation state management
//!
//! This module defines the per-conversation record that stands in for a
//! suspended call stack: the current step index, the prompt the
//! conversation is waiting on, and the results accumulated so far.
//! Resumption is a pure function of this record plus the inbound message.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::steps::ResultBag;
use crate::utils::errors::Result;

/// Persisted state of one active conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Conversation this state belongs to
    pub conversation_id: String,
    /// Index of the step the sequence is currently at
    pub current_step: usize,
    /// Prompt the conversation is suspended on, if any
    pub pending_prompt: Option<String>,
    /// Results keyed by the name of the step that produced them
    pub values: ResultBag,
    /// Consecutive invalid replies to the pending prompt
    pub retries: u32,
    /// When this state expires (for cleanup)
    pub expires_at: Option<DateTime<Utc>>,
    /// When this state was last updated
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create fresh state at step 0 with an empty result bag
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            current_step: 0,
            pending_prompt: None,
            values: ResultBag::new(),
            retries: 0,
            expires_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Suspend on the named prompt
    pub fn await_prompt(&mut self, prompt_id: impl Into<String>) {
        self.pending_prompt = Some(prompt_id.into());
        self.retries = 0;
        self.updated_at = Utc::now();
    }

    /// Consume the pending prompt, returning its id
    pub fn take_pending_prompt(&mut self) -> Option<String> {
        self.updated_at = Utc::now();
        self.pending_prompt.take()
    }

    /// Record a step's result under its name and move to the next step
    pub fn record_result(&mut self, step_name: &str, value: serde_json::Value) {
        self.values.insert(step_name.to_string(), value);
        self.current_step += 1;
        self.updated_at = Utc::now();
    }

    /// Move to the next step without recording a result
    pub fn advance(&mut self) {
        self.current_step += 1;
        self.updated_at = Utc::now();
    }

    /// Get a typed result from the bag
    pub fn get_value<T: for<'de> Deserialize<'de>>(&self, step_name: &str) -> Result<Option<T>> {
        match self.values.get(step_name) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Get a string result (convenience method)
    pub fn get_string(&self, step_name: &str) -> Option<String> {
        self.get_value::<String>(step_name).unwrap_or(None)
    }

    /// Check if state has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    /// Set expiry relative to now
    pub fn expire_in(&mut self, duration: Duration) {
        self.expires_at = Some(Utc::now() + duration);
        self.updated_at = Utc::now();
    }

    /// Set an absolute expiry time
    pub fn set_expiry(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    /// Check if the conversation is suspended on the named prompt
    pub fn is_awaiting(&self, prompt_id: &str) -> bool {
        self.pending_prompt.as_deref() == Some(prompt_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_at_step_zero() {
        let state = ConversationState::new("conv-1");
        assert_eq!(state.conversation_id, "conv-1");
        assert_eq!(state.current_step, 0);
        assert!(state.pending_prompt.is_none());
        assert!(state.values.is_empty());
        assert_eq!(state.retries, 0);
        assert!(state.expires_at.is_none());
    }

    #[test]
    fn await_and_take_prompt() {
        let mut state = ConversationState::new("conv-1");
        state.await_prompt("choose_action");
        assert!(state.is_awaiting("choose_action"));
        assert!(!state.is_awaiting("other"));

        assert_eq!(state.take_pending_prompt(), Some("choose_action".to_string()));
        assert!(state.pending_prompt.is_none());
    }

    #[test]
    fn record_result_advances_and_stores_under_step_name() {
        let mut state = ConversationState::new("conv-1");
        state.record_result("qtype", serde_json::json!("Ask"));

        assert_eq!(state.current_step, 1);
        assert_eq!(state.get_string("qtype"), Some("Ask".to_string()));
        assert_eq!(state.get_string("missing"), None);
    }

    #[test]
    fn expiry() {
        let mut state = ConversationState::new("conv-1");
        assert!(!state.is_expired());

        state.set_expiry(Utc::now() - Duration::hours(1));
        assert!(state.is_expired());

        state.expire_in(Duration::hours(1));
        assert!(!state.is_expired());
    }
}
