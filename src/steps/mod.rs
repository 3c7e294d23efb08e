//! Step sequence definitions
//!
//! A conversation is an ordered table of named steps registered once at
//! startup and executed strictly in registration order. Each step consumes
//! the result bag accumulated so far (plus the validated reply when
//! resuming from a suspend) and returns exactly one [`StepOutcome`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::prompts::ReplyValue;
use crate::utils::errors::{Result, WaterfallError};

/// Accumulated results, keyed by the name of the step that produced them
pub type ResultBag = HashMap<String, serde_json::Value>;

/// Terminal disposition of a completed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalOutcome {
    /// The user saw the flow through; results should be persisted
    Confirmed,
    /// The user declined at a confirm step; nothing is persisted
    Declined,
}

/// What a step decided to do with its turn
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Suspend until the next inbound message answers the named prompt.
    /// `options` overrides the prompt's default selectable labels.
    IssuePrompt {
        prompt_id: String,
        text: String,
        options: Option<Vec<String>>,
    },
    /// Record a result under the current step's name and run the next
    /// step in the same turn
    Advance(serde_json::Value),
    /// Stop advancing and hand the result bag to the finalizer
    Complete(FinalOutcome),
}

/// Read-only view of the conversation handed to a step action
pub struct StepContext<'a> {
    conversation_id: &'a str,
    values: &'a ResultBag,
    reply: Option<&'a ReplyValue>,
    notices: Vec<String>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        conversation_id: &'a str,
        values: &'a ResultBag,
        reply: Option<&'a ReplyValue>,
    ) -> Self {
        Self {
            conversation_id,
            values,
            reply,
            notices: Vec::new(),
        }
    }

    /// Conversation this turn belongs to
    pub fn conversation_id(&self) -> &str {
        self.conversation_id
    }

    /// Results accumulated by earlier steps
    pub fn values(&self) -> &ResultBag {
        self.values
    }

    /// Validated reply, present when resuming from a suspend
    pub fn reply(&self) -> Option<&ReplyValue> {
        self.reply
    }

    /// Text payload of the reply, if any
    pub fn reply_text(&self) -> Option<&str> {
        self.reply.and_then(ReplyValue::as_str)
    }

    /// String result recorded by an earlier step
    pub fn value_str(&self, step_name: &str) -> Option<&str> {
        self.values.get(step_name).and_then(|v| v.as_str())
    }

    /// Queue an interim message to send before the step's outcome
    pub fn notify(&mut self, text: impl Into<String>) {
        self.notices.push(text.into());
    }

    pub(crate) fn into_notices(self) -> Vec<String> {
        self.notices
    }
}

/// A step action: pure function of the context, no suspended call stack
pub type StepAction = Arc<dyn Fn(&mut StepContext<'_>) -> Result<StepOutcome> + Send + Sync>;

/// A named step in the sequence
#[derive(Clone)]
pub struct StepDefinition {
    pub name: String,
    pub action: StepAction,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An immutable ordered list of steps, registered once at startup
#[derive(Debug, Clone, Default)]
pub struct StepSequence {
    steps: Vec<StepDefinition>,
}

impl StepSequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, failing on a reused name
    pub fn register<F>(&mut self, name: impl Into<String>, action: F) -> Result<()>
    where
        F: Fn(&mut StepContext<'_>) -> Result<StepOutcome> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.steps.iter().any(|s| s.name == name) {
            return Err(WaterfallError::DuplicateId(name));
        }
        self.steps.push(StepDefinition {
            name,
            action: Arc::new(action),
        });
        Ok(())
    }

    /// Step at the given index
    pub fn get(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    /// Number of registered steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_execute_in_registration_order() {
        let mut sequence = StepSequence::new();
        sequence
            .register("first", |_| Ok(StepOutcome::Advance(serde_json::json!(1))))
            .unwrap();
        sequence
            .register("second", |_| Ok(StepOutcome::Complete(FinalOutcome::Confirmed)))
            .unwrap();

        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.get(0).unwrap().name, "first");
        assert_eq!(sequence.get(1).unwrap().name, "second");
        assert!(sequence.get(2).is_none());
    }

    #[test]
    fn duplicate_step_name_is_rejected() {
        let mut sequence = StepSequence::new();
        sequence
            .register("only", |_| Ok(StepOutcome::Complete(FinalOutcome::Confirmed)))
            .unwrap();
        let err = sequence
            .register("only", |_| Ok(StepOutcome::Complete(FinalOutcome::Confirmed)))
            .unwrap_err();
        assert!(matches!(err, WaterfallError::DuplicateId(_)));
    }

    #[test]
    fn context_exposes_bag_and_reply() {
        let mut values = ResultBag::new();
        values.insert("qtype".to_string(), serde_json::json!("Ask"));
        let reply = ReplyValue::Text("taxes".to_string());

        let mut ctx = StepContext::new("conv-1", &values, Some(&reply));
        assert_eq!(ctx.conversation_id(), "conv-1");
        assert_eq!(ctx.value_str("qtype"), Some("Ask"));
        assert_eq!(ctx.reply_text(), Some("taxes"));

        ctx.notify("working on it");
        assert_eq!(ctx.into_notices(), vec!["working on it".to_string()]);
    }
}
