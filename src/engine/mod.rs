//! Dialog resumption controller
//!
//! Each inbound message is a fresh invocation: the engine loads the
//! conversation's persisted state, consumes an outstanding prompt reply if
//! one is expected, and runs steps until the sequence either suspends on a
//! new prompt or completes. Nothing is persisted until the turn's state
//! transition is final, so a failed save leaves the conversation exactly
//! where it was.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::profile::ProfileFinalizer;
use crate::prompts::{PromptRegistry, ReplyValue, ValidationOutcome};
use crate::state::{ConversationState, StateStore};
use crate::steps::{FinalOutcome, StepContext, StepOutcome, StepSequence};
use crate::transport::OutboundMessage;
use crate::utils::errors::{Result, WaterfallError};

const CANCELLED_NOTICE: &str = "Okay, I have cancelled that.";
const RETRIES_EXCEEDED_NOTICE: &str = "Too many invalid replies. Let's start over.";

/// The waterfall step engine
pub struct DialogEngine {
    prompts: PromptRegistry,
    steps: StepSequence,
    store: Arc<dyn StateStore>,
    finalizer: ProfileFinalizer,
    config: EngineConfig,
    /// Serializes load-modify-save cycles per conversation id
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DialogEngine {
    pub fn new(
        prompts: PromptRegistry,
        steps: StepSequence,
        store: Arc<dyn StateStore>,
        finalizer: ProfileFinalizer,
        config: EngineConfig,
    ) -> Self {
        Self {
            prompts,
            steps,
            store,
            finalizer,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one inbound message and return the replies to deliver.
    ///
    /// Starts the sequence fresh when no state exists; otherwise validates
    /// the reply against the outstanding prompt and resumes.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        raw_text: &str,
    ) -> Result<Vec<OutboundMessage>> {
        let lock = self.conversation_lock(conversation_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process_turn(conversation_id, raw_text).await
        };
        self.release_conversation_lock(conversation_id, &lock).await;
        result
    }

    async fn process_turn(
        &self,
        conversation_id: &str,
        raw_text: &str,
    ) -> Result<Vec<OutboundMessage>> {
        let mut out = Vec::new();

        match self.store.load(conversation_id).await? {
            None => {
                debug!(conversation_id = conversation_id, "No prior state, starting sequence");
                let mut state = ConversationState::new(conversation_id);
                self.run_steps(&mut state, None, &mut out).await?;
            }
            Some(mut state) => {
                let Some(prompt_id) = state.pending_prompt.clone() else {
                    // State without an outstanding prompt should never have
                    // been persisted; recover by starting over.
                    warn!(conversation_id = conversation_id, step = state.current_step,
                          "Loaded state with no pending prompt, restarting");
                    self.store.clear(conversation_id).await?;
                    let mut state = ConversationState::new(conversation_id);
                    self.run_steps(&mut state, None, &mut out).await?;
                    return Ok(out);
                };

                if self.is_cancel(raw_text) {
                    info!(conversation_id = conversation_id, "Conversation cancelled by user");
                    self.store.clear(conversation_id).await?;
                    out.push(OutboundMessage::text(CANCELLED_NOTICE));
                    return Ok(out);
                }

                match self.prompts.validate(&prompt_id, raw_text)? {
                    ValidationOutcome::Rejected { retry_text } => {
                        self.reject_reply(&mut state, &prompt_id, retry_text, &mut out)
                            .await?;
                    }
                    ValidationOutcome::Accepted(value) => {
                        debug!(conversation_id = conversation_id, prompt_id = %prompt_id,
                               "Reply accepted");
                        state.take_pending_prompt();
                        // The continuation of a suspended step is the next
                        // step in the sequence.
                        state.advance();
                        self.run_steps(&mut state, Some(value), &mut out).await?;
                    }
                }
            }
        }

        Ok(out)
    }

    /// Run steps from the state's current index until the sequence
    /// suspends, completes, or is exhausted
    async fn run_steps(
        &self,
        state: &mut ConversationState,
        mut reply: Option<ReplyValue>,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<()> {
        loop {
            if state.current_step >= self.steps.len() {
                debug!(conversation_id = %state.conversation_id, "Sequence exhausted, finalizing");
                return self.complete(state, FinalOutcome::Confirmed, out).await;
            }

            let (step_name, outcome, notices) = {
                let step = self
                    .steps
                    .get(state.current_step)
                    .ok_or(WaterfallError::UnknownStep(state.current_step))?;
                let mut ctx =
                    StepContext::new(&state.conversation_id, &state.values, reply.as_ref());
                let outcome = (step.action)(&mut ctx)?;
                (step.name.clone(), outcome, ctx.into_notices())
            };

            out.extend(notices.into_iter().map(OutboundMessage::text));

            debug!(conversation_id = %state.conversation_id, step = %step_name,
                   outcome = ?outcome_label(&outcome), "Step executed");

            match outcome {
                StepOutcome::IssuePrompt {
                    prompt_id,
                    text,
                    options,
                } => {
                    let definition = self
                        .prompts
                        .get(&prompt_id)
                        .ok_or_else(|| WaterfallError::UnknownPrompt(prompt_id.clone()))?;
                    let options = options.or_else(|| definition.default_options());

                    state.await_prompt(prompt_id);
                    state.expire_in(Duration::seconds(self.config.state_ttl_seconds as i64));
                    self.store.save(state).await?;

                    out.push(OutboundMessage::prompt(text, options));
                    return Ok(());
                }
                StepOutcome::Advance(value) => {
                    state.record_result(&step_name, value);
                    reply = None;
                }
                StepOutcome::Complete(final_outcome) => {
                    return self.complete(state, final_outcome, out).await;
                }
            }
        }
    }

    async fn complete(
        &self,
        state: &mut ConversationState,
        outcome: FinalOutcome,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<()> {
        let replies = self
            .finalizer
            .finalize(&state.conversation_id, &state.values, outcome)
            .await?;
        out.extend(replies);
        self.store.clear(&state.conversation_id).await?;

        crate::utils::logging::log_turn(&state.conversation_id, state.current_step, "complete");
        Ok(())
    }

    /// Handle an invalid reply: re-issue the prompt, leaving step index and
    /// result bag untouched. With bounded retries configured, the counter
    /// is persisted and exceeding it cancels the conversation.
    async fn reject_reply(
        &self,
        state: &mut ConversationState,
        prompt_id: &str,
        retry_text: String,
        out: &mut Vec<OutboundMessage>,
    ) -> Result<()> {
        warn!(conversation_id = %state.conversation_id, prompt_id = prompt_id,
              retries = state.retries, "Invalid reply");

        if let Some(max_retries) = self.config.max_retries {
            state.retries += 1;
            if state.retries >= max_retries {
                self.store.clear(&state.conversation_id).await?;
                out.push(OutboundMessage::text(RETRIES_EXCEEDED_NOTICE));
                return Ok(());
            }
            self.store.save(state).await?;
        }

        let definition = self
            .prompts
            .get(prompt_id)
            .ok_or_else(|| WaterfallError::UnknownPrompt(prompt_id.to_string()))?;
        out.push(OutboundMessage::prompt(retry_text, definition.default_options()));
        Ok(())
    }

    fn is_cancel(&self, raw_text: &str) -> bool {
        match &self.config.cancel_token {
            Some(token) => raw_text.trim().eq_ignore_ascii_case(token),
            None => false,
        }
    }

    async fn conversation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the conversation's lock entry once no other turn holds or
    /// awaits it, so the map does not grow with every conversation ever
    /// seen. Holding the map mutex here means no concurrent turn can clone
    /// the entry between the count check and the removal.
    async fn release_conversation_lock(&self, conversation_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Two strong refs left: the map's and ours.
        if Arc::strong_count(lock) == 2 {
            locks.remove(conversation_id);
        }
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

impl std::fmt::Debug for DialogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogEngine")
            .field("steps", &self.steps.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn outcome_label(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::IssuePrompt { .. } => "issue_prompt",
        StepOutcome::Advance(_) => "advance",
        StepOutcome::Complete(_) => "complete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows;
    use crate::profile::{MemoryProfileStore, ProfileFinalizer};
    use crate::state::MemoryStateStore;

    fn engine() -> DialogEngine {
        DialogEngine::new(
            flows::ask_or_search_prompts().unwrap(),
            flows::ask_or_search_steps().unwrap(),
            Arc::new(MemoryStateStore::new()),
            ProfileFinalizer::new(Arc::new(MemoryProfileStore::new())),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn conversation_locks_are_released_after_each_turn() {
        let engine = engine();

        engine.handle_message("conv-1", "hi").await.unwrap();
        assert_eq!(engine.lock_count().await, 0);

        // Mid-sequence turns and extra conversations leave nothing behind
        // either.
        engine.handle_message("conv-1", "Ask").await.unwrap();
        engine.handle_message("conv-2", "hi").await.unwrap();
        assert_eq!(engine.lock_count().await, 0);

        engine.handle_message("conv-1", "taxes").await.unwrap();
        assert_eq!(engine.lock_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_turns_do_not_leak_locks() {
        let engine = Arc::new(engine());

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .handle_message(&format!("conv-{i}"), "hi")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(engine.lock_count().await, 0);
    }
}
