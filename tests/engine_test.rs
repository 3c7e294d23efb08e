//! End-to-end conversation tests
//!
//! Drives full multi-turn conversations through the dialog engine using the
//! built-in Ask/Search flow and in-memory stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use waterfall::config::EngineConfig;
use waterfall::engine::DialogEngine;
use waterfall::flows;
use waterfall::profile::{MemoryProfileStore, ProfileFinalizer, ProfileStore, UserProfile};
use waterfall::state::{ConversationState, MemoryStateStore, StateStore};
use waterfall::steps::StepSequence;
use waterfall::{Result, WaterfallError};

fn build_engine(
    steps: StepSequence,
    config: EngineConfig,
) -> (DialogEngine, Arc<MemoryStateStore>, Arc<MemoryProfileStore>) {
    let prompts = flows::ask_or_search_prompts().unwrap();
    let state_store = Arc::new(MemoryStateStore::new());
    let profile_store = Arc::new(MemoryProfileStore::new());
    let finalizer = ProfileFinalizer::new(profile_store.clone());
    let engine = DialogEngine::new(
        prompts,
        steps,
        state_store.clone(),
        finalizer,
        config,
    );
    (engine, state_store, profile_store)
}

fn default_engine() -> (DialogEngine, Arc<MemoryStateStore>, Arc<MemoryProfileStore>) {
    build_engine(flows::ask_or_search_steps().unwrap(), EngineConfig::default())
}

#[tokio::test]
async fn first_message_always_issues_the_first_prompt() {
    for opening in ["hi", "Ask", "complete gibberish 123"] {
        let (engine, _, _) = default_engine();
        let replies = engine.handle_message("conv-1", opening).await.unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "Choose your option wisely!");
        assert_eq!(
            replies[0].options,
            Some(vec!["Ask".to_string(), "Search".to_string()])
        );
    }
}

#[tokio::test]
async fn invalid_choice_reply_is_rejected_idempotently() {
    let (engine, state_store, _) = default_engine();
    engine.handle_message("conv-1", "hi").await.unwrap();

    let before = state_store.load("conv-1").await.unwrap().unwrap();

    let replies = engine.handle_message("conv-1", "Browse").await.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text, "Please pick one of the listed options.");
    assert_eq!(
        replies[0].options,
        Some(vec!["Ask".to_string(), "Search".to_string()])
    );

    let after = state_store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(after.current_step, before.current_step);
    assert_eq!(after.pending_prompt, before.pending_prompt);
    assert_eq!(after.values, before.values);

    // A valid reply still works after the rejection.
    let replies = engine.handle_message("conv-1", "Ask").await.unwrap();
    assert_eq!(replies[0].text, "What do you want to Ask for?");
}

#[tokio::test]
async fn full_run_persists_profile_and_resets_state() {
    let (engine, state_store, profile_store) = default_engine();

    engine.handle_message("conv-1", "hello").await.unwrap();
    let replies = engine.handle_message("conv-1", "Ask").await.unwrap();
    assert_eq!(replies[0].text, "What do you want to Ask for?");
    assert_eq!(replies[0].options, None);

    let replies = engine.handle_message("conv-1", "taxes").await.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text, "You Asked for taxes.");
    assert_eq!(replies[0].attachments.len(), 1);
    assert_eq!(replies[0].attachments[0].content_type, "doc/pdf");

    let profile = profile_store.get("conv-1").await.unwrap().unwrap();
    assert_eq!(
        profile,
        UserProfile {
            qtype: "Ask".to_string(),
            ques: "taxes".to_string()
        }
    );

    // Terminal: state cleared, next message starts a new sequence.
    assert!(state_store.load("conv-1").await.unwrap().is_none());
    let replies = engine.handle_message("conv-1", "anything").await.unwrap();
    assert_eq!(replies[0].text, "Choose your option wisely!");
}

#[tokio::test]
async fn search_scenario_matches_expected_transcript() {
    let (engine, _, profile_store) = default_engine();

    engine.handle_message("conv-1", "start").await.unwrap();
    let replies = engine.handle_message("conv-1", "Search").await.unwrap();
    assert_eq!(replies[0].text, "What do you want to Search for?");

    let replies = engine
        .handle_message("conv-1", "flights to Tokyo")
        .await
        .unwrap();
    assert_eq!(replies[0].text, "You Searched for flights to Tokyo.");

    let profile = profile_store.get("conv-1").await.unwrap().unwrap();
    assert_eq!(
        profile,
        UserProfile {
            qtype: "Search".to_string(),
            ques: "flights to Tokyo".to_string()
        }
    );
}

#[tokio::test]
async fn choice_labels_match_case_insensitively() {
    let (engine, _, _) = default_engine();

    engine.handle_message("conv-1", "start").await.unwrap();
    let replies = engine.handle_message("conv-1", "seARCh").await.unwrap();
    // The canonical label flows into the prompt text and the result bag.
    assert_eq!(replies[0].text, "What do you want to Search for?");
}

#[tokio::test]
async fn confirm_flow_sends_interim_notice_and_keeps_profile_on_yes() {
    let (engine, _, profile_store) = build_engine(
        flows::ask_or_search_with_confirm_steps().unwrap(),
        EngineConfig::default(),
    );

    engine.handle_message("conv-1", "start").await.unwrap();
    engine.handle_message("conv-1", "Search").await.unwrap();

    let replies = engine
        .handle_message("conv-1", "flights to Tokyo")
        .await
        .unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(
        replies[0].text,
        "Please wait while we search for flights to Tokyo."
    );
    assert_eq!(replies[1].text, "Confirm?");
    assert_eq!(
        replies[1].options,
        Some(vec!["yes".to_string(), "no".to_string()])
    );

    let replies = engine.handle_message("conv-1", "yes").await.unwrap();
    assert_eq!(replies[0].text, "You Searched for flights to Tokyo.");
    assert!(profile_store.get("conv-1").await.unwrap().is_some());
}

#[tokio::test]
async fn declining_confirmation_keeps_nothing() {
    let (engine, state_store, profile_store) = build_engine(
        flows::ask_or_search_with_confirm_steps().unwrap(),
        EngineConfig::default(),
    );

    engine.handle_message("conv-1", "start").await.unwrap();
    engine.handle_message("conv-1", "Ask").await.unwrap();
    engine.handle_message("conv-1", "taxes").await.unwrap();

    let replies = engine.handle_message("conv-1", "no").await.unwrap();
    assert_eq!(replies[0].text, "Thanks. Your profile will not be kept.");
    assert!(replies[0].attachments.is_empty());

    assert!(profile_store.get("conv-1").await.unwrap().is_none());
    assert!(state_store.load("conv-1").await.unwrap().is_none());
}

#[tokio::test]
async fn out_of_token_confirm_reply_reissues_the_prompt() {
    let (engine, _, _) = build_engine(
        flows::ask_or_search_with_confirm_steps().unwrap(),
        EngineConfig::default(),
    );

    engine.handle_message("conv-1", "start").await.unwrap();
    engine.handle_message("conv-1", "Ask").await.unwrap();
    engine.handle_message("conv-1", "taxes").await.unwrap();

    let replies = engine.handle_message("conv-1", "maybe").await.unwrap();
    assert_eq!(replies[0].text, "Please answer yes or no.");

    let replies = engine.handle_message("conv-1", "y").await.unwrap();
    assert_eq!(replies[0].text, "You Asked for taxes.");
}

#[tokio::test]
async fn sequential_runs_overwrite_the_profile() {
    let (engine, _, profile_store) = default_engine();

    engine.handle_message("conv-1", "start").await.unwrap();
    engine.handle_message("conv-1", "Ask").await.unwrap();
    engine.handle_message("conv-1", "taxes").await.unwrap();

    engine.handle_message("conv-1", "again").await.unwrap();
    engine.handle_message("conv-1", "Search").await.unwrap();
    let replies = engine
        .handle_message("conv-1", "flights to Tokyo")
        .await
        .unwrap();
    // No leakage from the first run.
    assert_eq!(replies[0].text, "You Searched for flights to Tokyo.");

    let profile = profile_store.get("conv-1").await.unwrap().unwrap();
    assert_eq!(
        profile,
        UserProfile {
            qtype: "Search".to_string(),
            ques: "flights to Tokyo".to_string()
        }
    );
}

#[tokio::test]
async fn conversations_are_independent() {
    let (engine, _, profile_store) = default_engine();

    engine.handle_message("alice", "start").await.unwrap();
    engine.handle_message("bob", "start").await.unwrap();

    engine.handle_message("alice", "Ask").await.unwrap();
    engine.handle_message("bob", "Search").await.unwrap();

    engine.handle_message("alice", "taxes").await.unwrap();
    engine
        .handle_message("bob", "flights to Tokyo")
        .await
        .unwrap();

    let alice = profile_store.get("alice").await.unwrap().unwrap();
    let bob = profile_store.get("bob").await.unwrap().unwrap();
    assert_eq!(alice.qtype, "Ask");
    assert_eq!(bob.qtype, "Search");
}

#[tokio::test]
async fn cancel_token_resets_the_conversation() {
    let config = EngineConfig {
        cancel_token: Some("/cancel".to_string()),
        ..EngineConfig::default()
    };
    let (engine, state_store, profile_store) =
        build_engine(flows::ask_or_search_steps().unwrap(), config);

    engine.handle_message("conv-1", "start").await.unwrap();
    engine.handle_message("conv-1", "Ask").await.unwrap();

    let replies = engine.handle_message("conv-1", "/CANCEL").await.unwrap();
    assert_eq!(replies[0].text, "Okay, I have cancelled that.");

    assert!(state_store.load("conv-1").await.unwrap().is_none());
    assert!(profile_store.get("conv-1").await.unwrap().is_none());

    // Back to Idle: the next message starts a fresh sequence.
    let replies = engine.handle_message("conv-1", "hello").await.unwrap();
    assert_eq!(replies[0].text, "Choose your option wisely!");
}

/// State store whose next save can be made to fail, for exercising
/// persistence-failure turns.
struct FlakyStateStore {
    inner: MemoryStateStore,
    fail_next_save: AtomicBool,
}

impl FlakyStateStore {
    fn new() -> Self {
        Self {
            inner: MemoryStateStore::new(),
            fail_next_save: AtomicBool::new(false),
        }
    }

    fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for FlakyStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        self.inner.load(conversation_id).await
    }

    async fn save(&self, state: &ConversationState) -> Result<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(WaterfallError::Persistence(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "simulated write failure",
            ))));
        }
        self.inner.save(state).await
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.inner.clear(conversation_id).await
    }
}

#[tokio::test]
async fn failed_save_surfaces_and_leaves_state_retryable() {
    let state_store = Arc::new(FlakyStateStore::new());
    let profile_store = Arc::new(MemoryProfileStore::new());
    let engine = DialogEngine::new(
        flows::ask_or_search_prompts().unwrap(),
        flows::ask_or_search_steps().unwrap(),
        state_store.clone(),
        ProfileFinalizer::new(profile_store.clone()),
        EngineConfig::default(),
    );

    engine.handle_message("conv-1", "hi").await.unwrap();
    let before = state_store.load("conv-1").await.unwrap().unwrap();

    // The save at the next suspension fails; the turn surfaces the error.
    state_store.fail_next_save();
    let err = engine.handle_message("conv-1", "Ask").await.unwrap_err();
    assert!(matches!(&err, WaterfallError::Persistence(_)));
    assert!(err.is_recoverable());

    // Persisted state is unchanged: still awaiting the choice prompt.
    let after = state_store.load("conv-1").await.unwrap().unwrap();
    assert_eq!(after.current_step, before.current_step);
    assert_eq!(after.pending_prompt, before.pending_prompt);
    assert_eq!(after.values, before.values);

    // Retrying the same message resumes from the same point.
    let replies = engine.handle_message("conv-1", "Ask").await.unwrap();
    assert_eq!(replies[0].text, "What do you want to Ask for?");

    let replies = engine.handle_message("conv-1", "taxes").await.unwrap();
    assert_eq!(replies[0].text, "You Asked for taxes.");
    assert!(profile_store.get("conv-1").await.unwrap().is_some());
}

#[tokio::test]
async fn bounded_retries_cancel_after_the_limit() {
    let config = EngineConfig {
        max_retries: Some(2),
        ..EngineConfig::default()
    };
    let (engine, state_store, _) = build_engine(flows::ask_or_search_steps().unwrap(), config);

    engine.handle_message("conv-1", "start").await.unwrap();

    let replies = engine.handle_message("conv-1", "Browse").await.unwrap();
    assert_eq!(replies[0].text, "Please pick one of the listed options.");

    let replies = engine.handle_message("conv-1", "Wander").await.unwrap();
    assert_eq!(replies[0].text, "Too many invalid replies. Let's start over.");
    assert!(state_store.load("conv-1").await.unwrap().is_none());
}
