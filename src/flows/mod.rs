//! Built-in Ask/Search flow
//!
//! The canonical waterfall: the user picks "Ask" or "Search", types what
//! they want, and the engine replies with a summary and persists the
//! profile. A variant with an explicit confirm step is also provided;
//! declining it discards the profile.

use crate::prompts::{PromptDefinition, PromptRegistry, ReplyValue};
use crate::steps::{FinalOutcome, StepOutcome, StepSequence};
use crate::utils::errors::{Result, WaterfallError};

/// Prompt id for the Ask/Search choice
pub const CHOICE_PROMPT: &str = "choose_action";

/// Prompt id for the free-text query
pub const TEXT_PROMPT: &str = "query_text";

/// Prompt id for the optional confirmation
pub const CONFIRM_PROMPT: &str = "confirm";

/// Prompt registry for the Ask/Search flow
pub fn ask_or_search_prompts() -> Result<PromptRegistry> {
    let mut registry = PromptRegistry::new();
    registry.register(PromptDefinition::choice(
        CHOICE_PROMPT,
        ["Ask", "Search"],
        "Please pick one of the listed options.",
    ))?;
    registry.register(PromptDefinition::free_text(
        TEXT_PROMPT,
        "Please type a few words about what you are looking for.",
    ))?;
    registry.register(PromptDefinition::confirm(
        CONFIRM_PROMPT,
        "Please answer yes or no.",
    ))?;
    Ok(registry)
}

/// The two-input Ask/Search sequence: choice, free text, summary
pub fn ask_or_search_steps() -> Result<StepSequence> {
    let mut steps = StepSequence::new();
    register_common_steps(&mut steps)?;
    register_summary_step(&mut steps)?;
    Ok(steps)
}

/// Ask/Search with an explicit confirm step before the summary
pub fn ask_or_search_with_confirm_steps() -> Result<StepSequence> {
    let mut steps = StepSequence::new();
    register_common_steps(&mut steps)?;

    steps.register("confirm_query", |ctx| {
        let ques = ctx
            .value_str(crate::profile::QUES_KEY)
            .ok_or_else(|| WaterfallError::InvalidInput("Missing result: ques".to_string()))?;
        ctx.notify(format!("Please wait while we search for {ques}."));
        Ok(StepOutcome::IssuePrompt {
            prompt_id: CONFIRM_PROMPT.to_string(),
            text: "Confirm?".to_string(),
            options: None,
        })
    })?;

    register_summary_step(&mut steps)?;
    Ok(steps)
}

fn register_common_steps(steps: &mut StepSequence) -> Result<()> {
    steps.register("choose_action", |_ctx| {
        Ok(StepOutcome::IssuePrompt {
            prompt_id: CHOICE_PROMPT.to_string(),
            text: "Choose your option wisely!".to_string(),
            options: None,
        })
    })?;

    // Records the validated choice under "qtype".
    steps.register(crate::profile::QTYPE_KEY, |ctx| {
        let choice = ctx
            .reply_text()
            .ok_or_else(|| WaterfallError::InvalidInput("Expected a choice reply".to_string()))?;
        Ok(StepOutcome::Advance(serde_json::json!(choice)))
    })?;

    steps.register("ask_query", |ctx| {
        let qtype = ctx
            .value_str(crate::profile::QTYPE_KEY)
            .ok_or_else(|| WaterfallError::InvalidInput("Missing result: qtype".to_string()))?;
        Ok(StepOutcome::IssuePrompt {
            prompt_id: TEXT_PROMPT.to_string(),
            text: format!("What do you want to {qtype} for?"),
            options: None,
        })
    })?;

    // Records the free-text query under "ques".
    steps.register(crate::profile::QUES_KEY, |ctx| {
        let text = ctx
            .reply_text()
            .ok_or_else(|| WaterfallError::InvalidInput("Expected a text reply".to_string()))?;
        Ok(StepOutcome::Advance(serde_json::json!(text)))
    })?;

    Ok(())
}

fn register_summary_step(steps: &mut StepSequence) -> Result<()> {
    steps.register("summary", |ctx| {
        let outcome = match ctx.reply() {
            Some(ReplyValue::Confirm(false)) => FinalOutcome::Declined,
            _ => FinalOutcome::Confirmed,
        };
        Ok(StepOutcome::Complete(outcome))
    })
}
