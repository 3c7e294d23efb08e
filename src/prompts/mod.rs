//! Prompt registry and reply validation
//!
//! Prompts are registered once at startup and looked up by id whenever a
//! step suspends on user input. Validation turns a raw inbound string into
//! a typed [`ReplyValue`], or rejects it with the prompt's retry text so
//! the engine can re-issue the prompt without advancing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::errors::{Result, WaterfallError};

/// Affirmative tokens accepted by confirm prompts (case-insensitive)
const AFFIRMATIVE_TOKENS: &[&str] = &["yes", "y", "true", "ok", "confirm"];

/// Negative tokens accepted by confirm prompts (case-insensitive)
const NEGATIVE_TOKENS: &[&str] = &["no", "n", "false", "cancel"];

/// Expected input shape of a prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PromptKind {
    /// One of an ordered set of labels, matched case-insensitively
    Choice { options: Vec<String> },
    /// Any non-empty string, with optional length/pattern constraints
    FreeText {
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<String>,
    },
    /// A fixed affirmative/negative token set
    Confirm,
}

/// An immutable prompt definition, registered once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Prompt identifier
    pub id: String,
    /// Expected input shape
    pub kind: PromptKind,
    /// Text re-issued to the user when their reply fails validation
    pub retry_text: String,
}

impl PromptDefinition {
    /// Create a choice prompt over an ordered set of labels
    pub fn choice<I, S>(id: impl Into<String>, options: I, retry_text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            kind: PromptKind::Choice {
                options: options.into_iter().map(Into::into).collect(),
            },
            retry_text: retry_text.into(),
        }
    }

    /// Create an unconstrained free-text prompt
    pub fn free_text(id: impl Into<String>, retry_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PromptKind::FreeText {
                min_length: None,
                max_length: None,
                pattern: None,
            },
            retry_text: retry_text.into(),
        }
    }

    /// Create a yes/no confirm prompt
    pub fn confirm(id: impl Into<String>, retry_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PromptKind::Confirm,
            retry_text: retry_text.into(),
        }
    }

    /// Selectable labels the transport should render for this prompt
    pub fn default_options(&self) -> Option<Vec<String>> {
        match &self.kind {
            PromptKind::Choice { options } => Some(options.clone()),
            PromptKind::Confirm => Some(vec!["yes".to_string(), "no".to_string()]),
            PromptKind::FreeText { .. } => None,
        }
    }
}

/// A validated reply value produced by prompt validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplyValue {
    /// Canonical label of the matched choice
    Choice(String),
    /// Trimmed free text
    Text(String),
    /// Confirm outcome
    Confirm(bool),
}

impl ReplyValue {
    /// Text payload of a choice or free-text reply
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ReplyValue::Choice(s) | ReplyValue::Text(s) => Some(s),
            ReplyValue::Confirm(_) => None,
        }
    }

    /// Boolean payload of a confirm reply
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ReplyValue::Confirm(b) => Some(*b),
            _ => None,
        }
    }

    /// Reply as a result-bag value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ReplyValue::Choice(s) | ReplyValue::Text(s) => serde_json::Value::String(s.clone()),
            ReplyValue::Confirm(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// Outcome of validating a raw reply against a prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Reply accepted; the engine feeds the value to the next step
    Accepted(ReplyValue),
    /// Reply rejected; the engine re-issues the prompt with this text
    Rejected { retry_text: String },
}

/// Mapping from prompt identifiers to prompt definitions
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt definition, failing on a reused id
    pub fn register(&mut self, definition: PromptDefinition) -> Result<()> {
        if self.prompts.contains_key(&definition.id) {
            return Err(WaterfallError::DuplicateId(definition.id));
        }

        if let PromptKind::FreeText {
            pattern: Some(ref pattern),
            ..
        } = definition.kind
        {
            regex::Regex::new(pattern)
                .map_err(|e| WaterfallError::Config(format!("Invalid prompt pattern: {e}")))?;
        }

        self.prompts.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Look up a prompt definition by id
    pub fn get(&self, prompt_id: &str) -> Option<&PromptDefinition> {
        self.prompts.get(prompt_id)
    }

    /// Validate a raw reply against the named prompt
    pub fn validate(&self, prompt_id: &str, raw_reply: &str) -> Result<ValidationOutcome> {
        let definition = self
            .prompts
            .get(prompt_id)
            .ok_or_else(|| WaterfallError::UnknownPrompt(prompt_id.to_string()))?;

        let trimmed = raw_reply.trim();
        let rejected = ValidationOutcome::Rejected {
            retry_text: definition.retry_text.clone(),
        };

        let outcome = match &definition.kind {
            PromptKind::Choice { options } => {
                match options.iter().find(|o| o.eq_ignore_ascii_case(trimmed)) {
                    Some(label) => ValidationOutcome::Accepted(ReplyValue::Choice(label.clone())),
                    None => rejected,
                }
            }
            PromptKind::FreeText {
                min_length,
                max_length,
                pattern,
            } => {
                if trimmed.is_empty() {
                    return Ok(rejected);
                }
                if let Some(min) = min_length {
                    if trimmed.chars().count() < *min {
                        return Ok(rejected);
                    }
                }
                if let Some(max) = max_length {
                    if trimmed.chars().count() > *max {
                        return Ok(rejected);
                    }
                }
                if let Some(pattern) = pattern {
                    let re = regex::Regex::new(pattern)
                        .map_err(|_| WaterfallError::Config("Invalid prompt pattern".to_string()))?;
                    if !re.is_match(trimmed) {
                        return Ok(rejected);
                    }
                }
                ValidationOutcome::Accepted(ReplyValue::Text(trimmed.to_string()))
            }
            PromptKind::Confirm => {
                let lowered = trimmed.to_ascii_lowercase();
                if AFFIRMATIVE_TOKENS.contains(&lowered.as_str()) {
                    ValidationOutcome::Accepted(ReplyValue::Confirm(true))
                } else if NEGATIVE_TOKENS.contains(&lowered.as_str()) {
                    ValidationOutcome::Accepted(ReplyValue::Confirm(false))
                } else {
                    rejected
                }
            }
        };

        Ok(outcome)
    }
}
