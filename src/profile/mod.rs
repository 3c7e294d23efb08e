//! User profile finalization
//!
//! On sequence completion the accumulated result bag is merged into a
//! durable [`UserProfile`] and a confirmation reply is produced for the
//! transport. A declined confirmation persists nothing and yields a
//! "not kept" notice instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::steps::{FinalOutcome, ResultBag};
use crate::transport::{Attachment, OutboundMessage};
use crate::utils::errors::{Result, WaterfallError};

/// Result-bag key holding the chosen action
pub const QTYPE_KEY: &str = "qtype";

/// Result-bag key holding the free-text query
pub const QUES_KEY: &str = "ques";

/// Durable user profile written at sequence completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "Qtype")]
    pub qtype: String,
    #[serde(rename = "Ques")]
    pub ques: String,
}

/// Durable user-profile storage, keyed by conversation id.
///
/// External collaborator seam: hosts back this with whatever storage the
/// platform provides.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, conversation_id: &str) -> Result<Option<UserProfile>>;
    async fn set(&self, conversation_id: &str, profile: UserProfile) -> Result<()>;
}

/// In-memory profile store
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(conversation_id).cloned())
    }

    async fn set(&self, conversation_id: &str, profile: UserProfile) -> Result<()> {
        debug!(conversation_id = conversation_id, "Storing user profile");
        self.profiles
            .write()
            .await
            .insert(conversation_id.to_string(), profile);
        Ok(())
    }
}

/// Maps a completed result bag onto a persisted profile and formats the
/// terminal reply
pub struct ProfileFinalizer {
    store: Arc<dyn ProfileStore>,
}

impl ProfileFinalizer {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Finalize a completed sequence
    pub async fn finalize(
        &self,
        conversation_id: &str,
        values: &ResultBag,
        outcome: FinalOutcome,
    ) -> Result<Vec<OutboundMessage>> {
        match outcome {
            FinalOutcome::Declined => {
                info!(conversation_id = conversation_id, "Profile declined, nothing persisted");
                Ok(vec![OutboundMessage::text(
                    "Thanks. Your profile will not be kept.",
                )])
            }
            FinalOutcome::Confirmed => {
                let qtype = bag_string(values, QTYPE_KEY)?;
                let ques = bag_string(values, QUES_KEY)?;

                let profile = UserProfile {
                    qtype: qtype.clone(),
                    ques: ques.clone(),
                };
                self.store.set(conversation_id, profile).await?;

                info!(conversation_id = conversation_id, qtype = %qtype,
                      "User profile persisted");

                let summary = OutboundMessage::text(format!("You {qtype}ed for {ques}."))
                    .with_attachment(reference_document());
                Ok(vec![summary])
            }
        }
    }
}

impl std::fmt::Debug for ProfileFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileFinalizer").finish_non_exhaustive()
    }
}

fn bag_string(values: &ResultBag, key: &str) -> Result<String> {
    values
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| WaterfallError::InvalidInput(format!("Missing result: {key}")))
}

/// Reference document attached to the confirmation reply
fn reference_document() -> Attachment {
    Attachment {
        name: "pdf.pdf".to_string(),
        content_type: "doc/pdf".to_string(),
        url: "http://www.pdf995.com/samples/pdf.pdf".to_string(),
    }
}
