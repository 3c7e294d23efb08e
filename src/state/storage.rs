//! Conversation state persistence
//!
//! This module defines the state store contract and two implementations:
//! an in-process map for tests and single-node hosts, and a Redis store
//! with key prefixing and TTL-based expiry.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::config::RedisConfig;
use crate::utils::errors::Result;

use super::context::ConversationState;

/// Contract for persisting per-conversation state between inbound messages.
///
/// `load` returning `Ok(None)` is the normal "fresh sequence" signal, not
/// an error. Writes must be atomic per conversation id; the engine
/// additionally serializes load-modify-save cycles per conversation.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>>;
    async fn save(&self, state: &ConversationState) -> Result<()>;
    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

/// In-memory state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations (expired entries included)
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        let expired = {
            let states = self.states.read().await;
            match states.get(conversation_id) {
                Some(state) if state.is_expired() => true,
                Some(state) => return Ok(Some(state.clone())),
                None => return Ok(None),
            }
        };

        if expired {
            warn!(conversation_id = conversation_id, "State has expired, removing");
            self.states.write().await.remove(conversation_id);
        }
        Ok(None)
    }

    async fn save(&self, state: &ConversationState) -> Result<()> {
        debug!(conversation_id = %state.conversation_id, step = state.current_step,
               pending_prompt = ?state.pending_prompt, "Saving state");
        self.states
            .write()
            .await
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.states.write().await.remove(conversation_id);
        debug!(conversation_id = conversation_id, "Cleared state");
        Ok(())
    }
}

/// Redis-based state store
#[derive(Clone)]
pub struct RedisStateStore {
    connection_manager: redis::aio::ConnectionManager,
    config: RedisConfig,
}

impl RedisStateStore {
    /// Create a new Redis-backed store
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection_manager = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            config,
        })
    }

    fn state_key(&self, conversation_id: &str) -> String {
        format!("{}state:{}", self.config.prefix, conversation_id)
    }

    /// Test Redis connection
    pub async fn test_connection(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        let key = self.state_key(conversation_id);
        debug!(conversation_id = conversation_id, key = %key, "Loading state from Redis");

        let mut conn = self.connection_manager.clone();
        let serialized: Option<String> = conn.get(&key).await.map_err(|e| {
            error!(conversation_id = conversation_id, error = %e, "Failed to get state from Redis");
            e
        })?;

        let Some(data) = serialized else {
            debug!(conversation_id = conversation_id, "No state found in Redis");
            return Ok(None);
        };

        let state: ConversationState = serde_json::from_str(&data).map_err(|e| {
            error!(conversation_id = conversation_id, error = %e, "Failed to deserialize state");
            e
        })?;

        if state.is_expired() {
            warn!(conversation_id = conversation_id, expires_at = ?state.expires_at,
                  "State has expired, removing");
            self.clear(conversation_id).await?;
            return Ok(None);
        }

        debug!(conversation_id = conversation_id, step = state.current_step,
               pending_prompt = ?state.pending_prompt, "State loaded");
        Ok(Some(state))
    }

    async fn save(&self, state: &ConversationState) -> Result<()> {
        let key = self.state_key(&state.conversation_id);
        debug!(conversation_id = %state.conversation_id, key = %key,
               step = state.current_step, pending_prompt = ?state.pending_prompt,
               "Saving state to Redis");

        let serialized = serde_json::to_string(state)?;

        let ttl_seconds = match state.expires_at {
            Some(expires_at) => {
                let duration = expires_at - chrono::Utc::now();
                std::cmp::max(duration.num_seconds(), 60) as u64 // Minimum 60 seconds
            }
            None => self.config.ttl_seconds,
        };

        let mut conn = self.connection_manager.clone();
        conn.set_ex::<_, _, ()>(&key, serialized, ttl_seconds)
            .await
            .map_err(|e| {
                error!(conversation_id = %state.conversation_id, error = %e,
                       "Failed to save state to Redis");
                e
            })?;

        debug!(conversation_id = %state.conversation_id, ttl_seconds = ttl_seconds,
               "State saved to Redis");
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let key = self.state_key(conversation_id);
        let mut conn = self.connection_manager.clone();

        let deleted: u32 = conn.del(&key).await?;
        if deleted > 0 {
            debug!(conversation_id = conversation_id, "Deleted state");
        }
        Ok(())
    }
}
