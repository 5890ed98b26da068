use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ConversationStore, StateUpdate};
use crate::error::StoreResult;
use crate::tutoring::TutoringState;

/// Process-local store backed by a map under one lock
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<String, TutoringState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_or_create(&self, id: &str) -> StoreResult<TutoringState> {
        let mut states = self.states.write().await;
        let state = states.entry(id.to_string()).or_insert_with(|| {
            info!(conversation_id = %id, "Created conversation state");
            TutoringState::new(id)
        });
        Ok(state.clone())
    }

    async fn update(&self, id: &str, update: StateUpdate) -> StoreResult<TutoringState> {
        let mut states = self.states.write().await;
        let state = states
            .entry(id.to_string())
            .or_insert_with(|| TutoringState::new(id));
        update.apply(state);
        debug!(conversation_id = %id, phase = %state.current_phase, "Updated conversation state");
        Ok(state.clone())
    }

    async fn commit(&self, state: TutoringState) -> StoreResult<()> {
        let mut states = self.states.write().await;
        debug!(
            conversation_id = %state.conversation_id,
            phase = %state.current_phase,
            "Committed conversation state"
        );
        states.insert(state.conversation_id.clone(), state);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<TutoringState>> {
        Ok(self.states.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let removed = self.states.write().await.remove(id).is_some();
        if removed {
            info!(conversation_id = %id, "Deleted conversation state");
        }
        Ok(removed)
    }

    async fn list_all(&self) -> StoreResult<HashMap<String, TutoringState>> {
        Ok(self.states.read().await.clone())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        let mut states = self.states.write().await;
        info!(count = states.len(), "Clearing all conversation states");
        states.clear();
        Ok(())
    }

    async fn conversation_count(&self) -> StoreResult<usize> {
        Ok(self.states.read().await.len())
    }
}
