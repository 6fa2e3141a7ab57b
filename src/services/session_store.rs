//! In-memory form sessions, one per user.
//!
//! A session is identified by a fresh UUID each time it starts. Writes that
//! follow an await point (the rate lookup) pass the id they started from, so
//! a session that was cancelled or restarted meanwhile is never overwritten.

use crate::services::order_form::FormState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FormSession {
    pub id: Uuid,
    pub user_id: i64,
    pub state: FormState,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, FormSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh session, discarding any previous one for this user.
    pub async fn start(&self, user_id: i64) -> FormSession {
        let session = FormSession {
            id: Uuid::new_v4(),
            user_id,
            state: FormState::Service,
            started_at: Utc::now(),
        };
        let previous = self
            .sessions
            .write()
            .await
            .insert(user_id, session.clone());
        if let Some(previous) = previous {
            debug!(user_id = user_id, superseded = %previous.id, "form session superseded");
        }
        session
    }

    pub async fn get(&self, user_id: i64) -> Option<FormSession> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    /// Store `state` only if the user's session is still `expected_id`.
    pub async fn replace(&self, user_id: i64, expected_id: Uuid, state: FormState) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&user_id) {
            Some(session) if session.id == expected_id => {
                session.state = state;
                true
            }
            _ => false,
        }
    }

    pub async fn remove(&self, user_id: i64) -> Option<FormSession> {
        self.sessions.write().await.remove(&user_id)
    }

    /// Remove the session only if it is still `expected_id`.
    pub async fn remove_if(&self, user_id: i64, expected_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.get(&user_id).map(|s| s.id) == Some(expected_id) {
            sessions.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
