//! # In-Memory Sessions
//!
//! Conversation history keyed by `(app_name, user_id, session_id)`. Sessions
//! live for the lifetime of the process only.

use crate::{errors::Nl2SqlError, providers::ai::Content};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub history: Vec<Content>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type SessionKey = (String, String, String);

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (
        app_name.to_string(),
        user_id.to_string(),
        session_id.to_string(),
    )
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session. A random id is generated when `session_id` is `None`.
    pub async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<Session, Nl2SqlError> {
        let id = session_id
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut sessions = self.sessions.write().await;
        let k = key(app_name, user_id, &id);
        if sessions.contains_key(&k) {
            return Err(Nl2SqlError::Session(format!(
                "session '{id}' already exists for user '{user_id}' in app '{app_name}'"
            )));
        }

        let now = Utc::now();
        let session = Session {
            id,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        debug!(session_id = %session.id, user_id, "Created session");
        sessions.insert(k, session.clone());
        Ok(session)
    }

    pub async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(&key(app_name, user_id, session_id))
            .cloned()
    }

    /// Returns the user's sessions, oldest first.
    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.app_name == app_name && s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Removes a session. Returns `false` if it did not exist.
    pub async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        self.sessions
            .write()
            .await
            .remove(&key(app_name, user_id, session_id))
            .is_some()
    }

    /// Appends completed turns to a session's history.
    pub async fn append(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        turns: Vec<Content>,
    ) -> Result<(), Nl2SqlError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&key(app_name, user_id, session_id))
            .ok_or_else(|| Nl2SqlError::Session(format!("session '{session_id}' not found")))?;
        session.history.extend(turns);
        session.updated_at = Utc::now();
        Ok(())
    }
}
