//! Process-wide table of active deck sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::driver::DeckId;
use crate::session::DeckSession;

/// Owned by the daemon and mutated only by the discovery loop.
#[derive(Default)]
pub struct DeckRegistry {
    sessions: Mutex<HashMap<DeckId, Arc<DeckSession>>>,
}

impl DeckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<DeckSession>) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.deck_id().clone(), session);
    }

    pub fn remove(&self, id: &DeckId) -> Option<Arc<DeckSession>> {
        self.sessions.lock().unwrap().remove(id)
    }

    pub fn contains(&self, id: &DeckId) -> bool {
        self.sessions.lock().unwrap().contains_key(id)
    }

    /// Current sessions, cloned out so callers never iterate under the lock.
    pub fn snapshot(&self) -> Vec<Arc<DeckSession>> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }
}
