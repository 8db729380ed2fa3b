//! Last-writer-wins bookkeeping for overlapping updates.
//!
//! Every update issued for a key gets a fresh token. When the backend
//! answers, the result is only applied if the token is still the current
//! one for its key; a re-trigger in the meantime silently supersedes it.

use std::collections::HashMap;

use dialog_paths::IndexId;

/// The logical target of an update: the watcher or trigger that started it
/// and the array element it was started for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RaceKey {
    pub owner: String,
    pub index_ids: Vec<IndexId>,
}

impl RaceKey {
    pub fn new(owner: impl Into<String>, index_ids: Vec<IndexId>) -> Self {
        Self {
            owner: owner.into(),
            index_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceTicket {
    key: RaceKey,
    token: u64,
}

#[derive(Debug)]
pub struct AbortCoordinator {
    current: HashMap<RaceKey, u64>,
    next_token: u64,
}

impl Default for AbortCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortCoordinator {
    fn random_u64_best_effort() -> Option<u64> {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    pub fn new() -> Self {
        Self {
            current: HashMap::new(),
            next_token: Self::random_u64_best_effort().unwrap_or(1),
        }
    }

    /// Stamp a new operation for `key`, superseding any operation in flight.
    pub fn issue(&mut self, key: RaceKey) -> RaceTicket {
        self.next_token = self.next_token.wrapping_add(1);
        self.current.insert(key.clone(), self.next_token);
        RaceTicket {
            key,
            token: self.next_token,
        }
    }

    pub fn is_current(&self, ticket: &RaceTicket) -> bool {
        self.current.get(&ticket.key) == Some(&ticket.token)
    }

    /// Settle an operation. Returns whether its result may be applied.
    pub fn finish(&mut self, ticket: &RaceTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.current.remove(&ticket.key);
        true
    }

    pub fn in_flight(&self) -> usize {
        self.current.len()
    }
}
