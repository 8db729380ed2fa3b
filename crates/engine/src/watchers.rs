//! Value watchers: reactions to changes below a set of scopes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dialog_paths::{
    get_indices_from_data_paths, scope_to_data_paths, ArrayIdentityRegistry, IndexId, PathError,
};
use serde_json::Value;

use crate::resolution::RegisteredUpdate;

pub type WatcherId = u64;

/// Synchronous transformation of the settings tree.
pub type TransformFn = Arc<dyn Fn(&mut Value, &WatchContext) + Send + Sync>;

/// Why a watcher fired: the changed path and the array element it lies in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchContext {
    pub changed_path: String,
    pub indices: Vec<usize>,
    pub index_ids: Vec<IndexId>,
}

#[derive(Clone)]
pub enum WatcherAction {
    Transform(TransformFn),
    Update(Arc<RegisteredUpdate>),
}

impl fmt::Debug for WatcherAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform(_) => f.write_str("Transform(..)"),
            Self::Update(update) => f.debug_tuple("Update").field(update).finish(),
        }
    }
}

#[derive(Debug)]
struct Watcher {
    id: WatcherId,
    data_paths: Vec<Vec<String>>,
    action: WatcherAction,
}

#[derive(Debug, Clone)]
pub struct TriggeredWatcher {
    pub id: WatcherId,
    pub action: WatcherAction,
    pub context: WatchContext,
}

#[derive(Debug, Default)]
pub struct WatcherRegistry {
    next_id: WatcherId,
    watchers: Vec<Watcher>,
}

impl WatcherRegistry {
    pub fn register(
        &mut self,
        scopes: &[String],
        action: WatcherAction,
    ) -> Result<WatcherId, PathError> {
        let data_paths = scopes
            .iter()
            .map(|scope| scope_to_data_paths(scope))
            .collect::<Result<Vec<_>, _>>()?;
        self.next_id += 1;
        self.watchers.push(Watcher {
            id: self.next_id,
            data_paths,
            action,
        });
        Ok(self.next_id)
    }

    pub fn unregister(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|watcher| watcher.id != id);
        self.watchers.len() != before
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&WatcherAction) -> bool) {
        self.watchers.retain(|watcher| keep(&watcher.action));
    }

    /// Watchers affected by any of `changed_paths`, in registration order,
    /// at most once per (watcher, element).
    pub fn triggered(
        &self,
        changed_paths: &[String],
        identities: &mut ArrayIdentityRegistry,
    ) -> Vec<TriggeredWatcher> {
        let mut seen: HashSet<(WatcherId, Vec<IndexId>)> = HashSet::new();
        let mut triggered = Vec::new();
        for watcher in &self.watchers {
            for path in changed_paths {
                let Some(matched) = get_indices_from_data_paths(&watcher.data_paths, path) else {
                    continue;
                };
                let index_ids = identities.to_index_ids(&matched.data_paths, &matched.indices);
                if !seen.insert((watcher.id, index_ids.clone())) {
                    continue;
                }
                triggered.push(TriggeredWatcher {
                    id: watcher.id,
                    action: watcher.action.clone(),
                    context: WatchContext {
                        changed_path: path.clone(),
                        indices: matched.indices,
                        index_ids,
                    },
                });
            }
        }
        triggered
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}
