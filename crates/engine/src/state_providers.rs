//! Backend-computed UI state (choice lists and the like) that is not part
//! of the settings document.
//!
//! States are broadcast to listeners by key. A listener registered for an
//! array element receives broadcasts addressed to that element or anything
//! below it; a listener without element address receives all of them.
//! Every broadcast is cached, so listeners that mount late are served the
//! closest cached state immediately.

use std::fmt;
use std::sync::Arc;

use dialog_paths::{ArrayIdentityRegistry, IndexId};
use serde_json::Value;

pub type StateListenerFn = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ListenerId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    Id(String),
    Scope {
        scope: String,
        provided_option_name: Option<String>,
    },
}

/// Element address of a broadcast. Positions are only used by states
/// computed before any index id existed (the initial updates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementPath {
    Ids(Vec<IndexId>),
    Positions(Vec<usize>),
}

impl ElementPath {
    fn len(&self) -> usize {
        match self {
            Self::Ids(ids) => ids.len(),
            Self::Positions(positions) => positions.len(),
        }
    }
}

/// Where a broadcast state is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocation {
    pub key: StateKey,
    pub settings_id: Option<String>,
    pub path: ElementPath,
}

/// What a listener is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerLocation {
    pub key: StateKey,
    pub settings_id: Option<String>,
    pub index_ids: Vec<IndexId>,
    pub indices: Vec<usize>,
}

impl ListenerLocation {
    pub fn id(id: impl Into<String>) -> Self {
        Self::for_key(StateKey::Id(id.into()))
    }

    pub fn scope(scope: impl Into<String>, provided_option_name: Option<String>) -> Self {
        Self::for_key(StateKey::Scope {
            scope: scope.into(),
            provided_option_name,
        })
    }

    fn for_key(key: StateKey) -> Self {
        Self {
            key,
            settings_id: None,
            index_ids: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn with_element(mut self, index_ids: Vec<IndexId>, indices: Vec<usize>) -> Self {
        self.index_ids = index_ids;
        self.indices = indices;
        self
    }

    pub fn with_settings_id(mut self, settings_id: impl Into<String>) -> Self {
        self.settings_id = Some(settings_id.into());
        self
    }

    fn same_key(&self, location: &StateLocation) -> bool {
        self.key == location.key && self.settings_id == location.settings_id
    }

    /// Whether a broadcast to `location` reaches this listener.
    fn is_invoked_by(&self, location: &StateLocation) -> bool {
        self.same_key(location)
            && match &location.path {
                ElementPath::Ids(ids) => is_prefix(&self.index_ids, ids),
                ElementPath::Positions(positions) => is_prefix(&self.indices, positions),
            }
    }
}

fn is_prefix<T: PartialEq>(prefix: &[T], full: &[T]) -> bool {
    prefix.len() <= full.len() && prefix.iter().zip(full).all(|(a, b)| a == b)
}

struct Listener {
    id: ListenerId,
    location: ListenerLocation,
    callback: StateListenerFn,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct StateProviderRegistry {
    next_id: ListenerId,
    listeners: Vec<Listener>,
    cache: Vec<(StateLocation, Value)>,
}

impl StateProviderRegistry {
    /// Register a listener. Returns its id and the cached state it should be
    /// served right away, if any.
    pub fn add_state_provider_listener(
        &mut self,
        location: ListenerLocation,
        callback: StateListenerFn,
    ) -> (ListenerId, Option<Value>) {
        let replay = self.cached_for(&location);
        self.next_id += 1;
        self.listeners.push(Listener {
            id: self.next_id,
            location,
            callback,
        });
        (self.next_id, replay)
    }

    pub fn remove_state_provider_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    /// Cache `value` for `location` and return the callbacks to invoke.
    pub fn call_state_provider_listener(
        &mut self,
        location: StateLocation,
        value: &Value,
    ) -> Vec<StateListenerFn> {
        let callbacks = self
            .listeners
            .iter()
            .filter(|listener| listener.location.is_invoked_by(&location))
            .map(|listener| listener.callback.clone())
            .collect();
        self.cache.retain(|(cached, _)| cached != &location);
        self.cache.push((location, value.clone()));
        callbacks
    }

    /// The closest cached state for a late listener: id-addressed states
    /// first, positional ones as fallback; among matches the one addressed
    /// most closely to the listener's element, the newest on ties.
    fn cached_for(&self, listener: &ListenerLocation) -> Option<Value> {
        let best_by = |wants_ids: bool| {
            self.cache
                .iter()
                .enumerate()
                .filter(|(_, (location, _))| {
                    matches!(location.path, ElementPath::Ids(_)) == wants_ids
                        && listener.is_invoked_by(location)
                })
                .min_by_key(|(order, (location, _))| {
                    (location.path.len(), std::cmp::Reverse(*order))
                })
                .map(|(_, (_, value))| value.clone())
        };
        best_by(true).or_else(|| best_by(false))
    }

    /// Drop the listeners and cached states of a torn-down settings panel.
    /// Returns the number of listeners removed.
    pub fn clear_settings(&mut self, settings_id: &str) -> usize {
        let other_panel = |id: &Option<String>| id.as_deref() != Some(settings_id);
        let before = self.listeners.len();
        self.listeners
            .retain(|listener| other_panel(&listener.location.settings_id));
        self.cache.retain(|(location, _)| other_panel(&location.settings_id));
        before - self.listeners.len()
    }

    /// Forget cached states addressed to elements that no longer exist.
    pub fn evict_removed_elements(&mut self, identities: &ArrayIdentityRegistry) {
        self.cache.retain(|(location, _)| match &location.path {
            ElementPath::Ids(ids) => ids.iter().all(|id| identities.get_index(id).is_some()),
            ElementPath::Positions(_) => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, StateListenerFn) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            seen,
            Arc::new(move |value: &Value| sink.lock().unwrap().push(value.clone())),
        )
    }

    fn ids(items: &[&str]) -> Vec<IndexId> {
        items.iter().map(|id| IndexId::new(*id)).collect()
    }

    fn broadcast(id: &str, path: ElementPath) -> StateLocation {
        StateLocation {
            key: StateKey::Id(id.into()),
            settings_id: None,
            path,
        }
    }

    fn deliver_to(registry: &mut StateProviderRegistry, location: StateLocation, value: Value) {
        for callback in registry.call_state_provider_listener(location, &value) {
            callback(&value);
        }
    }

    fn deliver(registry: &mut StateProviderRegistry, id: &str, path: ElementPath, value: Value) {
        deliver_to(registry, broadcast(id, path), value);
    }

    fn ignore() -> StateListenerFn {
        Arc::new(|_: &Value| {})
    }

    #[test]
    fn element_listener_receives_its_own_and_nested_broadcasts() {
        let mut registry = StateProviderRegistry::default();
        let (seen, callback) = recorder();
        registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_element(ids(&["a"]), vec![0]),
            callback,
        );

        deliver(&mut registry, "choices", ElementPath::Ids(ids(&["a"])), json!(1));
        deliver(&mut registry, "choices", ElementPath::Ids(ids(&["a", "x"])), json!(2));
        deliver(&mut registry, "choices", ElementPath::Ids(ids(&["b"])), json!(3));
        deliver(&mut registry, "other", ElementPath::Ids(ids(&["a"])), json!(4));

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn listener_without_element_receives_everything() {
        let mut registry = StateProviderRegistry::default();
        let (seen, callback) = recorder();
        registry.add_state_provider_listener(ListenerLocation::id("choices"), callback);

        deliver(&mut registry, "choices", ElementPath::Ids(ids(&["a"])), json!(1));
        deliver(&mut registry, "choices", ElementPath::Positions(vec![2]), json!(2));

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn late_listener_gets_closest_cached_state() {
        let mut registry = StateProviderRegistry::default();
        deliver(&mut registry, "choices", ElementPath::Ids(ids(&["a", "x"])), json!("nested"));
        deliver(&mut registry, "choices", ElementPath::Ids(ids(&["a"])), json!("exact"));
        deliver(&mut registry, "choices", ElementPath::Positions(vec![0]), json!("positional"));

        let (_, replay) = registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_element(ids(&["a"]), vec![0]),
            ignore(),
        );
        assert_eq!(replay, Some(json!("exact")));
    }

    #[test]
    fn positional_cache_is_the_fallback() {
        let mut registry = StateProviderRegistry::default();
        deliver(&mut registry, "choices", ElementPath::Positions(vec![1]), json!("initial"));

        let (_, replay) = registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_element(ids(&["b"]), vec![1]),
            ignore(),
        );
        assert_eq!(replay, Some(json!("initial")));

        let (_, none) = registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_element(ids(&["c"]), vec![2]),
            ignore(),
        );
        assert_eq!(none, None);
    }

    #[test]
    fn newer_broadcast_replaces_cached_state() {
        let mut registry = StateProviderRegistry::default();
        deliver(&mut registry, "choices", ElementPath::Ids(vec![]), json!(1));
        deliver(&mut registry, "choices", ElementPath::Ids(vec![]), json!(2));
        let (_, replay) =
            registry.add_state_provider_listener(ListenerLocation::id("choices"), ignore());
        assert_eq!(replay, Some(json!(2)));
    }

    #[test]
    fn removed_listener_is_not_called() {
        let mut registry = StateProviderRegistry::default();
        let (seen, callback) = recorder();
        let (id, _) =
            registry.add_state_provider_listener(ListenerLocation::id("choices"), callback);
        assert!(registry.remove_state_provider_listener(id));
        deliver(&mut registry, "choices", ElementPath::Ids(vec![]), json!(1));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn clearing_a_panel_drops_its_listeners_and_cache_only() {
        let mut registry = StateProviderRegistry::default();
        let (seen, callback) = recorder();
        registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_settings_id("panel"),
            callback,
        );
        let panel = StateLocation {
            settings_id: Some("panel".into()),
            ..broadcast("choices", ElementPath::Ids(vec![]))
        };
        deliver_to(&mut registry, panel.clone(), json!("panel"));
        deliver(&mut registry, "choices", ElementPath::Ids(vec![]), json!("global"));

        assert_eq!(registry.clear_settings("panel"), 1);
        deliver_to(&mut registry, panel, json!("after"));
        assert_eq!(*seen.lock().unwrap(), vec![json!("panel")]);

        registry.clear_settings("panel");
        let (_, replay) = registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_settings_id("panel"),
            ignore(),
        );
        assert_eq!(replay, None);
        let (_, global) =
            registry.add_state_provider_listener(ListenerLocation::id("choices"), ignore());
        assert_eq!(global, Some(json!("global")));
    }

    #[test]
    fn states_of_removed_elements_are_evicted() {
        let mut identities = ArrayIdentityRegistry::new();
        let data_paths = vec!["rows".to_string(), "v".to_string()];
        let first = identities.to_index_ids(&data_paths, &[0]);
        let second = identities.to_index_ids(&data_paths, &[1]);
        let mut registry = StateProviderRegistry::default();
        deliver(&mut registry, "choices", ElementPath::Ids(first.clone()), json!("first"));
        deliver(&mut registry, "choices", ElementPath::Ids(second.clone()), json!("second"));

        identities.element_removed("rows", 0);
        registry.evict_removed_elements(&identities);

        assert_eq!(registry.cache.len(), 1);
        let (_, replay) = registry.add_state_provider_listener(
            ListenerLocation::id("choices").with_element(second, vec![0]),
            ignore(),
        );
        assert_eq!(replay, Some(json!("second")));
    }
}
