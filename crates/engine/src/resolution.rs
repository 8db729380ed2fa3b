//! Interpreting update results against the live settings tree.
//!
//! Value results are written leaf by leaf, skipping flow-variable controlled
//! paths and leaves that already hold the value; only real writes are
//! reported as changed and feed the cascade. UI-state results never touch
//! the tree and are broadcast to state-provider listeners instead.

use dialog_paths::tree::{get_path, set_path};
use dialog_paths::{write_targets, ArrayIdentityRegistry, IndexId};
use dialog_protocol::{IndexRef, IndexedValue, StateTarget, UpdateDescriptor, UpdateResult};
use log::{debug, warn};
use serde_json::Value;

use crate::error::Result;
use crate::session::SessionState;
use crate::state_providers::{ElementPath, StateKey, StateListenerFn, StateLocation};

/// An update declared by the backend, bound to the settings panel it was
/// registered for.
#[derive(Debug)]
pub struct RegisteredUpdate {
    pub descriptor: UpdateDescriptor,
    pub settings_id: Option<String>,
}

impl RegisteredUpdate {
    pub fn new(descriptor: UpdateDescriptor, settings_id: Option<String>) -> Self {
        Self {
            descriptor,
            settings_id,
        }
    }
}

/// Side effects of applying results, delivered once the session lock is
/// released.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) changed: Vec<(String, Value)>,
    pub(crate) states: Vec<(StateListenerFn, Value)>,
    pub(crate) alerts: Vec<String>,
}

impl Effects {
    pub(crate) fn changed(path: &str, value: Value) -> Self {
        Self {
            changed: vec![(path.to_string(), value)],
            ..Self::default()
        }
    }

    /// A backend-reported failure: alerts only, the tree stays untouched.
    pub(crate) fn failed(messages: Vec<String>) -> Self {
        Self {
            alerts: messages,
            ..Self::default()
        }
    }
}

impl SessionState {
    /// Apply a batch of results. A value that cannot be written is reported
    /// as an alert and skipped; everything else in the batch still lands.
    pub(crate) fn apply_update_results(
        &mut self,
        results: Vec<UpdateResult>,
        settings_id: Option<&str>,
    ) -> Effects {
        let mut effects = Effects::default();
        for result in results {
            match result {
                UpdateResult::Value { scope, values } => {
                    for indexed in values {
                        if let Err(err) = self.write_value(&scope, indexed, &mut effects) {
                            warn!("Skipping value for {scope}: {err}");
                            effects.alerts.push(err.to_string());
                        }
                    }
                }
                UpdateResult::UiState {
                    target,
                    provided_option_name,
                    values,
                } => {
                    let key = match target {
                        StateTarget::Id(id) => StateKey::Id(id),
                        StateTarget::Scope(scope) => StateKey::Scope {
                            scope,
                            provided_option_name,
                        },
                    };
                    for IndexedValue { indices, value } in values {
                        let Some(path) = element_path(&indices, &self.identities) else {
                            debug!("Dropping ui state for removed element {indices:?}");
                            continue;
                        };
                        let location = StateLocation {
                            key: key.clone(),
                            settings_id: settings_id.map(str::to_string),
                            path,
                        };
                        for callback in self
                            .state_providers
                            .call_state_provider_listener(location, &value)
                        {
                            effects.states.push((callback, value.clone()));
                        }
                    }
                }
            }
        }
        if !effects.changed.is_empty() {
            self.reconcile_identities();
        }
        effects
    }

    /// Writes leaf by leaf; leaves written before a failing one are already
    /// recorded in `effects`.
    fn write_value(
        &mut self,
        scope: &str,
        indexed: IndexedValue,
        effects: &mut Effects,
    ) -> Result<()> {
        let Some(positions) = self.identities.resolve_refs(&indexed.indices) else {
            debug!("Dropping value for {scope}: element no longer exists");
            return Ok(());
        };
        for target in write_targets(&self.data, scope, &positions)? {
            // Control status is checked at write time; cascades may change it.
            if self.flow_variables.is_controlled(&target.path) {
                debug!("Skipping {}: controlled by a flow variable", target.path);
                continue;
            }
            if get_path(&self.data, &target.path) == Some(&indexed.value) {
                continue;
            }
            set_path(&mut self.data, &target.path, indexed.value.clone())?;
            effects.changed.push((target.path, indexed.value.clone()));
        }
        Ok(())
    }

    /// Whether applying `results` would change anything: any UI state, or
    /// any writable leaf whose current value differs.
    pub(crate) fn would_change(&self, results: &[UpdateResult]) -> Result<bool> {
        for result in results {
            let (scope, values) = match result {
                UpdateResult::UiState { .. } => return Ok(true),
                UpdateResult::Value { scope, values } => (scope, values),
            };
            for indexed in values {
                let Some(positions) = self.identities.resolve_refs(&indexed.indices) else {
                    continue;
                };
                for target in write_targets(&self.data, scope, &positions)? {
                    if !self.flow_variables.is_controlled(&target.path)
                        && get_path(&self.data, &target.path) != Some(&indexed.value)
                    {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Element address of a UI-state value: ids when the backend echoed ids,
/// positions otherwise. `None` when an id no longer resolves.
fn element_path(indices: &[IndexRef], identities: &ArrayIdentityRegistry) -> Option<ElementPath> {
    let ids: Option<Vec<IndexId>> = indices
        .iter()
        .map(|index| match index {
            IndexRef::Id(id) => Some(IndexId::new(id.as_str())),
            IndexRef::Position(_) => None,
        })
        .collect();
    match ids {
        Some(ids) => {
            if ids.iter().any(|id| identities.get_index(id).is_none()) {
                return None;
            }
            Some(ElementPath::Ids(ids))
        }
        None => identities.resolve_refs(indices).map(ElementPath::Positions),
    }
}
