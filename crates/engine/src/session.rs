//! One open settings dialog.
//!
//! All mutable state of a dialog lives behind a single mutex owned by the
//! session. The lock is never held across a backend call, and listener
//! callbacks run after it has been released. Watcher transforms and custom
//! trigger callbacks receive the tree mutably and therefore run under the
//! lock; they must not call back into the session. Whatever they change is
//! announced to change listeners and resolved like any other edit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dialog_paths::tree::{self, changed_paths, get_path, set_path};
use dialog_paths::{collect_dependencies, scope_to_data_paths, ArrayIdentityRegistry, IndexId};
use dialog_protocol::{
    Alert, FlowVariableSetting, FlowVariableSettings, InitialPayload, OverrideValue, RpcResponse,
    Trigger, UpdateDescriptor, ValidationKind,
};
use log::{debug, warn};
use serde_json::Value;

use crate::backend::{AlertSink, JsonDataService, Transport};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::flow_variables::FlowVariableOverrides;
use crate::races::{AbortCoordinator, RaceKey};
use crate::resolution::{Effects, RegisteredUpdate};
use crate::state_providers::{ListenerId, ListenerLocation, StateListenerFn, StateProviderRegistry};
use crate::triggers::{
    IsActiveFn, RegisteredTrigger, TriggerAction, TriggerFn, TriggerInvocation, TriggerRegistry,
};
use crate::watchers::{TransformFn, WatcherAction, WatcherId, WatcherRegistry};

/// Downstream listener for value changes: `(data path, new value)`.
pub type ChangeFn = Arc<dyn Fn(&str, &Value) + Send + Sync>;
pub type ChangeListenerId = u64;

pub(crate) struct SessionState {
    pub(crate) data: Value,
    pub(crate) identities: ArrayIdentityRegistry,
    pub(crate) watchers: WatcherRegistry,
    pub(crate) triggers: TriggerRegistry,
    pub(crate) state_providers: StateProviderRegistry,
    pub(crate) flow_variables: FlowVariableOverrides,
    pub(crate) races: AbortCoordinator,
    change_listeners: Vec<(ChangeListenerId, ChangeFn)>,
    next_change_listener: ChangeListenerId,
}

impl SessionState {
    pub(crate) fn new(data: Value, flow_variable_settings: FlowVariableSettings) -> Self {
        Self {
            data,
            identities: ArrayIdentityRegistry::new(),
            watchers: WatcherRegistry::default(),
            triggers: TriggerRegistry::default(),
            state_providers: StateProviderRegistry::default(),
            flow_variables: FlowVariableOverrides::new(flow_variable_settings),
            races: AbortCoordinator::new(),
            change_listeners: Vec::new(),
            next_change_listener: 0,
        }
    }

    /// Drop identities of elements the tree no longer holds, together with
    /// the UI state cached for them.
    pub(crate) fn reconcile_identities(&mut self) {
        self.identities.reconcile(&self.data);
        self.state_providers.evict_removed_elements(&self.identities);
    }

    /// Run a callback that edits the tree and report what it changed.
    fn edit_tree(&mut self, edit: impl FnOnce(&mut Value)) -> Effects {
        let before = self.data.clone();
        edit(&mut self.data);
        let changed = changed_paths(&before, &self.data);
        if changed.is_empty() {
            return Effects::default();
        }
        self.reconcile_identities();
        let mut effects = Effects::default();
        for path in changed {
            let value = get_path(&self.data, &path).cloned().unwrap_or(Value::Null);
            effects.changed.push((path, value));
        }
        effects
    }
}

#[derive(Clone)]
pub struct DialogSession {
    state: Arc<Mutex<SessionState>>,
    service: JsonDataService,
    alerts: Arc<dyn AlertSink>,
    config: EngineConfig,
}

impl DialogSession {
    /// Open a dialog: seed the tree, apply the precomputed initial updates
    /// and register the global ones.
    pub async fn open(
        payload: InitialPayload,
        transport: Arc<dyn Transport>,
        alerts: Arc<dyn AlertSink>,
        config: EngineConfig,
    ) -> Result<Self> {
        let InitialPayload {
            data,
            global_updates,
            initial_updates,
            flow_variable_settings,
            ..
        } = payload;
        let session = Self {
            state: Arc::new(Mutex::new(SessionState::new(data, flow_variable_settings))),
            service: JsonDataService::new(transport, config.backend_timeout),
            alerts,
            config,
        };
        let effects = session.lock().apply_update_results(initial_updates, None);
        session.deliver(effects);
        session.register_updates(None, global_updates).await?;
        Ok(session)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data(&self) -> Value {
        self.lock().data.clone()
    }

    pub fn get_value(&self, path: &str) -> Option<Value> {
        get_path(&self.lock().data, path).cloned()
    }

    /// Register backend-declared updates. Scope triggers become watchers, id
    /// triggers become registered triggers, and `triggerInitially` updates
    /// are resolved right away instead of being registered.
    pub async fn register_updates(
        &self,
        settings_id: Option<String>,
        updates: Vec<UpdateDescriptor>,
    ) -> Result<()> {
        let mut initial = Vec::new();
        {
            let mut state = self.lock();
            for descriptor in updates {
                let update = Arc::new(RegisteredUpdate::new(descriptor, settings_id.clone()));
                if update.descriptor.trigger.triggers_initially() {
                    initial.push(update);
                    continue;
                }
                match &update.descriptor.trigger {
                    Trigger::Scope { scope } => {
                        let scopes = [scope.clone()];
                        state
                            .watchers
                            .register(&scopes, WatcherAction::Update(update.clone()))?;
                    }
                    Trigger::Id { id, .. } => {
                        state.triggers.register(
                            id.clone(),
                            settings_id.clone(),
                            RegisteredTrigger {
                                action: TriggerAction::Update(update.clone()),
                                is_active: None,
                            },
                        );
                    }
                }
            }
        }
        for update in initial {
            let owner = format!("initial:{}", owner_suffix(&update));
            let changed = self.run_update(&update, &owner, Vec::new()).await?;
            self.resolve_changes(changed).await?;
        }
        Ok(())
    }

    /// Tear down a scoped sub-panel: its triggers, its update watchers and
    /// the UI state addressed to it.
    pub fn clear_scoped_updates(&self, settings_id: &str) {
        let mut state = self.lock();
        let triggers = state.triggers.clear(Some(settings_id));
        state.watchers.retain(|action| match action {
            WatcherAction::Update(update) => update.settings_id.as_deref() != Some(settings_id),
            WatcherAction::Transform(_) => true,
        });
        let listeners = state.state_providers.clear_settings(settings_id);
        debug!("Cleared panel {settings_id}: {triggers} triggers, {listeners} state listeners");
    }

    pub fn register_watcher(&self, scopes: &[String], transform: TransformFn) -> Result<WatcherId> {
        Ok(self
            .lock()
            .watchers
            .register(scopes, WatcherAction::Transform(transform))?)
    }

    pub fn unregister_watcher(&self, id: WatcherId) -> bool {
        self.lock().watchers.unregister(id)
    }

    pub fn register_trigger(
        &self,
        id: impl Into<String>,
        settings_id: Option<String>,
        is_active: Option<IsActiveFn>,
        callback: TriggerFn,
    ) {
        self.lock().triggers.register(
            id,
            settings_id,
            RegisteredTrigger {
                action: TriggerAction::Callback(callback),
                is_active,
            },
        );
    }

    pub fn clear_triggers(&self, settings_id: Option<&str>) -> usize {
        self.lock().triggers.clear(settings_id)
    }

    /// Fire a trigger. An id nobody registered is an integration bug and is
    /// returned as [`EngineError::TriggerNotRegistered`].
    pub async fn fire_trigger(&self, invocation: TriggerInvocation) -> Result<()> {
        let trigger = self.lock().triggers.get_trigger_callback(&invocation)?;
        match trigger.action {
            TriggerAction::Update(update) => {
                let owner = format!("trigger:{}", owner_suffix(&update));
                let changed = self
                    .run_update(&update, &owner, invocation.index_ids.clone())
                    .await?;
                self.resolve_changes(changed).await
            }
            TriggerAction::Callback(callback) => {
                let effects = self
                    .lock()
                    .edit_tree(|data| callback(data, &invocation));
                let changed = self.deliver(effects);
                self.resolve_changes(changed).await
            }
        }
    }

    /// Whether firing the trigger would do anything. Custom triggers answer
    /// through their `is_active` callback; update triggers ask the backend and
    /// compare the proposed values against the current tree.
    pub async fn is_trigger_active(&self, invocation: &TriggerInvocation) -> Result<bool> {
        let trigger = self.lock().triggers.get_trigger_callback(invocation)?;
        if let Some(is_active) = &trigger.is_active {
            let state = self.lock();
            return Ok(is_active(&state.data, invocation));
        }
        match trigger.action {
            TriggerAction::Callback(_) => Ok(true),
            TriggerAction::Update(update) => {
                self.update_would_change(&update, &invocation.index_ids)
                    .await
            }
        }
    }

    /// A user edit.
    pub async fn set_value(&self, path: &str, value: Value) -> Result<()> {
        let effects = {
            let mut guard = self.lock();
            let state = &mut *guard;
            set_path(&mut state.data, path, value.clone())?;
            state.reconcile_identities();
            Effects::changed(path, value)
        };
        let changed = self.deliver(effects);
        self.resolve_changes(changed).await
    }

    /// Insert an element into the array at `array_path` (`None` appends) and
    /// return its position.
    pub async fn add_array_element(
        &self,
        array_path: &str,
        index: Option<usize>,
        value: Value,
    ) -> Result<usize> {
        let (position, effects) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let position = tree::insert_array_element(&mut state.data, array_path, index, value)?;
            state.identities.element_inserted(array_path, position);
            (position, array_changed(state, array_path))
        };
        let changed = self.deliver(effects);
        self.resolve_changes(changed).await?;
        Ok(position)
    }

    pub async fn remove_array_element(&self, array_path: &str, index: usize) -> Result<Value> {
        let (removed, effects) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let removed = tree::remove_array_element(&mut state.data, array_path, index)?;
            state.identities.element_removed(array_path, index);
            state
                .state_providers
                .evict_removed_elements(&state.identities);
            (removed, array_changed(state, array_path))
        };
        let changed = self.deliver(effects);
        self.resolve_changes(changed).await?;
        Ok(removed)
    }

    pub async fn move_array_element(&self, array_path: &str, from: usize, to: usize) -> Result<()> {
        let effects = {
            let mut guard = self.lock();
            let state = &mut *guard;
            tree::move_array_element(&mut state.data, array_path, from, to)?;
            state.identities.element_moved(array_path, from, to);
            array_changed(state, array_path)
        };
        let changed = self.deliver(effects);
        self.resolve_changes(changed).await
    }

    /// Stable ids of the array elements addressed by `indices` along `scope`.
    pub fn to_index_ids(&self, scope: &str, indices: &[usize]) -> Result<Vec<IndexId>> {
        let data_paths = scope_to_data_paths(scope)?;
        Ok(self.lock().identities.to_index_ids(&data_paths, indices))
    }

    /// Current position of the element with the given id.
    pub fn get_index(&self, id: &IndexId) -> Option<usize> {
        self.lock().identities.get_index(id)
    }

    /// Subscribe to UI state. A matching cached state is delivered before
    /// this returns.
    pub fn add_state_provider_listener(
        &self,
        location: ListenerLocation,
        callback: StateListenerFn,
    ) -> ListenerId {
        let (id, replay) = self
            .lock()
            .state_providers
            .add_state_provider_listener(location, callback.clone());
        if let Some(value) = replay {
            callback(&value);
        }
        id
    }

    pub fn remove_state_provider_listener(&self, id: ListenerId) -> bool {
        self.lock().state_providers.remove_state_provider_listener(id)
    }

    pub fn subscribe_changes(&self, callback: ChangeFn) -> ChangeListenerId {
        let mut state = self.lock();
        state.next_change_listener += 1;
        let id = state.next_change_listener;
        state.change_listeners.push((id, callback));
        id
    }

    pub fn unsubscribe_changes(&self, id: ChangeListenerId) -> bool {
        let mut state = self.lock();
        let before = state.change_listeners.len();
        state.change_listeners.retain(|(listener, _)| *listener != id);
        state.change_listeners.len() != before
    }

    pub fn set_flow_variable_setting(&self, path: &str, setting: Option<FlowVariableSetting>) {
        self.lock().flow_variables.set(path, setting);
    }

    pub fn flow_variable_setting(&self, path: &str) -> Option<FlowVariableSetting> {
        self.lock().flow_variables.get(path).cloned()
    }

    pub fn flow_variable_settings(&self) -> FlowVariableSettings {
        self.lock().flow_variables.settings().clone()
    }

    pub fn is_flawed(&self, path: &str) -> bool {
        self.lock().flow_variables.is_flawed(path)
    }

    /// Flow variables the backend offers for `path`. `None` after a failure,
    /// which has been alerted.
    pub async fn available_flow_variables(&self, path: &str) -> Result<Option<Value>> {
        let context = self.flow_variable_context(path)?;
        let response = self
            .service
            .available_flow_variables(context, path_segments(path))
            .await;
        Ok(self.unwrap_response(response))
    }

    /// Resolve the value of the flow variable overriding `path` and write it
    /// into the tree. An undefined answer marks the override as flawed; an
    /// explicit `null` is a resolved value like any other.
    pub async fn resolve_flow_variable_override(&self, path: &str) -> Result<Option<Value>> {
        let context = self.flow_variable_context(path)?;
        let response = self
            .service
            .flow_variable_override_value(context, path_segments(path))
            .await;
        let Some(resolved) = self.unwrap_response(response) else {
            return Ok(None);
        };
        let (value, effects) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let OverrideValue::Defined(value) = resolved else {
                state.flow_variables.mark_flawed(path);
                return Ok(None);
            };
            state.flow_variables.clear_flawed(path);
            if get_path(&state.data, path) == Some(&value) {
                (value, Effects::default())
            } else {
                set_path(&mut state.data, path, value.clone())?;
                state.reconcile_identities();
                let effects = Effects::changed(path, value.clone());
                (value, effects)
            }
        };
        let changed = self.deliver(effects);
        self.resolve_changes(changed).await?;
        Ok(Some(value))
    }

    /// Run a backend validation; returns the error message, if any.
    pub async fn validate(
        &self,
        kind: ValidationKind,
        id: &str,
        value: &Value,
    ) -> Result<Option<String>> {
        let response = self.service.validate(kind, id, value).await;
        Ok(self.unwrap_response(response).flatten())
    }

    fn flow_variable_context(&self, path: &str) -> Result<String> {
        let state = self.lock();
        Ok(state.flow_variables.request_context(&state.data, path)?)
    }

    /// Resolve cascading updates: every path written by one generation is
    /// fed back as a change, up to the configured depth.
    async fn resolve_changes(&self, mut changed: Vec<String>) -> Result<()> {
        let mut depth = 0;
        while !changed.is_empty() {
            if depth >= self.config.max_cascade_depth {
                warn!("Update cascade stopped after {depth} generations, unresolved: {changed:?}");
                break;
            }
            changed = self.update_data(&changed).await?;
            depth += 1;
        }
        Ok(())
    }

    /// React to one generation of changed paths. Returns the paths written.
    async fn update_data(&self, paths: &[String]) -> Result<Vec<String>> {
        let triggered = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.watchers.triggered(paths, &mut state.identities)
        };
        let mut written = Vec::new();
        for hit in triggered {
            match hit.action {
                WatcherAction::Transform(transform) => {
                    let effects = self
                        .lock()
                        .edit_tree(|data| transform(data, &hit.context));
                    written.extend(self.deliver(effects));
                }
                WatcherAction::Update(update) => {
                    let owner = format!("watcher:{}", hit.id);
                    written.extend(
                        self.run_update(&update, &owner, hit.context.index_ids)
                            .await?,
                    );
                }
            }
        }
        Ok(written)
    }

    /// One backend round trip for `update`, issued for the element addressed
    /// by `index_ids`. Returns the paths written.
    async fn run_update(
        &self,
        update: &RegisteredUpdate,
        owner: &str,
        index_ids: Vec<IndexId>,
    ) -> Result<Vec<String>> {
        let (dependencies, ticket) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(indices) = state.identities.resolve_ids(&index_ids) else {
                debug!("Abandoning update of {owner}: element no longer exists");
                return Ok(Vec::new());
            };
            let dependencies = collect_dependencies(
                &state.data,
                &update.descriptor.dependencies,
                &indices,
                &mut state.identities,
            )?;
            let ticket = state.races.issue(RaceKey::new(owner, index_ids));
            (dependencies, ticket)
        };

        let response = self
            .service
            .update(
                update.settings_id.as_deref(),
                &update.descriptor.trigger,
                &dependencies,
            )
            .await;

        let applied = {
            let mut state = self.lock();
            if !state.races.finish(&ticket) {
                debug!("Discarding superseded result of {owner}");
                return Ok(Vec::new());
            }
            match response {
                Ok(RpcResponse::Success { result, message }) => {
                    for warning in message {
                        warn!("{warning}");
                    }
                    Ok(state.apply_update_results(result, update.settings_id.as_deref()))
                }
                Ok(RpcResponse::Fail { message }) => Ok(Effects::failed(message)),
                Err(err) => Err(err),
            }
        };
        match applied {
            Ok(effects) => Ok(self.deliver(effects)),
            Err(err) => {
                self.report(&err);
                Ok(Vec::new())
            }
        }
    }

    async fn update_would_change(
        &self,
        update: &RegisteredUpdate,
        index_ids: &[IndexId],
    ) -> Result<bool> {
        let dependencies = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(indices) = state.identities.resolve_ids(index_ids) else {
                return Ok(false);
            };
            collect_dependencies(
                &state.data,
                &update.descriptor.dependencies,
                &indices,
                &mut state.identities,
            )?
        };
        let response = self
            .service
            .update(
                update.settings_id.as_deref(),
                &update.descriptor.trigger,
                &dependencies,
            )
            .await;
        match response {
            Ok(RpcResponse::Success { result, .. }) => self.lock().would_change(&result),
            Ok(RpcResponse::Fail { message }) => {
                warn!("Activity check failed: {}", message.join("; "));
                Ok(false)
            }
            Err(err) => {
                warn!("Activity check failed: {err}");
                Ok(false)
            }
        }
    }

    /// Result of a successful backend call; failures become error alerts.
    fn unwrap_response<T>(&self, response: Result<RpcResponse<T>>) -> Option<T> {
        match response {
            Ok(RpcResponse::Success { result, message }) => {
                for warning in message {
                    warn!("{warning}");
                }
                Some(result)
            }
            Ok(RpcResponse::Fail { message }) => {
                self.send_alerts(message);
                None
            }
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    fn report(&self, err: &EngineError) {
        self.alerts.send_alert(Alert::error(err.to_string()));
    }

    fn send_alerts(&self, messages: Vec<String>) {
        for message in messages {
            self.alerts.send_alert(Alert::error(message));
        }
    }

    /// Notify listeners outside the lock. Returns the changed paths.
    fn deliver(&self, effects: Effects) -> Vec<String> {
        let Effects {
            changed,
            states,
            alerts,
        } = effects;
        self.send_alerts(alerts);
        let listeners: Vec<ChangeFn> = self
            .lock()
            .change_listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for (path, value) in &changed {
            for listener in &listeners {
                listener(path, value);
            }
        }
        for (callback, value) in &states {
            callback(value);
        }
        changed.into_iter().map(|(path, _)| path).collect()
    }
}

fn array_changed(state: &SessionState, array_path: &str) -> Effects {
    let value = get_path(&state.data, array_path)
        .cloned()
        .unwrap_or(Value::Null);
    Effects::changed(array_path, value)
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

fn owner_suffix(update: &RegisteredUpdate) -> String {
    let trigger = match &update.descriptor.trigger {
        Trigger::Id { id, .. } => id.clone(),
        Trigger::Scope { scope } => scope.clone(),
    };
    match &update.settings_id {
        Some(settings_id) => format!("{settings_id}/{trigger}"),
        None => trigger,
    }
}
