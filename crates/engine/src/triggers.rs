//! Id-based triggers: explicit user actions such as button clicks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dialog_paths::IndexId;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::resolution::RegisteredUpdate;

pub type TriggerFn = Arc<dyn Fn(&mut Value, &TriggerInvocation) + Send + Sync>;
pub type IsActiveFn = Arc<dyn Fn(&Value, &TriggerInvocation) -> bool + Send + Sync>;

/// A trigger being fired (or asked whether it would do anything).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerInvocation {
    pub id: String,
    pub index_ids: Vec<IndexId>,
    pub settings_id: Option<String>,
}

impl TriggerInvocation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_index_ids(mut self, index_ids: Vec<IndexId>) -> Self {
        self.index_ids = index_ids;
        self
    }

    pub fn with_settings_id(mut self, settings_id: impl Into<String>) -> Self {
        self.settings_id = Some(settings_id.into());
        self
    }
}

#[derive(Clone)]
pub enum TriggerAction {
    Update(Arc<RegisteredUpdate>),
    Callback(TriggerFn),
}

#[derive(Clone)]
pub struct RegisteredTrigger {
    pub action: TriggerAction,
    pub is_active: Option<IsActiveFn>,
}

impl fmt::Debug for RegisteredTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match &self.action {
            TriggerAction::Update(update) => format!("Update({update:?})"),
            TriggerAction::Callback(_) => "Callback(..)".to_string(),
        };
        f.debug_struct("RegisteredTrigger")
            .field("action", &action)
            .field("is_active", &self.is_active.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TriggerKey {
    settings_id: Option<String>,
    id: String,
}

/// Triggers keyed by (settings id, trigger id); the settings id separates
/// independently scoped panels.
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: HashMap<TriggerKey, RegisteredTrigger>,
}

impl TriggerRegistry {
    pub fn register(
        &mut self,
        id: impl Into<String>,
        settings_id: Option<String>,
        trigger: RegisteredTrigger,
    ) -> Option<RegisteredTrigger> {
        self.triggers.insert(
            TriggerKey {
                settings_id,
                id: id.into(),
            },
            trigger,
        )
    }

    pub fn get_trigger_callback(
        &self,
        invocation: &TriggerInvocation,
    ) -> Result<RegisteredTrigger> {
        let key = TriggerKey {
            settings_id: invocation.settings_id.clone(),
            id: invocation.id.clone(),
        };
        self.triggers
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::TriggerNotRegistered {
                id: invocation.id.clone(),
            })
    }

    /// Drop every trigger registered for `settings_id`.
    pub fn clear(&mut self, settings_id: Option<&str>) -> usize {
        let before = self.triggers.len();
        self.triggers
            .retain(|key, _| key.settings_id.as_deref() != settings_id);
        before - self.triggers.len()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
