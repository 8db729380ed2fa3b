//! Flow-variable overrides per data path and their "flawed" status.

use std::collections::BTreeSet;

use dialog_protocol::{FlowVariableSetting, FlowVariableSettings};
use serde_json::{json, Value};

#[derive(Debug, Default, Clone)]
pub struct FlowVariableOverrides {
    settings: FlowVariableSettings,
    flawed: BTreeSet<String>,
}

impl FlowVariableOverrides {
    pub fn new(settings: FlowVariableSettings) -> Self {
        let flawed = settings
            .iter()
            .filter(|(_, setting)| setting.controlling_flow_variable_flawed == Some(true))
            .map(|(path, _)| path.clone())
            .collect();
        Self { settings, flawed }
    }

    /// Whether writes to `path` must be skipped.
    pub fn is_controlled(&self, path: &str) -> bool {
        self.settings
            .get(path)
            .is_some_and(FlowVariableSetting::is_controlled)
    }

    pub fn get(&self, path: &str) -> Option<&FlowVariableSetting> {
        self.settings.get(path)
    }

    /// Replace the setting for `path`; `None` removes it.
    pub fn set(&mut self, path: &str, setting: Option<FlowVariableSetting>) {
        match setting {
            Some(setting) => {
                self.settings.insert(path.to_string(), setting);
            }
            None => {
                self.settings.remove(path);
                self.flawed.remove(path);
            }
        }
    }

    pub fn settings(&self) -> &FlowVariableSettings {
        &self.settings
    }

    pub fn is_flawed(&self, path: &str) -> bool {
        self.flawed.contains(path)
    }

    pub fn mark_flawed(&mut self, path: &str) {
        self.flawed.insert(path.to_string());
        self.settings
            .entry(path.to_string())
            .or_default()
            .controlling_flow_variable_flawed = Some(true);
    }

    pub fn clear_flawed(&mut self, path: &str) {
        self.flawed.remove(path);
        if let Some(setting) = self.settings.get_mut(path) {
            setting.controlling_flow_variable_flawed = None;
        }
    }

    /// JSON string of `{data, flowVariableSettings}` sent along with every
    /// flow-variable request. Flawed paths are left out, except `path`
    /// itself so a flawed override can still resolve.
    pub fn request_context(&self, data: &Value, path: &str) -> serde_json::Result<String> {
        let settings: FlowVariableSettings = self
            .settings
            .iter()
            .filter(|(key, _)| key.as_str() == path || !self.flawed.contains(key.as_str()))
            .map(|(key, setting)| (key.clone(), setting.clone()))
            .collect();
        serde_json::to_string(&json!({
            "data": data,
            "flowVariableSettings": settings,
        }))
    }
}
