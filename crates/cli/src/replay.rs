//! Offline backend: answers RPC calls from a recorded list of responses.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dialog_engine::{AlertSink, Transport};
use dialog_protocol::Alert;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// Replays response envelopes in call order. Once the recording is used
/// up, every call succeeds with an empty result list.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    responses: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ReplayTransport {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read responses from {}", path.display()))?;
        let responses: Vec<Value> =
            serde_json::from_str(&raw).context("Responses file must be a JSON array")?;
        Ok(Self::new(responses))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .map(|responses| responses.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> anyhow::Result<Value> {
        log::debug!("replay {method} {}", Value::Array(params.clone()));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                method: method.to_string(),
                params,
            });
        }
        let next = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("replay state poisoned"))?
            .pop_front();
        Ok(next.unwrap_or_else(|| json!({"state": "SUCCESS", "result": []})))
    }
}

/// Alerts kept for the final report.
#[derive(Debug, Default)]
pub struct CollectedAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectedAlerts {
    pub fn take(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|mut alerts| std::mem::take(&mut *alerts))
            .unwrap_or_default()
    }
}

impl AlertSink for CollectedAlerts {
    fn send_alert(&self, alert: Alert) {
        log::warn!("alert: {}", alert.message);
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}

/// Parse a `PATH=VALUE` edit. The value is read as JSON and falls back to a
/// plain string.
pub fn parse_change(raw: &str) -> Result<(String, Value)> {
    let (path, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected PATH=VALUE, got {raw:?}"))?;
    if path.is_empty() {
        anyhow::bail!("Empty path in {raw:?}");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.to_string(), value))
}
