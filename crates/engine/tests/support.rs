#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dialog_engine::{AlertSink, DialogSession, EngineConfig, Transport};
use dialog_protocol::{Alert, InitialPayload};
use serde_json::{json, Value};
use tokio::sync::oneshot;

pub enum Reply {
    Ready(Value),
    Gated(oneshot::Receiver<Value>),
    Pending,
    Error(String),
}

type Handler = Box<dyn Fn(&str, &[Value]) -> Reply + Send + Sync>;

/// In-memory backend answering from a script.
pub struct ScriptedTransport {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&str, &[Value]) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers calls in order; once the script runs dry every call succeeds
    /// with an empty result list.
    pub fn replies(replies: Vec<Reply>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Reply::Ready(success(json!([]))))
        })
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        while self.call_count() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> anyhow::Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        match (self.handler)(method, &params) {
            Reply::Ready(value) => Ok(value),
            Reply::Gated(gate) => Ok(gate.await?),
            Reply::Pending => std::future::pending().await,
            Reply::Error(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn messages(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|alert| alert.message.clone())
            .collect()
    }
}

impl AlertSink for RecordingAlerts {
    fn send_alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

pub fn success(result: Value) -> Value {
    json!({"state": "SUCCESS", "result": result})
}

pub fn fail(messages: &[&str]) -> Value {
    json!({"state": "FAIL", "message": messages})
}

/// A single value update result.
pub fn value_update(scope: &str, indices: Value, value: Value) -> Value {
    json!([{"scope": scope, "values": [{"indices": indices, "value": value}]}])
}

pub fn payload(data: Value, global_updates: Value) -> InitialPayload {
    serde_json::from_value(json!({
        "data": data,
        "globalUpdates": global_updates,
    }))
    .expect("payload")
}

pub async fn open(
    payload: InitialPayload,
    transport: Arc<ScriptedTransport>,
) -> (DialogSession, Arc<RecordingAlerts>) {
    open_with(payload, transport, EngineConfig::default()).await
}

pub async fn open_with(
    payload: InitialPayload,
    transport: Arc<ScriptedTransport>,
    config: EngineConfig,
) -> (DialogSession, Arc<RecordingAlerts>) {
    let alerts = Arc::new(RecordingAlerts::default());
    let session = DialogSession::open(payload, transport, alerts.clone(), config)
        .await
        .expect("open session");
    (session, alerts)
}

/// The trigger descriptor sent with an update call.
pub fn trigger_of(params: &[Value]) -> &Value {
    &params[params.len() - 2]
}

/// The dependency map sent with an update call.
pub fn dependencies_of(params: &[Value]) -> &Value {
    &params[params.len() - 1]
}
