//! The RPC boundary towards the node backend.
//!
//! Everything behind [`Transport`] is opaque: a method name plus positional
//! arguments go out, a `{state, result, message}` envelope comes back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dialog_protocol::{
    methods, Alert, DependencyMap, OverrideValue, RpcResponse, Trigger, UpdateResult,
    ValidationKind,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{EngineError, Result};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> anyhow::Result<Value>;
}

/// Receiver of user-visible alerts.
pub trait AlertSink: Send + Sync {
    fn send_alert(&self, alert: Alert);
}

/// Alert sink that only logs; for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn send_alert(&self, alert: Alert) {
        log::error!("{}", alert.message);
    }
}

/// Typed calls on top of a [`Transport`].
#[derive(Clone)]
pub struct JsonDataService {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl JsonDataService {
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self { transport, timeout }
    }

    async fn request<T>(&self, method: &'static str, params: Vec<Value>) -> Result<RpcResponse<T>>
    where
        T: DeserializeOwned + Default,
    {
        let call = self.transport.call(method, params);
        let raw = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                EngineError::BackendTimeout {
                    method,
                    timeout_ms: limit.as_millis(),
                }
            })?,
            None => call.await,
        }
        .map_err(|err| EngineError::Transport {
            method,
            message: format!("{err:#}"),
        })?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn update(
        &self,
        settings_id: Option<&str>,
        trigger: &Trigger,
        dependencies: &DependencyMap,
    ) -> Result<RpcResponse<Vec<UpdateResult>>> {
        let trigger = trigger.descriptor();
        let dependencies = serde_json::to_value(dependencies)?;
        match settings_id {
            None => {
                self.request(methods::UPDATE, vec![Value::Null, trigger, dependencies])
                    .await
            }
            Some(settings_id) => {
                self.request(
                    methods::UPDATE_WITH_SETTINGS_ID,
                    vec![json!(settings_id), Value::Null, trigger, dependencies],
                )
                .await
            }
        }
    }

    pub async fn available_flow_variables(
        &self,
        context: String,
        path: Vec<String>,
    ) -> Result<RpcResponse<Value>> {
        self.request(
            methods::AVAILABLE_FLOW_VARIABLES,
            vec![Value::String(context), json!(path)],
        )
        .await
    }

    pub async fn flow_variable_override_value(
        &self,
        context: String,
        path: Vec<String>,
    ) -> Result<RpcResponse<OverrideValue>> {
        self.request(
            methods::FLOW_VARIABLE_OVERRIDE_VALUE,
            vec![Value::String(context), json!(path)],
        )
        .await
    }

    pub async fn validate(
        &self,
        kind: ValidationKind,
        id: &str,
        value: &Value,
    ) -> Result<RpcResponse<Option<String>>> {
        self.request(kind.method(), vec![json!(id), value.clone()])
            .await
    }
}
