//! # Dialog Engine
//!
//! Update and dependency resolution for schema-driven settings dialogs.
//!
//! ## Resolution cycle
//!
//! ```text
//! set_value / fire_trigger
//!     │
//!     ├──> WatcherRegistry / TriggerRegistry
//!     │      └─> matching updates + element index ids
//!     │
//!     ├──> collect_dependencies (current tree, pinned element)
//!     │
//!     ├──> AbortCoordinator: stamp (owner, index ids)
//!     │
//!     ├──> JsonDataService::update ──> backend
//!     │
//!     ├──> still current? apply results
//!     │      ├─ values    ──> tree (flow-variable controlled paths skipped)
//!     │      └─ ui state  ──> StateProviderRegistry
//!     │
//!     └──> written paths ──> next cascade generation
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dialog_engine::{DialogSession, EngineConfig, LogAlerts, Transport};
//! use dialog_protocol::InitialPayload;
//!
//! async fn edit(payload: InitialPayload, transport: Arc<dyn Transport>) -> anyhow::Result<()> {
//!     let session =
//!         DialogSession::open(payload, transport, Arc::new(LogAlerts), EngineConfig::from_env())
//!             .await?;
//!     session.set_value("model.threshold", serde_json::json!(0.5)).await?;
//!     println!("{}", session.data());
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod error;
mod flow_variables;
mod races;
mod resolution;
mod session;
mod state_providers;
mod triggers;
mod watchers;

pub use backend::{AlertSink, JsonDataService, LogAlerts, Transport};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use flow_variables::FlowVariableOverrides;
pub use races::{AbortCoordinator, RaceKey, RaceTicket};
pub use resolution::RegisteredUpdate;
pub use session::{ChangeFn, ChangeListenerId, DialogSession};
pub use state_providers::{
    ElementPath, ListenerId, ListenerLocation, StateKey, StateListenerFn, StateLocation,
    StateProviderRegistry,
};
pub use triggers::{
    IsActiveFn, RegisteredTrigger, TriggerAction, TriggerFn, TriggerInvocation, TriggerRegistry,
};
pub use watchers::{
    TransformFn, TriggeredWatcher, WatchContext, WatcherAction, WatcherId, WatcherRegistry,
};
