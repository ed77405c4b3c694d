//! Dashflow Binding
//!
//! Connects widget configuration to data execution:
//!
//! - **Binding rules** map configuration properties (`base.deviceId`) to
//!   request parameters, optionally through a [`ValueTransform`](dashflow_config::ValueTransform).
//! - **Trigger rules** whitelist the properties whose change re-runs a
//!   widget. Runs are debounced per widget and a widget never runs twice at
//!   once.
//!
//! Rules start from a default set and are fully mutable at runtime, per
//! component type or by swapping in a [`Preset`].

mod config;
mod engine;
mod error;
mod executor;
mod presets;
mod registry;
mod transform;
mod watch;

pub use config::{PropertyChange, WidgetConfig};
pub use engine::{
  BindingWarning, EngineDebugInfo, ExecutionOutcome, LayerUpdate, RequestParams, TriggerEngine,
};
pub use error::{BindingError, TransformError};
pub use executor::{BridgeExecutor, ExecutionRequest, WidgetExecutor};
pub use presets::{Preset, default_rules};
pub use registry::{BindingRegistry, RuleDebugInfo};
pub use transform::TransformRunner;
pub use watch::WatchHandle;
