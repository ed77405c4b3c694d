//! Dashflow Config
//!
//! This crate contains the serializable types that describe how a widget gets
//! its data: the data items to fetch, how each item is filtered and
//! transformed, how the items of a source are merged, and which configuration
//! properties bind to request parameters or trigger a refresh.
//!
//! Configuration is supplied by the external configuration collaborator as
//! JSON. Field names are snake_case; the camelCase spellings used by browser
//! clients are accepted as aliases.
//!
//! Runtime settings for the services themselves (cache budget, fetch timeout,
//! script limits, debounce) live in [`DashflowSettings`].

mod binding;
mod item;
mod merge;
mod pipeline;
mod processing;
mod requirement;
mod settings;

pub use binding::{BindingRule, ComponentOverrides, TriggerRule, ValueTransform};
pub use item::{DataItemConfig, HttpItem, HttpMethod, HttpParam, ScriptItem, SocketItem};
pub use merge::MergeStrategy;
pub use pipeline::{DataItemDef, DataSourceDef, PipelineConfig};
pub use processing::ProcessingConfig;
pub use requirement::{DataSourceSpec, SourceKind, WidgetRequirement};
pub use settings::{
  DashflowSettings, FetchSettings, ScriptSettings, SettingsError, TriggerSettings,
  WarehouseSettings,
};
