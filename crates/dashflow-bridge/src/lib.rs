//! Dashflow Bridge
//!
//! The entry point external collaborators call. A [`DataBridge`] turns a
//! [`WidgetRequirement`](dashflow_config::WidgetRequirement) into a pipeline
//! run, caches each source entry in the
//! [`DataWarehouse`](dashflow_warehouse::DataWarehouse) and calls every
//! [`DataListener`] with the refreshed bag.

mod bridge;
mod convert;
mod events;
mod result;

pub use bridge::DataBridge;
pub use convert::{ConvertedRequirement, convert_requirement};
pub use events::{ChannelListener, DataListener, DataUpdate, Subscription};
pub use result::{BridgeStats, DataResult, WarehouseSummary};
