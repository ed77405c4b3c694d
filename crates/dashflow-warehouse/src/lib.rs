//! Dashflow Warehouse
//!
//! Shared cache of pipeline output, partitioned by widget and keyed by
//! source id within each widget.
//!
//! - Entries expire after their time-to-live and are dropped lazily on read
//!   or eagerly by [`DataWarehouse::sweep`].
//! - A store that would exceed the memory budget or the item ceiling drops
//!   expired entries to make room, and is rejected with
//!   [`WarehouseError::CapacityExceeded`] if it still does not fit.
//! - Under pressure, sweeping evicts the least-accessed entries first.

mod clock;
mod entry;
mod error;
mod metrics;
mod sweeper;
mod warehouse;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, EntrySource, estimate_size};
pub use error::WarehouseError;
pub use metrics::{PerformanceMetrics, StorageStats, SweepReport, WidgetStats};
pub use warehouse::{DataWarehouse, WidgetData};
