//! Dashflow Pipeline
//!
//! Turns a widget's declarative [`PipelineConfig`](dashflow_config::PipelineConfig)
//! into its data bag.
//!
//! # Architecture
//!
//! ```text
//! PipelineCoordinator::run(config, debug)
//! ├── per source, concurrently
//! │   ├── DataItemFetcher::try_fetch   (static, json, http, socket, script)
//! │   ├── DataItemProcessor::process   (default value, filter path, transform)
//! │   └── SourceMerger::try_merge      (object, array, select, script)
//! └── integrate(results, widget_id) -> ComponentData
//! ```
//!
//! Failures stay inside the stage that produced them: a failed item becomes
//! `{}`, a failed source becomes an entry with `success: false`, and the run
//! itself only fails if integration does.

mod coordinator;
mod error;
mod fetch;
mod http;
mod integrate;
mod merge;
mod path;
mod process;
mod result;
mod socket;
mod trace;

pub use coordinator::{PipelineCoordinator, PipelineStatistics};
pub use error::{FetchError, MergeError, ProcessError};
pub use fetch::DataItemFetcher;
pub use integrate::integrate;
pub use merge::{SourceMerger, validate_strategy};
pub use path::{MAX_PATH_DEPTH, PathSegment, parse_path, select};
pub use process::{DataItemProcessor, is_empty_value};
pub use result::{ComponentData, DataSourceResult, EntryMetadata, PipelineResult, SourceEntry};
pub use socket::{SnapshotSocketSource, SocketSource};
pub use trace::{PipelineStage, PipelineTrace, Snapshot, StageTransition};
