//! Warehouse errors.

/// Errors that can occur when writing to the warehouse.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WarehouseError {
  /// The store would push the cache past its memory budget or item ceiling.
  #[error("cannot store '{widget_id}/{source_id}': {message}")]
  CapacityExceeded {
    widget_id: String,
    source_id: String,
    message: String,
  },
}
