//! Background expiry sweep.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::warehouse::DataWarehouse;

/// Sweep `warehouse` every `interval`. The task holds only a weak reference
/// and ends when the token is cancelled or the warehouse is gone.
pub(crate) fn spawn_sweeper(
  runtime: &Handle,
  warehouse: Weak<DataWarehouse>,
  interval: Duration,
  cancel: CancellationToken,
) -> JoinHandle<()> {
  runtime.spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {
          let Some(warehouse) = warehouse.upgrade() else {
            break;
          };
          warehouse.sweep();
        }
      }
    }

    debug!("warehouse_sweeper_stopped");
  })
}
