// THEORY:
// The `trigger` module is the bridge between a periodic timer and the polling loop
// that runs detection cycles. The timer side only ever *raises* a flag; the loop side
// *takes* it, which reads and clears it in one atomic step. However many ticks land
// between two polls, the loop sees a single raised flag and runs a single cycle.
//
// The detection engine itself never looks at the trigger. A cycle is a plain function
// call; the trigger only decides when the caller makes it.

use crate::error::{DetectionError, DetectionResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// A shareable fetch-and-clear flag.
#[derive(Debug, Clone, Default)]
pub struct DetectionTrigger {
    flag: Arc<AtomicBool>,
}

impl DetectionTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Raising an already raised flag is a no-op.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether the flag was raised, clearing it.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// Spawns a task that raises `trigger` once every `period`, starting one period from now.
///
/// Ticks missed while the runtime was busy are skipped rather than replayed. The task
/// runs until the returned handle is aborted.
pub fn spawn_periodic(
    trigger: DetectionTrigger,
    period: Duration,
) -> DetectionResult<JoinHandle<()>> {
    if period.is_zero() {
        return Err(DetectionError::InvalidConfig(
            "trigger period must be non-zero".to_string(),
        ));
    }

    Ok(tokio::spawn(async move {
        let mut ticks = time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            trace!("detection trigger raised");
            trigger.raise();
        }
    }))
}
