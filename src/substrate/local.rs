//! In-process timer substrate.
//!
//! One tokio task per armed timer. The task sleeps in bounded slices and
//! checks the wall clock between them, so a suspended machine fires as soon
//! as it wakes instead of sleeping out the full monotonic duration.

use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::constants::LOCAL_TIMER_SLICE_SECS;
use crate::error::{IdleError, Result};
use crate::idle::{FiredTimer, SubstrateStatus, TimerRequest, TimerSubstrate};

pub struct LocalTimer {
    handle: Handle,
    fired_tx: UnboundedSender<FiredTimer>,
    slice: StdDuration,
    task: Option<AbortHandle>,
}

impl LocalTimer {
    pub fn new(handle: Handle, fired_tx: UnboundedSender<FiredTimer>) -> Self {
        Self {
            handle,
            fired_tx,
            slice: StdDuration::from_secs(LOCAL_TIMER_SLICE_SECS),
            task: None,
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl TimerSubstrate for LocalTimer {
    fn label(&self) -> &'static str {
        "local"
    }

    fn status(&self) -> SubstrateStatus {
        SubstrateStatus::Ready
    }

    fn schedule_timer(&mut self, request: TimerRequest) -> Result<()> {
        if self.fired_tx.is_closed() {
            return Err(IdleError::Substrate("fired-timer channel closed".into()));
        }
        self.abort();

        let tx = self.fired_tx.clone();
        let slice = self.slice;
        let join = self.handle.spawn(async move {
            loop {
                let remaining = request.fire_at - Utc::now().timestamp_millis();
                if remaining <= 0 {
                    break;
                }
                let wait = StdDuration::from_millis(remaining as u64).min(slice);
                tokio::time::sleep(wait).await;
            }
            debug!(event_type = %request.event_type, "local timer fired");
            let _ = tx.send(FiredTimer {
                event_type: request.event_type,
                event_data: request.event_data,
            });
        });
        self.task = Some(join.abort_handle());
        Ok(())
    }

    fn cancel_timer(&mut self) -> Result<()> {
        self.abort();
        Ok(())
    }
}

impl Drop for LocalTimer {
    fn drop(&mut self) {
        self.abort();
    }
}
