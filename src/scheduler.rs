// src/scheduler.rs
//
// Cancellable periodic task: a tokio interval loop with a watch-channel stop
// signal. Both pools run their refresh cadence on one of these; tests drive
// refresh directly instead of sleeping against real intervals.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Bound on how long `stop()` waits for the loop to wind down. An in-flight
/// fetch begun before the signal may still complete afterwards; its result is
/// merged best-effort or discarded (known limitation).
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct PeriodicTask {
    name: String,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a loop that runs `op` every `every`, starting immediately.
    /// `op` is expected to absorb and log its own failures; a failed cycle
    /// never terminates future cycles.
    pub fn spawn<F, Fut>(name: &str, every: Duration, mut op: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task_name = name.to_string();
        let loop_name = task_name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // A tick that overruns delays the next one; elapsed wall-clock
            // time still gates the work, so overruns delay refreshes rather
            // than duplicating them.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => op().await,
                    _ = stop_rx.changed() => {
                        tracing::info!(task = %loop_name, "periodic task stopping");
                        break;
                    }
                }
            }
        });

        tracing::info!(task = name, every_secs = every.as_secs(), "periodic task started");
        Self {
            name: task_name,
            stop_tx,
            handle,
        }
    }

    /// Signal the loop to halt and wait a bounded time for it to join.
    /// Does not cancel work already in flight.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if tokio::time::timeout(STOP_JOIN_TIMEOUT, self.handle)
            .await
            .is_err()
        {
            tracing::warn!(task = %self.name, "periodic task did not stop in time");
        }
    }
}
