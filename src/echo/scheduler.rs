// src/echo/scheduler.rs — Periodic re-analysis timer

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A cancellable background ticker.
///
/// The tick callback returns `false` to end the loop on its own (e.g. when
/// the engine it serves has been dropped).
pub struct LearningScheduler {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl LearningScheduler {
    /// Spawn the ticker on the current tokio runtime. Returns `None` when
    /// called outside a runtime.
    pub fn spawn<F, Fut>(interval: Duration, mut on_tick: F) -> Option<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let period = interval.max(Duration::from_millis(1));

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the immediate first tick
            ticker.tick().await;
            tracing::debug!("Learning scheduler started ({:?} interval)", period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !on_tick().await {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
            tracing::debug!("Learning scheduler stopped");
        });

        Some(Self {
            shutdown_tx,
            handle,
        })
    }

    /// Signal the loop to stop. A tick already in progress runs to completion.
    pub fn stop(self) {
        if self.handle.is_finished() {
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

}

#[cfg(test)]
impl LearningScheduler {
    async fn stop_and_wait(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
