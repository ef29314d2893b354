//! Cancellable periodic tasks
//!
//! Every task spawned through a [`Poller`] stops when the poller is cancelled
//! or dropped, so no refresh outlives the session that started it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Poller {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` now and then every `period`
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Polling task '{}' stopped", name);
                        break;
                    }
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = task() => {}
                        }
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Spawn a task that runs until cancellation
    pub fn spawn<Fut>(&mut self, name: &'static str, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Task '{}' stopped", name),
                _ = task => {}
            }
        });
        self.handles.push(handle);
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.handles.iter().any(|h| !h.is_finished())
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut poller = Poller::new();
        let counter = count.clone();
        poller.every("count", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_tasks() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let mut poller = Poller::new();
            let counter = count.clone();
            poller.every("count", Duration::from_secs(1), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!(poller.is_running());
        }

        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_spawned_tasks() {
        let mut poller = Poller::new();
        poller.spawn("idle", std::future::pending());
        assert!(poller.is_running());
        tokio::time::timeout(Duration::from_secs(1), poller.shutdown())
            .await
            .unwrap();
    }
}
