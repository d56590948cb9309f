//! Fixed-size worker pools over a shared queue

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A set of interchangeable workers draining one queue
pub struct WorkerPool {
    stage: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` tasks that each pull jobs from `receiver` until it closes.
    ///
    /// Workers stop picking up new jobs once `cancel` fires; a job already in
    /// progress runs to completion. The receiver is dropped when the last worker
    /// exits, which unblocks any producer still waiting on a full queue.
    pub fn spawn<T, F, Fut>(
        stage: &'static str,
        workers: usize,
        receiver: mpsc::Receiver<T>,
        cancel: CancellationToken,
        handler: F,
    ) -> Self
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let cancel = cancel.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut processed = 0u64;
                    loop {
                        let job = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            job = next_job(&receiver) => job,
                        };
                        let Some(job) = job else { break };
                        handler(job).await;
                        processed += 1;
                    }
                    tracing::debug!("{} worker {} done after {} jobs", stage, id, processed);
                })
            })
            .collect();

        Self { stage, handles }
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("{} worker panicked: {}", self.stage, e);
            }
        }
    }
}

async fn next_job<T>(receiver: &AsyncMutex<mpsc::Receiver<T>>) -> Option<T> {
    receiver.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let (tx, rx) = mpsc::channel(4);
        let sum = Arc::new(AtomicUsize::new(0));
        let pool = {
            let sum = Arc::clone(&sum);
            WorkerPool::spawn("test", 3, rx, CancellationToken::new(), move |n: usize| {
                let sum = Arc::clone(&sum);
                async move {
                    sum.fetch_add(n, Ordering::Relaxed);
                }
            })
        };

        for n in 1..=10 {
            tx.send(n).await.unwrap();
        }
        drop(tx);
        pool.join().await;
        assert_eq!(sum.load(Ordering::Relaxed), 55);
    }

    #[tokio::test]
    async fn test_cancelled_pool_releases_producers() {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::spawn("test", 2, rx, cancel, |_: u8| async {});
        pool.join().await;

        // Receiver is gone with the last worker
        assert!(tx.send(1).await.is_err());
    }
}
