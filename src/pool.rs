//! Bounded work queues shared by a pool of tokio workers, plus the
//! completion barrier the orchestrator blocks on.
//!
//! Every [`Producer::put`] registers one pending item with the queue's
//! [`CompletionBarrier`]. A consumer acknowledges the item by dropping the
//! [`Ack`] handed out with it, so an item is acknowledged even when the worker
//! handling it panics. [`drain`] waits for the barrier, closes the queue and
//! collects the workers' results.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinSet;

/// Countdown of enqueued-but-unacknowledged items
#[derive(Clone, Debug, Default)]
pub struct CompletionBarrier {
    inner: Arc<BarrierInner>,
}

#[derive(Debug, Default)]
struct BarrierInner {
    pending: AtomicUsize,
    notify: Notify,
}

impl CompletionBarrier {
    /// Create a barrier with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more item that must be acknowledged
    pub fn add(&self) {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Acknowledge one item, waking waiters when the count reaches zero
    pub fn done(&self) {
        let previous = self.inner.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "barrier acknowledged more items than added");
        if previous == 1 {
            self.inner.notify.notify_waiters();
        }
    }

    /// Items still waiting for acknowledgement
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Block until every registered item has been acknowledged
    pub async fn wait(&self) {
        loop {
            // Register interest before checking so a concurrent `done` is not missed
            let notified = self.inner.notify.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Acknowledgement guard for one taken item
#[must_use = "dropping the Ack acknowledges the item"]
#[derive(Debug)]
pub struct Ack {
    barrier: CompletionBarrier,
}

impl Drop for Ack {
    fn drop(&mut self) {
        self.barrier.done();
    }
}

/// Sending half of a work queue
#[derive(Debug)]
pub struct Producer<T> {
    tx: mpsc::Sender<T>,
    barrier: CompletionBarrier,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            barrier: self.barrier.clone(),
        }
    }
}

impl<T> Producer<T> {
    /// Enqueue an item, waiting for space when the queue is full
    pub async fn put(&self, item: T) -> Result<()> {
        self.barrier.add();
        if self.tx.send(item).await.is_err() {
            self.barrier.done();
            return Err(Error::QueueClosed);
        }
        Ok(())
    }

    /// Block until every item put so far has been acknowledged
    pub async fn join(&self) {
        self.barrier.wait().await;
    }

    /// Barrier tracking this queue
    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }
}

/// Receiving half of a work queue, shared by every worker of a pool
#[derive(Debug)]
pub struct Consumer<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    barrier: CompletionBarrier,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            barrier: self.barrier.clone(),
        }
    }
}

impl<T> Consumer<T> {
    /// Take the next item, or `None` once the queue is closed and empty
    pub async fn take(&self) -> Option<(T, Ack)> {
        let item = self.rx.lock().await.recv().await?;
        Some((
            item,
            Ack {
                barrier: self.barrier.clone(),
            },
        ))
    }
}

/// Create a bounded work queue
pub fn work_queue<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let barrier = CompletionBarrier::new();
    (
        Producer {
            tx,
            barrier: barrier.clone(),
        },
        Consumer {
            rx: Arc::new(Mutex::new(rx)),
            barrier,
        },
    )
}

/// Wait for every item put through `producer` to be acknowledged, then close
/// the queue and collect the worker results.
///
/// Workers exit once the queue is closed and empty; closing happens when the
/// last producer clone is dropped, so callers must not hold other clones. A
/// panicked worker aborts the wait with [`Error::WorkerPanicked`] and the
/// remaining workers are cancelled.
pub async fn drain<T, R>(producer: Producer<T>, mut workers: JoinSet<R>) -> Result<Vec<R>>
where
    R: Send + 'static,
{
    let barrier = producer.barrier().clone();
    let mut results = Vec::with_capacity(workers.len());

    loop {
        tokio::select! {
            _ = barrier.wait() => break,
            joined = workers.join_next() => match joined {
                Some(Ok(result)) => results.push(result),
                Some(Err(e)) => return Err(Error::WorkerPanicked(e.to_string())),
                None if barrier.pending() == 0 => break,
                None => return Err(Error::QueueClosed),
            },
        }
    }

    drop(producer);

    while let Some(joined) = workers.join_next().await {
        results.push(joined.map_err(|e| Error::WorkerPanicked(e.to_string()))?);
    }
    Ok(results)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn test_barrier_with_nothing_pending_returns_immediately() {
        let barrier = CompletionBarrier::new();
        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("empty barrier should not block");
    }

    #[tokio::test]
    async fn test_barrier_waits_for_every_acknowledgement() {
        let barrier = CompletionBarrier::new();
        barrier.add();
        barrier.add();

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        barrier.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        barrier.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn test_each_item_taken_exactly_once() {
        let (producer, consumer) = work_queue::<u32>(4);
        let mut workers = JoinSet::new();
        for _ in 0..3 {
            let consumer = consumer.clone();
            workers.spawn(async move {
                let mut seen = Vec::new();
                while let Some((item, _ack)) = consumer.take().await {
                    seen.push(item);
                }
                seen
            });
        }
        drop(consumer);

        for i in 0..50 {
            producer.put(i).await.unwrap();
        }

        let results = drain(producer, workers).await.unwrap();
        let all: Vec<u32> = results.into_iter().flatten().collect();
        assert_eq!(all.len(), 50);
        let unique: HashSet<u32> = all.into_iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[tokio::test]
    async fn test_drain_with_no_items() {
        let (producer, consumer) = work_queue::<u32>(1);
        let mut workers = JoinSet::new();
        workers.spawn(async move { while consumer.take().await.is_some() {} });

        let results = tokio::time::timeout(Duration::from_secs(1), drain(producer, workers))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_worker_surfaces_instead_of_hanging() {
        let (producer, consumer) = work_queue::<u32>(8);
        let mut workers = JoinSet::new();
        workers.spawn(async move {
            if let Some((item, _ack)) = consumer.take().await {
                panic!("worker failed on item {item}");
            }
        });

        for i in 0..3 {
            producer.put(i).await.unwrap();
        }

        let result = tokio::time::timeout(Duration::from_secs(1), drain(producer, workers))
            .await
            .expect("drain must not hang");
        assert!(matches!(result, Err(Error::WorkerPanicked(_))));
    }

    #[tokio::test]
    async fn test_put_after_close_fails_and_releases_barrier() {
        let (producer, consumer) = work_queue::<u32>(1);
        drop(consumer);

        assert!(matches!(producer.put(1).await, Err(Error::QueueClosed)));
        assert_eq!(producer.barrier().pending(), 0);
    }
}
