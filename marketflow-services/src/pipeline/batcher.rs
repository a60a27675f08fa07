//! Time-window batching of the merged tick stream

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use marketflow_core::Tick;

/// Default batch window
pub const BATCH_WINDOW: Duration = Duration::from_secs(1);

/// Groups ticks into fixed windows.
///
/// A collector task appends to a shared list; a ticker task swaps the list
/// for an empty one every window and emits it when non-empty. Each emit is a
/// swap under the lock, so a tick lands in exactly one batch.
pub struct Batcher {
    pending: Mutex<Vec<Tick>>,
}

impl Batcher {
    /// Spawn the collector and ticker tasks
    pub fn spawn(
        mut merged: mpsc::Receiver<Tick>,
        window: Duration,
        capacity: usize,
    ) -> (mpsc::Receiver<Vec<Tick>>, Vec<JoinHandle<()>>) {
        let batcher = Arc::new(Batcher {
            pending: Mutex::new(Vec::new()),
        });
        let (batch_tx, batch_rx) = mpsc::channel(capacity.max(1));
        let (done_tx, mut done_rx) = oneshot::channel::<()>();

        let collector = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                while let Some(tick) = merged.recv().await {
                    batcher.pending.lock().push(tick);
                    if done_tx.is_closed() {
                        // Ticker is gone, nobody will drain the list
                        return;
                    }
                }
                let _ = done_tx.send(());
            })
        };

        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + window, window);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !batcher.emit(&batch_tx).await {
                            debug!("[Batcher] Downstream closed, stopping");
                            return;
                        }
                    }
                    _ = &mut done_rx => {
                        batcher.emit(&batch_tx).await;
                        info!("[Batcher] Upstream closed, final batch flushed");
                        return;
                    }
                }
            }
        });

        (batch_rx, vec![collector, ticker])
    }

    /// Swap out the pending list and send it if non-empty. Returns false when
    /// the downstream receiver is gone.
    async fn emit(&self, out: &mpsc::Sender<Vec<Tick>>) -> bool {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return true;
        }
        out.send(batch).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64) -> Tick {
        Tick::new("Source1", "BTCUSDT", price, 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_one_batch_per_window() {
        let (tx, rx) = mpsc::channel(16);
        let (mut batches, _tasks) = Batcher::spawn(rx, BATCH_WINDOW, 4);

        tx.send(tick(1.0)).await.unwrap();
        tx.send(tick(2.0)).await.unwrap();

        let first = batches.recv().await.unwrap();
        assert_eq!(first.iter().map(|t| t.price).collect::<Vec<_>>(), vec![1.0, 2.0]);

        tx.send(tick(3.0)).await.unwrap();
        let second = batches.recv().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].price, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_remainder_on_close_without_repeats() {
        let (tx, rx) = mpsc::channel(16);
        let (mut batches, tasks) = Batcher::spawn(rx, Duration::from_secs(60), 4);

        for price in [1.0, 2.0, 3.0] {
            tx.send(tick(price)).await.unwrap();
        }
        drop(tx);

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batches.recv().await.is_none());

        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_windows_emit_nothing() {
        let (tx, rx) = mpsc::channel(16);
        let (mut batches, _tasks) = Batcher::spawn(rx, BATCH_WINDOW, 4);

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(tick(9.0)).await.unwrap();
        drop(tx);

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch, vec![tick(9.0)]);
        assert!(batches.recv().await.is_none());
    }
}
