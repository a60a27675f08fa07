//! Fan-in of per-source tick streams

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use marketflow_core::Tick;

/// Capacity of the merged channel
pub const MERGE_CAPACITY: usize = 15;

enum MergeEvent {
    Tick(Tick),
    Drained(String),
}

/// Merge named tick streams into one bounded channel.
///
/// A drained input drops out of the selection set; the merged channel closes
/// once every input has drained or the receiver is gone.
pub fn fan_in(
    inputs: Vec<(String, mpsc::Receiver<Tick>)>,
    capacity: usize,
) -> (mpsc::Receiver<Tick>, JoinHandle<()>) {
    let (merged_tx, merged_rx) = mpsc::channel(capacity.max(1));
    let total = inputs.len();

    let streams = inputs.into_iter().map(|(source, rx)| {
        ReceiverStream::new(rx)
            .map(MergeEvent::Tick)
            .chain(stream::once(async move { MergeEvent::Drained(source) }))
            .boxed()
    });
    let mut merged = stream::select_all(streams);

    let task = tokio::spawn(async move {
        let mut drained = 0usize;

        while let Some(event) = merged.next().await {
            match event {
                MergeEvent::Tick(tick) => {
                    // Bounded send: a slow batcher slows the sources down
                    if merged_tx.send(tick).await.is_err() {
                        debug!("[Merger] Downstream closed, stopping");
                        return;
                    }
                }
                MergeEvent::Drained(source) => {
                    drained += 1;
                    info!("[Merger] {} drained ({}/{})", source, drained, total);
                }
            }
        }

        info!("[Merger] All sources drained");
    });

    (merged_rx, task)
}
