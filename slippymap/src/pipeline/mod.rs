//! Asynchronous, deduplicated tile-fetch pipeline.
//!
//! A single dispatcher thread serializes admission: it checks the shared
//! in-flight key set and the bounded pending queue under one lock, so the
//! "at most one task per key" invariant needs no further coordination. A
//! small worker pool (1-2 threads, sized for I/O-bound fetches) takes
//! pending tasks freshest-first and invokes the backend's synchronous
//! fetch. Results cross back to the owning render context over a bounded
//! delivery channel drained between draw passes.
//!
//! Request lifecycle:
//!
//! ```text
//! request(key) ──► dispatcher ──► deduped (key already in flight)
//!                      │
//!                      ▼ admitted (may evict the oldest pending task)
//!                 pending queue ──► worker: TileSource::fetch_tile
//!                                      │
//!                                      ▼
//!                              delivery channel ──► try_next_delivery
//!                                                   (retires in-flight key)
//! ```
//!
//! Fetch failures are logged and delivered as absent; nothing is retried.
//! There is no per-tile cancellation: a task runs to completion unless the
//! overflow policy or shutdown drops it while still queued.

mod queue;

pub use queue::{FetchTask, PendingQueue};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::source::TileSource;
use crate::tile::{Tile, TileKey};

/// Default pending queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 2;

/// How long shutdown waits for a worker stuck in a fetch before detaching
/// it. Keeps teardown bounded when a backend never returns.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline tuning knobs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Worker threads performing blocking fetches (clamped to 1..=2).
    pub workers: usize,
    /// Pending queue capacity; overflow evicts the oldest pending task.
    pub queue_capacity: usize,
    /// Capacity of the request channel into the dispatcher.
    pub command_capacity: usize,
    /// Capacity of the worker-to-controller delivery channel.
    pub delivery_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            command_capacity: 64,
            delivery_capacity: 64,
        }
    }
}

/// A completed fetch, crossing from a worker to the controller context.
#[derive(Debug)]
pub struct TileDelivery {
    pub key: TileKey,
    /// `None` when the backend had no tile or the fetch failed.
    pub tile: Option<Tile>,
}

struct Shared {
    queue: Mutex<PendingQueue>,
    task_ready: Condvar,
    stopping: AtomicBool,
}

/// Owned fetch pipeline for one map view.
///
/// Each view instance constructs its own pipeline (pool, queue, in-flight
/// set); nothing is process-wide, so instances never interfere and tests
/// run isolated. The pipeline calls `TileSource::init` on construction and
/// `TileSource::release` exactly once after [`shutdown`] has joined all
/// threads.
///
/// [`shutdown`]: FetchPipeline::shutdown
pub struct FetchPipeline {
    /// Dropped on shutdown; the closed channel is the dispatcher's stop
    /// signal, so it cannot be missed the way a sentinel message could.
    command_tx: Option<mpsc::Sender<TileKey>>,
    delivery_rx: mpsc::Receiver<TileDelivery>,
    in_flight: Arc<DashSet<TileKey>>,
    shared: Arc<Shared>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    source: Arc<dyn TileSource>,
    shut_down: bool,
}

impl FetchPipeline {
    /// Initializes the backend and starts the dispatcher and worker threads.
    pub fn new(
        source: Arc<dyn TileSource>,
        config: PipelineConfig,
    ) -> Result<Self, crate::source::SourceError> {
        source.init()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (delivery_tx, delivery_rx) = mpsc::channel(config.delivery_capacity.max(1));

        let in_flight: Arc<DashSet<TileKey>> = Arc::new(DashSet::new());
        let shared = Arc::new(Shared {
            queue: Mutex::new(PendingQueue::new(config.queue_capacity.max(1))),
            task_ready: Condvar::new(),
            stopping: AtomicBool::new(false),
        });

        let dispatcher = {
            let shared = Arc::clone(&shared);
            let in_flight = Arc::clone(&in_flight);
            std::thread::Builder::new()
                .name("map-dispatch".to_string())
                .spawn(move || dispatcher_loop(command_rx, shared, in_flight))
                .map_err(|e| crate::source::SourceError::Init(e.to_string()))?
        };

        let worker_count = config.workers.clamp(1, 2);
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let shared = Arc::clone(&shared);
            let source = Arc::clone(&source);
            let delivery_tx = delivery_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("map-fetch-{}", i))
                .spawn(move || worker_loop(shared, source, delivery_tx))
                .map_err(|e| crate::source::SourceError::Init(e.to_string()))?;
            workers.push(handle);
        }

        Ok(Self {
            command_tx: Some(command_tx),
            delivery_rx,
            in_flight,
            shared,
            dispatcher: Some(dispatcher),
            workers,
            source,
            shut_down: false,
        })
    }

    /// Submits an asynchronous fetch for `key`. Never blocks.
    ///
    /// Duplicate requests for an in-flight key are dropped by the
    /// dispatcher. If the command channel is momentarily full the request
    /// is discarded; the tile is simply requested again on a later frame.
    pub fn request(&self, key: TileKey) {
        let Some(tx) = self.command_tx.as_ref() else {
            return;
        };
        if let Err(e) = tx.try_send(key) {
            debug!(tile = %key, "fetch request dropped: {}", e);
        }
    }

    /// Takes the next completed fetch, if any, retiring its in-flight key.
    ///
    /// Called by the controller between draw passes; never blocks.
    pub fn try_next_delivery(&mut self) -> Option<TileDelivery> {
        match self.delivery_rx.try_recv() {
            Ok(delivery) => {
                self.in_flight.remove(&delivery.key);
                Some(delivery)
            }
            Err(_) => None,
        }
    }

    /// Whether a fetch for `key` is currently in flight.
    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Number of keys currently in flight (queued, running, or undrained).
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of tasks waiting in the pending queue.
    pub fn pending_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Stops the pipeline and releases the backend.
    ///
    /// Closes the command channel to stop the dispatcher and joins it,
    /// abandons not-yet-started queued tasks, joins the workers (a running
    /// fetch completes first), then calls `TileSource::release`. A worker
    /// whose fetch never returns is detached after a bounded wait so
    /// teardown always terminates. No deliveries are observable after this
    /// returns.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.command_tx = None;
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }

        self.shared.stopping.store(true, Ordering::SeqCst);
        {
            let mut queue = self.shared.queue.lock();
            for task in queue.drain() {
                self.in_flight.remove(&task.key);
            }
        }
        self.shared.task_ready.notify_all();

        // Keep draining deliveries while joining so a worker blocked on a
        // full delivery channel can finish.
        let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
        for handle in self.workers.drain(..) {
            loop {
                if handle.is_finished() {
                    let _ = handle.join();
                    break;
                }
                if Instant::now() >= deadline {
                    warn!("fetch worker stuck in backend fetch; detaching");
                    break;
                }
                while self.delivery_rx.try_recv().is_ok() {}
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        while self.delivery_rx.try_recv().is_ok() {}
        self.in_flight.clear();

        self.source.release();
    }
}

impl Drop for FetchPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// Runs until the command channel closes.
fn dispatcher_loop(
    mut command_rx: mpsc::Receiver<TileKey>,
    shared: Arc<Shared>,
    in_flight: Arc<DashSet<TileKey>>,
) {
    let mut seq: u64 = 0;
    while let Some(key) = command_rx.blocking_recv() {
        let mut queue = shared.queue.lock();
        if in_flight.contains(&key) {
            debug!(tile = %key, "request deduped: already in flight");
            continue;
        }
        in_flight.insert(key);
        // Overflow eviction and admission are one step under the queue
        // lock: the evicted key leaves the in-flight set before the new
        // task becomes visible to workers.
        if let Some(evicted) = queue.admit(FetchTask::new(key, seq)) {
            in_flight.remove(&evicted.key);
            debug!(tile = %evicted.key, "pending queue full: evicted oldest task");
        }
        seq += 1;
        drop(queue);
        shared.task_ready.notify_one();
    }
}

fn worker_loop(
    shared: Arc<Shared>,
    source: Arc<dyn TileSource>,
    delivery_tx: mpsc::Sender<TileDelivery>,
) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.stopping.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(task) = queue.take() {
                    break task;
                }
                shared.task_ready.wait(&mut queue);
            }
        };

        let tile = match source.fetch_tile(task.key) {
            Ok(Some(tile)) => Some(tile),
            Ok(None) => {
                debug!(tile = %task.key, "backend has no tile");
                None
            }
            Err(e) => {
                warn!(tile = %task.key, error = %e, "tile fetch failed");
                None
            }
        };

        let delivery = TileDelivery {
            key: task.key,
            tile,
        };
        if delivery_tx.blocking_send(delivery).is_err() {
            // Receiver gone: the pipeline is being torn down.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryTileSource;
    use std::time::{Duration, Instant};

    fn key(x: u32) -> TileKey {
        TileKey::new(x, 0, 12)
    }

    fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn drain_all(pipeline: &mut FetchPipeline, expected: usize) -> Vec<TileDelivery> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while out.len() < expected {
            if let Some(d) = pipeline.try_next_delivery() {
                out.push(d);
            } else {
                assert!(
                    Instant::now() < deadline,
                    "timed out draining deliveries: got {} of {}",
                    out.len(),
                    expected
                );
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        out
    }

    fn pipeline_with(
        workers: usize,
        queue_capacity: usize,
    ) -> (FetchPipeline, Arc<MemoryTileSource>) {
        let source = Arc::new(MemoryTileSource::new(0.0, 18.0, 256));
        let config = PipelineConfig {
            workers,
            queue_capacity,
            ..PipelineConfig::default()
        };
        let pipeline = FetchPipeline::new(Arc::clone(&source) as Arc<dyn TileSource>, config)
            .expect("pipeline start");
        (pipeline, source)
    }

    #[test]
    fn test_fetch_delivers_tile_and_retires_key() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        source.insert(key(1), Tile::new(1, 1, vec![42]));

        pipeline.request(key(1));
        let deliveries = drain_all(&mut pipeline, 1);
        assert_eq!(deliveries[0].key, key(1));
        assert_eq!(deliveries[0].tile.as_ref().unwrap().pixels(), &[42]);
        assert!(!pipeline.is_in_flight(&key(1)));

        pipeline.shutdown();
    }

    #[test]
    fn test_missing_tile_delivered_as_absent() {
        let (mut pipeline, _source) = pipeline_with(1, 20);
        pipeline.request(key(7));
        let deliveries = drain_all(&mut pipeline, 1);
        assert!(deliveries[0].tile.is_none());
        pipeline.shutdown();
    }

    #[test]
    fn test_duplicate_requests_fetch_once() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        source.close_gate();

        pipeline.request(key(1));
        wait_until(|| pipeline.in_flight_len() == 1, "first request admitted");

        // Duplicates while the first fetch is stalled must all dedupe.
        for _ in 0..5 {
            pipeline.request(key(1));
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pipeline.in_flight_len(), 1);

        source.open_gate();
        drain_all(&mut pipeline, 1);
        assert_eq!(source.fetch_count(), 1);

        // After delivery the key is fetchable again.
        pipeline.request(key(1));
        drain_all(&mut pipeline, 1);
        assert_eq!(source.fetch_count(), 2);

        pipeline.shutdown();
    }

    #[test]
    fn test_overflow_evicts_oldest_and_key_is_fetchable_again() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        source.close_gate();

        // Key 0 occupies the single worker (blocked at the gate).
        pipeline.request(key(0));
        wait_until(
            || pipeline.in_flight_len() == 1 && pipeline.pending_len() == 0,
            "worker picked up key 0",
        );

        // Fill all 20 queue slots.
        for x in 1..=20 {
            pipeline.request(key(x));
        }
        wait_until(|| pipeline.pending_len() == 20, "queue full");
        assert_eq!(pipeline.in_flight_len(), 21);

        // The 21st pending request evicts exactly the oldest (key 1).
        pipeline.request(key(21));
        wait_until(|| !pipeline.is_in_flight(&key(1)), "key 1 evicted");
        assert_eq!(pipeline.pending_len(), 20);
        assert_eq!(pipeline.in_flight_len(), 21);

        source.open_gate();
        let deliveries = drain_all(&mut pipeline, 21);
        let delivered: Vec<u32> = deliveries.iter().map(|d| d.key.x).collect();
        assert!(!delivered.contains(&1), "evicted key was fetched");
        assert_eq!(pipeline.in_flight_len(), 0);

        // The evicted key is admissible again.
        pipeline.request(key(1));
        drain_all(&mut pipeline, 1);
        assert!(source.fetched_keys().contains(&key(1)));

        pipeline.shutdown();
    }

    #[test]
    fn test_workers_take_freshest_pending_first() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        source.close_gate();

        pipeline.request(key(0));
        wait_until(
            || pipeline.in_flight_len() == 1 && pipeline.pending_len() == 0,
            "worker busy",
        );
        for x in 1..=3 {
            pipeline.request(key(x));
        }
        wait_until(|| pipeline.pending_len() == 3, "queue populated");

        source.open_gate();
        drain_all(&mut pipeline, 4);

        let order = source.fetched_keys();
        assert_eq!(order[0], key(0));
        // Pending tasks come out most-recently-submitted first.
        assert_eq!(&order[1..], &[key(3), key(2), key(1)]);

        pipeline.shutdown();
    }

    #[test]
    fn test_lifecycle_brackets_pipeline() {
        let (mut pipeline, source) = pipeline_with(2, 20);
        assert_eq!(source.init_count(), 1);
        assert_eq!(source.release_count(), 0);

        pipeline.request(key(3));
        drain_all(&mut pipeline, 1);

        pipeline.shutdown();
        assert_eq!(source.init_count(), 1);
        assert_eq!(source.release_count(), 1);

        // Idempotent: a second shutdown must not release again.
        pipeline.shutdown();
        assert_eq!(source.release_count(), 1);
    }

    #[test]
    fn test_shutdown_abandons_queued_tasks() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        source.close_gate();

        pipeline.request(key(0));
        wait_until(|| pipeline.in_flight_len() == 1, "worker busy");
        for x in 1..=5 {
            pipeline.request(key(x));
        }
        wait_until(|| pipeline.pending_len() == 5, "queue populated");

        // The running fetch must complete; the queued five are abandoned.
        // The gate opens only after shutdown has drained the queue, so the
        // worker cannot pick up another task when it unblocks.
        let gate = Arc::clone(&source);
        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            gate.open_gate();
        });
        pipeline.shutdown();
        opener.join().ok();

        assert_eq!(source.fetch_count(), 1);
        assert_eq!(pipeline.in_flight_len(), 0);
        assert!(pipeline.try_next_delivery().is_none());
    }

    #[test]
    fn test_shutdown_returns_when_fetch_never_completes() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        source.close_gate();

        pipeline.request(key(0));
        wait_until(|| pipeline.in_flight_len() == 1, "worker busy");

        // The gate never opens: the stuck worker is detached after the
        // bounded wait and teardown still finishes.
        pipeline.shutdown();
        assert_eq!(source.release_count(), 1);
        assert!(pipeline.try_next_delivery().is_none());
    }

    #[test]
    fn test_shutdown_stops_dispatcher_with_backlogged_commands() {
        let source = Arc::new(MemoryTileSource::new(0.0, 18.0, 256));
        source.close_gate();
        let config = PipelineConfig {
            workers: 1,
            queue_capacity: 1,
            command_capacity: 1,
            ..PipelineConfig::default()
        };
        let mut pipeline =
            FetchPipeline::new(Arc::clone(&source) as Arc<dyn TileSource>, config)
                .expect("pipeline start");

        // Saturate the tiny command channel; closing it must still stop
        // the dispatcher even though no slot was free for a message.
        for x in 0..100 {
            pipeline.request(key(x));
        }
        let gate = Arc::clone(&source);
        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            gate.open_gate();
        });
        pipeline.shutdown();
        opener.join().ok();
        assert_eq!(source.release_count(), 1);
    }

    #[test]
    fn test_request_after_shutdown_is_ignored() {
        let (mut pipeline, source) = pipeline_with(1, 20);
        pipeline.shutdown();
        pipeline.request(key(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(source.fetch_count(), 0);
        assert!(pipeline.try_next_delivery().is_none());
    }

    #[test]
    fn test_two_workers_fetch_in_parallel() {
        let (mut pipeline, source) = pipeline_with(2, 20);
        source.close_gate();

        pipeline.request(key(1));
        pipeline.request(key(2));
        wait_until(
            || pipeline.in_flight_len() == 2 && pipeline.pending_len() == 0,
            "both workers busy",
        );

        source.open_gate();
        drain_all(&mut pipeline, 2);
        assert_eq!(source.fetch_count(), 2);

        pipeline.shutdown();
    }
}
