//! Debounced keypad input worker.
//!
//! Each open input session owns one pipeline: a thread-safe event queue fed
//! by the UI thread (enqueueing never blocks), a background worker that
//! coalesces queued keystrokes into a single query-string update per batch,
//! and a broadcast bus carrying throttled refresh requests to the hosting
//! controller. The worker survives panics inside an iteration; a dead worker
//! would leave input permanently unresponsive.

use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{error, info, warn};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::protocol::{InputEvent, SearchMessage};
use crate::sync_manager::SyncManager;

const BUS_CAPACITY: usize = 64;

type RefreshLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Owns one input session: event queue, worker thread, shared query slot, and
/// refresh signaling.
pub struct InputPipeline {
    event_tx: Sender<InputEvent>,
    query_slot: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
    bus_sender: broadcast::Sender<SearchMessage>,
    worker: Option<JoinHandle<()>>,
}

struct WorkerContext {
    event_rx: Receiver<InputEvent>,
    query_slot: Arc<Mutex<String>>,
    running: Arc<AtomicBool>,
    bus_sender: broadcast::Sender<SearchMessage>,
    sync: Arc<SyncManager>,
    refresh_limiter: RefreshLimiter,
    rebuild_sequence: String,
    min_query_len: usize,
    poll_timeout: Duration,
}

impl InputPipeline {
    /// Spawns the worker for one input session.
    pub fn new(config: &Config, sync: Arc<SyncManager>) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        let query_slot = Arc::new(Mutex::new(String::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (bus_sender, _) = broadcast::channel(BUS_CAPACITY);

        let cooldown = Duration::from_millis(config.refresh_cooldown_ms.max(1));
        let refresh_limiter = RateLimiter::direct(
            Quota::with_period(cooldown)
                .expect("valid limiter period")
                .allow_burst(NonZeroU32::new(1).expect("non-zero limiter burst")),
        );

        let context = WorkerContext {
            event_rx,
            query_slot: Arc::clone(&query_slot),
            running: Arc::clone(&running),
            bus_sender: bus_sender.clone(),
            sync,
            refresh_limiter,
            rebuild_sequence: config.rebuild_sequence.clone(),
            min_query_len: config.min_query_len,
            poll_timeout: Duration::from_millis(config.input_poll_ms.max(1)),
        };
        let worker = thread::spawn(move || worker_loop(context));

        Self {
            event_tx,
            query_slot,
            running,
            bus_sender,
            worker: Some(worker),
        }
    }

    /// Posts one event to the worker queue. Never blocks the caller.
    pub fn enqueue(&self, event: InputEvent) {
        if let Err(send_error) = self.event_tx.send(event) {
            warn!("Input pipeline worker is gone; dropping {:?}", send_error.0);
        }
    }

    /// Current coalesced query string.
    pub fn current_query(&self) -> String {
        self.query_slot
            .lock()
            .expect("query slot lock poisoned")
            .clone()
    }

    /// Subscribes to refresh/rebuild notifications for this session.
    pub fn subscribe(&self) -> broadcast::Receiver<SearchMessage> {
        self.bus_sender.subscribe()
    }

    /// Stops the worker and waits for it to exit. The wait is bounded by the
    /// poll timeout because the worker re-checks the running flag on every
    /// wakeup.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(InputEvent::Close);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Input pipeline worker panicked during shutdown");
            }
        }
    }
}

impl Drop for InputPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(context: WorkerContext) {
    info!("Input pipeline worker started");

    while context.running.load(Ordering::SeqCst) {
        let first = match context.event_rx.recv_timeout(context.poll_timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Drain everything already queued so a fast burst of keystrokes is
        // applied as one batch.
        let mut events = vec![first];
        while let Ok(event) = context.event_rx.try_recv() {
            events.push(event);
        }

        let iteration =
            std::panic::catch_unwind(AssertUnwindSafe(|| process_batch(&context, &events)));
        match iteration {
            Ok(close_requested) => {
                if close_requested {
                    break;
                }
            }
            Err(payload) => {
                error!(
                    "Input worker iteration panicked: {}",
                    panic_payload_to_string(payload.as_ref())
                );
            }
        }
    }

    info!("Input pipeline worker stopped");
}

/// Applies one drained batch and handles signaling. Returns whether a close
/// was requested.
fn process_batch(context: &WorkerContext, events: &[InputEvent]) -> bool {
    let previous = context
        .query_slot
        .lock()
        .expect("query slot lock poisoned")
        .clone();
    let mut query = previous.clone();
    let close_requested = apply_events(&mut query, events);
    write_query_slot(context, &query);

    if !context.rebuild_sequence.is_empty() && query == context.rebuild_sequence {
        warn!("Rebuild sequence entered; forcing code cache rebuild");
        context.sync.rebuild_cache();
        let _ = context.bus_sender.send(SearchMessage::CacheRebuilt);
        query.clear();
        write_query_slot(context, &query);
    }

    if query != previous {
        if query.is_empty() {
            // Emptied input returns to the unfiltered view right away, and
            // still starts the cool-down window for the next trigger.
            let _ = context.bus_sender.send(SearchMessage::RefreshRequested);
            let _ = context.refresh_limiter.check();
        } else if query.len() >= context.min_query_len && context.refresh_limiter.check().is_ok() {
            let _ = context.bus_sender.send(SearchMessage::RefreshRequested);
        }
    }

    close_requested
}

/// Applies events in arrival order to the query string. Stops at `Close`;
/// later events in the batch are discarded.
fn apply_events(query: &mut String, events: &[InputEvent]) -> bool {
    for event in events {
        match event {
            InputEvent::Digit(digit) => {
                if *digit <= 9 {
                    query.push(char::from(b'0' + digit));
                } else {
                    warn!("Ignoring out-of-range digit event {}", digit);
                }
            }
            InputEvent::Delete => {
                query.pop();
            }
            InputEvent::Clear => query.clear(),
            InputEvent::Close => return true,
        }
    }
    false
}

fn write_query_slot(context: &WorkerContext, query: &str) {
    let mut slot = context
        .query_slot
        .lock()
        .expect("query slot lock poisoned");
    if *slot != query {
        query.clone_into(&mut *slot);
    }
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}
