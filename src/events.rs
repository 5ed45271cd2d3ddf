//! Lifecycle events for explanation runs
//!
//! The engine reports what it does through a fire-and-forget event stream:
//! one `Started` per admitted computation, then exactly one `Completed` or
//! `Failed`. Cache hits skip `Started` and report a single `Completed` with
//! the cache flag set. The sink behind the emitter is pluggable; a full or
//! failing sink loses its own events, counted as drops, and never blocks or
//! fails an explanation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// One moment in an explanation run's lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// An admitted run began computing
    Started {
        /// Id of the explanation being produced
        explanation_id: String,
        /// Id of the prediction being explained
        prediction_id: String,
        /// Fingerprint digest of the input
        fingerprint: String,
    },
    /// A run produced an explanation record
    Completed {
        /// Id of the explanation produced
        explanation_id: String,
        /// Id of the prediction explained
        prediction_id: String,
        /// Wall-clock time the run took, in milliseconds
        elapsed_ms: u64,
        /// Confidence carried by the record
        confidence: f64,
        /// True when the record came from the cache
        cache_hit: bool,
    },
    /// A run ended with an error
    Failed {
        /// Id the explanation would have carried
        explanation_id: String,
        /// Id of the prediction that failed to explain
        prediction_id: String,
        /// Wall-clock time until the failure, in milliseconds
        elapsed_ms: u64,
        /// Display form of the error
        error: String,
    },
}

impl LifecycleEvent {
    /// Prediction id all event variants carry
    #[must_use]
    pub fn prediction_id(&self) -> &str {
        match self {
            LifecycleEvent::Started { prediction_id, .. }
            | LifecycleEvent::Completed { prediction_id, .. }
            | LifecycleEvent::Failed { prediction_id, .. } => prediction_id,
        }
    }

    /// Short name of the variant, matching the serialized tag
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Started { .. } => "started",
            LifecycleEvent::Completed { .. } => "completed",
            LifecycleEvent::Failed { .. } => "failed",
        }
    }
}

/// Destination for lifecycle events
///
/// Implementations must return quickly and must not panic; `emit` runs on
/// the thread that computed the explanation.
pub trait EventSink: Send + Sync {
    /// Accept one event; false means the event was dropped
    fn emit(&self, event: &LifecycleEvent) -> bool;
}

/// Sink that stores events in memory, mainly for tests and introspection
#[derive(Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl InMemoryEventSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event seen so far, in emission order
    pub fn records(&self) -> Vec<LifecycleEvent> {
        self.lock().clone()
    }

    /// Number of events seen so far
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Forget all stored events
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LifecycleEvent>> {
        // Pushes are single-step, so a poisoned buffer is still usable.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: &LifecycleEvent) -> bool {
        self.lock().push(event.clone());
        true
    }
}

/// Sink that forwards events over a bounded channel without blocking
///
/// When the channel is full or the receiver is gone the event is dropped;
/// the emitter records the drop.
pub struct ChannelEventSink {
    sender: SyncSender<LifecycleEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiving end of its channel
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<LifecycleEvent>) {
        let (sender, receiver) = std::sync::mpsc::sync_channel(capacity);
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &LifecycleEvent) -> bool {
        self.sender.try_send(event.clone()).is_ok()
    }
}

/// Sink that appends events to a JSON-lines file
///
/// The file is created on first write and opened in append mode, so
/// restarts extend the stream rather than truncating it. Serialization or
/// IO failures surface as a dropped event, never as an error on the
/// explain path.
pub struct JsonFileEventSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileEventSink {
    /// Create a sink appending to `path`
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// The file this sink appends to
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonFileEventSink {
    fn emit(&self, event: &LifecycleEvent) -> bool {
        let Ok(line) = serde_json::to_string(event) else {
            return false;
        };
        // Whole lines only: hold the lock across open and write so
        // concurrent emitters cannot interleave
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        else {
            return false;
        };
        writeln!(file, "{line}").is_ok()
    }
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &LifecycleEvent) -> bool {
        true
    }
}

/// Fire-and-forget front end the engine emits through
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl EventEmitter {
    /// Emit through the given sink
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Emitter that discards everything
    #[must_use]
    pub fn null() -> Self {
        Self::new(Arc::new(NullEventSink))
    }

    /// Emitter backed by an in-memory sink, returned alongside it
    #[must_use]
    pub fn in_memory() -> (Self, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::new());
        (Self::new(Arc::clone(&sink) as Arc<dyn EventSink>), sink)
    }

    /// Hand one event to the sink, counting the outcome
    pub fn emit(&self, event: LifecycleEvent) {
        if self.sink.emit(&event) {
            self.emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events the sink accepted
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Events the sink refused
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
