//! Indexing coordinator
//!
//! Owns the background worker for one library and sequences
//! scan → reconcile → notify. At most one pass runs at a time; reindex
//! requests that arrive mid-pass are coalesced into a single follow-up pass.
//!
//! ```text
//! Idle ──start──▶ Running ──reindex──▶ RunningWithReindexPending
//!  ▲                 │  ▲                        │
//!  │           done  │  └──── done (restart) ────┘
//!  │                 ▼
//!  └──── Stopping ◀──stop── (Running | RunningWithReindexPending)
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use thiserror::Error;

use crate::core::cancel::CancelFlag;
use crate::core::reconcile::{
    run_pass, FileReport, PassContext, PassError, PassProgress, PassSummary, ScanCounts,
};
use crate::core::store::StoreError;

/// Lifecycle state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    Idle,
    Running,
    RunningWithReindexPending,
    Stopping,
}

/// How a pass ended
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// Normal completion, including a cancelled (partial) pass
    Finished(PassSummary),
    /// Fatal pass failure (unreadable root, store failure)
    Failed(Arc<PassError>),
}

/// Notifications delivered to subscribers, in order
#[derive(Debug, Clone)]
pub enum IndexEvent {
    PassStarted { pass: u64 },
    ScanFinished { pass: u64, counts: ScanCounts },
    FileReconciled { pass: u64, report: FileReport },
    /// Sent exactly once per pass, after the last file is committed
    PassCompleted { pass: u64, outcome: PassOutcome },
}

/// Result of a start or reindex request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new pass was spawned
    Started,
    /// A pass is running; a follow-up pass is now pending
    Coalesced,
    /// A pass is already running; nothing changed
    AlreadyRunning,
    /// The coordinator is winding down; the request was dropped
    Ignored,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to spawn indexing worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Shared {
    state: CoordinatorState,
    worker: Option<JoinHandle<()>>,
    passes: u64,
}

struct Inner {
    ctx: PassContext,
    shared: Mutex<Shared>,
    idle: Condvar,
    cancel: CancelFlag,
    subscribers: Mutex<Vec<Sender<IndexEvent>>>,
}

impl Inner {
    fn broadcast(&self, event: IndexEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Background indexing for one library
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(ctx: PassContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                shared: Mutex::new(Shared {
                    state: CoordinatorState::Idle,
                    worker: None,
                    passes: 0,
                }),
                idle: Condvar::new(),
                cancel: CancelFlag::new(),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.shared.lock().state
    }

    /// Number of passes started so far
    pub fn passes(&self) -> u64 {
        self.inner.shared.lock().passes
    }

    /// Receive every event from now on; dropping the receiver unsubscribes
    pub fn subscribe(&self) -> Receiver<IndexEvent> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Begin a pass if idle
    pub fn start(&self) -> Result<StartOutcome, CoordinatorError> {
        let mut shared = self.inner.shared.lock();
        match shared.state {
            CoordinatorState::Idle => {
                self.spawn_worker(&mut shared)?;
                Ok(StartOutcome::Started)
            }
            CoordinatorState::Running | CoordinatorState::RunningWithReindexPending => {
                Ok(StartOutcome::AlreadyRunning)
            }
            CoordinatorState::Stopping => Ok(StartOutcome::Ignored),
        }
    }

    /// Ask for a fresh pass; safe to call in any state and idempotent while running
    pub fn request_reindex(&self) -> Result<StartOutcome, CoordinatorError> {
        let mut shared = self.inner.shared.lock();
        match shared.state {
            CoordinatorState::Idle => {
                self.spawn_worker(&mut shared)?;
                Ok(StartOutcome::Started)
            }
            CoordinatorState::Running | CoordinatorState::RunningWithReindexPending => {
                tracing::debug!("reindex requested while running; coalescing");
                shared.state = CoordinatorState::RunningWithReindexPending;
                Ok(StartOutcome::Coalesced)
            }
            CoordinatorState::Stopping => Ok(StartOutcome::Ignored),
        }
    }

    /// Cancel the current pass and block until the worker is idle
    ///
    /// The file being reconciled when the request arrives is allowed to finish.
    pub fn stop(&self) {
        let handle = {
            let mut shared = self.inner.shared.lock();
            if matches!(
                shared.state,
                CoordinatorState::Running | CoordinatorState::RunningWithReindexPending
            ) {
                tracing::info!("stopping indexing pass");
                shared.state = CoordinatorState::Stopping;
                self.inner.cancel.cancel();
            }
            while shared.state != CoordinatorState::Idle {
                self.inner.idle.wait(&mut shared);
            }
            shared.worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Block until no pass is running or pending
    pub fn wait_idle(&self) {
        let handle = {
            let mut shared = self.inner.shared.lock();
            while shared.state != CoordinatorState::Idle {
                self.inner.idle.wait(&mut shared);
            }
            shared.worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Stop, drop every record, and index from scratch
    pub fn reset_and_restart(&self) -> Result<StartOutcome, CoordinatorError> {
        self.stop();
        self.inner.ctx.store.reset()?;
        self.start()
    }

    fn spawn_worker(&self, shared: &mut Shared) -> Result<(), CoordinatorError> {
        // A previous worker has already flipped to Idle and is just returning
        if let Some(old) = shared.worker.take() {
            let _ = old.join();
        }

        self.inner.cancel.reset();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("cadventory-indexer".into())
            .spawn(move || worker_loop(inner))?;

        shared.state = CoordinatorState::Running;
        shared.worker = Some(handle);
        Ok(())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let pass = {
            let mut shared = inner.shared.lock();
            shared.passes += 1;
            shared.passes
        };
        inner.broadcast(IndexEvent::PassStarted { pass });

        // A panicking extractor must not leave the state stuck at Running
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_pass(&inner.ctx, &inner.cancel, &mut |progress| {
                let event = match progress {
                    PassProgress::Scanned(counts) => IndexEvent::ScanFinished { pass, counts },
                    PassProgress::File(report) => IndexEvent::FileReconciled { pass, report },
                };
                inner.broadcast(event);
            })
        }))
        .unwrap_or_else(|payload| Err(PassError::WorkerPanicked(panic_message(payload))));

        let panicked = matches!(result, Err(PassError::WorkerPanicked(_)));
        let outcome = match result {
            Ok(summary) => PassOutcome::Finished(summary),
            Err(err) => {
                tracing::error!(error = %err, "indexing pass failed");
                PassOutcome::Failed(Arc::new(err))
            }
        };
        inner.broadcast(IndexEvent::PassCompleted { pass, outcome });

        let mut shared = inner.shared.lock();
        match shared.state {
            CoordinatorState::RunningWithReindexPending if !panicked => {
                tracing::debug!("restarting for pending reindex");
                shared.state = CoordinatorState::Running;
            }
            _ => {
                shared.state = CoordinatorState::Idle;
                inner.idle.notify_all();
                return;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::{ExtractError, ExtractedMetadata, MetadataExtractor};
    use crate::core::reconcile::test_support::{context, write, FakeExtractor};
    use crossbeam_channel::Sender;
    use std::path::Path;
    use std::time::Duration;

    /// Blocks every extraction until the gate opens, announcing each entry
    struct GatedExtractor {
        inner: FakeExtractor,
        entered: Sender<String>,
        open: Mutex<bool>,
        opened: Condvar,
    }

    impl GatedExtractor {
        fn new(entered: Sender<String>) -> Self {
            Self {
                inner: FakeExtractor::default(),
                entered,
                open: Mutex::new(false),
                opened: Condvar::new(),
            }
        }

        fn open(&self) {
            *self.open.lock() = true;
            self.opened.notify_all();
        }
    }

    impl MetadataExtractor for GatedExtractor {
        fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ExtractError> {
            let _ = self.entered.send(path.display().to_string());
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
            drop(open);
            self.inner.extract(path)
        }
    }

    fn collect(rx: &Receiver<IndexEvent>) -> Vec<IndexEvent> {
        rx.try_iter().collect()
    }

    fn completed(events: &[IndexEvent]) -> Vec<&PassOutcome> {
        events
            .iter()
            .filter_map(|e| match e {
                IndexEvent::PassCompleted { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_runs_one_pass_to_idle() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.g", "A");
        write(tmp.path(), "b.g", "B");
        let coordinator = Coordinator::new(context(tmp.path(), Arc::new(FakeExtractor::default())));
        let rx = coordinator.subscribe();

        assert_eq!(coordinator.start().unwrap(), StartOutcome::Started);
        coordinator.wait_idle();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let events = collect(&rx);
        assert!(matches!(events[0], IndexEvent::PassStarted { pass: 1 }));
        assert!(matches!(events[1], IndexEvent::ScanFinished { .. }));
        let files = events
            .iter()
            .filter(|e| matches!(e, IndexEvent::FileReconciled { .. }))
            .count();
        assert_eq!(files, 2);
        assert!(matches!(events.last(), Some(IndexEvent::PassCompleted { .. })));
        match completed(&events)[..] {
            [PassOutcome::Finished(summary)] => assert_eq!(summary.geometry_processed, 2),
            _ => panic!("expected exactly one successful completion"),
        }
    }

    #[test]
    fn test_reindex_requests_coalesce_into_one_pass() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.g", "A");
        let (entered_tx, entered_rx) = unbounded();
        let extractor = Arc::new(GatedExtractor::new(entered_tx));
        let coordinator = Coordinator::new(context(tmp.path(), extractor.clone()));
        let rx = coordinator.subscribe();

        coordinator.start().unwrap();
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Running);

        assert_eq!(coordinator.start().unwrap(), StartOutcome::AlreadyRunning);
        for _ in 0..5 {
            assert_eq!(
                coordinator.request_reindex().unwrap(),
                StartOutcome::Coalesced
            );
        }
        assert_eq!(
            coordinator.state(),
            CoordinatorState::RunningWithReindexPending
        );

        extractor.open();
        coordinator.wait_idle();

        assert_eq!(coordinator.passes(), 2);
        let events = collect(&rx);
        let started = events
            .iter()
            .filter(|e| matches!(e, IndexEvent::PassStarted { .. }))
            .count();
        assert_eq!(started, 2);
        assert_eq!(completed(&events).len(), 2);
    }

    #[test]
    fn test_request_reindex_when_idle_starts() {
        let tmp = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(context(tmp.path(), Arc::new(FakeExtractor::default())));
        assert_eq!(
            coordinator.request_reindex().unwrap(),
            StartOutcome::Started
        );
        coordinator.wait_idle();
        assert_eq!(coordinator.passes(), 1);
    }

    #[test]
    fn test_stop_finishes_in_flight_file_then_idles() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.g", "A");
        write(tmp.path(), "b.g", "B");
        write(tmp.path(), "c.g", "C");
        let (entered_tx, entered_rx) = unbounded();
        let extractor = Arc::new(GatedExtractor::new(entered_tx));
        let ctx = context(tmp.path(), extractor.clone());
        let store = Arc::clone(&ctx.store);
        let coordinator = Arc::new(Coordinator::new(ctx));
        let rx = coordinator.subscribe();

        coordinator.start().unwrap();
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        coordinator.request_reindex().unwrap();

        let stopper = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.stop())
        };
        // Wait until stop() has flipped the state before letting the file finish
        while coordinator.state() != CoordinatorState::Stopping {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(coordinator.request_reindex().unwrap(), StartOutcome::Ignored);
        extractor.open();
        stopper.join().unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(extractor.inner.calls(), 1);
        assert_eq!(coordinator.passes(), 1);

        let events = collect(&rx);
        match completed(&events)[..] {
            [PassOutcome::Finished(summary)] => assert!(summary.cancelled),
            _ => panic!("expected one cancelled completion"),
        }

        // Nothing processed carries stale metadata
        for record in store.list(&Default::default()).unwrap() {
            if record.processed {
                let hash = crate::core::store::hash_file(&tmp.path().join(&record.rel_path)).unwrap();
                assert_eq!(record.fingerprint.unwrap().hash, Some(hash));
            }
        }
        assert_eq!(store.presented().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_when_idle_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(context(tmp.path(), Arc::new(FakeExtractor::default())));
        coordinator.stop();
        coordinator.stop();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn test_unreadable_root_reports_failure_once() {
        let tmp = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(context(
            &tmp.path().join("gone"),
            Arc::new(FakeExtractor::default()),
        ));
        let rx = coordinator.subscribe();
        coordinator.start().unwrap();
        coordinator.wait_idle();

        let events = collect(&rx);
        match completed(&events)[..] {
            [PassOutcome::Failed(err)] => {
                assert!(matches!(**err, PassError::ScanRootUnreadable(_)))
            }
            _ => panic!("expected one failed completion"),
        }
    }

    /// Panics on its first call, then behaves
    #[derive(Default)]
    struct PanicOnceExtractor {
        inner: FakeExtractor,
        panicked: std::sync::atomic::AtomicBool,
    }

    impl MetadataExtractor for PanicOnceExtractor {
        fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ExtractError> {
            if !self.panicked.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("extractor bug");
            }
            self.inner.extract(path)
        }
    }

    #[test]
    fn test_panicking_extractor_fails_pass_and_returns_to_idle() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.g", "A");
        let extractor = Arc::new(PanicOnceExtractor::default());
        let coordinator = Coordinator::new(context(tmp.path(), extractor.clone()));
        let rx = coordinator.subscribe();

        coordinator.start().unwrap();
        coordinator.wait_idle();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let events = collect(&rx);
        match completed(&events)[..] {
            [PassOutcome::Failed(err)] => match &**err {
                PassError::WorkerPanicked(message) => assert_eq!(message, "extractor bug"),
                other => panic!("unexpected failure: {}", other),
            },
            _ => panic!("expected one failed completion"),
        }

        // The worker survives for the next pass
        assert_eq!(coordinator.start().unwrap(), StartOutcome::Started);
        coordinator.wait_idle();
        let events = collect(&rx);
        match completed(&events)[..] {
            [PassOutcome::Finished(summary)] => assert_eq!(summary.geometry_processed, 1),
            _ => panic!("expected one successful completion"),
        }
        coordinator.stop();
    }

    #[test]
    fn test_reset_and_restart_reindexes_from_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.g", "A");
        let extractor = Arc::new(FakeExtractor::default());
        let ctx = context(tmp.path(), extractor.clone());
        let store = Arc::clone(&ctx.store);
        let coordinator = Coordinator::new(ctx);

        coordinator.start().unwrap();
        coordinator.wait_idle();
        let id = store.get_by_path("a.g").unwrap().unwrap().id;
        store.add_tag(id, "gone after reset").unwrap();

        coordinator.reset_and_restart().unwrap();
        coordinator.wait_idle();

        assert_eq!(extractor.calls(), 2);
        let record = store.get_by_path("a.g").unwrap().unwrap();
        assert!(record.processed);
        assert!(record.tags.is_empty());
    }
}
