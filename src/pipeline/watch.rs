//! Filesystem watch loop
//!
//! A dedicated thread owns the platform watcher and forwards debounced,
//! eligibility-filtered paths over a bounded channel to an async worker
//! that runs the relation pass. The thread polls a shutdown token every
//! 250ms so cancellation never waits on a filesystem event.

use super::{PipelineError, VaultPipeline};
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shutdown poll interval for the watcher thread.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Submission channel capacity; bursts beyond it are dropped with a
/// warning and picked up by a later event or batch pass.
const CHANNEL_CAPACITY: usize = 64;

/// Cooperative cancellation flag shared between the watch loop and its
/// owner. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. In-flight work finishes; no new events are accepted.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drops events arriving within a minimum interval of the last accepted
/// one. A zero interval accepts everything.
struct Debouncer {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    fn accept(&mut self) -> bool {
        let now = Instant::now();
        match self.last_accepted {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

/// Watch `root` and run the relation pass on every changed eligible
/// file until `shutdown` is cancelled.
///
/// The graph snapshot is persisted after each processed file; snapshot
/// errors are logged and watching continues.
pub async fn watch_vault(
    pipeline: Arc<VaultPipeline>,
    root: PathBuf,
    shutdown: ShutdownToken,
) -> Result<(), PipelineError> {
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(event_tx)
        .map_err(|e| PipelineError::Watch(e.to_string()))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| PipelineError::Watch(e.to_string()))?;

    let (path_tx, mut path_rx) = tokio::sync::mpsc::channel::<PathBuf>(CHANNEL_CAPACITY);
    let debounce = Duration::from_secs(pipeline.vault().debounce_secs);
    let thread_pipeline = Arc::clone(&pipeline);
    let thread_shutdown = shutdown.clone();

    let forwarder = std::thread::spawn(move || {
        // Watcher must live on this thread for as long as events flow.
        let _watcher = watcher;
        let mut debouncer = Debouncer::new(debounce);

        loop {
            if thread_shutdown.is_cancelled() {
                break;
            }
            let event = match event_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    warn!(error = %e, "watcher reported an error, continuing");
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            for path in event.paths {
                if !thread_pipeline.is_eligible(&path) {
                    continue;
                }
                if !debouncer.accept() {
                    debug!(path = %path.display(), "event debounced");
                    continue;
                }
                if path_tx.try_send(path.clone()).is_err() {
                    warn!(path = %path.display(), "submission channel full, dropping event");
                }
            }
        }
    });

    info!(root = %root.display(), "watching vault for changes");

    while let Some(path) = path_rx.recv().await {
        process_event(&pipeline, &path).await;
    }

    let _ = forwarder.join();
    info!(root = %root.display(), "watch loop stopped");
    Ok(())
}

async fn process_event(pipeline: &VaultPipeline, path: &Path) {
    let Some(report) = pipeline.process_file(path).await else {
        return;
    };
    info!(
        path = %path.display(),
        candidates = report.candidates,
        resolved = report.resolved,
        "change processed"
    );
    if let Err(e) = pipeline.save_graph().await {
        warn!(error = %e, "cannot persist graph snapshot, continuing to watch");
    }
}
