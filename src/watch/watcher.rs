//! Filesystem watch loops.
//!
//! One OS watcher and one task per [`WatchTarget`]. Raw notify events are
//! forwarded into the task, filtered for relevance and turned into
//! [`CoalescingTrigger::signal`] calls.

use notify::{Config, Event, RecommendedWatcher, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownSignal;
use crate::watch::target::WatchTarget;
use crate::watch::trigger::CoalescingTrigger;

/// Handles to the running watch loops.
#[derive(Debug, Default)]
pub struct WatchHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    /// Number of targets that are actually being watched.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every loop to exit. Loops exit once shutdown is triggered.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Watch loop panicked");
            }
        }
    }
}

/// Start watching every target. A target that cannot be watched is logged
/// and skipped; the others keep working.
pub fn start(
    targets: &[WatchTarget],
    trigger: &CoalescingTrigger,
    shutdown: &ShutdownSignal,
) -> WatchHandle {
    let mut tasks = Vec::with_capacity(targets.len());
    for target in targets {
        match spawn_loop(target.clone(), trigger.clone(), shutdown.clone()) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                crate::observability::metrics::record_watch_failure();
                tracing::error!(watched = %target, error = %e, "Failed to watch target, skipping");
            }
        }
    }
    WatchHandle { tasks }
}

fn spawn_loop(
    target: WatchTarget,
    trigger: CoalescingTrigger,
    mut shutdown: ShutdownSignal,
) -> Result<JoinHandle<()>, notify::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        },
        Config::default(),
    )?;

    let (root, mode) = target.watch_root();
    watcher.watch(&root, mode)?;
    tracing::info!(watched = %target, "Watching");

    Ok(tokio::spawn(async move {
        // The OS watch lives exactly as long as this loop.
        let _watcher = watcher;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = rx.recv() => match event {
                    Some(Ok(event)) => {
                        if target.is_relevant(&event) {
                            tracing::debug!(watched = %target, kind = ?event.kind, paths = ?event.paths, "Change detected");
                            trigger.signal();
                        }
                    }
                    Some(Err(e)) => {
                        crate::observability::metrics::record_watch_failure();
                        tracing::warn!(watched = %target, error = %e, "Watch error");
                    }
                    None => break,
                },
            }
        }
        tracing::debug!(watched = %target, "Watch loop stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;
    use std::time::Duration;

    #[tokio::test]
    async fn unwatchable_target_is_skipped() {
        let shutdown = Shutdown::new();
        let (trigger, _task) =
            CoalescingTrigger::spawn(Duration::from_millis(10), shutdown.subscribe(), || async {});

        let missing = WatchTarget::directory("/definitely/not/a/real/dir");
        let dir = tempfile::tempdir().unwrap();
        let present = WatchTarget::directory(dir.path());

        let handle = start(&[missing, present], &trigger, &shutdown.subscribe());
        assert_eq!(handle.active(), 1);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("watch loops exit on shutdown");
    }
}
