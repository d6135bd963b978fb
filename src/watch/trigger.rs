//! Coalescing trigger: a single-slot debouncer.
//!
//! Any number of [`CoalescingTrigger::signal`] calls within the quiescence
//! window collapse into one fire. Fires are serialized: signals that arrive
//! while the callback runs start a fresh window once it returns, so the
//! callback never overlaps itself.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::lifecycle::shutdown::ShutdownSignal;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct CoalescingTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl CoalescingTrigger {
    /// Start (or restart) the quiescence window. Returns `false` once the
    /// trigger task has ended.
    pub fn signal(&self) -> bool {
        self.tx.send(()).is_ok()
    }

    /// Spawn the trigger task. The task resolves to the number of fires.
    pub fn spawn<F, Fut>(
        window: Duration,
        shutdown: ShutdownSignal,
        on_fire: F,
    ) -> (Self, JoinHandle<u64>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, window, shutdown, on_fire));
        (Self { tx }, task)
    }
}

async fn run<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<()>,
    window: Duration,
    mut shutdown: ShutdownSignal,
    mut on_fire: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut fired = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            signal = rx.recv() => if signal.is_none() { break },
        }

        let deadline = time::sleep(window);
        tokio::pin!(deadline);
        let mut coalesced = 1u32;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!(coalesced, "Discarding pending recompile on shutdown");
                    return fired;
                }
                signal = rx.recv() => match signal {
                    Some(()) => {
                        coalesced += 1;
                        deadline.as_mut().reset(Instant::now() + window);
                    }
                    // Every sender is gone; still honor the pending window.
                    None => break,
                },
                _ = &mut deadline => break,
            }
        }

        fired += 1;
        tracing::debug!(coalesced, "Quiescence window elapsed, firing");
        on_fire().await;
    }

    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Counting = (CoalescingTrigger, JoinHandle<u64>, Arc<AtomicUsize>, Arc<AtomicUsize>);

    /// Trigger whose callback counts fires and the peak number running at once.
    fn counting(window: Duration, shutdown: &Shutdown, fire_time: Duration) -> Counting {
        let fires = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let (f, m) = (Arc::clone(&fires), Arc::clone(&max_active));
        let (trigger, task) = CoalescingTrigger::spawn(window, shutdown.subscribe(), move || {
            let (fires, max_active, active) = (Arc::clone(&f), Arc::clone(&m), Arc::clone(&active));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                fires.fetch_add(1, Ordering::SeqCst);
                time::sleep(fire_time).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        });
        (trigger, task, fires, max_active)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_fires_once() {
        let shutdown = Shutdown::new();
        let (trigger, _task, fires, _) = counting(DEFAULT_WINDOW, &shutdown, Duration::ZERO);

        for _ in 0..10 {
            assert!(trigger.signal());
            time::sleep(Duration::from_millis(50)).await;
        }
        // 500ms after the first signal but only 50ms after the last.
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(260)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_only_after_full_window() {
        let shutdown = Shutdown::new();
        let (trigger, _task, fires, _) = counting(DEFAULT_WINDOW, &shutdown, Duration::ZERO);

        trigger.signal();
        time::sleep(Duration::from_millis(299)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_fire_separately() {
        let shutdown = Shutdown::new();
        let (trigger, _task, fires, _) = counting(DEFAULT_WINDOW, &shutdown, Duration::ZERO);

        trigger.signal();
        trigger.signal();
        time::sleep(Duration::from_secs(1)).await;
        trigger.signal();
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fires.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn signals_during_fire_rearm_without_overlap() {
        let shutdown = Shutdown::new();
        let (trigger, _task, fires, max_active) =
            counting(DEFAULT_WINDOW, &shutdown, Duration::from_millis(500));

        trigger.signal();
        time::sleep(Duration::from_millis(400)).await; // fire started at 300ms
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        trigger.signal();
        trigger.signal();

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 2);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_pending_fire() {
        let shutdown = Shutdown::new();
        let (trigger, task, fires, _) = counting(DEFAULT_WINDOW, &shutdown, Duration::ZERO);

        trigger.signal();
        time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();

        assert_eq!(task.await.unwrap(), 0);
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        assert!(!trigger.signal());
    }
}
