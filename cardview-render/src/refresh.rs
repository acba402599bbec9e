//! Refresh coordination: one refresh at a time, index changes debounced.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

/// Single in-flight flag for the global refresh. A refresh requested while
/// another runs is dropped, not queued.
#[derive(Debug, Default)]
pub struct RefreshGuard {
    in_flight: AtomicBool,
}

/// Held for the duration of one refresh; clears the flag on drop.
#[derive(Debug)]
pub struct RefreshTicket<'a> {
    guard: &'a RefreshGuard,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Option<RefreshTicket<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshTicket { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}

/// Coalesce change notifications with a trailing-edge window.
///
/// `on_fire` runs once `quiet` has passed without a new notification; each
/// notification restarts the window. When the sender side closes, a pending
/// notification fires immediately and the loop ends.
pub async fn run_debounced<F, Fut>(mut rx: mpsc::UnboundedReceiver<()>, quiet: Duration, mut on_fire: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending = false;
    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(()) => pending = true,
                    None => {
                        if pending {
                            on_fire().await;
                        }
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(quiet), if pending => {
                pending = false;
                tracing::debug!("index changed, refreshing");
                on_fire().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn concurrent_refresh_is_dropped() {
        let guard = RefreshGuard::new();
        let ticket = guard.try_begin();
        assert!(ticket.is_some());
        assert!(guard.is_running());
        assert!(guard.try_begin().is_none());

        drop(ticket);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_within_window_coalesce() {
        let (tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let handle = tokio::spawn(run_debounced(rx, Duration::from_millis(1000), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        for _ in 0..3 {
            tx.send(()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0, "window restarts on every notification");

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_without_pending_does_not_fire() {
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        drop(tx);
        run_debounced(rx, Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
