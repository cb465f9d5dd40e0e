//! Triggered-once shutdown event.
//!
//! The event starts open and can be triggered exactly once; any number of
//! listeners may wait on it, before or after the trigger.

use tokio::sync::watch;

pub struct ShutdownEvent {
    tx: watch::Sender<bool>,
}

impl ShutdownEvent {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Trigger the event. Safe under concurrent invocation; only one call
    /// ever flips the state, and the return value tells the caller whether
    /// it was the triggering one.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownEvent {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Wait until the event has been triggered. Completes immediately if it
    /// already was. A dropped event can no longer change state, so channel
    /// closure counts as triggered.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::ShutdownEvent;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_fire_once() {
        let event = Arc::new(ShutdownEvent::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let event = Arc::clone(&event);
            let fired = Arc::clone(&fired);
            handles.push(tokio::spawn(async move {
                if event.trigger() {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(event.is_triggered());
    }

    #[tokio::test]
    async fn listener_wakes_on_trigger() {
        let event = ShutdownEvent::new();
        let mut listener = event.subscribe();

        let waiter = tokio::spawn(async move {
            listener.triggered().await;
        });
        event.trigger();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_after_trigger_completes_immediately() {
        let event = ShutdownEvent::new();
        event.trigger();

        let mut listener = event.subscribe();
        listener.triggered().await;
    }
}
