use std::{
    sync::Mutex,
    time::Duration,
};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

/// Trailing-edge debouncer: each fed value cancels the previous pending
/// emission and schedules its own after the quiet period. Only the last
/// value of a burst comes out the receiving end. Generic over the debounced
/// value type.
pub struct Debouncer<T: Send + 'static> {
    quiet_period: Duration,
    output: UnboundedSender<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(quiet_period: Duration) -> (Self, UnboundedReceiver<T>) {
        let (output, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            quiet_period,
            output,
            pending: Mutex::new(None),
        };
        (debouncer, rx)
    }

    /// Re-arms the timer with `value`. Must be called from within a tokio
    /// runtime.
    pub fn feed(&self, value: T) {
        let tx = self.output.clone();
        let quiet_period = self.quiet_period;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let _ = tx.send(value);
        });
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Drops any pending emission without replacing it.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
