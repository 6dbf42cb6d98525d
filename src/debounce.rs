use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Keyed delay-and-collapse timers.
///
/// Scheduling an action for a key replaces whatever was pending for that
/// key; only the last action runs, once the key has been quiet for `delay`.
/// Actions are synchronous and run on the timer task, so cancelling a timer
/// never interrupts work the action handed off elsewhere.
pub struct Debouncer<K> {
    delay: Duration,
    pending: HashMap<K, JoinHandle<()>>,
}

impl<K: Eq + Hash + Copy> Debouncer<K> {
    pub fn new(delay: Duration) -> Debouncer<K> {
        Debouncer {
            delay,
            pending: HashMap::new(),
        }
    }

    pub fn schedule<F>(&mut self, key: K, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel(key);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        self.pending.insert(key, handle);
    }

    pub fn cancel(&mut self, key: K) {
        if let Some(handle) = self.pending.remove(&key) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: K) -> bool {
        self.pending
            .get(&key)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}
