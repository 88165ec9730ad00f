// MIT License - Copyright (c) 2026 Peter Wright

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Identifies a pending delayed action.
///
/// At most one timer may be outstanding per key: the system-wide exit-delay
/// and alarm-reset timers are singular, entry-delay timers are per zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// The exit-delay timer started by an arm request.
    Exit,
    /// The alarm auto-reset timer started by a trigger.
    Reset,
    /// The entry-delay timer for one zone, keyed by normalized zone id.
    Entry(String),
}

/// Keyed, cancellable, restartable delayed actions.
///
/// Every firing is delivered as a typed message on the supplied channel, so
/// timer callbacks flow through the same serialized queue as every other
/// event — the scheduler never touches shared state itself.
///
/// Scheduling under a key that already has a pending timer cancels the old
/// timer first (last-writer-wins per key). A zero delay sends the message
/// immediately: zero-delay actions must not incur scheduling latency.
/// Cancelling an absent or already-fired timer is a no-op, and no message
/// is ever sent more than once per `schedule` call.
#[derive(Debug)]
pub struct DelayScheduler<M> {
    tx: UnboundedSender<M>,
    timers: HashMap<TimerKey, JoinHandle<()>>,
}

impl<M: Send + 'static> DelayScheduler<M> {
    pub fn new(tx: UnboundedSender<M>) -> Self {
        Self {
            tx,
            timers: HashMap::new(),
        }
    }

    /// Arrange for `msg` to be sent after `delay`, superseding any pending
    /// timer under the same key.
    pub fn schedule(&mut self, key: TimerKey, delay: Duration, msg: M) {
        self.cancel(&key);

        if delay.is_zero() {
            let _ = self.tx.send(msg);
            return;
        }

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg);
        });
        self.timers.insert(key, handle);
    }

    /// Cancel the pending timer under `key`, if any. Idempotent; aborting a
    /// timer whose message is already sent changes nothing.
    pub fn cancel(&mut self, key: &TimerKey) {
        if let Some(handle) = self.timers.remove(key) {
            handle.abort();
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    /// Whether a timer under `key` is scheduled and has not yet fired.
    pub fn is_pending(&self, key: &TimerKey) -> bool {
        self.timers.get(key).is_some_and(|h| !h.is_finished())
    }

    /// Number of scheduled timers that have not yet fired.
    pub fn pending_count(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl<M> Drop for DelayScheduler<M> {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
