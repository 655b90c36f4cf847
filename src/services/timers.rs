//! Timer scheduling for steps
//!
//! Timers fire as ordinary `TimedOut` events on the session queue. The
//! manager remembers which timers are still armed so the runtime can drop a
//! timeout that raced with the step moving on.

use crate::state_machine::Event;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identifies one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Opaque tag a step attaches to a timer and gets back on expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerState(pub u32);

pub struct TimerManager {
    /// Weak so pending timers never keep a finished session's queue open
    event_tx: mpsc::WeakUnboundedSender<Event>,
    armed: HashMap<TimerId, CancellationToken>,
    next_id: u64,
}

impl TimerManager {
    pub fn new(event_tx: &mpsc::UnboundedSender<Event>) -> Self {
        Self {
            event_tx: event_tx.downgrade(),
            armed: HashMap::new(),
            next_id: 0,
        }
    }

    /// Arm a timer that posts `TimedOut { timer, state }` after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, delay: Duration, state: TimerState) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let token = CancellationToken::new();
        self.armed.insert(id, token.clone());

        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    // Receiver gone means the session already ended
                    if let Some(tx) = event_tx.upgrade() {
                        let _ = tx.send(Event::TimedOut { timer: id, state });
                    }
                }
                () = token.cancelled() => {}
            }
        });

        tracing::trace!(timer = %id, delay_ms = delay.as_millis(), "Timer scheduled");
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        if let Some(token) = self.armed.remove(&id) {
            token.cancel();
            tracing::trace!(timer = %id, "Timer cancelled");
        }
    }

    /// Cancel everything still armed
    pub fn cancel_all(&mut self) {
        for (_, token) in self.armed.drain() {
            token.cancel();
        }
    }

    /// Consume a fired timer. Returns `false` for a stale timeout whose
    /// timer was cancelled before the event was dequeued.
    pub fn take_fired(&mut self, id: TimerId) -> bool {
        self.armed.remove(&id).is_some()
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
