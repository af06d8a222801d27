//! Time Scheduler
//!
//! Owns the logical clock and the timer queue. Timers are resolved one
//! timeslice at a time: every timer due at the earliest deadline, in
//! registration order.

use crate::pq::MinPq;
use std::cell::RefCell;
use std::rc::Rc;
use std::task::Waker;

/// Shared wait state between a suspended future and whoever resolves it.
#[derive(Clone)]
pub struct WaitState {
    inner: Rc<RefCell<WaitStateInner>>,
}

struct WaitStateInner {
    done: bool,
    cancelled: bool,
    waker: Option<Waker>,
}

impl WaitState {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(WaitStateInner {
                done: false,
                cancelled: false,
                waker: None,
            })),
        }
    }

    pub fn set_waker(&self, w: &Waker) {
        self.inner.borrow_mut().waker = Some(w.clone());
    }

    pub fn complete_ok(&self) {
        let waker = {
            let mut s = self.inner.borrow_mut();
            if s.done || s.cancelled {
                return;
            }
            s.done = true;
            s.waker.take()
        };
        if let Some(w) = waker {
            w.wake();
        }
    }

    pub fn complete_cancelled(&self) {
        let waker = {
            let mut s = self.inner.borrow_mut();
            if s.done || s.cancelled {
                return;
            }
            s.cancelled = true;
            s.waker.take()
        };
        if let Some(w) = waker {
            w.wake();
        }
    }

    pub fn is_done(&self) -> bool {
        self.inner.borrow().done
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    pub fn is_complete(&self) -> bool {
        let s = self.inner.borrow();
        s.done || s.cancelled
    }
}

impl Default for WaitState {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata for a pending `delay`.
#[derive(Clone)]
pub struct TimeWaitMeta {
    pub seq: u64,
    pub target_time: u64,
    pub state: WaitState,
    pub waiter_id: u64,
}

/// The logical-time scheduler.
pub struct TimeScheduler {
    /// Deterministic sequence counter, also used for waiter ids.
    seq: u64,

    /// Current logical time in milliseconds.
    now: u64,

    time_pq: MinPq<TimeWaitMeta>,
}

impl Default for TimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeScheduler {
    pub fn new() -> Self {
        Self {
            seq: 0,
            now: 0,
            time_pq: MinPq::new(),
        }
    }

    /// Allocate a deterministic sequence number.
    pub fn alloc_seq(&mut self) -> u64 {
        let s = self.seq;
        self.seq += 1;
        s
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Deadline of the earliest pending timer.
    pub fn peek_next_event_time(&mut self) -> Option<u64> {
        self.time_pq.peek_deadline()
    }

    pub fn add_time_wait(&mut self, meta: TimeWaitMeta) {
        let id = meta.waiter_id;
        let deadline = meta.target_time;
        let seq = meta.seq;
        self.time_pq.add(id, deadline, seq, meta);
    }

    /// Remove a timer and wake it as cancelled.
    pub fn cancel_waiter(&mut self, id: u64) {
        if let Some(meta) = self.time_pq.remove(id) {
            meta.state.complete_cancelled();
        }
    }

    /// Advance the clock to the earliest deadline and resolve every timer due
    /// at it. Returns the resolved waiter ids in wake order.
    pub fn process_one_timeslice(&mut self) -> Vec<u64> {
        let Some(t) = self.time_pq.peek_deadline() else {
            return Vec::new();
        };
        self.now = self.now.max(t);

        let mut batch: Vec<TimeWaitMeta> = Vec::new();
        while self.time_pq.peek_deadline() == Some(t) {
            let Some((_, _, _, meta)) = self.time_pq.pop() else {
                break;
            };
            batch.push(meta);
        }

        batch.sort_by_key(|m| m.seq);

        let mut resolved_ids = Vec::with_capacity(batch.len());
        for w in batch {
            w.state.complete_ok();
            resolved_ids.push(w.waiter_id);
        }
        resolved_ids
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_at(sched: &mut TimeScheduler, target_time: u64) -> (u64, WaitState) {
        let seq = sched.alloc_seq();
        let state = WaitState::new();
        sched.add_time_wait(TimeWaitMeta {
            seq,
            target_time,
            state: state.clone(),
            waiter_id: seq,
        });
        (seq, state)
    }

    #[test]
    fn test_alloc_seq() {
        let mut sched = TimeScheduler::new();
        assert_eq!(sched.alloc_seq(), 0);
        assert_eq!(sched.alloc_seq(), 1);
        assert_eq!(sched.alloc_seq(), 2);
    }

    #[test]
    fn test_peek_next_event_time_empty() {
        let mut sched = TimeScheduler::new();
        assert_eq!(sched.peek_next_event_time(), None);
        assert!(sched.process_one_timeslice().is_empty());
        assert_eq!(sched.now(), 0);
    }

    #[test]
    fn test_timeslice_resolves_in_registration_order() {
        let mut sched = TimeScheduler::new();
        let (late, late_state) = wait_at(&mut sched, 2000);
        let (a, a_state) = wait_at(&mut sched, 1000);
        let (b, _) = wait_at(&mut sched, 1000);

        assert_eq!(sched.process_one_timeslice(), vec![a, b]);
        assert_eq!(sched.now(), 1000);
        assert!(a_state.is_done());
        assert!(!late_state.is_complete());

        assert_eq!(sched.process_one_timeslice(), vec![late]);
        assert_eq!(sched.now(), 2000);
        assert_eq!(sched.peek_next_event_time(), None);
    }

    #[test]
    fn test_cancel_waiter() {
        let mut sched = TimeScheduler::new();
        let (id, state) = wait_at(&mut sched, 1000);
        sched.cancel_waiter(id);
        assert!(state.is_cancelled());
        assert_eq!(sched.peek_next_event_time(), None);
    }
}
