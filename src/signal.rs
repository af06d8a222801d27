//! Completion signals
//!
//! A one-shot signal that many coroutines can await. Every job carries one
//! (fired when the job settles) and a bare `Job()` handle is nothing but a
//! signal. Waiters are resumed in the order they started waiting.
//!
//! `join` and `await` differ on a cancelled caller: joining always observes
//! the cancellation, awaiting an already completed value does not.

use crate::context::{Ctx, WaitError};
use crate::scheduler::WaitState;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

struct SignalState {
    fired: bool,
    waiters: Vec<WaitState>,
}

#[derive(Clone)]
pub struct Signal(Rc<RefCell<SignalState>>);

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        Signal(Rc::new(RefCell::new(SignalState {
            fired: false,
            waiters: Vec::new(),
        })))
    }

    pub fn is_fired(&self) -> bool {
        self.0.borrow().fired
    }

    /// Fire the signal, waking all current waiters. Idempotent.
    pub fn fire(&self) {
        let waiters = {
            let mut state = self.0.borrow_mut();
            if state.fired {
                return;
            }
            state.fired = true;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter.complete_ok();
        }
    }

    /// Suspend `ctx` until the signal fires (`join`). Fails if `ctx` is
    /// cancelled on entry, while waiting, or on resume, even when the signal
    /// has already fired.
    pub fn wait(&self, ctx: &Ctx) -> SignalWaitFuture {
        self.wait_future(ctx, false)
    }

    /// Like [`Signal::wait`], but a signal that has already fired resolves
    /// without looking at `ctx` (`await` on a completed deferred).
    pub fn await_value(&self, ctx: &Ctx) -> SignalWaitFuture {
        self.wait_future(ctx, true)
    }

    fn wait_future(&self, ctx: &Ctx, fired_first: bool) -> SignalWaitFuture {
        SignalWaitFuture {
            ctx: ctx.clone(),
            signal: self.clone(),
            state: WaitState::new(),
            fired_first,
            registered: false,
            waiter_id: 0,
        }
    }
}

pub struct SignalWaitFuture {
    ctx: Ctx,
    signal: Signal,
    state: WaitState,
    fired_first: bool,
    registered: bool,
    waiter_id: u64,
}

impl Future for SignalWaitFuture {
    type Output = Result<(), WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.state.is_cancelled() {
            return Poll::Ready(Err(WaitError::cancelled()));
        }

        if this.state.is_done() {
            this.ctx.forget_waiter(this.waiter_id);
            if this.ctx.is_cancelled() {
                return Poll::Ready(Err(WaitError::cancelled()));
            }
            return Poll::Ready(Ok(()));
        }

        if !this.registered {
            if this.fired_first && this.signal.is_fired() {
                return Poll::Ready(Ok(()));
            }
            if this.ctx.is_cancelled() {
                this.state.complete_cancelled();
                return Poll::Ready(Err(WaitError::context_cancelled()));
            }
            if this.signal.is_fired() {
                return Poll::Ready(Ok(()));
            }

            this.state.set_waker(cx.waker());
            this.waiter_id = this.ctx.watch_signal_wait(this.state.clone());
            this.signal.0.borrow_mut().waiters.push(this.state.clone());
            this.registered = true;
            return Poll::Pending;
        }

        this.state.set_waker(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::JobKind;
    use crate::executor::Executor;
    use crate::scheduler::TimeScheduler;
    use std::cell::Cell;

    fn root() -> (Rc<Executor>, Ctx) {
        let sched = Rc::new(RefCell::new(TimeScheduler::new()));
        let executor = Rc::new(Executor::new());
        let ctx = Ctx::new_root(sched, executor.clone(), JobKind::Scope);
        (executor, ctx)
    }

    #[test]
    fn test_fire_wakes_waiters() {
        let (executor, ctx) = root();
        let signal = Signal::new();
        let resumed = Rc::new(Cell::new(0));

        for _ in 0..2 {
            let wait = signal.wait(&ctx);
            let r = resumed.clone();
            executor.spawn(async move {
                if wait.await.is_ok() {
                    r.set(r.get() + 1);
                }
            });
        }

        executor.run_until_stalled();
        assert_eq!(resumed.get(), 0);

        signal.fire();
        signal.fire();
        executor.run_until_stalled();
        assert_eq!(resumed.get(), 2);
    }

    #[test]
    fn test_already_fired_resolves_immediately() {
        let (executor, ctx) = root();
        let signal = Signal::new();
        signal.fire();

        let done = Rc::new(Cell::new(false));
        let d = done.clone();
        let wait = signal.wait(&ctx);
        executor.spawn(async move {
            d.set(wait.await.is_ok());
        });
        executor.run_until_stalled();
        assert!(done.get());
    }

    #[test]
    fn test_cancelled_caller_join_vs_await() {
        let (executor, ctx) = root();
        let signal = Signal::new();
        signal.fire();
        ctx.cancel();

        let joined = Rc::new(RefCell::new(None));
        let awaited = Rc::new(RefCell::new(None));
        let (j, a) = (joined.clone(), awaited.clone());
        let join = signal.wait(&ctx);
        let value = signal.await_value(&ctx);
        executor.spawn(async move {
            *j.borrow_mut() = Some(join.await.is_ok());
            *a.borrow_mut() = Some(value.await.is_ok());
        });
        executor.run_until_stalled();

        assert_eq!(*joined.borrow(), Some(false));
        assert_eq!(*awaited.borrow(), Some(true));
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let (executor, ctx) = root();
        let signal = Signal::new();

        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        let wait = signal.wait(&ctx);
        executor.spawn(async move {
            *r.borrow_mut() = Some(wait.await.is_err());
        });
        executor.run_until_stalled();

        ctx.cancel();
        executor.run_until_stalled();
        assert_eq!(*result.borrow(), Some(true));
    }
}
