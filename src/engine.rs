//! Engine - offline execution loop
//!
//! Ties the executor and scheduler together: drain every runnable task, then
//! advance the clock to the next timer, until the caller's completion check
//! passes or the run can make no further progress.

use crate::context::{Ctx, JobKind};
use crate::executor::Executor;
use crate::scheduler::TimeScheduler;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use tracing::debug;

/// Virtual time at which a run that has not finished is declared stuck.
pub const WAIT_FOREVER_HORIZON: u64 = 10_000_000;

/// Configuration for an engine run.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Timers beyond this logical time are never reached.
    pub horizon: u64,
    pub max_timeslices: usize,
    pub max_polls: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon: WAIT_FOREVER_HORIZON,
            max_timeslices: 200_000,
            max_polls: 1_000_000,
        }
    }
}

/// Why [`Engine::run_until`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    /// Nothing runnable and no timer pending.
    Deadlocked,
    /// The next timer lies past the horizon.
    HorizonReached,
    BudgetExhausted,
}

pub struct Engine {
    pub executor: Rc<Executor>,
    pub scheduler: Rc<RefCell<TimeScheduler>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            executor: Rc::new(Executor::new()),
            scheduler: Rc::new(RefCell::new(TimeScheduler::new())),
            config,
        }
    }

    /// A parentless job bound to this engine.
    pub fn root_ctx(&self, kind: JobKind) -> Ctx {
        Ctx::new_root(self.scheduler.clone(), self.executor.clone(), kind)
    }

    pub fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        self.executor.spawn(fut);
    }

    pub fn now(&self) -> u64 {
        self.scheduler.borrow().now()
    }

    /// Run until `is_done` holds after a drain, or until no progress is
    /// possible.
    pub fn run_until<F>(&mut self, is_done: F) -> RunOutcome
    where
        F: Fn() -> bool,
    {
        let mut processed = 0;
        loop {
            // Critical: drain executor before looking at timers
            self.executor.run_until_stalled();

            if is_done() {
                return RunOutcome::Finished;
            }

            if self.executor.polls() > self.config.max_polls {
                debug!(polls = self.executor.polls(), now = self.now(), "poll budget exhausted");
                return RunOutcome::BudgetExhausted;
            }

            let next = self.scheduler.borrow_mut().peek_next_event_time();
            match next {
                None => {
                    debug!(now = self.now(), live_tasks = self.executor.live_tasks(), "deadlock");
                    return RunOutcome::Deadlocked;
                }
                Some(t) if t > self.config.horizon => {
                    debug!(next = t, horizon = self.config.horizon, "next timer beyond horizon");
                    return RunOutcome::HorizonReached;
                }
                Some(_) => {}
            }

            self.scheduler.borrow_mut().process_one_timeslice();

            processed += 1;
            if processed > self.config.max_timeslices {
                debug!(processed, now = self.now(), "timeslice budget exhausted");
                return RunOutcome::BudgetExhausted;
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.executor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use std::cell::Cell;

    #[test]
    fn test_run_until_finished() {
        let mut engine = Engine::new(EngineConfig::default());
        let ctx = engine.root_ctx(JobKind::Scope);
        let counter = Rc::new(Cell::new(0));
        let c = counter.clone();

        engine.spawn(async move {
            c.set(c.get() + 1);
            let _ = ctx.delay(1000).await;
            c.set(c.get() + 1);
            let _ = ctx.delay(1000).await;
            c.set(c.get() + 1);
        });

        let done = counter.clone();
        assert_eq!(engine.run_until(move || done.get() == 3), RunOutcome::Finished);
        assert_eq!(engine.now(), 2000);
    }

    #[test]
    fn test_deadlock_detected() {
        let mut engine = Engine::new(EngineConfig::default());
        let ctx = engine.root_ctx(JobKind::Scope);
        let never = Signal::new();
        engine.spawn(async move {
            let _ = never.wait(&ctx).await;
        });
        assert_eq!(engine.run_until(|| false), RunOutcome::Deadlocked);
    }

    #[test]
    fn test_horizon() {
        let mut engine = Engine::new(EngineConfig {
            horizon: 5000,
            ..Default::default()
        });
        let ctx = engine.root_ctx(JobKind::Scope);
        engine.spawn(async move {
            let _ = ctx.delay(3000).await;
            let _ = ctx.delay(3000).await;
        });
        assert_eq!(engine.run_until(|| false), RunOutcome::HorizonReached);
        assert_eq!(engine.now(), 3000);
    }
}
