//! Job Context
//!
//! The job tree every simulated coroutine runs in. A [`Ctx`] is one job:
//! a structured scope, a supervisor scope, a spawned task, or the detached
//! background scope. It owns the bookkeeping for cancellation (cascading to
//! descendants and interrupting their pending waits), failure propagation to
//! the parent, and the wait-for-children step every job goes through before
//! it settles.

use crate::executor::Executor;
use crate::scheduler::{TimeScheduler, TimeWaitMeta, WaitState};
use crate::signal::Signal;
use crate::statement::ExceptionKind;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

static CTX_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_ctx_id() -> u64 {
    CTX_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Error returned when a wait is interrupted by cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitError {
    pub message: String,
}

impl WaitError {
    pub fn cancelled() -> Self {
        Self {
            message: "cancelled".to_string(),
        }
    }

    pub fn context_cancelled() -> Self {
        Self {
            message: "context cancelled".to_string(),
        }
    }
}

impl std::fmt::Display for WaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WaitError {}

/// Role of a job in the tree. Decides what happens when a child task fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// `coroutineScope`: a failing child cancels the scope.
    Scope,
    /// `supervisorScope`: child failures are ignored.
    Supervisor,
    /// A spawned coroutine (`launch`/`async`). Reports its failure upward.
    Task,
    /// The detached supervisor behind `backgroundScope.launch`.
    Background,
}

impl JobKind {
    fn supervises(self) -> bool {
        matches!(self, JobKind::Supervisor | JobKind::Background)
    }
}

/// Final state of a settled job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(ExceptionKind),
    Cancelled,
}

impl JobOutcome {
    /// The exception a scope rethrows (or an awaiter observes) for this outcome.
    pub fn into_result(self) -> Result<(), ExceptionKind> {
        match self {
            JobOutcome::Completed => Ok(()),
            JobOutcome::Failed(kind) => Err(kind),
            JobOutcome::Cancelled => Err(ExceptionKind::Cancellation),
        }
    }
}

/// A suspended wait that cancellation must interrupt.
#[derive(Clone)]
pub enum PendingWait {
    Timer,
    Signal(WaitState),
}

pub struct CtxInner {
    pub id: u64,
    pub kind: JobKind,
    pub cancelled: bool,

    /// First non-cancellation failure, from the body or a child.
    pub failure: Option<ExceptionKind>,

    /// Whether the parent already heard about `failure`.
    pub failure_reported: bool,

    pub outcome: Option<JobOutcome>,

    /// Pending waiters for this job (for cancellation cleanup).
    pub pending_waiters: HashMap<u64, PendingWait>,

    pub children: Vec<Weak<RefCell<CtxInner>>>,

    pub parent: Option<Weak<RefCell<CtxInner>>>,

    /// Woken when the last child unlinks.
    pub idle_waker: Option<Waker>,

    /// Fired when the job settles.
    pub completion: Signal,

    pub scheduler: Rc<RefCell<TimeScheduler>>,

    pub executor: Rc<Executor>,
}

/// A handle to a job.
/// Uses Rc<RefCell<>> for interior mutability across .await points.
#[derive(Clone)]
pub struct Ctx(pub Rc<RefCell<CtxInner>>);

impl Ctx {
    /// Create a job without a parent.
    pub fn new_root(
        scheduler: Rc<RefCell<TimeScheduler>>,
        executor: Rc<Executor>,
        kind: JobKind,
    ) -> Self {
        Ctx(Rc::new(RefCell::new(CtxInner {
            id: next_ctx_id(),
            kind,
            cancelled: false,
            failure: None,
            failure_reported: false,
            outcome: None,
            pending_waiters: HashMap::new(),
            children: Vec::new(),
            parent: None,
            idle_waker: None,
            completion: Signal::new(),
            scheduler,
            executor,
        })))
    }

    pub fn id(&self) -> u64 {
        self.0.borrow().id
    }

    pub fn kind(&self) -> JobKind {
        self.0.borrow().kind
    }

    /// Current logical time.
    pub fn now(&self) -> u64 {
        self.0.borrow().scheduler.borrow().now()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.borrow().cancelled
    }

    /// `None` until the job has settled.
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.0.borrow().outcome
    }

    pub fn completion(&self) -> Signal {
        self.0.borrow().completion.clone()
    }

    /// Cancel this job and all its descendants. Pending waits resume with an
    /// error. Idempotent.
    pub fn cancel(&self) {
        let (waiters, children, scheduler) = {
            let mut inner = self.0.borrow_mut();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;

            let mut waiters: Vec<(u64, PendingWait)> = inner.pending_waiters.drain().collect();
            waiters.sort_by_key(|(id, _)| *id);

            let children = inner.children.clone();
            (waiters, children, inner.scheduler.clone())
        };

        for (id, wait) in waiters {
            match wait {
                PendingWait::Timer => scheduler.borrow_mut().cancel_waiter(id),
                PendingWait::Signal(state) => state.complete_cancelled(),
            }
        }

        for child_weak in children {
            if let Some(child_rc) = child_weak.upgrade() {
                Ctx(child_rc).cancel();
            }
        }
    }

    /// Record a failure and cancel the job. A task tells its parent right away
    /// unless it was already being cancelled; in that case the parent hears
    /// about it when the task settles.
    pub fn fail(&self, kind: ExceptionKind) {
        let (first_failure, was_cancelled) = {
            let mut inner = self.0.borrow_mut();
            let first = inner.failure.is_none();
            if first {
                inner.failure = Some(kind);
            }
            (first, inner.cancelled)
        };
        self.cancel();
        if first_failure && !was_cancelled {
            self.report_failure();
        }
    }

    fn report_failure(&self) {
        let (kind, failure, parent) = {
            let mut inner = self.0.borrow_mut();
            if inner.failure_reported {
                return;
            }
            inner.failure_reported = true;
            let parent = inner.parent.as_ref().and_then(|w| w.upgrade());
            (inner.kind, inner.failure, parent)
        };
        if kind != JobKind::Task {
            return;
        }
        if let (Some(failure), Some(parent)) = (failure, parent) {
            Ctx(parent).child_failed(failure);
        }
    }

    fn child_failed(&self, kind: ExceptionKind) {
        if !self.kind().supervises() {
            self.fail(kind);
        }
    }

    /// Create a child job. A child of a cancelled job starts cancelled.
    pub fn child(&self, kind: JobKind) -> Ctx {
        let (cancelled, scheduler, executor) = {
            let inner = self.0.borrow();
            (
                inner.cancelled,
                inner.scheduler.clone(),
                inner.executor.clone(),
            )
        };

        let child = Ctx::new_root(scheduler, executor, kind);
        {
            let mut inner = child.0.borrow_mut();
            inner.cancelled = cancelled;
            inner.parent = Some(Rc::downgrade(&self.0));
        }

        self.0
            .borrow_mut()
            .children
            .push(Rc::downgrade(&child.0));

        child
    }

    /// Spawn a child task at the back of the run queue. The body future is
    /// built eagerly but never polled if the task is cancelled before it
    /// first runs.
    pub fn launch<F, Fut>(&self, f: F) -> Ctx
    where
        F: FnOnce(Ctx) -> Fut,
        Fut: Future<Output = Result<(), ExceptionKind>> + 'static,
    {
        let child = self.child(JobKind::Task);
        let fut = f(child.clone());
        let task_ctx = child.clone();
        let executor = self.0.borrow().executor.clone();

        executor.spawn(async move {
            let result = if task_ctx.is_cancelled() {
                Err(ExceptionKind::Cancellation)
            } else {
                fut.await
            };
            task_ctx.complete(result).await;
        });

        child
    }

    /// Finish the job: apply the body's result, wait for every child, then
    /// settle, wake joiners and unlink from the parent.
    pub async fn complete(&self, result: Result<(), ExceptionKind>) -> JobOutcome {
        match result {
            Ok(()) => {}
            Err(ExceptionKind::Cancellation) => self.cancel(),
            Err(kind) => self.fail(kind),
        }
        self.children_idle().await;
        self.settle()
    }

    fn settle(&self) -> JobOutcome {
        let (outcome, unreported, parent, completion) = {
            let mut inner = self.0.borrow_mut();
            let outcome = match inner.failure {
                Some(kind) => JobOutcome::Failed(kind),
                None if inner.cancelled => JobOutcome::Cancelled,
                None => JobOutcome::Completed,
            };
            inner.outcome = Some(outcome);
            let unreported = inner.failure.is_some() && !inner.failure_reported;
            let parent = inner.parent.as_ref().and_then(|w| w.upgrade());
            (outcome, unreported, parent, inner.completion.clone())
        };

        if unreported {
            self.report_failure();
        }

        completion.fire();

        if let Some(parent) = parent {
            Ctx(parent).unlink_child(self.id());
        }
        self.0.borrow_mut().parent = None;

        outcome
    }

    fn unlink_child(&self, child_id: u64) {
        let waker = {
            let mut inner = self.0.borrow_mut();
            inner.children.retain(|c| {
                c.upgrade()
                    .map(|rc| rc.borrow().id != child_id)
                    .unwrap_or(false)
            });
            if inner.children.is_empty() {
                inner.idle_waker.take()
            } else {
                None
            }
        };
        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Resolves once every child has settled. Not interrupted by cancellation.
    pub fn children_idle(&self) -> ChildrenIdleFuture {
        ChildrenIdleFuture { ctx: self.clone() }
    }

    /// Suspend for `ms` logical milliseconds.
    pub fn delay(&self, ms: u64) -> TimeWaitFuture {
        let (target, scheduler) = {
            let inner = self.0.borrow();
            let now = inner.scheduler.borrow().now();
            (now.saturating_add(ms), inner.scheduler.clone())
        };
        TimeWaitFuture::new(self.clone(), scheduler, target)
    }

    /// Track a signal wait so that cancellation interrupts it. Returns the
    /// waiter id.
    pub fn watch_signal_wait(&self, state: WaitState) -> u64 {
        let mut inner = self.0.borrow_mut();
        let id = inner.scheduler.borrow_mut().alloc_seq();
        inner.pending_waiters.insert(id, PendingWait::Signal(state));
        id
    }

    pub fn forget_waiter(&self, id: u64) {
        self.0.borrow_mut().pending_waiters.remove(&id);
    }
}

pub struct ChildrenIdleFuture {
    ctx: Ctx,
}

impl Future for ChildrenIdleFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.ctx.0.borrow_mut();
        inner.children.retain(|c| c.upgrade().is_some());
        if inner.children.is_empty() {
            inner.idle_waker = None;
            Poll::Ready(())
        } else {
            inner.idle_waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Future for `delay`.
pub struct TimeWaitFuture {
    ctx: Ctx,
    sched: Rc<RefCell<TimeScheduler>>,
    target_time: u64,
    state: WaitState,
    registered: Cell<bool>,
    waiter_id: Cell<u64>,
}

impl TimeWaitFuture {
    pub fn new(ctx: Ctx, sched: Rc<RefCell<TimeScheduler>>, target_time: u64) -> Self {
        Self {
            ctx,
            sched,
            target_time,
            state: WaitState::new(),
            registered: Cell::new(false),
            waiter_id: Cell::new(0),
        }
    }
}

impl Future for TimeWaitFuture {
    type Output = Result<(), WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.state.is_cancelled() {
            return Poll::Ready(Err(WaitError::cancelled()));
        }
        if this.state.is_done() {
            this.ctx.forget_waiter(this.waiter_id.get());
            // Cancelled between the timer firing and this resumption
            if this.ctx.is_cancelled() {
                return Poll::Ready(Err(WaitError::cancelled()));
            }
            return Poll::Ready(Ok(()));
        }

        this.state.set_waker(cx.waker());

        if !this.registered.get() {
            if this.ctx.is_cancelled() {
                this.state.complete_cancelled();
                return Poll::Ready(Err(WaitError::context_cancelled()));
            }

            let mut sched = this.sched.borrow_mut();
            let seq = sched.alloc_seq();
            let waiter_id = seq;
            this.waiter_id.set(waiter_id);

            this.ctx
                .0
                .borrow_mut()
                .pending_waiters
                .insert(waiter_id, PendingWait::Timer);

            sched.add_time_wait(TimeWaitMeta {
                seq,
                target_time: this.target_time,
                state: this.state.clone(),
                waiter_id,
            });
            this.registered.set(true);
        }

        Poll::Pending
    }
}
