//! Single-threaded deterministic executor
//!
//! Tasks are polled in FIFO wake order, so two evaluations of the same program
//! always interleave identically. The executor is the only owner of task
//! futures; wakers hold just the wake-side [`Handle`]. Dropping the slots is
//! therefore enough to tear down an abandoned evaluation (a program that never
//! completes), whatever the futures still reference.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, RawWaker, RawWakerVTable, Waker},
};

/// Index of a spawned task.
pub type TaskId = usize;

type ReadyQueue = RefCell<VecDeque<TaskId>>;

/// Wake-side state of one task, shared with its wakers.
struct Handle {
    id: TaskId,
    queued: Cell<bool>,
    done: Cell<bool>,
    ready: Weak<ReadyQueue>,
}

impl Handle {
    fn schedule(&self) {
        if self.done.get() || self.queued.replace(true) {
            return;
        }
        if let Some(ready) = self.ready.upgrade() {
            ready.borrow_mut().push_back(self.id);
        }
    }
}

struct Slot {
    /// `None` once finished, and while the task is being polled.
    fut: Option<Pin<Box<dyn Future<Output = ()>>>>,
    handle: Rc<Handle>,
}

/// Single-threaded deterministic executor.
pub struct Executor {
    ready: Rc<ReadyQueue>,
    slots: RefCell<Vec<Slot>>,
    polls: Cell<usize>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            ready: Rc::new(RefCell::new(VecDeque::new())),
            slots: RefCell::new(Vec::new()),
            polls: Cell::new(0),
        }
    }

    /// Spawn a new task at the back of the ready queue.
    pub fn spawn(&self, fut: impl Future<Output = ()> + 'static) -> TaskId {
        let mut slots = self.slots.borrow_mut();
        let id = slots.len();
        let handle = Rc::new(Handle {
            id,
            queued: Cell::new(false),
            done: Cell::new(false),
            ready: Rc::downgrade(&self.ready),
        });
        handle.schedule();
        slots.push(Slot {
            fut: Some(Box::pin(fut)),
            handle,
        });
        id
    }

    /// Poll ready tasks until the queue is empty. Returns the number of polls.
    pub fn run_until_stalled(&self) -> usize {
        let mut polls = 0;
        loop {
            let Some(id) = self.ready.borrow_mut().pop_front() else {
                break;
            };

            // The future leaves its slot for the poll, so tasks can spawn.
            let (mut fut, handle) = {
                let mut slots = self.slots.borrow_mut();
                let Some(slot) = slots.get_mut(id) else {
                    continue;
                };
                slot.handle.queued.set(false);
                match slot.fut.take() {
                    Some(fut) => (fut, slot.handle.clone()),
                    None => continue,
                }
            };

            polls += 1;
            let waker = handle_waker(handle.clone());
            let mut cx = Context::from_waker(&waker);
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => handle.done.set(true),
                Poll::Pending => {
                    if let Some(slot) = self.slots.borrow_mut().get_mut(id) {
                        slot.fut = Some(fut);
                    }
                }
            }
        }
        self.polls.set(self.polls.get() + polls);
        polls
    }

    /// Total polls performed over the executor's lifetime.
    pub fn polls(&self) -> usize {
        self.polls.get()
    }

    /// Number of spawned tasks that have not finished.
    pub fn live_tasks(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| !slot.handle.done.get())
            .count()
    }

    /// Drop every pending future and forget all tasks.
    pub fn shutdown(&self) {
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        self.ready.borrow_mut().clear();
        for slot in &slots {
            slot.handle.done.set(true);
        }
        // Futures drop here, outside any executor borrow.
        drop(slots);
    }
}

fn handle_waker(handle: Rc<Handle>) -> Waker {
    unsafe fn clone_waker(data: *const ()) -> RawWaker {
        Rc::increment_strong_count(data as *const Handle);
        RawWaker::new(data, &VTABLE)
    }

    unsafe fn wake(data: *const ()) {
        let handle = Rc::from_raw(data as *const Handle);
        handle.schedule();
    }

    unsafe fn wake_by_ref(data: *const ()) {
        (*(data as *const Handle)).schedule();
    }

    unsafe fn drop_waker(data: *const ()) {
        Rc::decrement_strong_count(data as *const Handle);
    }

    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_waker, wake, wake_by_ref, drop_waker);

    let raw = RawWaker::new(Rc::into_raw(handle) as *const (), &VTABLE);
    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pending on the first poll, parking its waker; ready on the next.
    async fn park_once(parked: Rc<RefCell<Option<Waker>>>) {
        let mut first = true;
        std::future::poll_fn(move |cx| {
            if std::mem::take(&mut first) {
                *parked.borrow_mut() = Some(cx.waker().clone());
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
    }

    #[test]
    fn test_spawn_order_is_fifo() {
        let exec = Executor::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 1..=3 {
            let o = order.clone();
            exec.spawn(async move {
                o.borrow_mut().push(i);
            });
        }

        assert_eq!(exec.run_until_stalled(), 3);
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
        assert_eq!(exec.live_tasks(), 0);
    }

    #[test]
    fn test_pending_then_wake() {
        let exec = Executor::new();
        let parked = Rc::new(RefCell::new(None));
        let finished = Rc::new(Cell::new(false));

        let (p, f) = (parked.clone(), finished.clone());
        exec.spawn(async move {
            park_once(p).await;
            f.set(true);
        });

        assert_eq!(exec.run_until_stalled(), 1);
        assert_eq!(exec.live_tasks(), 1);
        assert!(!finished.get());
        // Nothing woke it, so nothing runs.
        assert_eq!(exec.run_until_stalled(), 0);

        let waker = parked.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake_by_ref();
            waker.wake();
        }

        // Two wakes, one poll.
        assert_eq!(exec.run_until_stalled(), 1);
        assert!(finished.get());
        assert_eq!(exec.polls(), 2);
        assert_eq!(exec.live_tasks(), 0);
    }

    #[test]
    fn test_task_spawned_mid_poll_queues_behind_ready_tasks() {
        let exec = Rc::new(Executor::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        let (e, o) = (exec.clone(), order.clone());
        exec.spawn(async move {
            o.borrow_mut().push("parent");
            let child = o.clone();
            e.spawn(async move {
                child.borrow_mut().push("child");
            });
        });
        let o = order.clone();
        exec.spawn(async move {
            o.borrow_mut().push("sibling");
        });

        assert_eq!(exec.run_until_stalled(), 3);
        assert_eq!(*order.borrow(), vec!["parent", "sibling", "child"]);
    }

    #[test]
    fn test_wakers_outliving_the_task_are_harmless() {
        let exec = Executor::new();
        let parked = Rc::new(RefCell::new(None));
        exec.spawn(park_once(parked.clone()));
        exec.run_until_stalled();

        let stale = parked.borrow().clone();
        if let Some(waker) = parked.borrow_mut().take() {
            waker.wake();
        }
        exec.run_until_stalled();
        assert_eq!(exec.live_tasks(), 0);

        // The task is done; waking it again must not poll anything.
        if let Some(waker) = stale {
            waker.wake();
        }
        assert_eq!(exec.run_until_stalled(), 0);
        assert_eq!(exec.polls(), 2);
    }

    #[test]
    fn test_shutdown_drops_pending_futures() {
        let exec = Executor::new();
        let marker = Rc::new(());
        let held = marker.clone();
        exec.spawn(async move {
            let _held = held;
            std::future::pending::<()>().await;
        });
        exec.run_until_stalled();
        assert_eq!(Rc::strong_count(&marker), 2);

        exec.shutdown();
        assert_eq!(Rc::strong_count(&marker), 1);
        assert_eq!(exec.live_tasks(), 0);
        assert_eq!(exec.run_until_stalled(), 0);
    }
}
