use crate::{
    clock::{duration_as_nanos, ClockSource},
    scheduler::{Action, Handle, Scheduler},
};
use parking_lot::Mutex;
use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

struct Task {
    interval: u64,
    next: u64,
    action: Action,
    stopped: Arc<AtomicBool>,
}

struct Inner {
    now: AtomicU64,
    tasks: Mutex<Vec<Task>>,
}

/// A manually-driven clock that doubles as a deterministic scheduler.
///
/// Time only moves when `advance` is called.  Any task scheduled against the mock runs inline,
/// on the advancing thread, once for every interval boundary that the advance crosses, and the
/// clock reads exactly that boundary while the task runs.
///
/// Clones share the same time and task list.
#[derive(Clone)]
pub struct Mock {
    inner: Arc<Inner>,
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

impl Mock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                now: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Moves time forward by `amount`, firing due tasks in time order along the way.
    pub fn advance(&self, amount: Duration) {
        let target = self.now().saturating_add(duration_as_nanos(amount));

        while let Some((at, action, stopped)) = self.next_due(target) {
            self.inner.now.fetch_max(at, Ordering::AcqRel);
            if !stopped.load(Ordering::Acquire) {
                action();
            }
        }

        self.inner.now.fetch_max(target, Ordering::AcqRel);
    }

    /// Number of tasks that are still scheduled.
    pub fn pending_tasks(&self) -> usize {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.stopped.load(Ordering::Acquire));
        tasks.len()
    }

    // The task lock is released before the action runs, so actions may read the clock or
    // register further tasks.
    fn next_due(&self, target: u64) -> Option<(u64, Action, Arc<AtomicBool>)> {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.stopped.load(Ordering::Acquire));

        let task = tasks.iter_mut().filter(|t| t.next <= target).min_by_key(|t| t.next)?;
        let at = task.next;
        task.next = task.next.saturating_add(task.interval);

        Some((at, task.action.clone(), task.stopped.clone()))
    }
}

impl ClockSource for Mock {
    fn now(&self) -> u64 {
        self.inner.now.load(Ordering::Acquire)
    }
}

impl Scheduler for Mock {
    fn schedule(&self, interval: Duration, action: Action) -> io::Result<Handle> {
        let interval = duration_as_nanos(interval);
        if interval == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "interval must be non-zero"));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        self.inner.tasks.lock().push(Task {
            interval,
            next: self.now().saturating_add(interval),
            action,
            stopped: stopped.clone(),
        });

        Ok(Handle::new(stopped))
    }
}
