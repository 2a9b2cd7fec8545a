// pulse-core: multiplexed task timer
// One driver thread, one priority class, a fixed-capacity task table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrayvec::ArrayVec;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::task::{apply_priority, PriorityClass, TaskCore};
use crate::time::TimeService;

/// Maximum number of tasks one timer multiplexes.
pub const MAX_TASKS: usize = 32;

struct TimerInner {
    tasks: Mutex<ArrayVec<Arc<TaskCore>, MAX_TASKS>>,
    membership: Condvar,
    shutdown: AtomicBool,
}

/// A fixed-capacity group of periodic tasks sharing one priority class and
/// one driver thread.
///
/// The driver ticks at the shortest period currently registered
/// (recomputed whenever the table changes) and walks the table on each
/// tick; every task whose elapsed time reaches its period is stepped
/// exactly once. With no tasks registered the driver parks.
pub struct TaskTimer {
    priority: PriorityClass,
    inner: Arc<TimerInner>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TaskTimer {
    pub fn new(priority: PriorityClass) -> Arc<TaskTimer> {
        let inner = Arc::new(TimerInner {
            tasks: Mutex::new(ArrayVec::new()),
            membership: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let driver_inner = inner.clone();
        let thread = std::thread::spawn(move || timer_loop(driver_inner, priority));
        Arc::new(TaskTimer {
            priority,
            inner,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn priority(&self) -> PriorityClass {
        self.priority
    }

    pub fn task_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Add a started task to the table. False when the table is full.
    pub(crate) fn enroll(&self, core: Arc<TaskCore>) -> bool {
        let mut tasks = self.inner.tasks.lock();
        if tasks.try_push(core).is_err() {
            debug!(max = MAX_TASKS, "task timer table full");
            return false;
        }
        self.inner.membership.notify_all();
        true
    }

    pub(crate) fn remove(&self, core: &Arc<TaskCore>) {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|c| !Arc::ptr_eq(c, core));
        self.inner.membership.notify_all();
    }
}

impl Drop for TaskTimer {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            let _tasks = self.inner.tasks.lock();
            self.inner.membership.notify_all();
        }
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

fn timer_loop(inner: Arc<TimerInner>, priority: PriorityClass) {
    apply_priority(priority);
    let ts = TimeService::instance();
    let mut snapshot: Vec<Arc<TaskCore>> = Vec::with_capacity(MAX_TASKS);

    loop {
        let tick_ns = {
            let mut tasks = inner.tasks.lock();
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            if tasks.is_empty() {
                inner.membership.wait(&mut tasks);
                continue;
            }
            snapshot.clear();
            snapshot.extend(tasks.iter().cloned());
            // Base tick: the shortest registered period.
            tasks.iter().map(|c| c.period_ns).min().unwrap_or(u64::MAX)
        };

        let now = ts.now();
        for core in &snapshot {
            core.maybe_step(now);
        }

        let mut tasks = inner.tasks.lock();
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        inner
            .membership
            .wait_for(&mut tasks, Duration::from_nanos(tick_ns));
    }
}
