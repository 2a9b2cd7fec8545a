// pulse-core: periodic tasks
// A task drives one Runnable at a fixed period, either on a dedicated
// thread or enrolled in a multiplexed TaskTimer. stop() is cooperative: it
// waits for the in-flight step, then finalizes, exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::time::{secs_to_nsecs, Ticks, TimeService, NSECS_IN_SECS};
use crate::timer::TaskTimer;

/// The capability set a periodic task drives.
///
/// `initialize` runs exactly once per Idle→Running transition, `finalize`
/// exactly once per Running→Idle, and `step` at most once per elapsed
/// period in between.
pub trait Runnable: Send {
    /// Prepare for periodic execution. Returning false aborts the start
    /// and parks the task in the Error state.
    fn initialize(&mut self) -> bool {
        true
    }

    /// One period of work. Must not block on I/O and must absorb
    /// transient faults internally.
    fn step(&mut self);

    /// Release resources after the last step.
    fn finalize(&mut self) {}
}

/// Adapter turning a closure into a [`Runnable`].
pub struct FnRunner<F: FnMut() + Send> {
    f: F,
}

impl<F: FnMut() + Send> FnRunner<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut() + Send> Runnable for FnRunner<F> {
    fn step(&mut self) {
        (self.f)()
    }
}

/// Scheduling class communicated to the OS where available; an ordering
/// hint inside a single-thread multiplexer otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityClass {
    Hard,
    Soft,
    NonRealTime,
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_ERROR: u8 = 2;

/// Lifecycle state of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Error,
}

impl TaskState {
    fn from_u8(raw: u8) -> TaskState {
        match raw {
            STATE_RUNNING => TaskState::Running,
            STATE_ERROR => TaskState::Error,
            _ => TaskState::Idle,
        }
    }
}

type SlipHandler = Arc<dyn Fn(u64) + Send + Sync>;

/// Shared task record; schedulers hold this while the task is enrolled.
pub(crate) struct TaskCore {
    pub(crate) period_ns: u64,
    priority: PriorityClass,
    state: AtomicU8,
    /// True while enrolled with a scheduler; gates every step.
    active: AtomicBool,
    missed_steps: AtomicU64,
    /// Tick count at the begin of the last step, for due/slip accounting.
    last_step: AtomicU64,
    runner: Mutex<Box<dyn Runnable>>,
    /// Serializes start/stop; stop contenders block here until the winner
    /// has finalized.
    control: Mutex<()>,
    /// Wakes a sleeping dedicated thread on stop.
    wake_lock: Mutex<()>,
    wake_cond: Condvar,
    slip_handler: RwLock<Option<SlipHandler>>,
}

impl TaskCore {
    #[inline]
    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn record_slip(&self) {
        let missed = self.missed_steps.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(period_ns = self.period_ns, missed, "periodic task slipped");
        let handler = self.slip_handler.read().clone();
        if let Some(handler) = handler {
            handler(missed);
        }
    }

    /// Step the runner if the task is due at `now`. Called by TaskTimer.
    pub(crate) fn maybe_step(&self, now: Ticks) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let elapsed = now.as_nsecs().saturating_sub(self.last_step.load(Ordering::Relaxed));
        if elapsed < self.period_ns {
            return;
        }
        if elapsed > 2 * self.period_ns {
            self.record_slip();
        }
        {
            let mut runner = self.runner.lock();
            if !self.active.load(Ordering::Acquire) {
                return;
            }
            runner.step();
        }
        // No catch-up: one step per walk, re-phased from the step begin.
        self.last_step.store(now.as_nsecs(), Ordering::Relaxed);
    }
}

enum Dispatch {
    /// Dedicated OS thread, spawned on start.
    Thread {
        handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    },
    /// Enrolled in a multiplexed timer on start.
    Timer(Arc<TaskTimer>),
}

/// A periodically executed task.
///
/// Construct with a dedicated thread ([`PeriodicTask::new`]) or enrolled in
/// a [`TaskTimer`] ([`PeriodicTask::multiplexed`]); both honor the same
/// start/stop/slip contract.
pub struct PeriodicTask {
    core: Arc<TaskCore>,
    dispatch: Dispatch,
}

impl PeriodicTask {
    /// A thread-backed task with `period` in seconds, rounded to the
    /// nearest nanosecond.
    pub fn new(period_secs: f64, priority: PriorityClass, runner: Box<dyn Runnable>) -> Self {
        Self::from_parts(secs_to_nsecs(period_secs).max(1) as u64, priority, runner)
    }

    /// A thread-backed task with `period` given as seconds plus
    /// nanoseconds.
    pub fn with_period(
        secs: i64,
        nsecs: i64,
        priority: PriorityClass,
        runner: Box<dyn Runnable>,
    ) -> Self {
        let period = (secs * NSECS_IN_SECS + nsecs).max(1) as u64;
        Self::from_parts(period, priority, runner)
    }

    /// A task driven by `timer`'s multiplexing thread; the timer's
    /// priority class applies.
    pub fn multiplexed(period_secs: f64, timer: &Arc<TaskTimer>, runner: Box<dyn Runnable>) -> Self {
        let mut task = Self::from_parts(
            secs_to_nsecs(period_secs).max(1) as u64,
            timer.priority(),
            runner,
        );
        task.dispatch = Dispatch::Timer(timer.clone());
        task
    }

    fn from_parts(period_ns: u64, priority: PriorityClass, runner: Box<dyn Runnable>) -> Self {
        Self {
            core: Arc::new(TaskCore {
                period_ns,
                priority,
                state: AtomicU8::new(STATE_IDLE),
                active: AtomicBool::new(false),
                missed_steps: AtomicU64::new(0),
                last_step: AtomicU64::new(0),
                runner: Mutex::new(runner),
                control: Mutex::new(()),
                wake_lock: Mutex::new(()),
                wake_cond: Condvar::new(),
                slip_handler: RwLock::new(None),
            }),
            dispatch: Dispatch::Thread {
                handle: Mutex::new(None),
            },
        }
    }

    pub fn state(&self) -> TaskState {
        self.core.state()
    }

    pub fn is_running(&self) -> bool {
        self.core.state() == TaskState::Running
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.core.period_ns)
    }

    pub fn period_secs(&self) -> f64 {
        self.core.period_ns as f64 / NSECS_IN_SECS as f64
    }

    pub fn priority(&self) -> PriorityClass {
        self.core.priority
    }

    /// Steps missed due to slip since construction.
    pub fn missed_steps(&self) -> u64 {
        self.core.missed_steps.load(Ordering::Relaxed)
    }

    /// Install a handler invoked (from the scheduling thread) whenever a
    /// slip is recorded.
    pub fn set_slip_handler(&self, handler: impl Fn(u64) + Send + Sync + 'static) {
        *self.core.slip_handler.write() = Some(Arc::new(handler));
    }

    /// Swap the runner. Fails while the task is Running, handing the
    /// rejected runner back.
    pub fn run(&self, runner: Box<dyn Runnable>) -> Result<(), Box<dyn Runnable>> {
        let _control = self.core.control.lock();
        if self.core.state() == TaskState::Running {
            return Err(runner);
        }
        *self.core.runner.lock() = runner;
        Ok(())
    }

    /// Start periodic execution.
    ///
    /// No-op returning false when already Running. When `initialize`
    /// returns false the task parks in the Error state.
    pub fn start(&self) -> bool {
        let _control = self.core.control.lock();
        if self.core.state() != TaskState::Idle {
            return false;
        }
        if !self.core.runner.lock().initialize() {
            self.core.state.store(STATE_ERROR, Ordering::Release);
            debug!(period_ns = self.core.period_ns, "runner initialize failed");
            return false;
        }
        self.core
            .last_step
            .store(TimeService::instance().now().as_nsecs(), Ordering::Relaxed);
        self.core.active.store(true, Ordering::Release);
        self.core.state.store(STATE_RUNNING, Ordering::Release);

        match &self.dispatch {
            Dispatch::Thread { handle } => {
                let core = self.core.clone();
                *handle.lock() = Some(std::thread::spawn(move || thread_loop(core)));
            }
            Dispatch::Timer(timer) => {
                if !timer.enroll(self.core.clone()) {
                    // Timer table full: undo the transition.
                    self.core.active.store(false, Ordering::Release);
                    self.core.runner.lock().finalize();
                    self.core.state.store(STATE_IDLE, Ordering::Release);
                    return false;
                }
            }
        }
        true
    }

    /// Stop periodic execution.
    ///
    /// The task is first removed from its scheduler's active set, then the
    /// in-flight step (if any) is awaited and `finalize` runs exactly once.
    /// Concurrent callers block until that sequence has completed.
    pub fn stop(&self) -> bool {
        if self.core.state() != TaskState::Running {
            return false;
        }
        match self.core.control.try_lock() {
            Some(_control) => {
                if self.core.state() != TaskState::Running {
                    return false;
                }
                self.do_stop();
                true
            }
            None => {
                // Another thread is stopping (or starting); wait for it to
                // finish so finalize has completed before we return.
                let _control = self.core.control.lock();
                self.core.state() == TaskState::Idle
            }
        }
    }

    fn do_stop(&self) {
        // No further step may begin once the task leaves the active set.
        self.core.active.store(false, Ordering::Release);
        {
            let _wake = self.core.wake_lock.lock();
            self.core.wake_cond.notify_all();
        }
        if let Dispatch::Timer(timer) = &self.dispatch {
            timer.remove(&self.core);
        }
        {
            // Blocks until the in-flight step (which holds the runner
            // lock) has completed.
            let mut runner = self.core.runner.lock();
            runner.finalize();
        }
        self.core.state.store(STATE_IDLE, Ordering::Release);

        if let Dispatch::Thread { handle } = &self.dispatch {
            if let Some(join) = handle.lock().take() {
                if join.thread().id() != std::thread::current().id() {
                    let _ = join.join();
                }
            }
        }
    }

    /// Clear the Error state after a failed `initialize`.
    pub fn reset(&self) -> bool {
        let _control = self.core.control.lock();
        self.core
            .state
            .compare_exchange(
                STATE_ERROR,
                STATE_IDLE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Dedicated-thread dispatch loop: sleep until `start + n·period`, step
/// once, never catch up after a slip.
fn thread_loop(core: Arc<TaskCore>) {
    apply_priority(core.priority);
    let ts = TimeService::instance();
    let period = Duration::from_nanos(core.period_ns);
    let mut next = Instant::now() + period;

    loop {
        {
            let mut wake = core.wake_lock.lock();
            loop {
                if !core.active.load(Ordering::Acquire) {
                    return;
                }
                if Instant::now() >= next {
                    break;
                }
                core.wake_cond.wait_until(&mut wake, next);
            }
        }
        let step_begin = ts.now();
        {
            let mut runner = core.runner.lock();
            if !core.active.load(Ordering::Acquire) {
                return;
            }
            runner.step();
        }
        core.last_step.store(step_begin.as_nsecs(), Ordering::Relaxed);

        next += period;
        let now = Instant::now();
        if now > next {
            // The step overran the next deadline: elapsed exceeded twice
            // the period. Record it and re-phase instead of catching up.
            core.record_slip();
            next = now + period;
        }
    }
}

/// Communicate the priority class to the OS scheduler where possible.
pub(crate) fn apply_priority(class: PriorityClass) {
    #[cfg(target_os = "linux")]
    {
        let (policy, priority) = match class {
            PriorityClass::Hard => (libc::SCHED_FIFO, 80),
            PriorityClass::Soft => (libc::SCHED_FIFO, 20),
            PriorityClass::NonRealTime => (libc::SCHED_OTHER, 0),
        };
        let param = libc::sched_param {
            sched_priority: priority,
        };
        // SAFETY: plain syscall on the current thread with a valid param.
        let rc = unsafe { libc::sched_setscheduler(0, policy, &param) };
        if rc != 0 {
            debug!(?class, "scheduling class not applied");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = class;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRunner {
        inits: Arc<AtomicUsize>,
        steps: Arc<AtomicUsize>,
        finals: Arc<AtomicUsize>,
        init_ok: bool,
        step_sleep: Mutex<Option<Duration>>,
    }

    impl CountingRunner {
        fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let inits = Arc::new(AtomicUsize::new(0));
            let steps = Arc::new(AtomicUsize::new(0));
            let finals = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    inits: inits.clone(),
                    steps: steps.clone(),
                    finals: finals.clone(),
                    init_ok: true,
                    step_sleep: Mutex::new(None),
                },
                inits,
                steps,
                finals,
            )
        }
    }

    impl Runnable for CountingRunner {
        fn initialize(&mut self) -> bool {
            self.inits.fetch_add(1, Ordering::SeqCst);
            self.init_ok
        }

        fn step(&mut self) {
            self.steps.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.step_sleep.lock().take() {
                std::thread::sleep(d);
            }
        }

        fn finalize(&mut self) {
            self.finals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let (runner, inits, steps, finals) = CountingRunner::new();
        let task = PeriodicTask::new(0.002, PriorityClass::NonRealTime, Box::new(runner));

        assert_eq!(task.state(), TaskState::Idle);
        assert!(task.start());
        assert!(!task.start(), "start on Running must return false");
        assert_eq!(task.state(), TaskState::Running);

        std::thread::sleep(Duration::from_millis(25));
        assert!(task.stop());
        assert!(!task.stop(), "stop on Idle must return false");

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(finals.load(Ordering::SeqCst), 1);
        assert!(steps.load(Ordering::SeqCst) >= 1);
        assert_eq!(task.state(), TaskState::Idle);
    }

    #[test]
    fn test_failed_initialize_parks_in_error() {
        let (mut runner, _inits, steps, finals) = CountingRunner::new();
        runner.init_ok = false;
        let task = PeriodicTask::new(0.002, PriorityClass::NonRealTime, Box::new(runner));

        assert!(!task.start());
        assert_eq!(task.state(), TaskState::Error);
        assert_eq!(steps.load(Ordering::SeqCst), 0);
        assert_eq!(finals.load(Ordering::SeqCst), 0);

        assert!(task.reset());
        assert_eq!(task.state(), TaskState::Idle);
        assert!(!task.reset());
    }

    #[test]
    fn test_runner_swap_rejected_while_running() {
        let (runner, ..) = CountingRunner::new();
        let task = PeriodicTask::new(0.005, PriorityClass::NonRealTime, Box::new(runner));
        assert!(task.start());

        let (other, ..) = CountingRunner::new();
        assert!(task.run(Box::new(other)).is_err());
        assert!(task.stop());

        let (third, ..) = CountingRunner::new();
        assert!(task.run(Box::new(third)).is_ok());
    }

    #[test]
    fn test_slip_counts_one_per_overrun() {
        let (runner, _inits, steps, _finals) = CountingRunner::new();
        *runner.step_sleep.lock() = Some(Duration::from_millis(25));
        let task = PeriodicTask::new(0.010, PriorityClass::NonRealTime, Box::new(runner));

        assert!(task.start());
        // First step begins ~10 ms in and sleeps 25 ms; wait long enough
        // for it to complete and the slip to be recorded.
        std::thread::sleep(Duration::from_millis(35 + 8));
        let missed = task.missed_steps();
        let stepped = steps.load(Ordering::SeqCst);
        assert!(task.stop());

        assert_eq!(missed, 1, "one overrun must record exactly one slip");
        assert!(stepped >= 1);
    }

    #[test]
    fn test_concurrent_stop_finalizes_once() {
        let (runner, _inits, _steps, finals) = CountingRunner::new();
        *runner.step_sleep.lock() = Some(Duration::from_millis(30));
        let task = Arc::new(PeriodicTask::new(
            0.001,
            PriorityClass::NonRealTime,
            Box::new(runner),
        ));

        assert!(task.start());
        // Let the long step begin.
        std::thread::sleep(Duration::from_millis(5));

        let stoppers: Vec<_> = (0..2)
            .map(|_| {
                let task = task.clone();
                let finals = finals.clone();
                std::thread::spawn(move || {
                    task.stop();
                    // finalize must have completed by the time stop returns
                    assert_eq!(finals.load(Ordering::SeqCst), 1);
                })
            })
            .collect();

        for s in stoppers {
            s.join().unwrap();
        }
        assert_eq!(finals.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Idle);
    }

    #[test]
    fn test_slip_handler_invoked() {
        let (runner, ..) = CountingRunner::new();
        *runner.step_sleep.lock() = Some(Duration::from_millis(25));
        let task = PeriodicTask::new(0.010, PriorityClass::NonRealTime, Box::new(runner));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        task.set_slip_handler(move |_missed| {
            seen_in_handler.fetch_add(1, Ordering::SeqCst);
        });

        assert!(task.start());
        std::thread::sleep(Duration::from_millis(45));
        assert!(task.stop());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
