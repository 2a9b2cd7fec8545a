// pulse-kernel: the control kernel
// Owns the four bags, the ordered component list and the extensions, and
// drives pull → calculate → push → extensions.step once per period.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use pulse_core::{
    BagRole, CoreError, DataBag, EventProcessor, EventService, EventValue, PeriodicTask,
    PriorityClass, Runnable, ValueKind,
};

use crate::component::{Component, ComponentSet, ComponentSlot, ComponentState, Ports};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::extension::KernelExtension;

/// Built-in event emitted when the kernel's periodic task slips; carries
/// the total missed-step count.
pub const EVENT_SLIP: &str = "kernel.slip";

/// Built-in event for unrecoverable component faults; carries the
/// component name and a message.
pub const EVENT_FAULT: &str = "kernel.fault";

/// The four role-tagged bags owned by one kernel.
pub struct KernelBags {
    pub input: DataBag,
    pub model: DataBag,
    pub set_point: DataBag,
    pub output: DataBag,
}

impl KernelBags {
    fn new() -> Self {
        Self {
            input: DataBag::new(BagRole::Input),
            model: DataBag::new(BagRole::Model),
            set_point: DataBag::new(BagRole::SetPoint),
            output: DataBag::new(BagRole::Output),
        }
    }

    pub fn ports(&self) -> Ports<'_> {
        Ports {
            input: &self.input,
            model: &self.model,
            set_point: &self.set_point,
            output: &self.output,
        }
    }
}

struct KernelCore {
    name: String,
    bags: KernelBags,
    components: Mutex<Vec<ComponentSlot>>,
    extensions: Mutex<Vec<Box<dyn KernelExtension>>>,
    /// Components are up; structure is locked.
    started: AtomicBool,
    periods: AtomicU64,
    events: Arc<EventService>,
    completion: Arc<EventProcessor>,
}

impl KernelCore {
    /// One period: the three data phases over every component in load
    /// order, then every extension.
    fn execute_period(&self) {
        let mut components = self.components.lock();
        for slot in components.iter_mut() {
            slot.component.pull();
        }
        for slot in components.iter_mut() {
            slot.component.calculate();
        }
        for slot in components.iter_mut() {
            slot.component.push();
        }
        let mut extensions = self.extensions.lock();
        for extension in extensions.iter_mut() {
            extension.step(&mut ComponentSet::new(components.as_mut_slice()));
        }
        self.periods.fetch_add(1, Ordering::Relaxed);
    }
}

/// The kernel's periodic runner.
struct PipelineRunner {
    core: Arc<KernelCore>,
}

impl Runnable for PipelineRunner {
    fn step(&mut self) {
        self.core.execute_period();
    }
}

/// Snapshot of kernel counters.
#[derive(Debug, Clone)]
pub struct KernelStats {
    pub periods: u64,
    pub missed_steps: u64,
    pub components: usize,
    pub extensions: usize,
    pub running: bool,
}

/// A host-owned control kernel.
///
/// Usage: construct, register extensions, load components, `start()`.
/// Structure (components, extensions) may only change while stopped;
/// mutation attempts while running fail with [`KernelError::KernelBusy`].
pub struct ControlKernel {
    core: Arc<KernelCore>,
    task: PeriodicTask,
}

impl ControlKernel {
    pub fn new(name: impl Into<String>, period_secs: f64, priority: PriorityClass) -> Self {
        let events = Arc::new(EventService::new());
        events
            .add_event(EVENT_SLIP, vec![ValueKind::UInt])
            .expect("fresh service cannot hold duplicates");
        events
            .add_event(EVENT_FAULT, vec![ValueKind::Str, ValueKind::Str])
            .expect("fresh service cannot hold duplicates");

        let core = Arc::new(KernelCore {
            name: name.into(),
            bags: KernelBags::new(),
            components: Mutex::new(Vec::new()),
            extensions: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            periods: AtomicU64::new(0),
            events: events.clone(),
            completion: EventProcessor::new("completion", 256),
        });

        let task = PeriodicTask::new(
            period_secs,
            priority,
            Box::new(PipelineRunner { core: core.clone() }),
        );
        task.set_slip_handler(move |missed| {
            let capped = missed.min(u32::MAX as u64) as u32;
            let _ = events.emit(EVENT_SLIP, &[EventValue::UInt(capped)]);
        });

        Self { core, task }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.period_secs,
            config.priority.into(),
        )
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn input(&self) -> &DataBag {
        &self.core.bags.input
    }

    pub fn model(&self) -> &DataBag {
        &self.core.bags.model
    }

    pub fn set_point(&self) -> &DataBag {
        &self.core.bags.set_point
    }

    pub fn output(&self) -> &DataBag {
        &self.core.bags.output
    }

    /// The kernel-wide event service; `kernel.slip` and `kernel.fault`
    /// are pre-registered.
    pub fn events(&self) -> &Arc<EventService> {
        &self.core.events
    }

    /// The default processor for asynchronous event handlers; stepped by
    /// the event extension each period.
    pub fn completion(&self) -> &Arc<EventProcessor> {
        &self.core.completion
    }

    /// Report an unrecoverable component fault through the event service.
    ///
    /// The period is never aborted; diagnostics travel out-of-band.
    pub fn report_fault(&self, component: &str, message: &str) {
        error!(kernel = %self.core.name, component, message, "component fault");
        let _ = self.core.events.emit(
            EVENT_FAULT,
            &[EventValue::from(component), EventValue::from(message)],
        );
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            periods: self.core.periods.load(Ordering::Relaxed),
            missed_steps: self.task.missed_steps(),
            components: self.core.components.lock().len(),
            extensions: self.core.extensions.lock().len(),
            running: self.task.is_running(),
        }
    }

    pub fn periods(&self) -> u64 {
        self.core.periods.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Register an extension. Extensions observe only components loaded
    /// after them.
    pub fn add_extension(&self, extension: Box<dyn KernelExtension>) -> KernelResult<()> {
        if self.core.started.load(Ordering::Acquire) {
            return Err(KernelError::KernelBusy);
        }
        let mut extensions = self.core.extensions.lock();
        if extensions.iter().any(|e| e.name() == extension.name()) {
            return Err(CoreError::Duplicate(extension.name().to_string()).into());
        }
        debug!(kernel = %self.core.name, extension = extension.name(), "extension registered");
        extensions.push(extension);
        Ok(())
    }

    /// Load a component at the end of the pipeline order.
    ///
    /// Calls `loaded` on the component, then offers it to every extension
    /// for facet binding. A refusal anywhere unbinds what was bound and
    /// leaves the component out of the kernel.
    pub fn load_component(&self, mut component: Box<dyn Component>) -> KernelResult<()> {
        if self.core.started.load(Ordering::Acquire) {
            return Err(KernelError::KernelBusy);
        }
        let mut components = self.core.components.lock();
        let name = component.name().to_string();
        if components.iter().any(|s| s.name() == name) {
            return Err(CoreError::Duplicate(name).into());
        }

        if !component.loaded(&self.core.bags.ports()) {
            error!(component = %name, "component refused load");
            return Err(KernelError::LifecycleRejected {
                component: name,
                transition: "load",
            });
        }

        let mut extensions = self.core.extensions.lock();
        for i in 0..extensions.len() {
            if !extensions[i].component_loaded(component.as_mut()) {
                error!(
                    component = %name,
                    extension = extensions[i].name(),
                    "facet bind failed; unloading"
                );
                for j in (0..i).rev() {
                    extensions[j].component_unloaded(component.as_mut());
                }
                let _ = component.unloaded();
                return Err(KernelError::LifecycleRejected {
                    component: name,
                    transition: "facet bind",
                });
            }
        }

        debug!(kernel = %self.core.name, component = %name, "component loaded");
        components.push(ComponentSlot {
            state: ComponentState::Loaded,
            component,
        });
        Ok(())
    }

    /// Unload a component: unbind facets in reverse extension order, then
    /// call `unloaded`.
    pub fn unload_component(&self, name: &str) -> KernelResult<()> {
        if self.core.started.load(Ordering::Acquire) {
            return Err(KernelError::KernelBusy);
        }
        let mut components = self.core.components.lock();
        let index = components
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;

        let mut extensions = self.core.extensions.lock();
        {
            let slot = &mut components[index];
            for j in (0..extensions.len()).rev() {
                extensions[j].component_unloaded(slot.component.as_mut());
            }
            if !slot.component.unloaded() {
                // Re-bind so the component stays consistently Loaded.
                for extension in extensions.iter_mut() {
                    let _ = extension.component_loaded(slot.component.as_mut());
                }
                return Err(KernelError::LifecycleRejected {
                    component: name.to_string(),
                    transition: "unload",
                });
            }
        }
        components.remove(index);
        debug!(kernel = %self.core.name, component = %name, "component unloaded");
        Ok(())
    }

    /// Start the kernel: extensions initialize, components start up in
    /// load order (rolling back on refusal), then the periodic task runs.
    pub fn start(&self) -> KernelResult<()> {
        self.bring_up()?;
        if !self.task.start() {
            self.bring_down();
            return Err(KernelError::KernelBusy);
        }
        info!(kernel = %self.core.name, period_secs = self.task.period_secs(), "kernel started");
        Ok(())
    }

    /// Bring the kernel up without starting the periodic task, for hosts
    /// that single-step the pipeline cooperatively.
    pub fn start_manual(&self) -> KernelResult<()> {
        self.bring_up()?;
        info!(kernel = %self.core.name, "kernel started (manual stepping)");
        Ok(())
    }

    /// Execute exactly one period. Requires a manual start.
    pub fn step_once(&self) -> KernelResult<()> {
        if !self.core.started.load(Ordering::Acquire) {
            return Err(KernelError::NotStarted);
        }
        if self.task.is_running() {
            return Err(KernelError::KernelBusy);
        }
        self.core.execute_period();
        Ok(())
    }

    /// Stop the periodic task, shut components down in reverse load
    /// order, finalize extensions. Idempotent.
    pub fn stop(&self) -> KernelResult<()> {
        self.task.stop();
        self.bring_down();
        Ok(())
    }

    fn bring_up(&self) -> KernelResult<()> {
        if self.core.started.load(Ordering::Acquire) {
            return Err(KernelError::KernelBusy);
        }
        let mut components = self.core.components.lock();
        let mut extensions = self.core.extensions.lock();

        for i in 0..extensions.len() {
            if !extensions[i].initialize(&mut ComponentSet::new(components.as_mut_slice())) {
                let failed = extensions[i].name().to_string();
                error!(extension = %failed, "extension initialize failed; rolling back");
                for j in (0..i).rev() {
                    extensions[j].finalize(&mut ComponentSet::new(components.as_mut_slice()));
                }
                return Err(KernelError::LifecycleRejected {
                    component: failed,
                    transition: "initialize",
                });
            }
        }

        for i in 0..components.len() {
            if components[i].component.startup(&self.core.bags.ports()) {
                components[i].state = ComponentState::Started;
                continue;
            }
            let failed = components[i].name().to_string();
            error!(component = %failed, "startup rejected; rolling back");
            for j in (0..i).rev() {
                if !components[j].component.shutdown() {
                    warn!(component = components[j].name(), "shutdown rejected during rollback");
                }
                components[j].state = ComponentState::Loaded;
            }
            for j in (0..extensions.len()).rev() {
                extensions[j].finalize(&mut ComponentSet::new(components.as_mut_slice()));
            }
            return Err(KernelError::LifecycleRejected {
                component: failed,
                transition: "startup",
            });
        }

        self.core.started.store(true, Ordering::Release);
        Ok(())
    }

    fn bring_down(&self) {
        if !self.core.started.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut components = self.core.components.lock();
        let mut extensions = self.core.extensions.lock();

        for slot in components.iter_mut().rev() {
            if slot.state == ComponentState::Started {
                if !slot.component.shutdown() {
                    warn!(component = slot.name(), "shutdown rejected");
                }
                slot.state = ComponentState::Loaded;
            }
        }
        for j in (0..extensions.len()).rev() {
            extensions[j].finalize(&mut ComponentSet::new(components.as_mut_slice()));
        }
        info!(kernel = %self.core.name, "kernel stopped");
    }
}

impl Drop for ControlKernel {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
