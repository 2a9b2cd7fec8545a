// Facet wiring through the kernel: event declaration and async dispatch,
// scripting commands polled to completion, slip events from the kernel
// task.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use pulse_core::{EventService, EventValue, PriorityClass, ValueKind};
use pulse_kernel::{
    CommandStatus, Component, ControlKernel, EventExtension, EventFacet, Ports, ScriptingExtension,
    ScriptingFacet, EVENT_SLIP,
};
use pulse_kernel::scripting::OperationScope;

/// Declares a "limit" event and emits it from push when armed.
struct LimitWatch {
    armed: Arc<AtomicBool>,
    service: Option<Arc<EventService>>,
    kernel_events: Arc<EventService>,
}

impl Component for LimitWatch {
    fn name(&self) -> &str {
        "watch"
    }

    fn push(&mut self) {
        if self.armed.load(Ordering::Relaxed) {
            if let Some(service) = &self.service {
                let _ = service.emit("watch.limit", &[EventValue::Double(9.5)]);
            }
        }
    }

    fn events(&mut self) -> Option<&mut dyn EventFacet> {
        Some(self)
    }
}

impl EventFacet for LimitWatch {
    fn declare_events(&mut self, service: &EventService) -> bool {
        if service
            .add_event("watch.limit", vec![ValueKind::Double])
            .is_err()
        {
            return false;
        }
        // The facet keeps the service for emission; the kernel owns it.
        self.service = Some(self.kernel_events.clone());
        true
    }

    fn unbind_events(&mut self, service: &EventService) {
        service.remove_event("watch.limit");
        self.service = None;
    }
}

#[test]
fn event_facet_async_handlers_run_in_extension_step() {
    let kernel = ControlKernel::new("events", 0.001, PriorityClass::NonRealTime);
    kernel
        .add_extension(Box::new(EventExtension::new(&kernel)))
        .unwrap();

    let armed = Arc::new(AtomicBool::new(false));
    kernel
        .load_component(Box::new(LimitWatch {
            armed: armed.clone(),
            service: None,
            kernel_events: kernel.events().clone(),
        }))
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    kernel
        .events()
        .connect_async(
            "watch.limit",
            move |args| {
                if let EventValue::Double(v) = args[0] {
                    seen_in.lock().push(v);
                }
            },
            kernel.completion(),
        )
        .unwrap();

    kernel.start_manual().unwrap();
    kernel.step_once().unwrap();
    assert!(seen.lock().is_empty());

    // Arm: push emits, the same period's extension step drains the queue.
    armed.store(true, Ordering::Relaxed);
    kernel.step_once().unwrap();
    assert_eq!(*seen.lock(), vec![9.5]);
    kernel.stop().unwrap();
}

/// Exposes a "home" command that completes after three periods and a
/// "cycles" method.
struct Homing {
    cycles: Arc<AtomicU32>,
    homing_until: Arc<AtomicU32>,
}

impl Component for Homing {
    fn name(&self) -> &str {
        "axis"
    }

    fn calculate(&mut self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn scripting(&mut self) -> Option<&mut dyn ScriptingFacet> {
        Some(self)
    }
}

impl ScriptingFacet for Homing {
    fn register_operations(&mut self, scope: &mut OperationScope<'_>) {
        let cycles = self.cycles.clone();
        let until = self.homing_until.clone();
        scope
            .add_command(
                "home",
                vec![ValueKind::UInt],
                move |args| {
                    let duration = match args[0] {
                        EventValue::UInt(v) => v,
                        _ => return false,
                    };
                    until.store(cycles.load(Ordering::Relaxed) + duration, Ordering::Relaxed);
                    true
                },
                {
                    let cycles = self.cycles.clone();
                    let until = self.homing_until.clone();
                    move || cycles.load(Ordering::Relaxed) >= until.load(Ordering::Relaxed)
                },
            )
            .unwrap();

        let cycles = self.cycles.clone();
        scope
            .add_method("cycles", vec![], move |_| {
                EventValue::UInt(cycles.load(Ordering::Relaxed))
            })
            .unwrap();
    }
}

#[test]
fn scripting_commands_complete_via_extension_polling() {
    let kernel = ControlKernel::new("scripting", 0.001, PriorityClass::NonRealTime);
    let extension = ScriptingExtension::new();
    let handle = extension.handle();
    kernel.add_extension(Box::new(extension)).unwrap();

    kernel
        .load_component(Box::new(Homing {
            cycles: Arc::new(AtomicU32::new(0)),
            homing_until: Arc::new(AtomicU32::new(0)),
        }))
        .unwrap();

    assert!(handle.has_command("axis.home"));
    assert!(handle.has_method("axis.cycles"));

    kernel.start_manual().unwrap();

    let ticket = handle
        .dispatch("axis.home", &[EventValue::UInt(3)])
        .unwrap();
    assert_eq!(ticket.status(), CommandStatus::Dispatched);

    for _ in 0..3 {
        assert!(!ticket.done());
        kernel.step_once().unwrap();
    }
    kernel.step_once().unwrap();
    assert!(ticket.done());

    match handle.call("axis.cycles", &[]).unwrap() {
        EventValue::UInt(cycles) => assert!(cycles >= 4),
        other => panic!("unexpected result {:?}", other),
    }
    kernel.stop().unwrap();
}

#[test]
fn extensions_only_observe_later_loads() {
    let kernel = ControlKernel::new("ordering", 0.001, PriorityClass::NonRealTime);

    // Loaded before the scripting extension exists: never bound.
    kernel
        .load_component(Box::new(Homing {
            cycles: Arc::new(AtomicU32::new(0)),
            homing_until: Arc::new(AtomicU32::new(0)),
        }))
        .unwrap();

    let extension = ScriptingExtension::new();
    let handle = extension.handle();
    kernel.add_extension(Box::new(extension)).unwrap();
    assert!(!handle.has_command("axis.home"));

    // A later load is observed.
    kernel.unload_component("axis").unwrap();
    kernel
        .load_component(Box::new(Homing {
            cycles: Arc::new(AtomicU32::new(0)),
            homing_until: Arc::new(AtomicU32::new(0)),
        }))
        .unwrap();
    assert!(handle.has_command("axis.home"));
}

#[test]
fn scripting_setup_errors() {
    let kernel = ControlKernel::new("script-errors", 0.001, PriorityClass::NonRealTime);
    let extension = ScriptingExtension::new();
    let handle = extension.handle();
    kernel.add_extension(Box::new(extension)).unwrap();
    kernel
        .load_component(Box::new(Homing {
            cycles: Arc::new(AtomicU32::new(0)),
            homing_until: Arc::new(AtomicU32::new(0)),
        }))
        .unwrap();

    assert!(handle.dispatch("axis.park", &[]).is_err());
    assert!(handle.dispatch("axis.home", &[]).is_err());
    assert!(handle
        .dispatch("axis.home", &[EventValue::Double(1.0)])
        .is_err());
}

#[test]
fn kernel_slip_event_reaches_sync_handlers() {
    let kernel = ControlKernel::new("slippy", 0.005, PriorityClass::NonRealTime);

    struct Sleeper;
    impl Component for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }

        fn calculate(&mut self) {
            std::thread::sleep(std::time::Duration::from_millis(12));
        }
    }
    kernel.load_component(Box::new(Sleeper)).unwrap();

    let slips = Arc::new(AtomicU32::new(0));
    let slips_in = slips.clone();
    kernel
        .events()
        .connect_sync(EVENT_SLIP, move |_| {
            slips_in.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    kernel.start().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(40));
    kernel.stop().unwrap();

    assert!(slips.load(Ordering::Relaxed) >= 1, "no slip event observed");
    assert!(kernel.stats().missed_steps >= 1);
}
