// Pipeline semantics: one-period latency between a generator's push and a
// consumer's pull, and startup rollback when a port bind fails.

use std::sync::Arc;

use parking_lot::Mutex;

use pulse_core::{DataHandle, PriorityClass};
use pulse_kernel::{Component, ControlKernel, KernelError, Ports};

/// Writes 1.0 into SetPoint["v"] every period.
struct Generator {
    out: Option<DataHandle<f64>>,
}

impl Generator {
    fn new() -> Box<Self> {
        Box::new(Self { out: None })
    }
}

impl Component for Generator {
    fn name(&self) -> &str {
        "generator"
    }

    fn loaded(&mut self, ports: &Ports<'_>) -> bool {
        match ports.set_point.register("v", 0.0f64) {
            Ok(handle) => {
                self.out = Some(handle);
                true
            }
            Err(_) => false,
        }
    }

    fn push(&mut self) {
        if let Some(out) = &self.out {
            out.set(1.0);
        }
    }
}

/// Pulls SetPoint["v"] each period and records what it saw.
struct Observer {
    input: Option<DataHandle<f64>>,
    seen: Arc<Mutex<Vec<f64>>>,
}

impl Observer {
    fn new(seen: &Arc<Mutex<Vec<f64>>>) -> Box<Self> {
        Box::new(Self {
            input: None,
            seen: seen.clone(),
        })
    }
}

impl Component for Observer {
    fn name(&self) -> &str {
        "observer"
    }

    fn startup(&mut self, ports: &Ports<'_>) -> bool {
        match ports.set_point.get::<f64>("v") {
            Ok(handle) => {
                self.input = Some(handle);
                true
            }
            Err(_) => false,
        }
    }

    fn pull(&mut self) {
        if let Some(input) = &self.input {
            self.seen.lock().push(input.get_clone());
        }
    }
}

#[test]
fn push_is_visible_one_period_later() {
    let kernel = ControlKernel::new("latency", 0.001, PriorityClass::NonRealTime);
    let seen = Arc::new(Mutex::new(Vec::new()));

    kernel.load_component(Generator::new()).unwrap();
    kernel.load_component(Observer::new(&seen)).unwrap();

    kernel.start_manual().unwrap();
    kernel.step_once().unwrap();
    kernel.step_once().unwrap();
    kernel.stop().unwrap();

    // Period n pulls the value pushed in period n-1: the initial 0.0
    // first, the generator's 1.0 from then on.
    assert_eq!(*seen.lock(), vec![0.0, 1.0]);
}

/// Registers Input["pos"] as a vector during load.
struct VectorSource {
    started: Arc<Mutex<Vec<&'static str>>>,
}

impl Component for VectorSource {
    fn name(&self) -> &str {
        "source"
    }

    fn loaded(&mut self, ports: &Ports<'_>) -> bool {
        ports.input.register("pos", vec![0.0f64; 6]).is_ok()
    }

    fn startup(&mut self, _ports: &Ports<'_>) -> bool {
        self.started.lock().push("source.startup");
        true
    }

    fn shutdown(&mut self) -> bool {
        self.started.lock().push("source.shutdown");
        true
    }
}

/// Asks for Input["pos"] as a scalar; the bind-time type check refuses.
struct ScalarConsumer;

impl Component for ScalarConsumer {
    fn name(&self) -> &str {
        "consumer"
    }

    fn startup(&mut self, ports: &Ports<'_>) -> bool {
        ports.input.get::<f64>("pos").is_ok()
    }
}

#[test]
fn type_mismatch_at_bind_rolls_back_start() {
    let kernel = ControlKernel::new("mismatch", 0.001, PriorityClass::NonRealTime);
    let log = Arc::new(Mutex::new(Vec::new()));

    kernel
        .load_component(Box::new(VectorSource {
            started: log.clone(),
        }))
        .unwrap();
    kernel.load_component(Box::new(ScalarConsumer)).unwrap();

    match kernel.start() {
        Err(KernelError::LifecycleRejected {
            component,
            transition,
        }) => {
            assert_eq!(component, "consumer");
            assert_eq!(transition, "startup");
        }
        other => panic!("expected startup rejection, got {:?}", other.map(|_| ())),
    }

    // The already-started source was shut down during rollback.
    assert_eq!(*log.lock(), vec!["source.startup", "source.shutdown"]);
    assert!(!kernel.is_running());
}

#[test]
fn scheduled_pipeline_reaches_consumers() {
    let kernel = ControlKernel::new("scheduled", 0.001, PriorityClass::NonRealTime);
    let seen = Arc::new(Mutex::new(Vec::new()));

    kernel.load_component(Generator::new()).unwrap();
    kernel.load_component(Observer::new(&seen)).unwrap();

    kernel.start().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    kernel.stop().unwrap();

    let seen = seen.lock();
    assert!(seen.len() >= 3, "only {} periods observed", seen.len());
    assert_eq!(seen[0], 0.0);
    assert!(seen[1..].iter().all(|v| *v == 1.0));
}
