// pulse-cli: demo components
// A simulated joint sensor, a sine setpoint generator and a proportional
// velocity controller wired through the kernel bags:
//   sensor  -> Input["Position_joint"]
//   generator -> SetPoint["Position_joint"], SetPoint["Velocity_joint"]
//   controller -> Output["Velocity_joint"]

use pulse_core::{
    compose_property, decompose_property, DataHandle, Property, PropertyBag, Ticks, TimeService,
};
use pulse_kernel::{Component, Ports, PropertyFacet, ReportingFacet};

/// Simulated position sensor: publishes a slowly drifting joint position.
pub struct JointSensor {
    axes: usize,
    position: Vec<f64>,
    out: Option<DataHandle<Vec<f64>>>,
}

impl JointSensor {
    pub fn new(axes: usize) -> Box<Self> {
        Box::new(Self {
            axes,
            position: vec![0.0; axes],
            out: None,
        })
    }
}

impl Component for JointSensor {
    fn name(&self) -> &str {
        "sensor"
    }

    fn loaded(&mut self, ports: &Ports<'_>) -> bool {
        match ports.input.register("Position_joint", vec![0.0; self.axes]) {
            Ok(handle) => {
                self.out = Some(handle);
                true
            }
            Err(_) => false,
        }
    }

    fn calculate(&mut self) {
        for p in &mut self.position {
            *p += 1.0e-4;
        }
    }

    fn push(&mut self) {
        if let Some(out) = &self.out {
            out.set(self.position.clone());
        }
    }
}

/// Sine setpoint generator over `axes` joints.
///
/// Configured through per-axis `amplitude`, `frequency` and `phase`
/// properties; anchors the sine on the measured position at startup so
/// the trajectory starts where the mechanism is.
pub struct SineGenerator {
    axes: usize,
    amplitude: Property<Vec<f64>>,
    frequency: Property<Vec<f64>>,
    phase: Property<Vec<f64>>,
    properties_read: bool,
    initialized: bool,
    time_begin: Ticks,
    position_initial: Vec<f64>,
    position_meas: Vec<f64>,
    position_local: Vec<f64>,
    velocity_local: Vec<f64>,
    meas_in: Option<DataHandle<Vec<f64>>>,
    position_out: Option<DataHandle<Vec<f64>>>,
    velocity_out: Option<DataHandle<Vec<f64>>>,
}

impl SineGenerator {
    pub fn new(axes: usize) -> Box<Self> {
        Box::new(Self {
            axes,
            amplitude: Property::new("amplitude", "Amplitude of sine", Vec::new()),
            frequency: Property::new("frequency", "Frequency of sine", Vec::new()),
            phase: Property::new("phase", "Phase of sine", Vec::new()),
            properties_read: false,
            initialized: false,
            time_begin: Ticks::ZERO,
            position_initial: vec![0.0; axes],
            position_meas: vec![0.0; axes],
            position_local: vec![0.0; axes],
            velocity_local: vec![0.0; axes],
            meas_in: None,
            position_out: None,
            velocity_out: None,
        })
    }
}

impl Component for SineGenerator {
    fn name(&self) -> &str {
        "generator"
    }

    fn loaded(&mut self, ports: &Ports<'_>) -> bool {
        let position = ports
            .set_point
            .register("Position_joint", vec![0.0; self.axes]);
        let velocity = ports
            .set_point
            .register("Velocity_joint", vec![0.0; self.axes]);
        match (position, velocity) {
            (Ok(p), Ok(v)) => {
                self.position_out = Some(p);
                self.velocity_out = Some(v);
                true
            }
            _ => false,
        }
    }

    fn startup(&mut self, ports: &Ports<'_>) -> bool {
        if !self.properties_read {
            return false;
        }
        self.initialized = false;
        match ports.input.get::<Vec<f64>>("Position_joint") {
            Ok(handle) => {
                self.meas_in = Some(handle);
                true
            }
            Err(_) => false,
        }
    }

    fn pull(&mut self) {
        if !self.initialized {
            self.initialized = true;
            if let Some(meas) = &self.meas_in {
                meas.get(&mut self.position_meas);
            }
            let amplitude = self.amplitude.value();
            let phase = self.phase.value();
            for i in 0..self.axes {
                self.position_initial[i] =
                    self.position_meas[i] - amplitude[i] * phase[i].sin();
            }
            self.time_begin = TimeService::instance().now();
        }
    }

    fn calculate(&mut self) {
        let elapsed = TimeService::instance().seconds_since(self.time_begin);
        let amplitude = self.amplitude.value();
        let frequency = self.frequency.value();
        let phase = self.phase.value();
        for i in 0..self.axes {
            let arg = frequency[i] * elapsed + phase[i];
            self.position_local[i] = self.position_initial[i] + amplitude[i] * arg.sin();
            self.velocity_local[i] = amplitude[i] * frequency[i] * arg.cos();
        }
    }

    fn push(&mut self) {
        if let Some(out) = &self.position_out {
            out.set(self.position_local.clone());
        }
        if let Some(out) = &self.velocity_out {
            out.set(self.velocity_local.clone());
        }
    }

    fn properties(&mut self) -> Option<&mut dyn PropertyFacet> {
        Some(self)
    }
}

impl PropertyFacet for SineGenerator {
    fn update_properties(&mut self, bag: &PropertyBag) -> bool {
        if !compose_property(bag, &mut self.amplitude)
            || !compose_property(bag, &mut self.frequency)
            || !compose_property(bag, &mut self.phase)
        {
            return false;
        }
        if self.amplitude.value().len() != self.axes
            || self.frequency.value().len() != self.axes
            || self.phase.value().len() != self.axes
        {
            return false;
        }
        self.properties_read = true;
        true
    }

    fn export_properties(&self, bag: &mut PropertyBag) {
        bag.add(decompose_property(&self.amplitude));
        bag.add(decompose_property(&self.frequency));
        bag.add(decompose_property(&self.phase));
    }
}

/// Proportional velocity controller with a position-feedback integrator.
///
/// Integrates the desired velocity, applies proportional feedback on the
/// difference to the measured position, and publishes feedback plus
/// feedforward.
pub struct VelocityController {
    axes: usize,
    gain: Property<Vec<f64>>,
    properties_read: bool,
    initialized: bool,
    time_begin: Ticks,
    position_meas: Vec<f64>,
    velocity_desired: Vec<f64>,
    position_integrated: Vec<f64>,
    velocity_out_local: Vec<f64>,
    position_in: Option<DataHandle<Vec<f64>>>,
    velocity_in: Option<DataHandle<Vec<f64>>>,
    velocity_out: Option<DataHandle<Vec<f64>>>,
}

impl VelocityController {
    pub fn new(axes: usize) -> Box<Self> {
        Box::new(Self {
            axes,
            gain: Property::new("K", "Proportional Gain", Vec::new()),
            properties_read: false,
            initialized: false,
            time_begin: Ticks::ZERO,
            position_meas: vec![0.0; axes],
            velocity_desired: vec![0.0; axes],
            position_integrated: vec![0.0; axes],
            velocity_out_local: vec![0.0; axes],
            position_in: None,
            velocity_in: None,
            velocity_out: None,
        })
    }
}

impl Component for VelocityController {
    fn name(&self) -> &str {
        "controller"
    }

    fn loaded(&mut self, ports: &Ports<'_>) -> bool {
        match ports.output.register("Velocity_joint", vec![0.0; self.axes]) {
            Ok(handle) => {
                self.velocity_out = Some(handle);
                true
            }
            Err(_) => false,
        }
    }

    fn startup(&mut self, ports: &Ports<'_>) -> bool {
        if !self.properties_read {
            return false;
        }
        self.initialized = false;
        let position = ports.input.get::<Vec<f64>>("Position_joint");
        let velocity = ports.set_point.get::<Vec<f64>>("Velocity_joint");
        match (position, velocity) {
            (Ok(p), Ok(v)) => {
                self.position_in = Some(p);
                self.velocity_in = Some(v);
                true
            }
            _ => false,
        }
    }

    fn pull(&mut self) {
        if let Some(input) = &self.position_in {
            input.get(&mut self.position_meas);
        }
        if let Some(input) = &self.velocity_in {
            input.get(&mut self.velocity_desired);
        }
    }

    fn calculate(&mut self) {
        let time_service = TimeService::instance();
        if !self.initialized {
            self.initialized = true;
            self.position_integrated.clone_from(&self.position_meas);
            self.time_begin = time_service.now();
        }
        let dt = time_service.seconds_since(self.time_begin);
        self.time_begin = time_service.now();

        let gain = self.gain.value();
        for i in 0..self.axes {
            self.position_integrated[i] += self.velocity_desired[i] * dt;
            let feedback = (self.position_integrated[i] - self.position_meas[i]) * gain[i];
            self.velocity_out_local[i] = self.velocity_desired[i] + feedback;
        }
    }

    fn push(&mut self) {
        if let Some(out) = &self.velocity_out {
            out.set(self.velocity_out_local.clone());
        }
    }

    fn properties(&mut self) -> Option<&mut dyn PropertyFacet> {
        Some(self)
    }

    fn reporting(&mut self) -> Option<&mut dyn ReportingFacet> {
        Some(self)
    }
}

impl PropertyFacet for VelocityController {
    fn update_properties(&mut self, bag: &PropertyBag) -> bool {
        if !compose_property(bag, &mut self.gain) {
            return false;
        }
        if self.gain.value().len() != self.axes {
            return false;
        }
        self.properties_read = true;
        true
    }

    fn export_properties(&self, bag: &mut PropertyBag) {
        bag.add(decompose_property(&self.gain));
    }
}

impl ReportingFacet for VelocityController {
    fn export_report(&mut self, bag: &mut PropertyBag) {
        for (i, v) in self.velocity_out_local.iter().enumerate() {
            bag.add_double(&format!("velocity_{}", i), "", *v);
        }
    }
}
