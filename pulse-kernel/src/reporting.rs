// pulse-kernel: reporting extension
// Snapshots each reporting component's exported variables every N periods
// and hands them to the structured log.

use std::fmt::Write as _;

use tracing::info;

use pulse_core::{Property, PropertyBag, PropertyVisitor};

use crate::component::{Component, ComponentSet};
use crate::extension::KernelExtension;

/// Kernel extension contributing the reporting facet.
///
/// Every `interval` periods, components exposing
/// [`crate::component::ReportingFacet`] export a bag of variables which is
/// rendered into one log line per component.
pub struct ReportingExtension {
    interval: u64,
    counter: u64,
}

impl ReportingExtension {
    /// Report every `interval` periods (at least every period).
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
        }
    }
}

impl KernelExtension for ReportingExtension {
    fn name(&self) -> &str {
        "reporting"
    }

    fn step(&mut self, components: &mut ComponentSet<'_>) {
        self.counter += 1;
        if self.counter % self.interval != 0 {
            return;
        }
        for component in components.iter_mut() {
            let name = component.name().to_string();
            if let Some(facet) = component.reporting() {
                let mut bag = PropertyBag::with_type("report");
                facet.export_report(&mut bag);
                if !bag.is_empty() {
                    info!(
                        target: "pulse::report",
                        component = %name,
                        values = %render(&bag),
                        "report"
                    );
                }
            }
        }
    }
}

/// Render a report bag as `name=value` pairs.
fn render(bag: &PropertyBag) -> String {
    struct Renderer {
        out: String,
    }

    impl Renderer {
        fn pair(&mut self, name: &str, value: impl std::fmt::Display) {
            if !self.out.is_empty() {
                self.out.push(' ');
            }
            let _ = write!(self.out, "{}={}", name, value);
        }
    }

    impl PropertyVisitor for Renderer {
        fn visit_bool(&mut self, p: &Property<bool>) {
            self.pair(p.name(), p.value());
        }

        fn visit_char(&mut self, p: &Property<char>) {
            self.pair(p.name(), p.value());
        }

        fn visit_int(&mut self, p: &Property<i32>) {
            self.pair(p.name(), p.value());
        }

        fn visit_uint(&mut self, p: &Property<u32>) {
            self.pair(p.name(), p.value());
        }

        fn visit_double(&mut self, p: &Property<f64>) {
            self.pair(p.name(), p.value());
        }

        fn visit_string(&mut self, p: &Property<String>) {
            self.pair(p.name(), p.value());
        }

        fn visit_bag(&mut self, name: &str, _description: &str, bag: &PropertyBag) {
            self.pair(name, format!("{{{}}}", render(bag)));
        }
    }

    let mut renderer = Renderer { out: String::new() };
    bag.accept(&mut renderer);
    renderer.out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pairs() {
        let mut inner = PropertyBag::with_type("doubles");
        inner.add_double("0", "", 1.5);

        let mut bag = PropertyBag::with_type("report");
        bag.add_double("position", "", 0.25);
        bag.add_uint("cycles", "", 12);
        bag.add_bag("gains", "", inner);

        assert_eq!(render(&bag), "position=0.25 cycles=12 gains={0=1.5}");
    }
}
