// pulse-kernel: event extension
// Binds component event facets to the kernel-wide event service and
// drains the completion processor once per period.

use std::sync::Arc;

use tracing::error;

use pulse_core::{EventProcessor, EventService};

use crate::component::{Component, ComponentSet};
use crate::extension::KernelExtension;
use crate::kernel::ControlKernel;

/// Kernel extension contributing the event facet.
///
/// Components exposing [`crate::component::EventFacet`] declare their
/// events and subscriptions against the kernel's service at load time.
/// Each period, queued asynchronous handlers on the kernel's completion
/// processor are drained.
pub struct EventExtension {
    service: Arc<EventService>,
    completion: Arc<EventProcessor>,
}

impl EventExtension {
    pub fn new(kernel: &ControlKernel) -> Self {
        Self {
            service: kernel.events().clone(),
            completion: kernel.completion().clone(),
        }
    }
}

impl KernelExtension for EventExtension {
    fn name(&self) -> &str {
        "events"
    }

    fn step(&mut self, _components: &mut ComponentSet<'_>) {
        self.completion.process_pending();
    }

    fn component_loaded(&mut self, component: &mut dyn Component) -> bool {
        let name = component.name().to_string();
        match component.events() {
            Some(facet) => {
                if facet.declare_events(&self.service) {
                    true
                } else {
                    error!(component = %name, "event declaration failed");
                    false
                }
            }
            None => true,
        }
    }

    fn component_unloaded(&mut self, component: &mut dyn Component) {
        if let Some(facet) = component.events() {
            facet.unbind_events(&self.service);
        }
    }
}
