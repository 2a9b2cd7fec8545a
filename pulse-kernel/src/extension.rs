// pulse-kernel: extension contract
// An extension is a kernel-scoped singleton contributing one facet to
// participating components. It runs at the pipeline cadence, after the
// three data phases.

use crate::component::{Component, ComponentSet};

/// A kernel extension.
///
/// Extensions are registered before any component; a component loaded
/// earlier than an extension is never observed by it. The extension owns
/// all facet state; components keep no owning references back.
pub trait KernelExtension: Send {
    fn name(&self) -> &str;

    /// Runs at kernel start, before components start up. Returning false
    /// aborts the start; already-initialized extensions are finalized in
    /// reverse order.
    fn initialize(&mut self, components: &mut ComponentSet<'_>) -> bool {
        let _ = components;
        true
    }

    /// Runs once per period, after push, in registration order.
    fn step(&mut self, components: &mut ComponentSet<'_>) {
        let _ = components;
    }

    /// Runs at kernel stop, after components shut down, in reverse
    /// registration order.
    fn finalize(&mut self, components: &mut ComponentSet<'_>) {
        let _ = components;
    }

    /// Probe `component` for this extension's facet and bind it.
    /// Returning false fails the load; the kernel unbinds the facets
    /// bound so far and unloads the component.
    fn component_loaded(&mut self, component: &mut dyn Component) -> bool {
        let _ = component;
        true
    }

    /// Release any facet state held for `component`. Must tolerate
    /// components this extension never bound.
    fn component_unloaded(&mut self, component: &mut dyn Component) {
        let _ = component;
    }
}
