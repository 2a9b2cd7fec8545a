// pulse-kernel: component model
// A component is loaded into exactly one kernel, binds its ports against
// the kernel's bags, and is driven through pull/calculate/push each period.

use pulse_core::{DataBag, EventService, PropertyBag};

use crate::scripting::OperationScope;

/// Lifecycle state of a component, driven by the owning kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Unloaded,
    Loaded,
    Started,
}

/// Borrowed view of the kernel's four role-tagged bags, handed to the
/// lifecycle hooks for port binding.
pub struct Ports<'a> {
    pub input: &'a DataBag,
    pub model: &'a DataBag,
    pub set_point: &'a DataBag,
    pub output: &'a DataBag,
}

/// A control component.
///
/// The kernel initiates every lifecycle transition: `loaded` when the
/// component enters the kernel (bind output ports, register initial
/// values), `startup` right before periodic execution (bind input ports,
/// reset integrators), and their inverses. Lifecycle hooks may refuse by
/// returning false; the kernel then rolls back.
///
/// The phase hooks run on the kernel's scheduling thread once per period,
/// in load order, and cannot fail: `pull` snapshots inputs, `calculate`
/// computes locally, `push` publishes outputs.
///
/// Optional capabilities are exposed through the facet accessors; an
/// extension probes them at load time and owns the facet state. Closures a
/// component registers through a facet run outside the kernel thread, so
/// they must capture thread-safe state.
pub trait Component: Send {
    fn name(&self) -> &str;

    fn loaded(&mut self, ports: &Ports<'_>) -> bool {
        let _ = ports;
        true
    }

    fn startup(&mut self, ports: &Ports<'_>) -> bool {
        let _ = ports;
        true
    }

    fn shutdown(&mut self) -> bool {
        true
    }

    fn unloaded(&mut self) -> bool {
        true
    }

    fn pull(&mut self) {}

    fn calculate(&mut self) {}

    fn push(&mut self) {}

    /// Property facet: configuration through property bags.
    fn properties(&mut self) -> Option<&mut dyn PropertyFacet> {
        None
    }

    /// Scripting facet: commands and methods exposed as named callables.
    fn scripting(&mut self) -> Option<&mut dyn ScriptingFacet> {
        None
    }

    /// Event facet: declared events and subscriptions.
    fn events(&mut self) -> Option<&mut dyn EventFacet> {
        None
    }

    /// Reporting facet: variables to be logged periodically.
    fn reporting(&mut self) -> Option<&mut dyn ReportingFacet> {
        None
    }
}

/// Configuration capability of a component.
pub trait PropertyFacet {
    /// Update the component's properties from `bag`. False when a
    /// required property is missing or malformed.
    fn update_properties(&mut self, bag: &PropertyBag) -> bool;

    /// Export the component's current properties into `bag`.
    fn export_properties(&self, bag: &mut PropertyBag);
}

/// Scripting capability: the component registers its callables.
pub trait ScriptingFacet {
    fn register_operations(&mut self, scope: &mut OperationScope<'_>);
}

/// Event capability: the component declares emitted events and connects
/// its subscriptions.
pub trait EventFacet {
    fn declare_events(&mut self, service: &EventService) -> bool;

    fn unbind_events(&mut self, service: &EventService) {
        let _ = service;
    }
}

/// Reporting capability: the component exports the variables to log.
pub trait ReportingFacet {
    fn export_report(&mut self, bag: &mut PropertyBag);
}

/// A component plus its kernel-tracked state.
pub struct ComponentSlot {
    pub(crate) state: ComponentState,
    pub(crate) component: Box<dyn Component>,
}

impl ComponentSlot {
    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }
}

/// Mutable access to the kernel's component list, handed to extensions.
pub struct ComponentSet<'a> {
    slots: &'a mut [ComponentSlot],
}

impl<'a> ComponentSet<'a> {
    pub(crate) fn new(slots: &'a mut [ComponentSlot]) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Components in load order.
    pub fn iter_mut<'b>(&'b mut self) -> impl Iterator<Item = &'b mut dyn Component> {
        self.slots
            .iter_mut()
            .map::<&'b mut dyn Component, _>(|s| &mut *s.component)
    }

    pub fn get_mut<'b>(&'b mut self, name: &str) -> Option<&'b mut dyn Component> {
        self.slots
            .iter_mut()
            .find(|s| s.component.name() == name)
            .map::<&'b mut dyn Component, _>(|s| &mut *s.component)
    }
}
