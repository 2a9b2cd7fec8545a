// pulse-kernel: the control kernel and component model
// Hosts periodically executed components exchanging typed data through
// role-tagged bags, with optional capabilities contributed by extensions.

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # Pulse Kernel
//!
//! The composition layer of a Pulse control application.
//!
//! ## Key Components
//!
//! - **Kernel**: owns the Input/Model/SetPoint/Output bags and an ordered
//!   component list; drives pull → calculate → push → extensions once per
//!   period on its own periodic task
//! - **Component**: lifecycle (`loaded`/`startup`/`shutdown`/`unloaded`)
//!   initiated by the kernel, phase hooks, optional facets
//! - **Extensions**: properties (XML file configuration and snapshots),
//!   events (facet binding plus completion-processor draining), scripting
//!   (commands and methods as named callables), reporting (periodic
//!   variable logging)
//!
//! ## Ordering Guarantees
//!
//! Within a period every component pulls before any component calculates,
//! and calculates before any pushes; a value pushed in period n is pulled
//! in period n+1. Components and extensions run in registration order.

pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod extension;
pub mod kernel;
pub mod properties;
pub mod reporting;
pub mod scripting;

// Re-exports for convenience
pub use component::{
    Component, ComponentSet, ComponentSlot, ComponentState, EventFacet, PropertyFacet, Ports,
    ReportingFacet, ScriptingFacet,
};
pub use config::{KernelConfig, Priority, PropertyPolicy};
pub use error::{KernelError, KernelResult};
pub use events::EventExtension;
pub use extension::KernelExtension;
pub use kernel::{ControlKernel, KernelBags, KernelStats, EVENT_FAULT, EVENT_SLIP};
pub use properties::PropertyExtension;
pub use reporting::ReportingExtension;
pub use scripting::{
    CommandStatus, CommandTicket, OperationRegistry, OperationScope, ScriptingExtension,
    ScriptingHandle,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::component::{Component, ComponentState, Ports};
    pub use crate::config::KernelConfig;
    pub use crate::error::{KernelError, KernelResult};
    pub use crate::extension::KernelExtension;
    pub use crate::kernel::ControlKernel;
    pub use crate::properties::PropertyExtension;
    pub use pulse_core::prelude::*;
}
