// pulse-core: periodic task runtime and dataflow primitives
// The hard real-time substrate: time base, buffers, ports, tasks, events.

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
// Note: unsafe code is limited to the buffer primitives and the thread
// scheduling shim, each with safety justifications.

//! # Pulse Core
//!
//! The periodic task runtime and dataflow primitives underneath a Pulse
//! control kernel.
//!
//! ## Key Components
//!
//! - **Time**: monotonic tick counter with tick/second conversions
//! - **Buffer**: locked and lock-free SPSC bounded FIFOs, blocking policies,
//!   and the last-writer-wins data cell
//! - **Data**: named typed data objects organized in role-tagged bags,
//!   type-checked at bind time
//! - **Task**: periodic tasks with bounded slip, driven by a dedicated
//!   thread or a multiplexed timer
//! - **Property**: documented configuration values with deep-update /
//!   clone / real-time refresh semantics, marshalled to XML
//! - **Event**: named typed events with synchronous and asynchronous
//!   dispatch
//!
//! ## Guarantees
//!
//! - `initialize` runs exactly once per task start, `finalize` exactly
//!   once per stop, `step` at most once per elapsed period
//! - A slipped period is stepped exactly once and counted, never caught up
//! - Port reads never observe a half-written publication
//! - Buffer full/empty are reported as `bool`, never raised

pub mod buffer;
pub mod data;
pub mod error;
pub mod event;
pub mod marshal;
pub mod property;
pub mod task;
pub mod time;
pub mod timer;

// Re-exports for convenience
pub use buffer::{
    BlockingPolicy, Buffer, BufferLockFree, BufferLocked, BufferPolicy, DataCell,
    NonBlockingPolicy, Semaphore,
};
pub use data::{AnyDataObject, BagRole, DataBag, DataHandle, DataObject, PortData};
pub use error::{CoreError, CoreResult};
pub use event::{
    AnySlot, ArgBinding, ConnectionHandle, EmitBuilder, EmitHandle, EventArgs, EventProcessor,
    EventService, EventSlot, EventValue, SlotValue, ValueKind,
};
pub use marshal::{
    demarshal_str, marshal_to_string, MarshalError, MarshalResult, XmlDemarshaller, XmlMarshaller,
};
pub use property::{
    compose_property, decompose_property, Decompose, Property, PropertyBag, PropertyEntry,
    PropertyKind, PropertyValue, PropertyVisitor,
};
pub use task::{FnRunner, PeriodicTask, PriorityClass, Runnable, TaskState};
pub use time::{nsecs_to_secs, secs_to_nsecs, Ticks, TimeService};
pub use timer::{TaskTimer, MAX_TASKS};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        buffer::{Buffer, BufferLockFree, BufferLocked},
        data::{BagRole, DataBag, DataHandle},
        error::{CoreError, CoreResult},
        event::{EventProcessor, EventService, EventValue, ValueKind},
        property::{Property, PropertyBag},
        task::{PeriodicTask, PriorityClass, Runnable, TaskState},
        time::{Ticks, TimeService},
        timer::TaskTimer,
    };
}
