// pulse-core: event service
// Named events with typed argument signatures. Sync handlers run in the
// emitting task, in registration order; async handlers are enqueued to an
// EventProcessor and drained on its own schedule. All signature checks
// happen at setup time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::warn;

use crate::buffer::{Buffer, BufferLockFree};
use crate::error::{CoreError, CoreResult};
use crate::task::Runnable;

/// A value of the closed event/scripting primitive set.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Bool(bool),
    Char(char),
    Int(i32),
    UInt(u32),
    Double(f64),
    Str(String),
}

impl EventValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            EventValue::Bool(_) => ValueKind::Bool,
            EventValue::Char(_) => ValueKind::Char,
            EventValue::Int(_) => ValueKind::Int,
            EventValue::UInt(_) => ValueKind::UInt,
            EventValue::Double(_) => ValueKind::Double,
            EventValue::Str(_) => ValueKind::Str,
        }
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        EventValue::Bool(v)
    }
}

impl From<char> for EventValue {
    fn from(v: char) -> Self {
        EventValue::Char(v)
    }
}

impl From<i32> for EventValue {
    fn from(v: i32) -> Self {
        EventValue::Int(v)
    }
}

impl From<u32> for EventValue {
    fn from(v: u32) -> Self {
        EventValue::UInt(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Double(v)
    }
}

impl From<&str> for EventValue {
    fn from(v: &str) -> Self {
        EventValue::Str(v.to_string())
    }
}

impl From<String> for EventValue {
    fn from(v: String) -> Self {
        EventValue::Str(v)
    }
}

/// Discriminant of [`EventValue`], used for signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Char,
    Int,
    UInt,
    Double,
    Str,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Char => "char",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Double => "double",
            ValueKind::Str => "string",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Argument vector carried by one emission.
pub type EventArgs = SmallVec<[EventValue; 4]>;

/// Writable argument storage; handler-side bindings must be one of these.
pub trait AnySlot: Send + Sync {
    fn kind(&self) -> ValueKind;
    fn store(&self, value: &EventValue);
    fn load(&self) -> EventValue;
}

/// Typed lvalue storage for event argument bindings.
///
/// A handler bound with slots has the emitted arguments written into its
/// slots before its function runs; an emit handle bound with slots reads
/// them at emit time.
pub struct EventSlot<T: SlotValue> {
    value: Arc<RwLock<T>>,
}

impl<T: SlotValue> Clone for EventSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T: SlotValue> EventSlot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
    }

    fn as_any(&self) -> Arc<dyn AnySlot> {
        Arc::new(self.clone())
    }
}

impl<T: SlotValue> AnySlot for EventSlot<T> {
    fn kind(&self) -> ValueKind {
        T::KIND
    }

    fn store(&self, value: &EventValue) {
        if let Some(v) = T::from_value(value) {
            *self.value.write() = v;
        }
    }

    fn load(&self) -> EventValue {
        self.value.read().to_value()
    }
}

/// Types storable in an [`EventSlot`].
pub trait SlotValue: Clone + Send + Sync + 'static {
    const KIND: ValueKind;
    fn from_value(value: &EventValue) -> Option<Self>;
    fn to_value(&self) -> EventValue;
}

macro_rules! impl_slot_value {
    ($ty:ty, $kind:expr, $variant:ident) => {
        impl SlotValue for $ty {
            const KIND: ValueKind = $kind;

            fn from_value(value: &EventValue) -> Option<Self> {
                match value {
                    EventValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn to_value(&self) -> EventValue {
                EventValue::$variant(self.clone())
            }
        }
    };
}

impl_slot_value!(bool, ValueKind::Bool, Bool);
impl_slot_value!(char, ValueKind::Char, Char);
impl_slot_value!(i32, ValueKind::Int, Int);
impl_slot_value!(u32, ValueKind::UInt, UInt);
impl_slot_value!(f64, ValueKind::Double, Double);
impl_slot_value!(String, ValueKind::Str, Str);

/// One argument position of a connection or emit handle.
pub enum ArgBinding {
    /// A fixed value; allowed for emit handles only.
    Literal(EventValue),
    /// Writable storage; required for handler-side bindings.
    Slot(Arc<dyn AnySlot>),
}

impl ArgBinding {
    pub fn literal(value: impl Into<EventValue>) -> Self {
        ArgBinding::Literal(value.into())
    }

    pub fn slot<T: SlotValue>(slot: &EventSlot<T>) -> Self {
        ArgBinding::Slot(slot.as_any())
    }

    fn kind(&self) -> ValueKind {
        match self {
            ArgBinding::Literal(v) => v.kind(),
            ArgBinding::Slot(s) => s.kind(),
        }
    }
}

/// The invocable side of a connection.
#[derive(Clone)]
enum Callback {
    /// Receives the argument vector directly.
    Direct(Arc<dyn Fn(&[EventValue]) + Send + Sync>),
    /// Arguments are stored into the sinks, then the function runs.
    Bound {
        sinks: Arc<[Arc<dyn AnySlot>]>,
        func: Arc<dyn Fn() + Send + Sync>,
    },
}

impl Callback {
    fn invoke(&self, args: &[EventValue]) {
        match self {
            Callback::Direct(f) => f(args),
            Callback::Bound { sinks, func } => {
                for (sink, arg) in sinks.iter().zip(args) {
                    sink.store(arg);
                }
                func();
            }
        }
    }
}

struct Connections {
    next_id: u64,
    sync: Vec<(u64, Callback)>,
    asynchronous: Vec<(u64, Callback, Arc<EventProcessor>)>,
}

struct EventEntry {
    name: String,
    signature: Vec<ValueKind>,
    connections: RwLock<Connections>,
}

impl EventEntry {
    fn check_args(&self, kinds: impl ExactSizeIterator<Item = ValueKind>) -> CoreResult<()> {
        if kinds.len() != self.signature.len() {
            return Err(CoreError::WrongArgumentCount {
                expected: self.signature.len(),
                got: kinds.len(),
            });
        }
        for (index, (got, expected)) in kinds.zip(self.signature.iter()).enumerate() {
            if got != *expected {
                return Err(CoreError::WrongArgumentType {
                    index,
                    expected: expected.name(),
                    got: got.name(),
                });
            }
        }
        Ok(())
    }

    fn dispatch(&self, args: &[EventValue]) {
        let connections = self.connections.read();
        for (_, callback) in &connections.sync {
            callback.invoke(args);
        }
        for (_, callback, processor) in &connections.asynchronous {
            processor.enqueue(PendingInvocation {
                event: self.name.clone(),
                callback: callback.clone(),
                args: args.iter().cloned().collect(),
            });
        }
    }
}

/// Identifies one connection for later disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    event: String,
    id: u64,
}

/// A queued asynchronous handler invocation.
struct PendingInvocation {
    event: String,
    callback: Callback,
    args: EventArgs,
}

/// Drains asynchronous handler invocations on its own schedule.
///
/// The queue is the lock-free single-producer ring: emission for a given
/// processor must stay on one thread (the kernel thread that owns the
/// service), and one thread drains.
pub struct EventProcessor {
    name: String,
    queue: BufferLockFree<PendingInvocation>,
    dropped: AtomicU64,
}

impl EventProcessor {
    pub fn new(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            queue: BufferLockFree::new(capacity),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, pending: PendingInvocation) {
        let event = pending.event.clone();
        if !self.queue.push(pending) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(processor = %self.name, %event, "event queue full, async handler dropped");
        }
    }

    /// Run every queued invocation; returns how many ran.
    ///
    /// Invocations enqueued while this runs are left for the next call.
    pub fn process_pending(&self) -> usize {
        let mut pending = Vec::new();
        self.queue.pop_all(&mut pending);
        for invocation in &pending {
            invocation.callback.invoke(&invocation.args);
        }
        pending.len()
    }

    /// Invocations dropped on a full queue since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// A runner stepping this processor, for driving it from a periodic
    /// task.
    pub fn runner(self: &Arc<Self>) -> Box<dyn Runnable> {
        struct ProcessorRunner(Arc<EventProcessor>);
        impl Runnable for ProcessorRunner {
            fn step(&mut self) {
                self.0.process_pending();
            }
        }
        Box::new(ProcessorRunner(self.clone()))
    }
}

/// Registry of named events with typed signatures.
pub struct EventService {
    events: RwLock<FxHashMap<String, Arc<EventEntry>>>,
}

impl Default for EventService {
    fn default() -> Self {
        Self::new()
    }
}

impl EventService {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register an event under `name` with the given argument signature.
    pub fn add_event(&self, name: &str, signature: Vec<ValueKind>) -> CoreResult<()> {
        let mut events = self.events.write();
        if events.contains_key(name) {
            return Err(CoreError::Duplicate(name.to_string()));
        }
        events.insert(
            name.to_string(),
            Arc::new(EventEntry {
                name: name.to_string(),
                signature,
                connections: RwLock::new(Connections {
                    next_id: 0,
                    sync: Vec::new(),
                    asynchronous: Vec::new(),
                }),
            }),
        );
        Ok(())
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.events.read().contains_key(name)
    }

    /// Number of arguments of `name`, if registered.
    pub fn arity(&self, name: &str) -> Option<usize> {
        self.events.read().get(name).map(|e| e.signature.len())
    }

    pub fn remove_event(&self, name: &str) -> bool {
        self.events.write().remove(name).is_some()
    }

    fn entry(&self, name: &str) -> CoreResult<Arc<EventEntry>> {
        self.events
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    /// Connect a synchronous handler receiving the argument vector.
    pub fn connect_sync(
        &self,
        name: &str,
        handler: impl Fn(&[EventValue]) + Send + Sync + 'static,
    ) -> CoreResult<ConnectionHandle> {
        let entry = self.entry(name)?;
        Ok(self.register(&entry, Callback::Direct(Arc::new(handler)), None))
    }

    /// Connect a synchronous handler with argument sinks.
    ///
    /// Every binding must be writable storage of the matching kind;
    /// literals are rejected with `NonLvalueArgument`.
    pub fn connect_sync_bound(
        &self,
        name: &str,
        bindings: Vec<ArgBinding>,
        func: impl Fn() + Send + Sync + 'static,
    ) -> CoreResult<ConnectionHandle> {
        let entry = self.entry(name)?;
        let sinks = check_sinks(&entry, bindings)?;
        Ok(self.register(
            &entry,
            Callback::Bound {
                sinks,
                func: Arc::new(func),
            },
            None,
        ))
    }

    /// Connect an asynchronous handler run later by `processor`.
    pub fn connect_async(
        &self,
        name: &str,
        handler: impl Fn(&[EventValue]) + Send + Sync + 'static,
        processor: &Arc<EventProcessor>,
    ) -> CoreResult<ConnectionHandle> {
        let entry = self.entry(name)?;
        Ok(self.register(
            &entry,
            Callback::Direct(Arc::new(handler)),
            Some(processor.clone()),
        ))
    }

    /// Connect an asynchronous handler with argument sinks.
    pub fn connect_async_bound(
        &self,
        name: &str,
        bindings: Vec<ArgBinding>,
        func: impl Fn() + Send + Sync + 'static,
        processor: &Arc<EventProcessor>,
    ) -> CoreResult<ConnectionHandle> {
        let entry = self.entry(name)?;
        let sinks = check_sinks(&entry, bindings)?;
        Ok(self.register(
            &entry,
            Callback::Bound {
                sinks,
                func: Arc::new(func),
            },
            Some(processor.clone()),
        ))
    }

    fn register(
        &self,
        entry: &Arc<EventEntry>,
        callback: Callback,
        processor: Option<Arc<EventProcessor>>,
    ) -> ConnectionHandle {
        let mut connections = entry.connections.write();
        let id = connections.next_id;
        connections.next_id += 1;
        match processor {
            Some(processor) => connections.asynchronous.push((id, callback, processor)),
            None => connections.sync.push((id, callback)),
        }
        ConnectionHandle {
            event: entry.name.clone(),
            id,
        }
    }

    /// Remove one connection. False when it no longer exists.
    pub fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        let entry = match self.entry(&handle.event) {
            Ok(entry) => entry,
            Err(_) => return false,
        };
        let mut connections = entry.connections.write();
        let sync_before = connections.sync.len();
        let async_before = connections.asynchronous.len();
        connections.sync.retain(|(id, _)| *id != handle.id);
        connections.asynchronous.retain(|(id, ..)| *id != handle.id);
        connections.sync.len() != sync_before || connections.asynchronous.len() != async_before
    }

    /// Emit `name` with `args`, checking the signature.
    ///
    /// Sync handlers run before this returns, in registration order;
    /// async handlers are enqueued to their processors.
    pub fn emit(&self, name: &str, args: &[EventValue]) -> CoreResult<()> {
        let entry = self.entry(name)?;
        entry.check_args(args.iter().map(|a| a.kind()))?;
        entry.dispatch(args);
        Ok(())
    }

    /// Build a reusable emit handle with pre-checked argument bindings.
    pub fn setup_emit(&self, name: &str) -> CoreResult<EmitBuilder> {
        let entry = self.entry(name)?;
        Ok(EmitBuilder {
            entry,
            bindings: Vec::new(),
        })
    }
}

fn check_sinks(
    entry: &EventEntry,
    bindings: Vec<ArgBinding>,
) -> CoreResult<Arc<[Arc<dyn AnySlot>]>> {
    entry.check_args(bindings.iter().map(|b| b.kind()))?;
    let mut sinks = Vec::with_capacity(bindings.len());
    for (index, binding) in bindings.into_iter().enumerate() {
        match binding {
            ArgBinding::Slot(slot) => sinks.push(slot),
            ArgBinding::Literal(_) => return Err(CoreError::NonLvalueArgument(index)),
        }
    }
    Ok(sinks.into())
}

/// Collects argument bindings for an emit handle.
pub struct EmitBuilder {
    entry: Arc<EventEntry>,
    bindings: Vec<ArgBinding>,
}

impl EmitBuilder {
    /// Bind the next argument to a fixed value.
    pub fn arg(mut self, value: impl Into<EventValue>) -> Self {
        self.bindings.push(ArgBinding::Literal(value.into()));
        self
    }

    /// Bind the next argument to a slot read at emit time.
    pub fn arg_slot<T: SlotValue>(mut self, slot: &EventSlot<T>) -> Self {
        self.bindings.push(ArgBinding::Slot(slot.as_any()));
        self
    }

    /// Validate the bindings against the signature.
    pub fn finish(self) -> CoreResult<EmitHandle> {
        self.entry
            .check_args(self.bindings.iter().map(|b| b.kind()))?;
        Ok(EmitHandle {
            entry: self.entry,
            bindings: self.bindings,
        })
    }
}

/// A pre-validated, reusable emitter for one event.
pub struct EmitHandle {
    entry: Arc<EventEntry>,
    bindings: Vec<ArgBinding>,
}

impl EmitHandle {
    /// Read the bindings and deliver one emission.
    pub fn emit(&self) {
        let args: EventArgs = self
            .bindings
            .iter()
            .map(|binding| match binding {
                ArgBinding::Literal(v) => v.clone(),
                ArgBinding::Slot(s) => s.load(),
            })
            .collect();
        self.entry.dispatch(&args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_add_and_duplicate() {
        let service = EventService::new();
        service
            .add_event("overrun", vec![ValueKind::UInt])
            .unwrap();
        assert!(service.has_event("overrun"));
        assert_eq!(service.arity("overrun"), Some(1));
        assert!(matches!(
            service.add_event("overrun", vec![]),
            Err(CoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_sync_registration_order() {
        let service = EventService::new();
        service.add_event("tick", vec![ValueKind::Int]).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            service
                .connect_sync("tick", move |args| {
                    let v = match args[0] {
                        EventValue::Int(v) => v,
                        _ => unreachable!(),
                    };
                    seen.lock().push(format!("{}{}", tag, v));
                })
                .unwrap();
        }

        service.emit("tick", &[EventValue::Int(7)]).unwrap();
        assert_eq!(*seen.lock(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn test_bound_connection_writes_sinks() {
        let service = EventService::new();
        service
            .add_event("measured", vec![ValueKind::Double, ValueKind::UInt])
            .unwrap();

        let position = EventSlot::new(0.0f64);
        let axis = EventSlot::new(0u32);
        let fired = Arc::new(AtomicU64::new(0));
        let fired_in = fired.clone();
        service
            .connect_sync_bound(
                "measured",
                vec![ArgBinding::slot(&position), ArgBinding::slot(&axis)],
                move || {
                    fired_in.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        service
            .emit(
                "measured",
                &[EventValue::Double(1.25), EventValue::UInt(2)],
            )
            .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(position.get(), 1.25);
        assert_eq!(axis.get(), 2);
    }

    #[test]
    fn test_setup_errors() {
        let service = EventService::new();
        service
            .add_event("fault", vec![ValueKind::Str, ValueKind::Int])
            .unwrap();

        assert!(matches!(
            service.connect_sync("absent", |_| {}),
            Err(CoreError::NotFound(_))
        ));

        assert!(matches!(
            service.connect_sync_bound("fault", vec![], || {}),
            Err(CoreError::WrongArgumentCount {
                expected: 2,
                got: 0
            })
        ));

        let text = EventSlot::new(String::new());
        let wrong = EventSlot::new(0.0f64);
        assert!(matches!(
            service.connect_sync_bound(
                "fault",
                vec![ArgBinding::slot(&text), ArgBinding::slot(&wrong)],
                || {},
            ),
            Err(CoreError::WrongArgumentType { index: 1, .. })
        ));

        let code = EventSlot::new(0i32);
        assert!(matches!(
            service.connect_sync_bound(
                "fault",
                vec![ArgBinding::literal("boom"), ArgBinding::slot(&code)],
                || {},
            ),
            Err(CoreError::NonLvalueArgument(0))
        ));
    }

    #[test]
    fn test_emit_signature_checked() {
        let service = EventService::new();
        service.add_event("tick", vec![ValueKind::Int]).unwrap();
        assert!(matches!(
            service.emit("tick", &[]),
            Err(CoreError::WrongArgumentCount { .. })
        ));
        assert!(matches!(
            service.emit("tick", &[EventValue::Double(0.0)]),
            Err(CoreError::WrongArgumentType { index: 0, .. })
        ));
    }

    #[test]
    fn test_async_dispatch_via_processor() {
        let service = EventService::new();
        service.add_event("late", vec![ValueKind::Int]).unwrap();
        let processor = EventProcessor::new("completion", 16);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        service
            .connect_async(
                "late",
                move |args| {
                    if let EventValue::Int(v) = args[0] {
                        seen_in.lock().push(v);
                    }
                },
                &processor,
            )
            .unwrap();

        service.emit("late", &[EventValue::Int(1)]).unwrap();
        service.emit("late", &[EventValue::Int(2)]).unwrap();
        assert!(seen.lock().is_empty(), "async handlers must not run inline");
        assert_eq!(processor.pending(), 2);

        assert_eq!(processor.process_pending(), 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_emit_handle_with_slot_source() {
        let service = EventService::new();
        service
            .add_event("setpoint", vec![ValueKind::Double])
            .unwrap();

        let latest = Arc::new(Mutex::new(0.0));
        let latest_in = latest.clone();
        service
            .connect_sync("setpoint", move |args| {
                if let EventValue::Double(v) = args[0] {
                    *latest_in.lock() = v;
                }
            })
            .unwrap();

        let source = EventSlot::new(0.0f64);
        let handle = service
            .setup_emit("setpoint")
            .unwrap()
            .arg_slot(&source)
            .finish()
            .unwrap();

        source.set(3.5);
        handle.emit();
        assert_eq!(*latest.lock(), 3.5);
    }

    #[test]
    fn test_emit_handle_type_check() {
        let service = EventService::new();
        service
            .add_event("setpoint", vec![ValueKind::Double])
            .unwrap();
        assert!(matches!(
            service.setup_emit("setpoint").unwrap().arg(1i32).finish(),
            Err(CoreError::WrongArgumentType { index: 0, .. })
        ));
        assert!(matches!(
            service.setup_emit("missing"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_disconnect() {
        let service = EventService::new();
        service.add_event("tick", vec![]).unwrap();

        let count = Arc::new(AtomicU64::new(0));
        let count_in = count.clone();
        let handle = service
            .connect_sync("tick", move |_| {
                count_in.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        service.emit("tick", &[]).unwrap();
        assert!(service.disconnect(&handle));
        assert!(!service.disconnect(&handle));
        service.emit("tick", &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_processor_driven_by_periodic_task() {
        use crate::task::{PeriodicTask, PriorityClass};

        let service = EventService::new();
        service.add_event("sample", vec![ValueKind::UInt]).unwrap();
        let processor = EventProcessor::new("background", 64);

        let seen = Arc::new(AtomicU64::new(0));
        let seen_in = seen.clone();
        service
            .connect_async(
                "sample",
                move |args| {
                    if let EventValue::UInt(v) = args[0] {
                        seen_in.fetch_add(v as u64, Ordering::SeqCst);
                    }
                },
                &processor,
            )
            .unwrap();

        let task = PeriodicTask::new(0.001, PriorityClass::NonRealTime, processor.runner());
        assert!(task.start());

        for _ in 0..10 {
            service.emit("sample", &[EventValue::UInt(1)]).unwrap();
        }
        // The processor's own task drains the queue.
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(200);
        while seen.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(task.stop());
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_queue_overflow_drops() {
        let service = EventService::new();
        service.add_event("burst", vec![]).unwrap();
        let processor = EventProcessor::new("tiny", 2);
        service.connect_async("burst", |_| {}, &processor).unwrap();

        for _ in 0..5 {
            service.emit("burst", &[]).unwrap();
        }
        assert_eq!(processor.pending(), 2);
        assert_eq!(processor.dropped(), 3);
        assert_eq!(processor.process_pending(), 2);
    }
}
