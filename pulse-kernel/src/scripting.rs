// pulse-kernel: scripting extension
// Components expose commands (dispatched, completion polled at the
// pipeline cadence) and methods (synchronous calls) as named callables
// over the closed value set. All signature checks happen at setup time.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::debug;

use pulse_core::{CoreError, CoreResult, EventValue, ValueKind};

use crate::component::{Component, ComponentSet};
use crate::extension::KernelExtension;

type ExecuteFn = Arc<dyn Fn(&[EventValue]) -> bool + Send + Sync>;
type CompletedFn = Arc<dyn Fn() -> bool + Send + Sync>;
type CallFn = Arc<dyn Fn(&[EventValue]) -> EventValue + Send + Sync>;

struct CommandOp {
    signature: Vec<ValueKind>,
    execute: ExecuteFn,
    completed: CompletedFn,
}

struct MethodOp {
    signature: Vec<ValueKind>,
    call: CallFn,
}

fn check_signature(signature: &[ValueKind], args: &[EventValue]) -> CoreResult<()> {
    if args.len() != signature.len() {
        return Err(CoreError::WrongArgumentCount {
            expected: signature.len(),
            got: args.len(),
        });
    }
    for (index, (arg, expected)) in args.iter().zip(signature).enumerate() {
        if arg.kind() != *expected {
            return Err(CoreError::WrongArgumentType {
                index,
                expected: expected.name(),
                got: arg.kind().name(),
            });
        }
    }
    Ok(())
}

/// Named callables registered by the loaded components.
#[derive(Default)]
pub struct OperationRegistry {
    commands: FxHashMap<String, CommandOp>,
    methods: FxHashMap<String, MethodOp>,
}

impl OperationRegistry {
    fn add_command(
        &mut self,
        name: String,
        signature: Vec<ValueKind>,
        execute: ExecuteFn,
        completed: CompletedFn,
    ) -> CoreResult<()> {
        if self.commands.contains_key(&name) {
            return Err(CoreError::Duplicate(name));
        }
        self.commands.insert(
            name,
            CommandOp {
                signature,
                execute,
                completed,
            },
        );
        Ok(())
    }

    fn add_method(
        &mut self,
        name: String,
        signature: Vec<ValueKind>,
        call: CallFn,
    ) -> CoreResult<()> {
        if self.methods.contains_key(&name) {
            return Err(CoreError::Duplicate(name));
        }
        self.methods.insert(name, MethodOp { signature, call });
        Ok(())
    }

    fn remove_prefix(&mut self, prefix: &str) {
        let dotted = format!("{}.", prefix);
        self.commands.retain(|name, _| !name.starts_with(&dotted));
        self.methods.retain(|name, _| !name.starts_with(&dotted));
    }
}

/// Registration view handed to a component's scripting facet; every name
/// is qualified with the component name.
pub struct OperationScope<'a> {
    registry: &'a mut OperationRegistry,
    prefix: &'a str,
}

impl<'a> OperationScope<'a> {
    /// Register a command: `execute` dispatches it, `completed` is polled
    /// once per period until it reports true.
    pub fn add_command(
        &mut self,
        name: &str,
        signature: Vec<ValueKind>,
        execute: impl Fn(&[EventValue]) -> bool + Send + Sync + 'static,
        completed: impl Fn() -> bool + Send + Sync + 'static,
    ) -> CoreResult<()> {
        self.registry.add_command(
            format!("{}.{}", self.prefix, name),
            signature,
            Arc::new(execute),
            Arc::new(completed),
        )
    }

    /// Register a synchronous method returning a value.
    pub fn add_method(
        &mut self,
        name: &str,
        signature: Vec<ValueKind>,
        call: impl Fn(&[EventValue]) -> EventValue + Send + Sync + 'static,
    ) -> CoreResult<()> {
        self.registry
            .add_method(format!("{}.{}", self.prefix, name), signature, Arc::new(call))
    }
}

const STATUS_REJECTED: u8 = 0;
const STATUS_DISPATCHED: u8 = 1;
const STATUS_DONE: u8 = 2;

/// Observable state of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The command's execute refused the dispatch.
    Rejected,
    /// Dispatched; completion not yet observed.
    Dispatched,
    /// The completion condition reported true.
    Done,
}

/// Tracks one dispatched command.
#[derive(Clone)]
pub struct CommandTicket {
    status: Arc<AtomicU8>,
}

impl CommandTicket {
    pub fn status(&self) -> CommandStatus {
        match self.status.load(Ordering::Acquire) {
            STATUS_DISPATCHED => CommandStatus::Dispatched,
            STATUS_DONE => CommandStatus::Done,
            _ => CommandStatus::Rejected,
        }
    }

    pub fn accepted(&self) -> bool {
        self.status() != CommandStatus::Rejected
    }

    pub fn done(&self) -> bool {
        self.status() == CommandStatus::Done
    }
}

struct PendingCommand {
    completed: CompletedFn,
    status: Arc<AtomicU8>,
}

struct ScriptingCore {
    registry: RwLock<OperationRegistry>,
    pending: Mutex<Vec<PendingCommand>>,
}

/// Host-side access to the registered callables.
#[derive(Clone)]
pub struct ScriptingHandle {
    core: Arc<ScriptingCore>,
}

impl ScriptingHandle {
    /// Dispatch a command. The returned ticket turns `Done` once the
    /// command's completion condition is observed by the extension step.
    pub fn dispatch(&self, name: &str, args: &[EventValue]) -> CoreResult<CommandTicket> {
        let registry = self.core.registry.read();
        let command = registry
            .commands
            .get(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        check_signature(&command.signature, args)?;

        let accepted = (command.execute)(args);
        let status = Arc::new(AtomicU8::new(if accepted {
            STATUS_DISPATCHED
        } else {
            STATUS_REJECTED
        }));
        if accepted {
            self.core.pending.lock().push(PendingCommand {
                completed: command.completed.clone(),
                status: status.clone(),
            });
        }
        Ok(CommandTicket { status })
    }

    /// Call a method synchronously.
    pub fn call(&self, name: &str, args: &[EventValue]) -> CoreResult<EventValue> {
        let registry = self.core.registry.read();
        let method = registry
            .methods
            .get(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        check_signature(&method.signature, args)?;
        Ok((method.call)(args))
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.core.registry.read().commands.contains_key(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.core.registry.read().methods.contains_key(name)
    }
}

/// Kernel extension contributing the scripting facet.
#[derive(Default)]
pub struct ScriptingExtension {
    core: Arc<ScriptingCore>,
}

impl Default for ScriptingCore {
    fn default() -> Self {
        Self {
            registry: RwLock::new(OperationRegistry::default()),
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptingExtension {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloneable handle for dispatching commands and calling methods
    /// from outside the kernel.
    pub fn handle(&self) -> ScriptingHandle {
        ScriptingHandle {
            core: self.core.clone(),
        }
    }
}

impl KernelExtension for ScriptingExtension {
    fn name(&self) -> &str {
        "scripting"
    }

    fn step(&mut self, _components: &mut ComponentSet<'_>) {
        // Poll dispatched commands for completion.
        let mut pending = self.core.pending.lock();
        pending.retain(|command| {
            if (command.completed)() {
                command.status.store(STATUS_DONE, Ordering::Release);
                false
            } else {
                true
            }
        });
    }

    fn component_loaded(&mut self, component: &mut dyn Component) -> bool {
        let name = component.name().to_string();
        if let Some(facet) = component.scripting() {
            let mut registry = self.core.registry.write();
            let mut scope = OperationScope {
                registry: &mut registry,
                prefix: &name,
            };
            facet.register_operations(&mut scope);
            debug!(component = %name, "scripting operations registered");
        }
        true
    }

    fn component_unloaded(&mut self, component: &mut dyn Component) {
        self.core
            .registry
            .write()
            .remove_prefix(component.name());
    }
}
