// pulse-core: typed data objects and role-tagged bags
// Ports are bound once, at component load/startup; the per-period path does
// no name lookup and no type check.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::buffer::DataCell;
use crate::error::{CoreError, CoreResult};

/// Marker for values that can live in a data object.
pub trait PortData: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> PortData for T {}

/// The four roles a bag can play inside a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BagRole {
    Input,
    Model,
    SetPoint,
    Output,
}

impl fmt::Display for BagRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BagRole::Input => "Input",
            BagRole::Model => "Model",
            BagRole::SetPoint => "SetPoint",
            BagRole::Output => "Output",
        };
        f.write_str(name)
    }
}

enum Cell<T> {
    /// All access serialized; for non-real-time writers.
    Locked(RwLock<T>),
    /// Lock-free single-writer publication.
    LockFree(DataCell<T>),
}

/// A named typed port cell with atomic get/set.
///
/// `get` never observes a half-written `set`; the lock-free construction
/// keeps the writer out of any lock.
pub struct DataObject<T: PortData> {
    name: String,
    cell: Cell<T>,
}

impl<T: PortData> DataObject<T> {
    pub fn locked(name: impl Into<String>, initial: T) -> Self {
        Self {
            name: name.into(),
            cell: Cell::Locked(RwLock::new(initial)),
        }
    }

    pub fn lock_free(name: impl Into<String>, initial: T) -> Self {
        Self {
            name: name.into(),
            cell: Cell::LockFree(DataCell::new(initial)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy the current value into `out`.
    #[inline]
    pub fn get(&self, out: &mut T) {
        match &self.cell {
            Cell::Locked(lock) => out.clone_from(&lock.read()),
            Cell::LockFree(cell) => *out = cell.get(),
        }
    }

    /// Clone the current value.
    #[inline]
    pub fn get_clone(&self) -> T {
        match &self.cell {
            Cell::Locked(lock) => lock.read().clone(),
            Cell::LockFree(cell) => cell.get(),
        }
    }

    /// Publish a new value, replacing the previous one.
    #[inline]
    pub fn set(&self, value: T) {
        match &self.cell {
            Cell::Locked(lock) => *lock.write() = value,
            Cell::LockFree(cell) => cell.set(value),
        }
    }
}

/// Type-erased view of a [`DataObject`] stored in a bag.
pub trait AnyDataObject: Send + Sync {
    fn name(&self) -> &str;
    fn value_type(&self) -> TypeId;
    fn value_type_name(&self) -> &'static str;
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: PortData> AnyDataObject for DataObject<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A bind-time-checked handle to a data object.
///
/// Cheap to clone; components keep these across periods instead of going
/// through the bag again.
pub struct DataHandle<T: PortData> {
    obj: Arc<DataObject<T>>,
}

impl<T: PortData> Clone for DataHandle<T> {
    fn clone(&self) -> Self {
        Self {
            obj: self.obj.clone(),
        }
    }
}

impl<T: PortData> DataHandle<T> {
    pub fn name(&self) -> &str {
        self.obj.name()
    }

    #[inline]
    pub fn get(&self, out: &mut T) {
        self.obj.get(out);
    }

    #[inline]
    pub fn get_clone(&self) -> T {
        self.obj.get_clone()
    }

    #[inline]
    pub fn set(&self, value: T) {
        self.obj.set(value);
    }
}

/// A named collection of typed data objects with one [`BagRole`].
///
/// Bags are populated during kernel configuration, before any component is
/// started; names are unique within a bag.
pub struct DataBag {
    role: BagRole,
    entries: RwLock<FxHashMap<String, Arc<dyn AnyDataObject>>>,
}

impl DataBag {
    pub fn new(role: BagRole) -> Self {
        Self {
            role,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn role(&self) -> BagRole {
        self.role
    }

    /// Register a lock-free data object under `name`.
    pub fn register<T: PortData>(&self, name: &str, initial: T) -> CoreResult<DataHandle<T>> {
        self.insert(name, Arc::new(DataObject::lock_free(name, initial)))
    }

    /// Register a mutex-guarded data object under `name`, for ports whose
    /// writer is not real-time.
    pub fn register_locked<T: PortData>(&self, name: &str, initial: T) -> CoreResult<DataHandle<T>> {
        self.insert(name, Arc::new(DataObject::locked(name, initial)))
    }

    fn insert<T: PortData>(
        &self,
        name: &str,
        obj: Arc<DataObject<T>>,
    ) -> CoreResult<DataHandle<T>> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(CoreError::Duplicate(format!("{}.{}", self.role, name)));
        }
        entries.insert(name.to_string(), obj.clone());
        Ok(DataHandle { obj })
    }

    /// Look up `name` as a port of type `T`.
    ///
    /// The type check happens here, once, so per-step `get`/`set` through
    /// the returned handle is statically typed.
    pub fn get<T: PortData>(&self, name: &str) -> CoreResult<DataHandle<T>> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| CoreError::NotFound(format!("{}.{}", self.role, name)))?;
        if entry.value_type() != TypeId::of::<T>() {
            return Err(CoreError::TypeMismatch {
                name: format!("{}.{}", self.role, name),
                expected: std::any::type_name::<T>(),
                found: entry.value_type_name(),
            });
        }
        let obj = entry
            .clone()
            .as_any_arc()
            .downcast::<DataObject<T>>()
            .expect("type id matched but downcast failed");
        Ok(DataHandle { obj })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_register_and_get() {
        let bag = DataBag::new(BagRole::SetPoint);
        bag.register("velocity", 0.0f64).unwrap();

        let handle = bag.get::<f64>("velocity").unwrap();
        handle.set(1.5);
        assert_eq!(handle.get_clone(), 1.5);

        let mut out = 0.0;
        handle.get(&mut out);
        assert_eq!(out, 1.5);
    }

    #[test]
    fn test_duplicate_rejected() {
        let bag = DataBag::new(BagRole::Input);
        bag.register("pos", 0.0f64).unwrap();
        assert!(matches!(
            bag.register("pos", 0.0f64),
            Err(CoreError::Duplicate(name)) if name == "Input.pos"
        ));
    }

    #[test]
    fn test_type_mismatch_at_bind() {
        let bag = DataBag::new(BagRole::Input);
        bag.register("pos", vec![0.0f64; 3]).unwrap();
        match bag.get::<f64>("pos") {
            Err(CoreError::TypeMismatch { name, .. }) => assert_eq!(name, "Input.pos"),
            other => panic!("expected TypeMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_not_found() {
        let bag = DataBag::new(BagRole::Output);
        assert!(matches!(
            bag.get::<f64>("missing"),
            Err(CoreError::NotFound(name)) if name == "Output.missing"
        ));
    }

    #[test]
    fn test_vector_port() {
        let bag = DataBag::new(BagRole::SetPoint);
        let w = bag.register("joints", vec![0.0f64; 3]).unwrap();
        let r = bag.get::<Vec<f64>>("joints").unwrap();

        w.set(vec![1.0, 2.0, 3.0]);
        assert_eq!(r.get_clone(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_locked_variant() {
        let bag = DataBag::new(BagRole::Model);
        let h = bag.register_locked("offset", 0.25f64).unwrap();
        assert_eq!(h.get_clone(), 0.25);
        h.set(0.5);
        assert_eq!(h.get_clone(), 0.5);
    }

    #[test]
    fn test_concurrent_get_set() {
        // One real-time writer, two readers cloning concurrently; readers
        // must only ever observe fully-written values.
        let bag = DataBag::new(BagRole::Output);
        let writer = bag.register("pair", (0u64, 0u64)).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let handle = bag.get::<(u64, u64)>("pair").unwrap();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let (a, b) = handle.get_clone();
                        assert_eq!(a, b, "torn read: {} != {}", a, b);
                    }
                })
            })
            .collect();

        for i in 0..100_000u64 {
            writer.set((i, i));
        }
        stop.store(true, Ordering::Relaxed);
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(writer.get_clone(), (99_999, 99_999));
    }
}
