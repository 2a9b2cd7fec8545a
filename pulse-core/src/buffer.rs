// pulse-core: bounded FIFO primitives
// One locked implementation for non-real-time writers, one lock-free
// single-producer/single-consumer ring for the hard real-time path.
// Unsafe slot access is confined to this module.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

/// Bounded FIFO of `T`.
///
/// Full and empty conditions are reported through the return values; they
/// are never errors.
pub trait Buffer<T: Send>: Send + Sync {
    /// Append one item. Returns false (and leaves the buffer unchanged)
    /// when the buffer is full.
    fn push(&self, item: T) -> bool;

    /// Append items from `items` until the buffer is full.
    /// Returns how many were appended.
    fn push_slice(&self, items: &[T]) -> usize
    where
        T: Clone;

    /// Remove the oldest item into `out`. Returns false when empty.
    fn pop(&self, out: &mut T) -> bool;

    /// Drain every available item into `out`, returning how many.
    fn pop_all(&self, out: &mut Vec<T>) -> usize;

    /// Number of items currently buffered.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items this buffer holds.
    fn capacity(&self) -> usize;

    /// Discard all buffered items.
    fn clear(&self);
}

/// Counting semaphore built on a mutex and condition variable.
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and wake one waiter.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_one();
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }

    /// Decrement the count if positive without blocking.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub fn value(&self) -> usize {
        *self.count.lock()
    }
}

/// Blocking behaviour composed with a buffer by the caller.
///
/// The buffer itself does not know whether callers block; a policy is
/// signalled after successful pushes and waited on before pops.
pub trait BufferPolicy: Send + Sync {
    /// Account for `n` items made available.
    fn push(&self, n: usize);
    /// Wait for (or account for) `n` items being consumed.
    fn pop(&self, n: usize);
    /// Force the internal count to `n`.
    fn reset(&self, n: usize);
}

/// Never blocks; every operation is a no-op.
pub struct NonBlockingPolicy;

impl BufferPolicy for NonBlockingPolicy {
    fn push(&self, _n: usize) {}
    fn pop(&self, _n: usize) {}
    fn reset(&self, _n: usize) {}
}

/// Blocks consumers on an empty buffer via a counting semaphore.
pub struct BlockingPolicy {
    count: Semaphore,
}

impl BlockingPolicy {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Semaphore::new(initial),
        }
    }
}

impl BufferPolicy for BlockingPolicy {
    fn push(&self, n: usize) {
        for _ in 0..n {
            self.count.signal();
        }
    }

    fn pop(&self, n: usize) {
        for _ in 0..n {
            self.count.wait();
        }
    }

    fn reset(&self, n: usize) {
        while self.count.value() < n {
            self.count.signal();
        }
        while self.count.value() > n {
            self.count.wait();
        }
    }
}

/// Mutex-guarded bounded FIFO.
///
/// Every operation is serialized under one lock; use this when writers may
/// be non-real-time.
pub struct BufferLocked<T> {
    buf: Mutex<VecDeque<T>>,
    cap: usize,
}

impl<T: Send> BufferLocked<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            cap: capacity,
        }
    }
}

impl<T: Send> Buffer<T> for BufferLocked<T> {
    fn push(&self, item: T) -> bool {
        let mut buf = self.buf.lock();
        if buf.len() == self.cap {
            return false;
        }
        buf.push_back(item);
        true
    }

    fn push_slice(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        let mut buf = self.buf.lock();
        let mut appended = 0;
        for item in items {
            if buf.len() == self.cap {
                break;
            }
            buf.push_back(item.clone());
            appended += 1;
        }
        appended
    }

    fn pop(&self, out: &mut T) -> bool {
        match self.buf.lock().pop_front() {
            Some(item) => {
                *out = item;
                true
            }
            None => false,
        }
    }

    fn pop_all(&self, out: &mut Vec<T>) -> usize {
        let mut buf = self.buf.lock();
        let drained = buf.len();
        out.extend(buf.drain(..));
        drained
    }

    fn len(&self) -> usize {
        self.buf.lock().len()
    }

    fn capacity(&self) -> usize {
        self.cap
    }

    fn clear(&self) {
        self.buf.lock().clear();
    }
}

/// Lock-free single-producer/single-consumer bounded ring.
///
/// The producer stores the payload with release ordering before advancing
/// `tail`; the consumer reads `tail` with acquire before touching the slot.
/// At most one thread may push concurrently and at most one thread may pop
/// concurrently; `clear` belongs to the consumer side.
pub struct BufferLockFree<T> {
    /// Consumer index, owned by the popping thread.
    head: CachePadded<AtomicUsize>,
    /// Producer index, owned by the pushing thread.
    tail: CachePadded<AtomicUsize>,
    /// capacity + 1 slots; the ring is full when advancing tail would
    /// collide with head.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: the head/tail protocol hands each slot to exactly one side at a
// time; T itself only needs to be sendable across the producer/consumer
// threads.
unsafe impl<T: Send> Send for BufferLockFree<T> {}
unsafe impl<T: Send> Sync for BufferLockFree<T> {}

impl<T: Send> BufferLockFree<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        let slots = (0..capacity + 1)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
        }
    }

    #[inline(always)]
    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slots.len() {
            0
        } else {
            next
        }
    }
}

impl<T: Send> Buffer<T> for BufferLockFree<T> {
    fn push(&self, item: T) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = self.advance(tail);
        if next == self.head.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: slot `tail` is outside the readable region [head, tail),
        // so the consumer does not touch it until the release store below.
        unsafe {
            (*self.slots[tail].get()).write(item);
        }
        self.tail.store(next, Ordering::Release);
        true
    }

    fn push_slice(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        let mut pushed = 0;
        for item in items {
            if !self.push(item.clone()) {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    fn pop(&self, out: &mut T) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: the acquire load above ordered this read after the
        // producer's write of slot `head`; the slot is initialized and the
        // producer will not reuse it before head advances.
        *out = unsafe { (*self.slots[head].get()).assume_init_read() };
        self.head.store(self.advance(head), Ordering::Release);
        true
    }

    fn pop_all(&self, out: &mut Vec<T>) -> usize {
        let mut popped = 0;
        loop {
            let head = self.head.load(Ordering::Relaxed);
            if head == self.tail.load(Ordering::Acquire) {
                return popped;
            }
            // SAFETY: as in pop().
            out.push(unsafe { (*self.slots[head].get()).assume_init_read() });
            self.head.store(self.advance(head), Ordering::Release);
            popped += 1;
        }
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail + self.slots.len() - head) % self.slots.len()
    }

    fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    fn clear(&self) {
        let mut sink = Vec::new();
        self.pop_all(&mut sink);
    }
}

impl<T> Drop for BufferLockFree<T> {
    fn drop(&mut self) {
        let mut head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        while head != tail {
            // SAFETY: slots in [head, tail) hold initialized values that
            // nobody else can observe during drop.
            unsafe {
                (*self.slots[head].get()).assume_init_drop();
            }
            head = {
                let next = head + 1;
                if next == self.slots.len() { 0 } else { next }
            };
        }
    }
}

/// Number of value slots in a [`DataCell`].
///
/// Must exceed the number of concurrently reading threads by at least two
/// for publication latency to stay bounded.
const DATA_CELL_SLOTS: usize = 4;

struct CellSlot<T> {
    value: UnsafeCell<T>,
    /// Readers currently cloning this slot.
    readers: AtomicUsize,
}

/// The degenerate buffer of capacity one: a last-writer-wins cell with a
/// lock-free writer.
///
/// The writer rotates through spare slots, never touching the published one
/// or any slot a reader has announced; readers announce, validate, clone and
/// retreat. Publication latency is bounded, not wait-free, for values wider
/// than a pointer.
pub struct DataCell<T> {
    slots: Box<[CellSlot<T>]>,
    /// Index of the last published slot.
    active: CachePadded<AtomicUsize>,
    /// Serializes writers only; readers never take it.
    write: Mutex<()>,
}

// SAFETY: readers clone through &T from multiple threads and the slot
// rotation protocol keeps writes exclusive, so T must be Send + Sync.
unsafe impl<T: Send + Sync> Send for DataCell<T> {}
unsafe impl<T: Send + Sync> Sync for DataCell<T> {}

impl<T: Clone + Send + Sync> DataCell<T> {
    pub fn new(initial: T) -> Self {
        let slots = (0..DATA_CELL_SLOTS)
            .map(|_| CellSlot {
                value: UnsafeCell::new(initial.clone()),
                readers: AtomicUsize::new(0),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            active: CachePadded::new(AtomicUsize::new(0)),
            write: Mutex::new(()),
        }
    }

    /// Clone the last published value.
    pub fn get(&self) -> T {
        loop {
            let idx = self.active.load(Ordering::SeqCst);
            // Announce before validating; the writer's slot scan and this
            // announcement are ordered by the SeqCst total order, so either
            // the writer sees the announcement or we see its publication
            // and retry.
            self.slots[idx].readers.fetch_add(1, Ordering::SeqCst);
            if self.active.load(Ordering::SeqCst) == idx {
                // SAFETY: the slot was announced before validation, so no
                // writer selects it until the count drops back to zero.
                let value = unsafe { (*self.slots[idx].value.get()).clone() };
                self.slots[idx].readers.fetch_sub(1, Ordering::Release);
                return value;
            }
            self.slots[idx].readers.fetch_sub(1, Ordering::Release);
        }
    }

    /// Publish a new value.
    pub fn set(&self, value: T) {
        let _writers = self.write.lock();
        let active = self.active.load(Ordering::Relaxed);
        let mut idx = (active + 1) % self.slots.len();
        loop {
            if idx != active && self.slots[idx].readers.load(Ordering::SeqCst) == 0 {
                break;
            }
            idx = (idx + 1) % self.slots.len();
            if idx == (active + 1) % self.slots.len() {
                std::hint::spin_loop();
            }
        }
        // SAFETY: slot `idx` is neither published nor announced by any
        // reader, so this write is exclusive.
        unsafe {
            *self.slots[idx].value.get() = value;
        }
        self.active.store(idx, Ordering::SeqCst);
    }
}
