//! Label routing: per-subscriber inboxes and the dense label table.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::message::{Label, Message, LABEL_SPACE};
use super::queue::{BoundedQueue, QUEUE_CAPACITY};

/// Subscriber slots per label. The bound is the contract; the receiver
/// array never grows.
pub const MAX_RECEIVERS: usize = 3;

/// Per-subscriber delivery endpoint: a bounded descriptor queue plus a
/// registration count.
///
/// Identity is the heap address of this allocation: the registry stores
/// `Arc<Inbox>` handles and compares them with `Arc::ptr_eq`. Once
/// registered, the inbox stays pinned behind its `Arc` until every label
/// is unregistered; the registration count backs the debug check for
/// endpoints dropped while still registered.
pub struct Inbox {
    queue: BoundedQueue<Message>,
    registrations: AtomicU32,
}

impl Inbox {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: BoundedQueue::new(queue_capacity),
            registrations: AtomicU32::new(0),
        })
    }

    #[inline(always)]
    pub fn queue(&self) -> &BoundedQueue<Message> {
        &self.queue
    }

    /// Labels this inbox currently occupies slots for (counting
    /// duplicates once per slot).
    #[inline(always)]
    pub fn registration_count(&self) -> u32 {
        self.registrations.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn note_registered(&self, slots: u32) {
        self.registrations.fetch_add(slots, Ordering::Relaxed);
    }

    #[inline(always)]
    fn note_unregistered(&self, slots: u32) {
        self.registrations.fetch_sub(slots, Ordering::Relaxed);
    }
}

/// The fixed slot set for one label. Empty slots are `None`; insertion
/// takes the first empty slot, removal nulls matching slots in place.
/// Slot order is not stable across registration churn.
#[derive(Clone, Default)]
pub struct Receivers {
    slots: [Option<Arc<Inbox>>; MAX_RECEIVERS],
}

impl Receivers {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_RECEIVERS],
        }
    }

    /// Insert into the first empty slot. False when all slots are taken.
    /// The same inbox may occupy several slots; it is then delivered to
    /// once per slot.
    pub fn add(&mut self, inbox: &Arc<Inbox>) -> bool {
        for slot in &mut self.slots {
            if slot.is_none() {
                *slot = Some(inbox.clone());
                return true;
            }
        }
        false
    }

    /// Null every slot holding `inbox`. Returns true when the slot set is
    /// now fully empty (hash-map realizations use this to evict the key).
    pub fn remove(&mut self, inbox: &Arc<Inbox>) -> bool {
        let mut empty = true;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, inbox)) {
                *slot = None;
            }
            empty &= slot.is_none();
        }
        empty
    }

    /// Slots currently holding `inbox`.
    pub fn count_of(&self, inbox: &Arc<Inbox>) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| Arc::ptr_eq(s, inbox))
            .count() as u32
    }

    /// Occupied slots in physical array order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Inbox>> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, index: usize) -> Option<&Arc<Inbox>> {
        self.slots[index].as_ref()
    }
}

/// Dense label → `Receivers` table behind a single mutex. Memory is one
/// slot set per possible label, allocated once; lookup on the publish
/// path is an index.
pub struct Registry {
    table: Mutex<Box<[Receivers]>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(vec![Receivers::new(); LABEL_SPACE].into_boxed_slice()),
        }
    }

    /// Register `inbox` for `label`. False when all `MAX_RECEIVERS` slots
    /// are occupied. Updates the inbox registration count on success.
    pub fn register(&self, label: Label, inbox: &Arc<Inbox>) -> bool {
        let mut table = self.lock();
        let added = table[label as usize].add(inbox);
        if added {
            inbox.note_registered(1);
        }
        added
    }

    /// Unregister `inbox` from `label`, nulling every matching slot.
    /// Returns true when the label's slot set is now fully empty.
    pub fn unregister(&self, label: Label, inbox: &Arc<Inbox>) -> bool {
        let mut table = self.lock();
        let receivers = &mut table[label as usize];
        let removed = receivers.count_of(inbox);
        let empty = receivers.remove(inbox);
        if removed > 0 {
            inbox.note_unregistered(removed);
        }
        empty
    }

    /// Whether `inbox` occupied any slot at `label` (used by the endpoint
    /// API to report unregistration of a label that was never registered).
    pub fn is_registered(&self, label: Label, inbox: &Arc<Inbox>) -> bool {
        self.lock()[label as usize].count_of(inbox) > 0
    }

    /// Snapshot of the slot set for `label`. Cheap (three handle clones);
    /// the publish path uses `lock` instead and iterates in place.
    pub fn receivers(&self, label: Label) -> Receivers {
        self.lock()[label as usize].clone()
    }

    /// The registry mutex. Publishers hold this guard for the whole
    /// fan-out so that per-(publisher, label, subscriber) delivery order
    /// matches publish order. Lock order is registry first, then inbox
    /// queue, never the reverse.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<[Receivers]>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
