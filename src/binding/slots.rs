// ============================================================================
// spark-observe - Observer Slots
// Versioned dependency slots with mark-and-sweep release
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::collections::observer::CollectionObserver;
use crate::core::types::{same_rc, PropertyObserver};

/// A dependency held by a binding.
#[derive(Clone)]
pub enum Observed {
    Property(Rc<dyn PropertyObserver>),
    Collection(Rc<CollectionObserver>),
}

impl Observed {
    fn same(&self, other: &Observed) -> bool {
        match (self, other) {
            (Observed::Property(a), Observed::Property(b)) => same_rc(a, b),
            (Observed::Collection(a), Observed::Collection(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

struct Slot {
    observed: Observed,
    version: u64,
}

/// The dependencies of one binding, each stamped with the evaluation version
/// that last touched it.
///
/// Callers subscribe when [`ObserverSlots::add`] reports a new entry and
/// unsubscribe whatever [`ObserverSlots::sweep`] or [`ObserverSlots::clear`]
/// hands back, so no subscriber callback runs while the slots are borrowed.
#[derive(Default)]
pub struct ObserverSlots {
    slots: RefCell<SmallVec<[Slot; 4]>>,
}

impl ObserverSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `observed` at `version`. Returns true if it was not held yet.
    pub fn add(&self, observed: Observed, version: u64) -> bool {
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.iter_mut().find(|s| s.observed.same(&observed)) {
            slot.version = version;
            return false;
        }
        slots.push(Slot { observed, version });
        true
    }

    /// Remove and return every entry not stamped with `version`.
    pub fn sweep(&self, version: u64) -> SmallVec<[Observed; 4]> {
        let mut slots = self.slots.borrow_mut();
        let mut stale = SmallVec::new();
        slots.retain(|slot| {
            if slot.version == version {
                true
            } else {
                stale.push(slot.observed.clone());
                false
            }
        });
        stale
    }

    /// Remove and return every entry.
    pub fn clear(&self) -> SmallVec<[Observed; 4]> {
        self.slots
            .borrow_mut()
            .drain(..)
            .map(|slot| slot.observed)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn contains(&self, observed: &Observed) -> bool {
        self.slots.borrow().iter().any(|s| s.observed.same(observed))
    }
}
