//! Global live-reference accounting with cycle reclamation.

use crate::stack_item::{ArrayInner, MapInner, StackItem};
use crate::{VmError, VmResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Counts every reference a VM run keeps alive: items on evaluation stacks,
/// items in slots, and children held by compound items.
///
/// The counter is shared (cheaply cloned) between the engine, its stacks and
/// every compound item. Compounds register themselves on creation so that
/// the count-exceed path can traverse the live object graph: references held
/// only by unreachable cycles are reclaimed before the limit faults the run.
/// The limit itself is enforced by [`ReferenceCounter::check_limit`], which
/// the engine invokes after every instruction — the one point where no
/// compound is mid-mutation.
#[derive(Clone)]
pub struct ReferenceCounter {
    inner: Rc<CounterInner>,
}

struct CounterInner {
    count: Cell<usize>,
    limit: usize,
    /// Every compound ever created under this counter, weakly held.
    tracked: RefCell<Vec<Tracked>>,
}

enum Tracked {
    Array(Weak<RefCell<ArrayInner>>),
    Map(Weak<RefCell<MapInner>>),
}

/// A tracked compound pinned alive for the duration of one sweep.
enum Live {
    Array(Rc<RefCell<ArrayInner>>),
    Map(Rc<RefCell<MapInner>>),
}

impl Live {
    fn id(&self) -> usize {
        match self {
            Live::Array(rc) => Rc::as_ptr(rc) as *const () as usize,
            Live::Map(rc) => Rc::as_ptr(rc) as *const () as usize,
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            Live::Array(rc) => Rc::strong_count(rc),
            Live::Map(rc) => Rc::strong_count(rc),
        }
    }

    /// Identities of the compound children; `None` while the compound is
    /// borrowed, which cannot happen between instructions.
    fn child_ids(&self) -> Option<Vec<usize>> {
        match self {
            Live::Array(rc) => {
                let inner = rc.try_borrow().ok()?;
                Some(inner.items().iter().filter_map(compound_id).collect())
            }
            Live::Map(rc) => {
                let inner = rc.try_borrow().ok()?;
                Some(
                    inner
                        .entries()
                        .filter_map(|(_, value)| compound_id(value))
                        .collect(),
                )
            }
        }
    }

    /// Releases every reference the compound holds, breaking its cycles.
    fn clear(&self) {
        match self {
            Live::Array(rc) => rc.borrow_mut().clear(),
            Live::Map(rc) => rc.borrow_mut().clear(),
        }
    }
}

fn compound_id(item: &StackItem) -> Option<usize> {
    match item {
        StackItem::Array(rc) | StackItem::Struct(rc) => {
            Some(Rc::as_ptr(rc) as *const () as usize)
        }
        StackItem::Map(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
        _ => None,
    }
}

impl ReferenceCounter {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Rc::new(CounterInner {
                count: Cell::new(0),
                limit,
                tracked: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Current number of live references.
    pub fn count(&self) -> usize {
        self.inner.count.get()
    }

    /// Registers `n` new references. The limit is enforced separately by
    /// [`ReferenceCounter::check_limit`] so that growth inside a compound
    /// mutation never races the cycle traverse.
    pub fn add(&self, n: usize) {
        self.inner.count.set(self.inner.count.get() + n);
    }

    /// Releases `n` references.
    pub fn remove(&self, n: usize) {
        let current = self.inner.count.get();
        debug_assert!(current >= n, "reference counter underflow");
        self.inner.count.set(current.saturating_sub(n));
    }

    /// Whether two handles share the same underlying counter.
    pub fn ptr_eq(&self, other: &ReferenceCounter) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn track_array(&self, compound: &Rc<RefCell<ArrayInner>>) {
        self.inner
            .tracked
            .borrow_mut()
            .push(Tracked::Array(Rc::downgrade(compound)));
    }

    pub(crate) fn track_map(&self, compound: &Rc<RefCell<MapInner>>) {
        self.inner
            .tracked
            .borrow_mut()
            .push(Tracked::Map(Rc::downgrade(compound)));
    }

    /// Enforces the reference limit. When the count exceeds it, a mark
    /// traverse over the tracked compounds reclaims references held only by
    /// unreachable cycles; the error surfaces only if the count is still
    /// over the limit afterwards.
    pub fn check_limit(&self) -> VmResult<()> {
        if self.inner.count.get() <= self.inner.limit {
            return Ok(());
        }
        self.sweep();
        if self.inner.count.get() > self.inner.limit {
            return Err(VmError::ReferenceLimit);
        }
        Ok(())
    }

    /// The count-exceed traverse. A compound is externally reachable when
    /// it has more strong handles than tracked parent edges (stacks, slots
    /// and host state all hold such handles); everything not reachable from
    /// those roots is garbage kept alive only by its own cycles and gets
    /// its references released.
    fn sweep(&self) {
        let mut live: Vec<Live> = Vec::new();
        self.inner.tracked.borrow_mut().retain(|entry| match entry {
            Tracked::Array(weak) => match weak.upgrade() {
                Some(rc) => {
                    live.push(Live::Array(rc));
                    true
                }
                None => false,
            },
            Tracked::Map(weak) => match weak.upgrade() {
                Some(rc) => {
                    live.push(Live::Map(rc));
                    true
                }
                None => false,
            },
        });

        let index: HashMap<usize, usize> = live
            .iter()
            .enumerate()
            .map(|(position, item)| (item.id(), position))
            .collect();
        let mut children: Vec<Vec<usize>> = Vec::with_capacity(live.len());
        for item in &live {
            match item.child_ids() {
                Some(ids) => children.push(ids),
                // A compound is mid-mutation; skip this pass entirely
                // rather than reclaim against an incomplete graph.
                None => return,
            }
        }

        let mut parent_edges = vec![0usize; live.len()];
        for ids in &children {
            for id in ids {
                if let Some(&position) = index.get(id) {
                    parent_edges[position] += 1;
                }
            }
        }

        // Roots: one strong handle belongs to this sweep, the tracked
        // parent edges account for the rest that live inside compounds.
        let mut reachable = vec![false; live.len()];
        let mut queue: Vec<usize> = Vec::new();
        for (position, item) in live.iter().enumerate() {
            if item.strong_count() > parent_edges[position] + 1 {
                reachable[position] = true;
                queue.push(position);
            }
        }
        while let Some(position) = queue.pop() {
            for id in &children[position] {
                if let Some(&child) = index.get(id) {
                    if !reachable[child] {
                        reachable[child] = true;
                        queue.push(child);
                    }
                }
            }
        }

        for (position, item) in live.iter().enumerate() {
            if !reachable[position] {
                item.clear();
            }
        }
    }
}

impl std::fmt::Debug for ReferenceCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCounter")
            .field("count", &self.inner.count.get())
            .field("limit", &self.inner.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_limit_check() {
        let rc = ReferenceCounter::new(3);
        rc.add(2);
        assert_eq!(rc.count(), 2);
        rc.remove(1);
        assert_eq!(rc.count(), 1);
        rc.add(2);
        assert!(rc.check_limit().is_ok());
        rc.add(1);
        assert!(rc.check_limit().is_err());
    }

    #[test]
    fn clones_share_state() {
        let rc = ReferenceCounter::new(10);
        let clone = rc.clone();
        clone.add(4);
        assert_eq!(rc.count(), 4);
        assert!(rc.ptr_eq(&clone));
    }

    #[test]
    fn sweep_reclaims_garbage_cycles() {
        let rc = ReferenceCounter::new(4);
        {
            let a = StackItem::new_array(&rc, vec![]).unwrap();
            let b = StackItem::new_array(&rc, vec![]).unwrap();
            if let (StackItem::Array(first), StackItem::Array(second)) = (&a, &b) {
                first.borrow_mut().push(b.clone()).unwrap();
                second.borrow_mut().push(a.clone()).unwrap();
            }
        }
        // The two cycle edges outlive every external handle.
        assert_eq!(rc.count(), 2);
        rc.add(3);
        assert!(rc.check_limit().is_ok());
        assert_eq!(rc.count(), 3);
    }

    #[test]
    fn reachable_cycles_survive_the_sweep() {
        let rc = ReferenceCounter::new(3);
        let held = StackItem::new_array(&rc, vec![]).unwrap();
        if let StackItem::Array(inner) = &held {
            inner.borrow_mut().push(held.clone()).unwrap();
        }
        rc.add(3);
        // The self-cycle is still externally held, so nothing is reclaimed.
        assert!(rc.check_limit().is_err());
        assert_eq!(rc.count(), 4);
        drop(held);
    }

    #[test]
    fn sweep_prunes_dead_weak_entries() {
        let rc = ReferenceCounter::new(2);
        for _ in 0..8 {
            // Acyclic arrays free themselves; only the weak entry lingers.
            let _ = StackItem::new_array(&rc, vec![StackItem::Null]).unwrap();
        }
        assert_eq!(rc.count(), 0);
        rc.add(3);
        assert!(rc.check_limit().is_err());
        assert!(rc.inner.tracked.borrow().is_empty());
    }
}
