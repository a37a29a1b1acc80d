//! GC root tracking
//!
//! Roots are the references the execution driver still intends to use:
//! registers of live frames, locals, and globals. The collector never owns
//! them; it asks a [`RootProvider`] to hand out each root slot mutably so a
//! compacting cycle can rewrite it in place.

use crate::vm::value::{Reference, Value};

/// Source of GC roots
///
/// Implementations must visit every reference the driver may still read
/// after the allocation that triggered collection. Visiting a stale root is
/// allowed; it only keeps garbage alive.
pub trait RootProvider {
    /// Call `visitor` once for every root slot
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference));
}

/// Provider with no roots (everything allocated so far is garbage)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(&mut Reference)) {}
}

impl RootProvider for Reference {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        visitor(self);
    }
}

impl RootProvider for [Reference] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        self.iter_mut().for_each(|r| visitor(r));
    }
}

impl RootProvider for Vec<Reference> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        self.as_mut_slice().visit_roots(visitor);
    }
}

impl RootProvider for [Value] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        for value in self.iter_mut() {
            if let Value::Ref(r) = value {
                visitor(r);
            }
        }
    }
}

impl<A: RootProvider + ?Sized, B: RootProvider + ?Sized> RootProvider for (&mut A, &mut B) {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        self.0.visit_roots(visitor);
        self.1.visit_roots(visitor);
    }
}

/// Root set for garbage collection
///
/// A driver-side table of root slots. Slots are addressed by index so the
/// driver can read back references after a compacting cycle moved them.
#[derive(Debug, Default)]
pub struct RootSet {
    /// Stack roots (pushed and popped with the driver's scopes)
    stack_roots: Vec<Reference>,

    /// Global roots (live for the whole run)
    global_roots: Vec<Reference>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a stack root, returning its slot index
    pub fn push(&mut self, reference: Reference) -> usize {
        self.stack_roots.push(reference);
        self.stack_roots.len() - 1
    }

    /// Read a stack root
    pub fn get(&self, slot: usize) -> Reference {
        self.stack_roots.get(slot).copied().unwrap_or_default()
    }

    /// Overwrite a stack root
    pub fn set(&mut self, slot: usize, reference: Reference) {
        if let Some(r) = self.stack_roots.get_mut(slot) {
            *r = reference;
        }
    }

    /// Pop stack roots down to `len` (end of a scope)
    pub fn truncate(&mut self, len: usize) {
        self.stack_roots.truncate(len);
    }

    /// Clear all stack roots
    pub fn clear_stack_roots(&mut self) {
        self.stack_roots.clear();
    }

    /// Add a global root, returning its slot index
    pub fn add_global(&mut self, reference: Reference) -> usize {
        self.global_roots.push(reference);
        self.global_roots.len() - 1
    }

    /// Read a global root
    pub fn global(&self, slot: usize) -> Reference {
        self.global_roots.get(slot).copied().unwrap_or_default()
    }

    /// Overwrite a global root
    pub fn set_global(&mut self, slot: usize, reference: Reference) {
        if let Some(r) = self.global_roots.get_mut(slot) {
            *r = reference;
        }
    }

    /// Iterate over all roots
    pub fn iter(&self) -> impl Iterator<Item = Reference> + '_ {
        self.stack_roots
            .iter()
            .chain(self.global_roots.iter())
            .copied()
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.stack_roots.len() + self.global_roots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RootProvider for RootSet {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Reference)) {
        self.stack_roots.visit_roots(visitor);
        self.global_roots.visit_roots(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::Handle;

    fn count<P: RootProvider + ?Sized>(provider: &mut P) -> usize {
        let mut n = 0;
        provider.visit_roots(&mut |_| n += 1);
        n
    }

    #[test]
    fn test_root_set_creation() {
        let roots = RootSet::new();
        assert_eq!(roots.len(), 0);
        assert!(roots.is_empty());
    }

    #[test]
    fn test_root_set_push_truncate() {
        let mut roots = RootSet::new();
        let a = roots.push(Reference::Handle(Handle::from_index(0)));
        let b = roots.push(Reference::Null);
        roots.add_global(Reference::Handle(Handle::from_index(8)));

        assert_eq!((a, b), (0, 1));
        assert_eq!(roots.len(), 3);

        roots.truncate(1);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots.get(0), Reference::Handle(Handle::from_index(0)));
        assert_eq!(roots.get(5), Reference::Null);
    }

    #[test]
    fn test_visitor_rewrites_slots() {
        let mut roots = RootSet::new();
        roots.push(Reference::Handle(Handle::from_index(10)));
        roots.add_global(Reference::Handle(Handle::from_index(20)));

        roots.visit_roots(&mut |r| {
            if let Some(h) = r.handle() {
                *r = Reference::Handle(Handle::from_index(h.index() - 10));
            }
        });

        assert_eq!(roots.get(0), Reference::Handle(Handle::from_index(0)));
        assert_eq!(roots.global(0), Reference::Handle(Handle::from_index(10)));
    }

    #[test]
    fn test_value_slice_skips_numbers() {
        let mut values = vec![Value::int(1), Value::null(), Value::double(2.0)];
        assert_eq!(count(values.as_mut_slice()), 1);
        assert_eq!(count(&mut NoRoots), 0);
    }

    #[test]
    fn test_chained_providers() {
        let mut a = RootSet::new();
        a.push(Reference::Null);
        let mut b = vec![Reference::Null, Reference::Null];
        assert_eq!(count(&mut (&mut a, &mut b)), 3);
    }
}
