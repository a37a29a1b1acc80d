//! Heap allocator for GC-managed objects
//!
//! The heap carves objects and arrays out of a single [`HeapRegion`]:
//! ```text
//! object:  [GcHeader][slot 0] .. [slot n-1]
//! array:   [GcHeader][length][elem 0] .. [elem len-1]
//! free:    [GcHeader::free(size)][next] ..
//! ```
//! Every block is at least two words so that a dead block can always be
//! linked into a free list. Walking headers from word 0 up to `top` visits
//! every block exactly once.

use super::config::{GcConfig, GcStrategy};
use super::freelist::FreeLists;
use super::header::GcHeader;
use super::region::HeapRegion;
use crate::vm::defaults::WORD_SIZE;
use crate::vm::types::{ClassId, TypeRegistry};
use crate::vm::value::Handle;
use crate::vm::{VmError, VmResult};
use std::sync::Arc;

/// Smallest block in words
pub const MIN_BLOCK_WORDS: usize = 2;

/// Words occupied by an array before its first element
pub const ARRAY_HEADER_WORDS: usize = 2;

/// Heap allocator for GC-managed memory
pub struct Heap {
    /// Backing reservation
    region: HeapRegion,

    /// Type registry for precise GC
    type_registry: Arc<TypeRegistry>,

    /// Free-space policy
    strategy: GcStrategy,

    /// Bump pointer: first word never handed out
    top: usize,

    /// Free lists (mark-sweep only)
    free_lists: FreeLists,

    /// Words held by allocated blocks, dead-but-unswept ones included
    used_words: usize,

    /// Number of allocated blocks, dead-but-unswept ones included
    allocation_count: usize,
}

impl Heap {
    /// Reserve the heap region described by `config`
    pub fn new(config: &GcConfig, type_registry: Arc<TypeRegistry>) -> VmResult<Self> {
        config.validate()?;
        Ok(Self {
            region: HeapRegion::reserve(config.heap_size)?,
            type_registry,
            strategy: config.strategy,
            top: 0,
            free_lists: FreeLists::new(),
            used_words: 0,
            allocation_count: 0,
        })
    }

    /// Get the type registry
    #[inline]
    pub fn type_registry(&self) -> &Arc<TypeRegistry> {
        &self.type_registry
    }

    /// Block size of an instance of `class`
    pub fn object_words(&self, class: ClassId) -> VmResult<usize> {
        let desc = self.type_registry.class(class)?;
        Ok((1 + desc.field_count()).max(MIN_BLOCK_WORDS))
    }

    /// Block size of an array of `length` elements, `None` on overflow
    pub fn array_words(length: usize) -> Option<usize> {
        length.checked_add(ARRAY_HEADER_WORDS)
    }

    /// Reserve `size` contiguous words, or `None` if no free space fits
    pub fn try_allocate(&mut self, size: usize) -> Option<usize> {
        debug_assert!(size >= MIN_BLOCK_WORDS);
        let index = match self.strategy {
            GcStrategy::Compact => self.bump(size),
            GcStrategy::Sweep => {
                if let Some(index) = self.free_lists.pop_exact(self.region.words(), size) {
                    Some(index)
                } else if let Some(index) = self.bump(size) {
                    Some(index)
                } else {
                    self.free_lists.take_fit(self.region.words_mut(), size)
                }
            }
        }?;
        self.used_words += size;
        self.allocation_count += 1;
        Some(index)
    }

    fn bump(&mut self, size: usize) -> Option<usize> {
        let end = self.top.checked_add(size)?;
        if end > self.region.len_words() {
            return None;
        }
        let index = self.top;
        self.top = end;
        Some(index)
    }

    /// Write an object header and zero/null every slot
    pub fn init_object(&mut self, index: usize, class: ClassId, size: usize) -> Handle {
        let words = self.region.words_mut();
        words[index] = GcHeader::object(class).raw();
        words[index + 1..index + size].fill(0);
        Handle::from_index(index)
    }

    /// Write an array header and length, nulling every element
    pub fn init_array(&mut self, index: usize, element: ClassId, length: usize) -> Handle {
        let words = self.region.words_mut();
        words[index] = GcHeader::array(element).raw();
        words[index + 1] = length as u64;
        words[index + ARRAY_HEADER_WORDS..index + ARRAY_HEADER_WORDS + length].fill(0);
        Handle::from_index(index)
    }

    /// Header of the block at `index`
    #[inline]
    pub fn header(&self, index: usize) -> GcHeader {
        GcHeader::from_raw(self.region.words()[index])
    }

    /// Overwrite the header of the block at `index`
    #[inline]
    pub fn set_header(&mut self, index: usize, header: GcHeader) {
        self.region.words_mut()[index] = header.raw();
    }

    /// Length of the array at `index`
    #[inline]
    pub fn array_length(&self, index: usize) -> usize {
        self.region.words()[index + 1] as usize
    }

    /// Size in words of the block at `index`
    pub fn block_words(&self, index: usize) -> usize {
        let header = self.header(index);
        if header.is_free() {
            header.aux()
        } else if header.is_array() {
            ARRAY_HEADER_WORDS + self.array_length(index)
        } else {
            let fields = self
                .type_registry
                .get(header.class_id())
                .map_or(0, |c| c.field_count());
            (1 + fields).max(MIN_BLOCK_WORDS)
        }
    }

    /// Header of the object named by `handle`, validated against the heap bounds
    pub fn resolve(&self, handle: Handle) -> VmResult<GcHeader> {
        let index = handle.index();
        if index >= self.top {
            return Err(VmError::InvalidReference(format!(
                "{} is outside the allocated heap",
                handle
            )));
        }
        let header = self.header(index);
        if header.is_free() {
            return Err(VmError::InvalidReference(format!(
                "{} names reclaimed storage",
                handle
            )));
        }
        Ok(header)
    }

    /// Heap words
    #[inline]
    pub fn words(&self) -> &[u64] {
        self.region.words()
    }

    /// Mutable heap words
    #[inline]
    pub fn words_mut(&mut self) -> &mut [u64] {
        self.region.words_mut()
    }

    /// Bump pointer (word index)
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Capacity in words
    #[inline]
    pub fn capacity_words(&self) -> usize {
        self.region.len_words()
    }

    /// Total allocated bytes
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.used_words * WORD_SIZE
    }

    /// Get allocation count
    #[inline]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Free-list bookkeeping (mark-sweep)
    pub(super) fn free_lists_mut(&mut self) -> (&mut FreeLists, &mut [u64]) {
        (&mut self.free_lists, self.region.words_mut())
    }

    /// Words held by free-list blocks
    #[inline]
    pub fn free_list_words(&self) -> usize {
        self.free_lists.free_words()
    }

    /// Record the outcome of a collection
    pub(super) fn reset_after_collection(&mut self, top: usize, live_words: usize, live_objects: usize) {
        self.top = top;
        self.used_words = live_words;
        self.allocation_count = live_objects;
    }

    /// Snapshot of heap occupancy
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            capacity_bytes: self.region.len_bytes(),
            allocated_bytes: self.allocated_bytes(),
            allocation_count: self.allocation_count,
            top_bytes: self.top * WORD_SIZE,
            free_list_bytes: self.free_lists.free_words() * WORD_SIZE,
        }
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("strategy", &self.strategy)
            .field("top", &self.top)
            .field("used_words", &self.used_words)
            .field("allocation_count", &self.allocation_count)
            .finish()
    }
}

/// Heap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Size of the heap region
    pub capacity_bytes: usize,

    /// Bytes held by allocated blocks
    pub allocated_bytes: usize,

    /// Number of allocated blocks
    pub allocation_count: usize,

    /// Bytes below the bump pointer
    pub top_bytes: usize,

    /// Bytes parked on free lists (mark-sweep)
    pub free_list_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::types::{FieldDescriptor, TypeRegistryBuilder};

    fn registry() -> Arc<TypeRegistry> {
        let mut builder = TypeRegistryBuilder::new();
        builder.register_class("Empty", vec![]).unwrap();
        builder
            .register_class(
                "Pair",
                vec![FieldDescriptor::int("a"), FieldDescriptor::double("b")],
            )
            .unwrap();
        Arc::new(builder.build())
    }

    fn heap(strategy: GcStrategy) -> Heap {
        let config = GcConfig {
            heap_size: 4096,
            strategy,
        };
        Heap::new(&config, registry()).unwrap()
    }

    #[test]
    fn test_heap_creation() {
        let heap = heap(GcStrategy::Compact);
        assert_eq!(heap.allocated_bytes(), 0);
        assert_eq!(heap.allocation_count(), 0);
        assert_eq!(heap.capacity_words(), 512);
    }

    #[test]
    fn test_object_words() {
        let heap = heap(GcStrategy::Compact);
        // Empty objects are padded to the minimum block
        assert_eq!(heap.object_words(ClassId(0)).unwrap(), 2);
        assert_eq!(heap.object_words(ClassId(1)).unwrap(), 3);
        assert!(heap.object_words(ClassId(9)).is_err());
    }

    #[test]
    fn test_bump_allocation_is_contiguous() {
        let mut heap = heap(GcStrategy::Compact);
        let a = heap.try_allocate(3).unwrap();
        let b = heap.try_allocate(2).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 3);
        assert_eq!(heap.top(), 5);
        assert_eq!(heap.allocated_bytes(), 5 * WORD_SIZE);
    }

    #[test]
    fn test_exhaustion() {
        let mut heap = heap(GcStrategy::Compact);
        assert!(heap.try_allocate(512).is_some());
        assert!(heap.try_allocate(2).is_none());
    }

    #[test]
    fn test_init_object_zeroes_slots() {
        let mut heap = heap(GcStrategy::Compact);
        let index = heap.try_allocate(3).unwrap();
        heap.words_mut()[index + 1] = 99;
        let handle = heap.init_object(index, ClassId(1), 3);

        let header = heap.resolve(handle).unwrap();
        assert_eq!(header.class_id(), ClassId(1));
        assert!(!header.is_array());
        assert_eq!(heap.words()[index + 1], 0);
        assert_eq!(heap.block_words(index), 3);
    }

    #[test]
    fn test_init_array() {
        let mut heap = heap(GcStrategy::Compact);
        let size = Heap::array_words(10).unwrap();
        let index = heap.try_allocate(size).unwrap();
        let handle = heap.init_array(index, ClassId(1), 10);

        assert!(heap.resolve(handle).unwrap().is_array());
        assert_eq!(heap.array_length(index), 10);
        assert_eq!(heap.block_words(index), 12);
    }

    #[test]
    fn test_array_words_overflow() {
        assert_eq!(Heap::array_words(usize::MAX), None);
        assert_eq!(Heap::array_words(0), Some(ARRAY_HEADER_WORDS));
    }

    #[test]
    fn test_resolve_rejects_unallocated() {
        let heap = heap(GcStrategy::Sweep);
        assert!(heap.resolve(Handle::from_index(4)).is_err());
    }

    #[test]
    fn test_sweep_strategy_reuses_free_block() {
        let mut heap = heap(GcStrategy::Sweep);
        let a = heap.try_allocate(4).unwrap();
        let _b = heap.try_allocate(4).unwrap();

        let (lists, words) = heap.free_lists_mut();
        lists.push(words, a, 4);

        assert_eq!(heap.try_allocate(4), Some(a));
    }
}
