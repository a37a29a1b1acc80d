//! Stop-the-world tracing collector
//!
//! A cycle is only ever started by an allocation that found no room (or by an
//! explicit [`GarbageCollector::collect`]). It marks everything reachable from
//! the driver's roots, then reclaims according to the configured strategy:
//!
//! - **Compact**: sliding (Lisp-2) compaction. Forwarding indices are stored in
//!   the header's aux field, every root and reference slot is rewritten, live
//!   blocks slide down in address order, and the bump top drops to the end of
//!   the last survivor.
//! - **Sweep**: survivors stay put; runs of adjacent dead and free blocks are
//!   coalesced onto the free lists and a trailing run retracts the bump top.

use super::config::{GcConfig, GcStrategy};
use super::heap::{Heap, HeapStats, ARRAY_HEADER_WORDS};
use super::roots::RootProvider;
use crate::vm::defaults::{MARK_STACK_CAPACITY, WORD_SIZE};
use crate::vm::types::{ClassId, TypeRegistry};
use crate::vm::value::{Handle, Reference, Value};
use crate::vm::{VmError, VmResult};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Collector state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPhase {
    /// Mutator running
    #[default]
    Idle,
    /// Tracing from roots
    Marking,
    /// Returning dead blocks to the free lists
    Sweeping,
    /// Sliding survivors down
    Compacting,
}

impl fmt::Display for GcPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcPhase::Idle => "idle",
            GcPhase::Marking => "marking",
            GcPhase::Sweeping => "sweeping",
            GcPhase::Compacting => "compacting",
        };
        f.write_str(name)
    }
}

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total bytes freed
    pub bytes_freed: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Average pause time
    pub avg_pause_time: Duration,

    /// Maximum pause time
    pub max_pause_time: Duration,

    /// Minimum pause time
    pub min_pause_time: Duration,

    /// Objects marked in last collection
    pub last_marked_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Bytes freed in last collection
    pub last_freed_bytes: usize,

    /// Live objects after last collection
    pub live_objects: usize,

    /// Live bytes after last collection
    pub live_bytes: usize,

    /// Allocations that failed even after collecting
    pub out_of_memory_count: usize,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, cycle: &CycleOutcome) {
        self.collections += 1;
        self.objects_freed += cycle.freed_objects;
        self.bytes_freed += cycle.freed_words * WORD_SIZE;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;

        self.avg_pause_time = self.total_pause_time.div_f64(self.collections as f64);

        if pause_time > self.max_pause_time {
            self.max_pause_time = pause_time;
        }
        if self.collections == 1 || pause_time < self.min_pause_time {
            self.min_pause_time = pause_time;
        }

        self.last_marked_count = cycle.marked;
        self.last_freed_count = cycle.freed_objects;
        self.last_freed_bytes = cycle.freed_words * WORD_SIZE;
        self.live_objects = cycle.live_objects;
        self.live_bytes = cycle.live_words * WORD_SIZE;
    }
}

/// What one reclaim pass found
#[derive(Debug, Default)]
struct CycleOutcome {
    marked: usize,
    freed_objects: usize,
    freed_words: usize,
    live_objects: usize,
    live_words: usize,
}

/// Heap context: the bounded heap, its collector, and the checked accessors
///
/// Each instance owns an independent heap region; nothing is global, so tests
/// can run many of them side by side.
pub struct GarbageCollector {
    /// Heap allocator
    heap: Heap,

    /// Configuration the heap was created with
    config: GcConfig,

    /// Gray objects (word indices), reused across cycles
    mark_stack: Vec<usize>,

    /// Current phase
    phase: GcPhase,

    /// Statistics
    stats: GcStats,
}

impl GarbageCollector {
    /// Reserve a heap for `config` and attach the descriptor registry
    pub fn new(config: GcConfig, type_registry: Arc<TypeRegistry>) -> VmResult<Self> {
        let heap = Heap::new(&config, type_registry)?;
        debug!(
            "gc: reserved {} byte heap ({} strategy)",
            heap.stats().capacity_bytes,
            config.strategy
        );
        Ok(Self {
            heap,
            config,
            mark_stack: Vec::with_capacity(MARK_STACK_CAPACITY),
            phase: GcPhase::Idle,
            stats: GcStats::default(),
        })
    }

    /// Allocate an instance of `class` with zeroed numeric slots and null references
    ///
    /// Collects at most once when the heap is full; `roots` must cover every
    /// reference the caller still intends to use, and is rewritten in place
    /// if objects move.
    pub fn allocate_object(
        &mut self,
        class: ClassId,
        roots: &mut dyn RootProvider,
    ) -> VmResult<Reference> {
        let size = self.heap.object_words(class)?;
        let index = self.reserve(size, roots, |registry| registry.class_name(class))?;
        Ok(Reference::Handle(self.heap.init_object(index, class, size)))
    }

    /// Allocate an array of `length` null references to instances of `element`
    pub fn allocate_array(
        &mut self,
        element: ClassId,
        length: i64,
        roots: &mut dyn RootProvider,
    ) -> VmResult<Reference> {
        self.heap.type_registry().class(element)?;
        let length = usize::try_from(length).map_err(|_| {
            VmError::RuntimeError(format!(
                "negative length {} for {}",
                length,
                self.heap.type_registry().array_name(element)
            ))
        })?;
        let size = Heap::array_words(length).unwrap_or(usize::MAX);
        let index = self.reserve(size, roots, |registry| {
            format!("{} of length {}", registry.array_name(element), length)
        })?;
        Ok(Reference::Handle(self.heap.init_array(index, element, length)))
    }

    fn reserve(
        &mut self,
        size: usize,
        roots: &mut dyn RootProvider,
        describe: impl FnOnce(&TypeRegistry) -> String,
    ) -> VmResult<usize> {
        // A block larger than the whole region never fits, but still costs a cycle
        let fits = size <= self.heap.capacity_words();
        if fits {
            if let Some(index) = self.heap.try_allocate(size) {
                return Ok(index);
            }
        }

        self.collect(roots);

        if fits {
            if let Some(index) = self.heap.try_allocate(size) {
                return Ok(index);
            }
        }

        let descriptor = describe(self.heap.type_registry());
        let requested_bytes = size.saturating_mul(WORD_SIZE);
        self.stats.out_of_memory_count += 1;
        warn!(
            "gc: out of memory allocating {} bytes for {} ({} of {} bytes live)",
            requested_bytes,
            descriptor,
            self.heap.allocated_bytes(),
            self.heap.stats().capacity_bytes
        );
        Err(VmError::OutOfMemory {
            requested_bytes,
            descriptor,
        })
    }

    /// Run one full collection cycle
    ///
    /// Every object reachable from `roots` survives with its contents intact;
    /// root slots are updated if the object moved.
    pub fn collect(&mut self, roots: &mut dyn RootProvider) {
        let start = Instant::now();

        self.set_phase(GcPhase::Marking);
        let marked = self.mark(roots);

        let mut cycle = match self.config.strategy {
            GcStrategy::Compact => {
                self.set_phase(GcPhase::Compacting);
                self.compact(roots)
            }
            GcStrategy::Sweep => {
                self.set_phase(GcPhase::Sweeping);
                self.sweep()
            }
        };
        cycle.marked = marked;

        self.set_phase(GcPhase::Idle);

        let pause = start.elapsed();
        self.stats.update(pause, &cycle);
        debug!(
            "gc #{} ({}): freed {} objects ({} bytes), {} live ({} bytes), pause {:?}",
            self.stats.collections,
            self.config.strategy,
            cycle.freed_objects,
            cycle.freed_words * WORD_SIZE,
            cycle.live_objects,
            cycle.live_words * WORD_SIZE,
            pause
        );
    }

    fn set_phase(&mut self, phase: GcPhase) {
        trace!("gc: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Mark phase: mark everything reachable from `roots`
    /// Returns number of objects marked
    fn mark(&mut self, roots: &mut dyn RootProvider) -> usize {
        let heap = &mut self.heap;
        let stack = &mut self.mark_stack;
        stack.clear();

        let mut marked = 0;
        roots.visit_roots(&mut |root| {
            marked += shade(heap, stack, *root);
        });

        let registry = Arc::clone(heap.type_registry());
        while let Some(index) = stack.pop() {
            let header = heap.header(index);
            if header.is_array() {
                let first = index + ARRAY_HEADER_WORDS;
                for slot in first..first + heap.array_length(index) {
                    let target = Reference::from_slot(heap.words()[slot]);
                    marked += shade(heap, stack, target);
                }
            } else if let Some(class) = registry.get(header.class_id()) {
                for &field in class.reference_slots() {
                    let target = Reference::from_slot(heap.words()[index + 1 + field]);
                    marked += shade(heap, stack, target);
                }
            }
        }

        marked
    }

    /// Sweep phase: coalesce dead runs onto the free lists
    fn sweep(&mut self) -> CycleOutcome {
        let heap = &mut self.heap;
        let top = heap.top();
        let mut cycle = CycleOutcome::default();

        heap.free_lists_mut().0.clear();

        let mut run_start: Option<usize> = None;
        let mut index = 0;
        while index < top {
            let header = heap.header(index);
            let size = heap.block_words(index);

            if header.is_marked() {
                heap.set_header(index, header.reset());
                cycle.live_objects += 1;
                cycle.live_words += size;
                if let Some(start) = run_start.take() {
                    let (lists, words) = heap.free_lists_mut();
                    lists.push(words, start, index - start);
                }
            } else {
                if !header.is_free() {
                    cycle.freed_objects += 1;
                    cycle.freed_words += size;
                }
                run_start.get_or_insert(index);
            }

            index += size;
        }

        let new_top = run_start.unwrap_or(top);
        heap.reset_after_collection(new_top, cycle.live_words, cycle.live_objects);
        cycle
    }

    /// Compact phase: slide survivors to the bottom of the heap
    fn compact(&mut self, roots: &mut dyn RootProvider) -> CycleOutcome {
        let heap = &mut self.heap;
        let top = heap.top();
        let mut cycle = CycleOutcome::default();

        // 1. Assign forwarding indices in address order
        let mut free = 0;
        let mut index = 0;
        while index < top {
            let header = heap.header(index);
            let size = heap.block_words(index);
            if header.is_marked() {
                heap.set_header(index, header.with_aux(free));
                free += size;
                cycle.live_objects += 1;
                cycle.live_words += size;
            } else if !header.is_free() {
                cycle.freed_objects += 1;
                cycle.freed_words += size;
            }
            index += size;
        }

        // 2. Rewrite roots and every reference slot of a survivor
        roots.visit_roots(&mut |root| {
            *root = forward(heap, *root);
        });

        let registry = Arc::clone(heap.type_registry());
        let mut index = 0;
        while index < top {
            let header = heap.header(index);
            let size = heap.block_words(index);
            if header.is_marked() {
                if header.is_array() {
                    for slot in index + ARRAY_HEADER_WORDS..index + size {
                        forward_slot(heap, slot);
                    }
                } else if let Some(class) = registry.get(header.class_id()) {
                    for &field in class.reference_slots() {
                        forward_slot(heap, index + 1 + field);
                    }
                }
            }
            index += size;
        }

        // 3. Slide; destinations never pass the block being read
        let mut index = 0;
        while index < top {
            let header = heap.header(index);
            let size = heap.block_words(index);
            if header.is_marked() {
                let dest = header.aux();
                if dest != index {
                    heap.words_mut().copy_within(index..index + size, dest);
                }
                heap.set_header(dest, header.reset());
            }
            index += size;
        }

        // 4. Everything above the survivors is free
        heap.free_lists_mut().0.clear();
        heap.reset_after_collection(free, cycle.live_words, cycle.live_objects);
        cycle
    }

    // ========================================================================
    // Object model accessors
    // ========================================================================

    /// Read field `index` of an object
    pub fn load_field(&self, object: Reference, index: usize) -> VmResult<Value> {
        self.heap.load_field(object, index)
    }

    /// Write field `index` of an object
    pub fn store_field(&mut self, object: Reference, index: usize, value: Value) -> VmResult<()> {
        self.heap.store_field(object, index, value)
    }

    /// Read element `index` of an array
    pub fn load_element(&self, array: Reference, index: i64) -> VmResult<Value> {
        self.heap.load_element(array, index)
    }

    /// Write element `index` of an array
    pub fn store_element(&mut self, array: Reference, index: i64, value: Value) -> VmResult<()> {
        self.heap.store_element(array, index, value)
    }

    /// Length of an array
    pub fn array_length(&self, array: Reference) -> VmResult<usize> {
        self.heap.length_of(array)
    }

    /// Check a reference against the null sentinel
    #[inline]
    pub fn is_null(&self, reference: Reference) -> bool {
        reference.is_null()
    }

    /// Class of an object (element class of an array)
    pub fn class_of(&self, reference: Reference) -> VmResult<ClassId> {
        self.heap.class_of(reference)
    }

    /// Diagnostic name of an object's or array's descriptor
    pub fn describe(&self, reference: Reference) -> VmResult<String> {
        self.heap.describe(reference)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current phase (always `Idle` outside a cycle)
    #[inline]
    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    /// Get GC statistics
    #[inline]
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Get heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Configuration the heap was created with
    #[inline]
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Descriptor registry shared with the driver
    #[inline]
    pub fn type_registry(&self) -> &Arc<TypeRegistry> {
        self.heap.type_registry()
    }

    /// The underlying heap
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }
}

impl fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("heap", &self.heap)
            .finish()
    }
}

/// Mark `target` and queue it for tracing; returns 1 if newly marked
fn shade(heap: &mut Heap, stack: &mut Vec<usize>, target: Reference) -> usize {
    let Some(handle) = target.handle() else {
        return 0;
    };
    let index = handle.index();
    if index >= heap.top() {
        return 0;
    }
    let header = heap.header(index);
    if header.is_free() || header.is_marked() {
        return 0;
    }
    heap.set_header(index, header.marked());
    stack.push(index);
    1
}

/// New location of a surviving object
fn forward(heap: &Heap, reference: Reference) -> Reference {
    match reference.handle() {
        Some(handle) if handle.index() < heap.top() => {
            let header = heap.header(handle.index());
            if header.is_marked() {
                Reference::Handle(Handle::from_index(header.aux()))
            } else {
                reference
            }
        }
        _ => reference,
    }
}

fn forward_slot(heap: &mut Heap, slot: usize) {
    let raw = heap.words()[slot];
    if raw != 0 {
        let moved = forward(heap, Reference::from_slot(raw));
        heap.words_mut()[slot] = moved.to_slot();
    }
}
