//! Default constants for VM configuration.
//!
//! Centralizes sizes shared by the heap, collector, and interpreter.

/// Size of one heap word in bytes. Every slot and header occupies one word.
pub const WORD_SIZE: usize = 8;

/// Default heap ceiling for user objects (32 MiB).
pub const DEFAULT_HEAP_SIZE: usize = 32 * 1024 * 1024;

/// Smallest accepted heap ceiling (one page).
pub const MIN_HEAP_SIZE: usize = 4096;

/// Largest heap, in words, addressable by 32-bit word handles.
pub const MAX_HEAP_WORDS: usize = u32::MAX as usize - 1;

/// Default maximum register file size (in slots).
pub const DEFAULT_MAX_REGISTERS: usize = 1024 * 64;

/// Largest block size (in words) served from an exact-size free list.
pub const SMALL_BLOCK_WORDS: usize = 32;

/// Initial capacity of the collector's mark stack.
pub const MARK_STACK_CAPACITY: usize = 1024;

/// Maximum number of nested calls before a stack overflow is raised.
pub const MAX_CALL_DEPTH: usize = 1 << 14;
