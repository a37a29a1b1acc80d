//! Heap region
//!
//! One coarse reservation of the whole heap ceiling, acquired once when the
//! heap is created and released when it is dropped. Collection reuses the
//! same memory; nothing else asks the system for heap memory.

use crate::vm::defaults::{MAX_HEAP_WORDS, MIN_HEAP_SIZE, WORD_SIZE};
use crate::vm::{VmError, VmResult};

/// A fixed-size, word-addressed memory reservation
pub struct HeapRegion {
    /// Base address of the reservation
    base: *mut u64,

    /// Size of the region in words
    words: usize,
}

impl HeapRegion {
    /// Reserve `size_bytes` (rounded down to whole words)
    pub fn reserve(size_bytes: usize) -> VmResult<Self> {
        if size_bytes < MIN_HEAP_SIZE {
            return Err(VmError::InvalidConfig(format!(
                "heap size {} is below the minimum of {} bytes",
                size_bytes, MIN_HEAP_SIZE
            )));
        }
        let words = size_bytes / WORD_SIZE;
        if words > MAX_HEAP_WORDS {
            return Err(VmError::InvalidConfig(format!(
                "heap size {} exceeds the addressable maximum of {} words",
                size_bytes, MAX_HEAP_WORDS
            )));
        }

        let base = reserve_words(words).ok_or(VmError::ReservationFailed(size_bytes))?;
        log::debug!("heap: reserved {} bytes at {:p}", words * WORD_SIZE, base);
        Ok(Self { base, words })
    }

    /// Size of the region in words
    #[inline]
    pub fn len_words(&self) -> usize {
        self.words
    }

    /// Size of the region in bytes
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.words * WORD_SIZE
    }

    /// View the region as words
    #[inline]
    pub fn words(&self) -> &[u64] {
        // SAFETY: `base` points to `words` initialized (zero-filled) u64s
        // owned exclusively by this region until drop.
        unsafe { std::slice::from_raw_parts(self.base, self.words) }
    }

    /// View the region as mutable words
    #[inline]
    pub fn words_mut(&mut self) -> &mut [u64] {
        // SAFETY: as in `words`; `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base, self.words) }
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        release_words(self.base, self.words);
    }
}

// SAFETY: the region exclusively owns its reservation; moving it to another
// thread moves that ownership along with it.
unsafe impl Send for HeapRegion {}

impl std::fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapRegion")
            .field("base", &self.base)
            .field("bytes", &self.len_bytes())
            .finish()
    }
}

/// Reserve zero-filled memory with a single anonymous mapping.
#[cfg(unix)]
fn reserve_words(words: usize) -> Option<*mut u64> {
    let bytes = words * WORD_SIZE;
    unsafe {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if ptr == libc::MAP_FAILED {
            return None;
        }
        Some(ptr as *mut u64)
    }
}

#[cfg(unix)]
fn release_words(base: *mut u64, words: usize) {
    if base.is_null() || words == 0 {
        return;
    }
    unsafe {
        if libc::munmap(base as *mut libc::c_void, words * WORD_SIZE) != 0 {
            log::warn!("heap: munmap failed for region at {:p}", base);
        }
    }
}

#[cfg(not(unix))]
fn reserve_words(words: usize) -> Option<*mut u64> {
    let layout = std::alloc::Layout::array::<u64>(words).ok()?;
    // SAFETY: layout has non-zero size (words >= MIN_HEAP_SIZE / WORD_SIZE).
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        None
    } else {
        Some(ptr as *mut u64)
    }
}

#[cfg(not(unix))]
fn release_words(base: *mut u64, words: usize) {
    if base.is_null() || words == 0 {
        return;
    }
    if let Ok(layout) = std::alloc::Layout::array::<u64>(words) {
        // SAFETY: allocated in `reserve_words` with the same layout.
        unsafe { std::alloc::dealloc(base as *mut u8, layout) };
    }
}
