//! Segregated free lists for the mark-sweep strategy
//!
//! Free blocks live inside the heap region itself:
//! ```text
//! ┌──────────────────────────┬──────────────────────┬─────────────┐
//! │ GcHeader::free(size)     │ next (index + 1, 0)  │ unused ...  │
//! └──────────────────────────┴──────────────────────┴─────────────┘
//! ```
//! Blocks of up to [`SMALL_BLOCK_WORDS`] words sit on an exact-size list, so
//! the common small allocation pops a list head in O(1). Larger blocks share
//! one first-fit list. One-word remainders cannot hold a link; they stay in
//! the heap as unlinked filler until the next sweep coalesces them.

use super::header::GcHeader;
use crate::vm::defaults::SMALL_BLOCK_WORDS;

/// Free-list heads, indexed by block size in words
#[derive(Debug, Clone)]
pub struct FreeLists {
    /// Exact-size list heads (`index + 1`, 0 = empty)
    small: [u32; SMALL_BLOCK_WORDS + 1],

    /// First-fit list of blocks larger than `SMALL_BLOCK_WORDS`
    large: u32,

    /// Words held by free blocks, filler included
    free_words: usize,
}

impl FreeLists {
    /// Create empty lists
    pub fn new() -> Self {
        Self {
            small: [0; SMALL_BLOCK_WORDS + 1],
            large: 0,
            free_words: 0,
        }
    }

    /// Drop every list (the blocks themselves are left untouched)
    pub fn clear(&mut self) {
        self.small = [0; SMALL_BLOCK_WORDS + 1];
        self.large = 0;
        self.free_words = 0;
    }

    /// Words held by free blocks
    #[inline]
    pub fn free_words(&self) -> usize {
        self.free_words
    }

    /// Format `size` words at `index` as a free block and link it
    pub fn push(&mut self, words: &mut [u64], index: usize, size: usize) {
        debug_assert!(size >= 1);
        words[index] = GcHeader::free(size).raw();
        self.free_words += size;
        if size < 2 {
            return;
        }

        let head = if size <= SMALL_BLOCK_WORDS {
            &mut self.small[size]
        } else {
            &mut self.large
        };
        words[index + 1] = *head as u64;
        *head = (index + 1) as u32;
    }

    /// Take a block of exactly `size` words if its list is non-empty
    pub fn pop_exact(&mut self, words: &[u64], size: usize) -> Option<usize> {
        if size > SMALL_BLOCK_WORDS {
            return None;
        }
        let head = self.small[size];
        if head == 0 {
            return None;
        }
        let index = head as usize - 1;
        self.small[size] = words[index + 1] as u32;
        self.free_words -= size;
        Some(index)
    }

    /// Take the first block that fits `size`, splitting off the remainder
    pub fn take_fit(&mut self, words: &mut [u64], size: usize) -> Option<usize> {
        if let Some(index) = self.pop_exact(words, size) {
            return Some(index);
        }

        // Larger exact-size lists, smallest first
        for bucket in (size + 1).max(2)..=SMALL_BLOCK_WORDS {
            if let Some(index) = self.pop_exact(words, bucket) {
                self.split(words, index, bucket, size);
                return Some(index);
            }
        }

        // First fit on the large list
        let mut prev: Option<usize> = None;
        let mut cursor = self.large;
        while cursor != 0 {
            let index = cursor as usize - 1;
            let block = GcHeader::from_raw(words[index]).aux();
            let next = words[index + 1] as u32;
            if block >= size {
                match prev {
                    Some(p) => words[p + 1] = next as u64,
                    None => self.large = next,
                }
                self.free_words -= block;
                self.split(words, index, block, size);
                return Some(index);
            }
            prev = Some(index);
            cursor = next;
        }

        None
    }

    fn split(&mut self, words: &mut [u64], index: usize, block: usize, size: usize) {
        if block > size {
            self.push(words, index + size, block - size);
        }
    }
}

impl Default for FreeLists {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_exact() {
        let mut words = vec![0u64; 64];
        let mut lists = FreeLists::new();

        lists.push(&mut words, 0, 4);
        lists.push(&mut words, 10, 4);
        assert_eq!(lists.free_words(), 8);

        // LIFO order
        assert_eq!(lists.pop_exact(&words, 4), Some(10));
        assert_eq!(lists.pop_exact(&words, 4), Some(0));
        assert_eq!(lists.pop_exact(&words, 4), None);
        assert_eq!(lists.free_words(), 0);
    }

    #[test]
    fn test_take_fit_splits_small_block() {
        let mut words = vec![0u64; 64];
        let mut lists = FreeLists::new();

        lists.push(&mut words, 0, 6);
        assert_eq!(lists.take_fit(&mut words, 3), Some(0));

        // Remainder of 3 words is back on its own list
        assert_eq!(lists.free_words(), 3);
        assert_eq!(lists.pop_exact(&words, 3), Some(3));
    }

    #[test]
    fn test_take_fit_large_list() {
        let mut words = vec![0u64; 256];
        let mut lists = FreeLists::new();

        lists.push(&mut words, 0, 40);
        lists.push(&mut words, 100, 100);

        // 100-word block was pushed last, so it is found first
        assert_eq!(lists.take_fit(&mut words, 80), Some(100));
        assert_eq!(lists.free_words(), 40 + 20);
        assert_eq!(lists.take_fit(&mut words, 40), Some(0));
        assert_eq!(lists.take_fit(&mut words, 30), None);
    }

    #[test]
    fn test_one_word_remainder_is_filler() {
        let mut words = vec![0u64; 16];
        let mut lists = FreeLists::new();

        lists.push(&mut words, 0, 3);
        assert_eq!(lists.take_fit(&mut words, 2), Some(0));

        let filler = GcHeader::from_raw(words[2]);
        assert!(filler.is_free());
        assert_eq!(filler.aux(), 1);
        assert_eq!(lists.free_words(), 1);
        assert_eq!(lists.take_fit(&mut words, 2), None);
    }
}
