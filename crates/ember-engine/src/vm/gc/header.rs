//! GC object header
//!
//! Every block in the heap region starts with a one-word header that stores
//! metadata for the collector.

use crate::vm::types::ClassId;

const MARK_BIT: u64 = 1 << 0;
const ARRAY_BIT: u64 = 1 << 1;
const FREE_BIT: u64 = 1 << 2;
const CLASS_SHIFT: u32 = 8;
const CLASS_MASK: u64 = 0x00FF_FFFF;
const AUX_SHIFT: u32 = 32;

/// Header word stored before each object, array, or free block
///
/// Layout of the 64-bit word:
/// ```text
/// ┌──────────────────────┬──────────────────┬──────────┬─────────────┐
/// │ aux (32 bits)        │ class id (24)    │ reserved │ F │ A │ M   │
/// │ 63..32               │ 31..8            │ 7..3     │ 2 │ 1 │ 0   │
/// └──────────────────────┴──────────────────┴──────────┴─────────────┘
/// ```
/// - `M`: mark bit (reachable in the current cycle)
/// - `A`: block is an array; class id names the element class
/// - `F`: block is free; aux holds its size in words
/// - `aux`: forwarding word index while compacting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHeader(u64);

impl GcHeader {
    /// Header for a class instance
    #[inline]
    pub fn object(class: ClassId) -> Self {
        GcHeader((class.0 as u64 & CLASS_MASK) << CLASS_SHIFT)
    }

    /// Header for an array of `element` references
    #[inline]
    pub fn array(element: ClassId) -> Self {
        GcHeader(((element.0 as u64 & CLASS_MASK) << CLASS_SHIFT) | ARRAY_BIT)
    }

    /// Header for a free block of `words` words
    #[inline]
    pub fn free(words: usize) -> Self {
        GcHeader(FREE_BIT | ((words as u64) << AUX_SHIFT))
    }

    /// Decode a raw header word
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        GcHeader(raw)
    }

    /// Raw header word
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Check if this object is marked
    #[inline]
    pub fn is_marked(self) -> bool {
        self.0 & MARK_BIT != 0
    }

    /// Mark this object as reachable
    #[inline]
    pub fn marked(self) -> Self {
        GcHeader(self.0 | MARK_BIT)
    }

    /// Clear the mark bit and the auxiliary field (for the next cycle)
    #[inline]
    pub fn reset(self) -> Self {
        GcHeader(self.0 & !(MARK_BIT | (u64::MAX << AUX_SHIFT)))
    }

    /// Check if the block is an array
    #[inline]
    pub fn is_array(self) -> bool {
        self.0 & ARRAY_BIT != 0
    }

    /// Check if the block is free space
    #[inline]
    pub fn is_free(self) -> bool {
        self.0 & FREE_BIT != 0
    }

    /// Class id (element class for arrays)
    #[inline]
    pub fn class_id(self) -> ClassId {
        ClassId(((self.0 >> CLASS_SHIFT) & CLASS_MASK) as u32)
    }

    /// Auxiliary field
    #[inline]
    pub fn aux(self) -> usize {
        (self.0 >> AUX_SHIFT) as usize
    }

    /// Replace the auxiliary field
    #[inline]
    pub fn with_aux(self, aux: usize) -> Self {
        debug_assert!(aux <= u32::MAX as usize);
        GcHeader((self.0 & !(u64::MAX << AUX_SHIFT)) | ((aux as u64) << AUX_SHIFT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        // One heap word
        assert_eq!(std::mem::size_of::<GcHeader>(), 8);
    }

    #[test]
    fn test_header_mark_reset() {
        let header = GcHeader::object(ClassId(7));
        assert!(!header.is_marked());

        let marked = header.marked().with_aux(1234);
        assert!(marked.is_marked());
        assert_eq!(marked.aux(), 1234);
        assert_eq!(marked.class_id(), ClassId(7));

        let reset = marked.reset();
        assert!(!reset.is_marked());
        assert_eq!(reset.aux(), 0);
        assert_eq!(reset, header);
    }

    #[test]
    fn test_header_array() {
        let header = GcHeader::array(ClassId(3));
        assert!(header.is_array());
        assert!(!header.is_free());
        assert_eq!(header.class_id(), ClassId(3));
    }

    #[test]
    fn test_header_free_block() {
        let header = GcHeader::free(42);
        assert!(header.is_free());
        assert!(!header.is_array());
        assert_eq!(header.aux(), 42);
    }

    #[test]
    fn test_max_class_id() {
        let id = ClassId(CLASS_MASK as u32);
        assert_eq!(GcHeader::object(id).with_aux(u32::MAX as usize).class_id(), id);
    }
}
