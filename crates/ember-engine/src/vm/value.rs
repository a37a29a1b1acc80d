//! Values and references
//!
//! References never carry raw addresses. A [`Handle`] is a word index into the
//! heap region, so the collector can rewrite it when objects slide during
//! compaction without the driver special-casing null.

use std::fmt;
use std::num::NonZeroU32;

/// Handle to an object or array living in a heap region
///
/// Stored as `word_index + 1` so that the all-zero slot encodes null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU32);

impl Handle {
    /// Create a handle for the object whose header lives at `index`
    #[inline]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < u32::MAX as usize);
        // index + 1 is never zero
        Handle(NonZeroU32::MIN.saturating_add(index as u32))
    }

    /// Word index of the object header
    #[inline]
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Raw non-zero encoding
    #[inline]
    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.index())
    }
}

/// Nullable reference to a managed object or array
///
/// Every class- or array-typed slot and register uses this one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reference {
    /// The null reference
    #[default]
    Null,
    /// A live object or array
    Handle(Handle),
}

impl Reference {
    /// Check for the null sentinel
    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Reference::Null)
    }

    /// Get the handle if not null
    #[inline]
    pub fn handle(self) -> Option<Handle> {
        match self {
            Reference::Null => None,
            Reference::Handle(h) => Some(h),
        }
    }

    /// Encode into a heap slot word (`0` is null)
    #[inline]
    pub fn to_slot(self) -> u64 {
        match self {
            Reference::Null => 0,
            Reference::Handle(h) => h.raw() as u64,
        }
    }

    /// Decode a heap slot word
    #[inline]
    pub fn from_slot(raw: u64) -> Self {
        match NonZeroU32::new(raw as u32) {
            Some(nz) => Reference::Handle(Handle(nz)),
            None => Reference::Null,
        }
    }
}

impl From<Handle> for Reference {
    fn from(handle: Handle) -> Self {
        Reference::Handle(handle)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Null => write!(f, "null"),
            Reference::Handle(h) => write!(f, "{}", h),
        }
    }
}

/// A register or slot value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Double(f64),
    /// Nullable reference
    Ref(Reference),
}

impl Value {
    /// The null reference value
    #[inline]
    pub fn null() -> Self {
        Value::Ref(Reference::Null)
    }

    /// Integer value
    #[inline]
    pub fn int(v: i64) -> Self {
        Value::Int(v)
    }

    /// Float value
    #[inline]
    pub fn double(v: f64) -> Self {
        Value::Double(v)
    }

    /// Check if this is the null reference
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(Reference::Null))
    }

    /// Check if this is a reference (null included)
    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// Get the integer payload
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the numeric payload as a float (integers are widened)
    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Ref(_) => None,
        }
    }

    /// Get the reference payload
    #[inline]
    pub fn as_reference(&self) -> Option<Reference> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Short name of the value's kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Ref(Reference::Null) => "null",
            Value::Ref(_) => "reference",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Ref(r)
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Value::Ref(Reference::Handle(h))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Ref(r) => write!(f, "{}", r),
        }
    }
}
