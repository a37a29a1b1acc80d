//! Collector configuration
//!
//! Fixed when the heap is created; there is no way to change the ceiling or
//! the strategy of a live heap.

use crate::vm::defaults::{DEFAULT_HEAP_SIZE, MIN_HEAP_SIZE};
use crate::vm::{VmError, VmResult};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// How a collection cycle reclaims dead storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcStrategy {
    /// Mark-compact: slide survivors down, bump-allocate from the tail
    #[default]
    Compact,
    /// Mark-sweep: leave survivors in place, reuse dead blocks via free lists
    Sweep,
}

impl FromStr for GcStrategy {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(GcStrategy::Compact),
            "sweep" => Ok(GcStrategy::Sweep),
            other => Err(VmError::InvalidConfig(format!(
                "unknown gc strategy '{}' (expected 'compact' or 'sweep')",
                other
            ))),
        }
    }
}

impl fmt::Display for GcStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcStrategy::Compact => write!(f, "compact"),
            GcStrategy::Sweep => write!(f, "sweep"),
        }
    }
}

/// Heap and collector configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcConfig {
    /// Heap ceiling in bytes (one reservation of this size)
    pub heap_size: usize,

    /// Reclamation strategy
    pub strategy: GcStrategy,
}

impl GcConfig {
    /// Configuration with a custom ceiling and the default strategy
    pub fn with_heap_size(heap_size: usize) -> Self {
        Self {
            heap_size,
            ..Self::default()
        }
    }

    /// Check that the configuration can back a heap
    pub fn validate(&self) -> VmResult<()> {
        if self.heap_size < MIN_HEAP_SIZE {
            return Err(VmError::InvalidConfig(format!(
                "heap_size must be at least {} bytes, got {}",
                MIN_HEAP_SIZE, self.heap_size
            )));
        }
        Ok(())
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            heap_size: DEFAULT_HEAP_SIZE,
            strategy: GcStrategy::default(),
        }
    }
}
