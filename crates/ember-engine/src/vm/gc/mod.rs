//! Bounded heap and tracing garbage collector
//!
//! All managed storage lives in one [`HeapRegion`](region::HeapRegion)
//! reserved up front. The [`GarbageCollector`] owns that heap and runs a
//! stop-the-world cycle only when an allocation cannot be satisfied.

mod collector;
mod config;
mod freelist;
mod header;
mod heap;
mod region;
mod roots;

pub use collector::{GarbageCollector, GcPhase, GcStats};
pub use config::{GcConfig, GcStrategy};
pub use freelist::FreeLists;
pub use header::GcHeader;
pub use heap::{Heap, HeapStats, ARRAY_HEADER_WORDS, MIN_BLOCK_WORDS};
pub use region::HeapRegion;
pub use roots::{NoRoots, RootProvider, RootSet};
