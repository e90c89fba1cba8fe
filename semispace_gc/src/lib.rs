//! Semispace Garbage Collector
//!
//! A stop-the-world copying collector meant to be embedded in a host runtime. The host decides
//! object layouts, tags and sizes; this crate owns the memory, the bump allocator and
//! reclamation.
//!
//! Key types:
//! - `Heap`: One region split into two semispaces, with bump allocation in the active half
//! - `GcPtr<T>`: A pointer to a GC-managed object
//! - `GcHeader`: First word of every object, either a host tag or a forwarding address
//! - `HandleScope` / `Handle<T>`: Scoped roots for native frames
//!
//! Key traits:
//! - `GcVisitor`: Implemented by the collector, used by objects to report (and rewrite) pointers
//! - `ObjectModel`: Implemented by the runtime, provides object sizes, tracing and external roots

mod collector;
mod error;
mod gc_header;
mod handle;
mod heap;
mod options;
mod pointer;
mod visitor;

pub use collector::GcStats;
pub use error::{AllocResult, GcError, GcResult};
pub use gc_header::{GcHeader, HeaderState, NOT_FORWARDED_BIT};
#[cfg(feature = "handle_stats")]
pub use handle::{handle_stats, HandleStats};
pub use handle::{
    assert_no_live_frames, live_frame_count, live_slot_count, Handle, HandleScope,
    HANDLE_FRAME_CAPACITY,
};
pub use heap::Heap;
pub use options::{HeapOptions, HeapOptionsBuilder, DEFAULT_HEAP_SIZE};
pub use pointer::GcPtr;
pub use visitor::{GcVisitor, ObjectModel};
