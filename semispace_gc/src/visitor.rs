//! GC Visitor and ObjectModel traits
//!
//! These traits allow the GC to be decoupled from the runtime types.
//! - `GcVisitor`: Implemented by the collector, used by objects to report their pointers
//! - `ObjectModel`: Implemented by the runtime, provides object sizes, tracing and root scanning

use crate::{GcHeader, GcPtr};

/// GC Visitor trait - implemented by the collector
///
/// Objects call methods on this trait to report their pointer fields during tracing. The visitor
/// receives the field itself, not a copy, and may overwrite it with the object's new address.
///
/// # Example
/// ```ignore
/// fn trace_pair(pair: &mut Pair, visitor: &mut impl GcVisitor) {
///     visitor.visit(&mut pair.first);
///     visitor.visit_opt(&mut pair.rest);
/// }
/// ```
pub trait GcVisitor {
    /// Visit a strongly held pointer
    ///
    /// Copies the target out of from-space if this is the first visit, and rewrites the field to
    /// point at the copy.
    fn visit<T>(&mut self, ptr: &mut GcPtr<T>);

    /// Visit an optional strongly held pointer
    #[inline]
    fn visit_opt<T>(&mut self, ptr: &mut Option<GcPtr<T>>) {
        if let Some(p) = ptr {
            self.visit(p);
        }
    }
}

/// Object model - implemented by the runtime
///
/// Provides the GC with object sizes, the pointer fields of each object, and any roots the
/// runtime holds outside of handle scopes. Tags are the runtime's own; the collector only ever
/// passes objects whose header holds a tag.
///
/// # Example
/// ```ignore
/// impl ObjectModel for Runtime {
///     fn object_size(object: GcPtr<GcHeader>) -> usize {
///         match object.tag() {
///             TAG_NUM => size_of::<Num>(),
///             TAG_PAIR => size_of::<Pair>(),
///             tag => panic!("unknown tag: {}", tag),
///         }
///     }
///
///     fn trace_object(&mut self, object: GcPtr<GcHeader>, visitor: &mut impl GcVisitor) {
///         if object.tag() == TAG_PAIR {
///             let mut pair = object.cast::<Pair>();
///             visitor.visit_opt(&mut pair.first);
///             visitor.visit_opt(&mut pair.rest);
///         }
///     }
/// }
/// ```
pub trait ObjectModel {
    /// Size of an object in bytes, including its header
    ///
    /// Must depend only on the object's own header and payload. Called when an object is copied
    /// and again when the scan moves past its copy.
    fn object_size(object: GcPtr<GcHeader>) -> usize;

    /// Trace an object's pointers
    ///
    /// Implementation should call `visitor.visit()` exactly once for every pointer field of the
    /// object, dispatching on the object's tag.
    fn trace_object(&mut self, object: GcPtr<GcHeader>, visitor: &mut impl GcVisitor);

    /// Visit all roots held by the runtime outside of handle scopes
    ///
    /// Roots registered through `HandleScope` are visited by the collector itself and must not be
    /// reported here.
    fn visit_roots(&mut self, visitor: &mut impl GcVisitor) {
        // Default: no external roots
        let _ = visitor;
    }
}
