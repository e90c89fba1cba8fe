//! A small Lisp-like object model hosted on the semispace heap
//!
//! Every object starts with a `GcHeader` carrying one of the tags below:
//! - `Cons`: a pair of nullable references
//! - `Num`: a boxed integer
//! - `Vector`: a fixed number of nullable references stored inline after the fixed part

use core::mem::size_of;

use semispace_gc::{
    AllocResult, GcHeader, GcPtr, GcResult, GcStats, GcVisitor, Handle, HandleScope, Heap,
    HeapOptions, ObjectModel,
};

pub const TAG_CONS: usize = 0;
pub const TAG_NUM: usize = 1;
pub const TAG_VECTOR: usize = 2;

/// A nullable reference to any object
pub type Value = Option<GcPtr<GcHeader>>;

#[repr(C)]
pub struct Cons {
    header: GcHeader,
    pub car: Value,
    pub cdr: Value,
}

#[repr(C)]
pub struct Num {
    header: GcHeader,
    pub value: i64,
}

#[repr(C)]
pub struct Vector {
    header: GcHeader,
    len: usize,
    // Followed by `len` slots of type `Value`
}

impl Vector {
    /// Size in bytes of a vector with `len` slots, saturating on overflow
    pub fn size_for_len(len: usize) -> usize {
        len.saturating_mul(size_of::<Value>())
            .saturating_add(size_of::<Vector>())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn slots_ptr(&self) -> *mut Value {
        unsafe { (self as *const Vector).add(1) as *mut Value }
    }

    pub fn get(&self, index: usize) -> Value {
        assert!(index < self.len, "vector index {} out of bounds", index);
        unsafe { self.slots_ptr().add(index).read() }
    }

    pub fn set(&mut self, index: usize, value: Value) {
        assert!(index < self.len, "vector index {} out of bounds", index);
        unsafe { self.slots_ptr().add(index).write(value) }
    }
}

/// Typed view of an object, decoded from its tag
#[derive(Clone, Copy, Debug)]
pub enum ObjectRef {
    Cons(GcPtr<Cons>),
    Num(GcPtr<Num>),
    Vector(GcPtr<Vector>),
}

impl ObjectRef {
    pub fn from_header(object: GcPtr<GcHeader>) -> ObjectRef {
        match object.tag() {
            TAG_CONS => ObjectRef::Cons(object.cast()),
            TAG_NUM => ObjectRef::Num(object.cast()),
            TAG_VECTOR => ObjectRef::Vector(object.cast()),
            tag => panic!("unknown object tag {} at {:p}", tag, object),
        }
    }
}

/// The host side of the heap. Owns the global variables, which are roots the collector reaches
/// through `ObjectModel::visit_roots` rather than through handle scopes.
#[derive(Default)]
pub struct Runtime {
    globals: Vec<Value>,
    objects_traced: usize,
}

impl Runtime {
    /// Number of objects traced over all collections
    pub fn objects_traced(&self) -> usize {
        self.objects_traced
    }
}

impl ObjectModel for Runtime {
    fn object_size(object: GcPtr<GcHeader>) -> usize {
        match ObjectRef::from_header(object) {
            ObjectRef::Cons(_) => size_of::<Cons>(),
            ObjectRef::Num(_) => size_of::<Num>(),
            ObjectRef::Vector(vector) => Vector::size_for_len(vector.len()),
        }
    }

    fn trace_object(&mut self, object: GcPtr<GcHeader>, visitor: &mut impl GcVisitor) {
        self.objects_traced += 1;

        match ObjectRef::from_header(object) {
            ObjectRef::Cons(mut cons) => {
                visitor.visit_opt(&mut cons.car);
                visitor.visit_opt(&mut cons.cdr);
            }
            ObjectRef::Num(_) => {}
            ObjectRef::Vector(vector) => {
                for index in 0..vector.len() {
                    unsafe { visitor.visit_opt(&mut *vector.slots_ptr().add(index)) };
                }
            }
        }
    }

    fn visit_roots(&mut self, visitor: &mut impl GcVisitor) {
        for global in &mut self.globals {
            visitor.visit_opt(global);
        }
    }
}

/// A heap together with the runtime that describes its objects.
///
/// Constructors that take children take them as handles, and only read them after their own
/// allocation, which may have moved them.
pub struct Machine {
    heap: Heap,
    runtime: Runtime,
}

impl Machine {
    pub fn new(options: HeapOptions) -> GcResult<Machine> {
        Ok(Machine {
            heap: Heap::with_options(options)?,
            runtime: Runtime::default(),
        })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn stats(&self) -> &GcStats {
        self.heap.stats()
    }

    pub fn collect(&mut self) {
        self.heap.collect(&mut self.runtime);
    }

    pub fn num(&mut self, value: i64) -> AllocResult<GcPtr<Num>> {
        let num = self.heap.alloc::<Num>(&mut self.runtime)?;
        unsafe {
            num.as_ptr().write(Num {
                header: GcHeader::new(TAG_NUM),
                value,
            });
        }

        Ok(num)
    }

    pub fn cons(
        &mut self,
        car: Option<Handle<'_, GcHeader>>,
        cdr: Option<Handle<'_, GcHeader>>,
    ) -> AllocResult<GcPtr<Cons>> {
        let cons = self.heap.alloc::<Cons>(&mut self.runtime)?;
        unsafe {
            cons.as_ptr().write(Cons {
                header: GcHeader::new(TAG_CONS),
                car: car.map(|car| car.get()),
                cdr: cdr.map(|cdr| cdr.get()),
            });
        }

        Ok(cons)
    }

    /// Allocate a vector with every slot empty
    pub fn vector(&mut self, len: usize) -> AllocResult<GcPtr<Vector>> {
        let size = Vector::size_for_len(len);
        let mut vector = self
            .heap
            .alloc_with_size::<Vector>(&mut self.runtime, size)?;
        unsafe {
            vector.as_ptr().write(Vector {
                header: GcHeader::new(TAG_VECTOR),
                len,
            });
        }

        for index in 0..len {
            vector.set(index, None);
        }

        Ok(vector)
    }

    /// Build a proper list of numbers, in order
    pub fn list(&mut self, values: &[i64]) -> AllocResult<Option<GcPtr<Cons>>> {
        let scope = HandleScope::new();
        let mut head: Option<Handle<'_, GcHeader>> = None;

        for &value in values.iter().rev() {
            let cell = HandleScope::run(|inner| -> AllocResult<GcPtr<Cons>> {
                let num = inner.handle(self.num(value)?);
                self.cons(Some(num.cast()), head)
            })?;

            match head {
                Some(head) => head.set(cell.header()),
                None => head = Some(scope.handle(cell.header())),
            }
        }

        Ok(head.map(|head| head.get().cast()))
    }

    /// Add a global variable, returning its index
    pub fn define_global(&mut self, value: Value) -> usize {
        self.runtime.globals.push(value);
        self.runtime.globals.len() - 1
    }

    pub fn global(&self, index: usize) -> Value {
        self.runtime.globals[index]
    }

    pub fn set_global(&mut self, index: usize, value: Value) {
        self.runtime.globals[index] = value;
    }
}

/// Value of a number object, or `None` for any other value
pub fn num_value(value: Value) -> Option<i64> {
    match ObjectRef::from_header(value?) {
        ObjectRef::Num(num) => Some(num.value),
        _ => None,
    }
}

/// Walk a chain of cons cells through their cdrs, calling `f` on every car
fn walk_list(mut value: Value, mut f: impl FnMut(Value)) {
    while let Some(object) = value {
        match ObjectRef::from_header(object) {
            ObjectRef::Cons(cons) => {
                f(cons.car);
                value = cons.cdr;
            }
            _ => {
                f(Some(object));
                return;
            }
        }
    }
}

/// Number of cons cells in a list
pub fn list_length(list: Value) -> usize {
    let mut length = 0;
    let mut current = list;
    while let Some(ObjectRef::Cons(cons)) = current.map(ObjectRef::from_header) {
        length += 1;
        current = cons.cdr;
    }

    length
}

/// Sum of the numbers in a list. A number in tail position counts as the last element.
pub fn sum_list(list: Value) -> i64 {
    let mut sum = 0;
    walk_list(list, |value| sum += num_value(value).unwrap_or(0));
    sum
}

#[cfg(test)]
mod tests {
    use semispace_gc::HeapOptionsBuilder;

    use super::*;

    fn machine(heap_size: usize) -> Machine {
        let options = HeapOptionsBuilder::new()
            .heap_size(heap_size)
            .gc_stress_test(false)
            .build();
        Machine::new(options).unwrap()
    }

    #[test]
    fn test_object_sizes() {
        let mut machine = machine(4096);

        let num = machine.num(1).unwrap();
        let cons = machine.cons(None, None).unwrap();
        let vector = machine.vector(3).unwrap();

        assert_eq!(Runtime::object_size(num.header()), size_of::<Num>());
        assert_eq!(Runtime::object_size(cons.header()), size_of::<Cons>());
        assert_eq!(
            Runtime::object_size(vector.header()),
            size_of::<Vector>() + 3 * size_of::<Value>()
        );
    }

    #[test]
    fn test_list_helpers() {
        let mut machine = machine(4096);

        let list = machine.list(&[1, 2, 3, 4]).unwrap();

        assert_eq!(list_length(list.map(|list| list.header())), 4);
        assert_eq!(sum_list(list.map(|list| list.header())), 10);
        assert_eq!(list_length(None), 0);
        assert_eq!(sum_list(None), 0);
    }

    #[test]
    fn test_empty_list() {
        let mut machine = machine(4096);
        assert!(machine.list(&[]).unwrap().is_none());
        assert_eq!(machine.stats().collections, 0);
    }

    #[test]
    fn test_globals_are_roots() {
        let mut machine = machine(4096);

        let num = machine.num(-5).unwrap();
        let index = machine.define_global(Some(num.header()));
        let empty = machine.define_global(None);
        machine.collect();

        let global = machine.global(index);
        assert_ne!(global, Some(num.header()));
        assert!(machine.heap().contains(global.unwrap()));
        assert_eq!(num_value(global), Some(-5));
        assert_eq!(machine.global(empty), None);
        assert_eq!(machine.runtime().objects_traced(), 1);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_vector_bounds() {
        let mut machine = machine(4096);
        let vector = machine.vector(2).unwrap();
        vector.get(2);
    }
}
