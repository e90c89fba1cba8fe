//! Heap options
//!
//! Settings fixed when a heap is created, built with `HeapOptionsBuilder`.

/// Default heap size in bytes, covering both semispaces.
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024;

/// Options used to create a heap.
#[derive(Clone, Debug)]
pub struct HeapOptions {
    /// The heap size in bytes. Rounded up to the page size and split into two semispaces.
    pub heap_size: usize,

    /// Run a full collection before every allocation
    pub gc_stress_test: bool,

    /// Overwrite the abandoned from-space with garbage after every collection, so that reads
    /// through stale pointers are caught early
    pub poison_from_space: bool,
}

impl Default for HeapOptions {
    /// Create a new options struct with default values.
    fn default() -> Self {
        HeapOptionsBuilder::new().build()
    }
}

pub struct HeapOptionsBuilder(HeapOptions);

impl HeapOptionsBuilder {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self(HeapOptions {
            heap_size: DEFAULT_HEAP_SIZE,
            gc_stress_test: cfg!(feature = "gc_stress_test"),
            poison_from_space: cfg!(feature = "gc_stress_test"),
        })
    }

    /// Return the options that have been built, consuming the builder.
    pub fn build(self) -> HeapOptions {
        self.0
    }

    pub fn heap_size(mut self, heap_size: usize) -> Self {
        self.0.heap_size = heap_size;
        self
    }

    pub fn gc_stress_test(mut self, gc_stress_test: bool) -> Self {
        self.0.gc_stress_test = gc_stress_test;
        self
    }

    pub fn poison_from_space(mut self, poison_from_space: bool) -> Self {
        self.0.poison_from_space = poison_from_space;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let options = HeapOptionsBuilder::new()
            .heap_size(64 * 1024)
            .gc_stress_test(true)
            .poison_from_space(true)
            .build();

        assert_eq!(options.heap_size, 64 * 1024);
        assert!(options.gc_stress_test);
        assert!(options.poison_from_space);
    }

    #[test]
    fn test_default_heap_size() {
        assert_eq!(HeapOptions::default().heap_size, DEFAULT_HEAP_SIZE);
    }
}
