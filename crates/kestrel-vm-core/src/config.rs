//! Runtime configuration

use kestrel_gc::GcConfig;

/// Default maximum reentrancy depth
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Default upper bound on a single ArrayBuffer's byte length (2GB)
pub const DEFAULT_MAX_ARRAY_BUFFER_LENGTH: usize = 1 << 31;

/// Configuration for a [`crate::VmContext`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Heap configuration
    pub gc: GcConfig,
    /// Nested call depth before a stack overflow RangeError
    pub max_call_depth: usize,
    /// Largest byte length the ArrayBuffer constructor accepts
    pub max_array_buffer_length: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_array_buffer_length: DEFAULT_MAX_ARRAY_BUFFER_LENGTH,
        }
    }
}

impl RuntimeConfig {
    /// Create config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heap configuration
    pub fn gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }

    /// Set the maximum call depth
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the maximum ArrayBuffer byte length
    pub fn max_array_buffer_length(mut self, bytes: usize) -> Self {
        self.max_array_buffer_length = bytes;
        self
    }
}
