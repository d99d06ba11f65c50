//! Image module trait and shared types.
//!
//! An [`ImageModule`] behaves like a compiled C library living in its own
//! address space. Callers cannot hand it Rust slices: they `malloc` a region
//! inside the module, copy bytes in, call an entry point by symbol name with a
//! flat argument list, and copy the result back out. An entry point signals
//! failure by returning [`Ptr::NULL`].
//!
//! The production implementation is
//! [`NativeModule`](super::native::NativeModule). The relay only ever talks to
//! `dyn ImageModule`, so tests swap in the recording [`tests::MockModule`].

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("{symbol}: expected {expected} arguments, got {actual}")]
    Arity {
        symbol: String,
        expected: usize,
        actual: usize,
    },
    #[error("{symbol}: argument {index} has the wrong type")]
    ArgumentType { symbol: String, index: usize },
    #[error("invalid pointer {0}")]
    InvalidPointer(Ptr),
    #[error("access of {len} bytes at {ptr} is out of bounds")]
    OutOfBounds { ptr: Ptr, len: usize },
    #[error("{0}")]
    LoadFailed(String),
}

/// Offset into a module's linear memory. Zero is never a valid allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptr(pub u32);

impl Ptr {
    pub const NULL: Ptr = Ptr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// One argument of an entry point call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    U32(u32),
    F64(f64),
    Ptr(Ptr),
}

/// Snapshot of a module's heap usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub live_allocations: usize,
    pub bytes_in_use: usize,
    pub heap_size: usize,
}

/// A loaded image-processing module with private linear memory.
///
/// Every method is called from the relay thread only; `Send` is required so
/// the loader can construct the module there.
pub trait ImageModule: Send {
    /// Reserve `len` bytes. Returns [`Ptr::NULL`] when memory is exhausted.
    fn malloc(&mut self, len: usize) -> Ptr;

    /// Release a region returned by [`malloc`](Self::malloc) or an entry
    /// point. Freeing [`Ptr::NULL`] is a no-op.
    fn free(&mut self, ptr: Ptr) -> Result<(), ModuleError>;

    /// Copy `bytes` into module memory starting at `ptr`.
    fn write(&mut self, ptr: Ptr, bytes: &[u8]) -> Result<(), ModuleError>;

    /// Copy `len` bytes out of module memory starting at `ptr`.
    fn read(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, ModuleError>;

    /// Invoke an exported entry point.
    fn call(&mut self, symbol: &str, args: &[Arg]) -> Result<Ptr, ModuleError>;

    fn memory_stats(&self) -> MemoryStats;
}

/// Produces the single module instance a relay owns.
pub trait ModuleLoader: Send {
    fn load(&self) -> Result<Box<dyn ImageModule>, ModuleError>;
}
