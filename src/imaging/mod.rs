//! The image module the relay drives.
//!
//! | Export | Kernel |
//! |---|---|
//! | `fcv_grayscale` | [`filters::grayscale`] |
//! | `fcv_apply_gaussian_blur` | [`filters::gaussian_blur`] |
//! | `fcv_sobel_edge_detection` | [`filters::luma`] + [`filters::sobel`] |
//! | `fcv_otsu_threshold_rgba` | [`filters::otsu_threshold`] |
//!
//! The module is split into:
//! - **Backend**: [`ImageModule`] + [`ModuleLoader`] traits, pointer and argument types
//! - **Heap**: the linear memory allocator behind [`NativeModule`]
//! - **Filters**: pure pixel kernels (unit testable, no memory model)
//! - **Native**: [`NativeModule`], the symbol table gluing heap and filters together

pub mod backend;
pub mod filters;
mod heap;
pub mod native;

pub use backend::{Arg, ImageModule, MemoryStats, ModuleError, ModuleLoader, Ptr};
pub use native::{NativeLoader, NativeModule};
