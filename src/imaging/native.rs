//! In-process image module with its own linear memory.
//!
//! [`NativeModule`] exposes the same calling convention as a compiled C
//! library: callers allocate inside its [`LinearMemory`], pass pointers and
//! scalars to an exported symbol, and get back a pointer to a freshly
//! allocated result that they must free.
//!
//! ## Exports
//!
//! | Symbol | Arguments | Result |
//! |---|---|---|
//! | `fcv_grayscale` | width, height, rgba | W×H×4 |
//! | `fcv_apply_gaussian_blur` | width, height, radius, rgba | W×H×4 |
//! | `fcv_sobel_edge_detection` | width, height, channels, pixels | W×H×1 |
//! | `fcv_otsu_threshold_rgba` | width, height, use_double_threshold, rgba | W×H×4 |
//!
//! Every export returns null instead of a result for an empty frame, an
//! unsupported argument value, or when the heap is exhausted.

use super::backend::{Arg, ImageModule, MemoryStats, ModuleError, ModuleLoader, Ptr};
use super::filters;
use super::heap::LinearMemory;

pub const GRAYSCALE: &str = "fcv_grayscale";
pub const GAUSSIAN_BLUR: &str = "fcv_apply_gaussian_blur";
pub const SOBEL: &str = "fcv_sobel_edge_detection";
pub const OTSU_THRESHOLD: &str = "fcv_otsu_threshold_rgba";

/// Default heap cap: 256 MiB.
pub const DEFAULT_MEMORY_LIMIT: usize = 256 * 1024 * 1024;

/// See the [module docs](self) for the export table.
pub struct NativeModule {
    memory: LinearMemory,
}

impl NativeModule {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            memory: LinearMemory::new(memory_limit),
        }
    }

    /// Allocate a result region and copy `bytes` into it.
    fn store(&mut self, bytes: &[u8]) -> Result<Ptr, ModuleError> {
        let ptr = self.memory.malloc(bytes.len());
        if !ptr.is_null() {
            self.memory.slice_mut(ptr, bytes.len())?.copy_from_slice(bytes);
        }
        Ok(ptr)
    }

    fn grayscale(&mut self, width: u32, height: u32, input: Ptr) -> Result<Ptr, ModuleError> {
        let Some(px) = frame_pixels(width, height) else {
            return Ok(Ptr::NULL);
        };
        let out = filters::grayscale(self.memory.slice(input, px * 4)?);
        self.store(&out)
    }

    fn gaussian_blur(
        &mut self,
        width: u32,
        height: u32,
        radius: f64,
        input: Ptr,
    ) -> Result<Ptr, ModuleError> {
        let Some(px) = frame_pixels(width, height) else {
            return Ok(Ptr::NULL);
        };
        if !radius.is_finite() || radius < 0.0 {
            return Ok(Ptr::NULL);
        }
        let rgba = self.memory.slice(input, px * 4)?;
        let out = filters::gaussian_blur(rgba, width as usize, height as usize, radius);
        self.store(&out)
    }

    fn sobel(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        input: Ptr,
    ) -> Result<Ptr, ModuleError> {
        let Some(px) = frame_pixels(width, height) else {
            return Ok(Ptr::NULL);
        };
        let gray = match channels {
            1 => self.memory.slice(input, px)?.to_vec(),
            4 => filters::luma(self.memory.slice(input, px * 4)?),
            _ => return Ok(Ptr::NULL),
        };
        let out = filters::sobel(&gray, width as usize, height as usize);
        self.store(&out)
    }

    fn otsu_threshold(
        &mut self,
        width: u32,
        height: u32,
        double_threshold: u32,
        input: Ptr,
    ) -> Result<Ptr, ModuleError> {
        let Some(px) = frame_pixels(width, height) else {
            return Ok(Ptr::NULL);
        };
        let out = filters::otsu_threshold(self.memory.slice(input, px * 4)?, double_threshold != 0);
        self.store(&out)
    }
}

impl Default for NativeModule {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

/// Pixel count of a non-empty frame, `None` for empty or overflowing sizes.
fn frame_pixels(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .filter(|&n| n > 0 && n.checked_mul(4).is_some())
}

/// Typed access to a flat argument list.
struct Args<'a> {
    symbol: &'a str,
    args: &'a [Arg],
}

impl<'a> Args<'a> {
    fn new(symbol: &'a str, args: &'a [Arg], expected: usize) -> Result<Self, ModuleError> {
        if args.len() != expected {
            return Err(ModuleError::Arity {
                symbol: symbol.to_string(),
                expected,
                actual: args.len(),
            });
        }
        Ok(Self { symbol, args })
    }

    fn mismatch(&self, index: usize) -> ModuleError {
        ModuleError::ArgumentType {
            symbol: self.symbol.to_string(),
            index,
        }
    }

    fn u32(&self, index: usize) -> Result<u32, ModuleError> {
        match self.args[index] {
            Arg::U32(v) => Ok(v),
            _ => Err(self.mismatch(index)),
        }
    }

    fn f64(&self, index: usize) -> Result<f64, ModuleError> {
        match self.args[index] {
            Arg::F64(v) => Ok(v),
            Arg::U32(v) => Ok(v as f64),
            _ => Err(self.mismatch(index)),
        }
    }

    fn ptr(&self, index: usize) -> Result<Ptr, ModuleError> {
        match self.args[index] {
            Arg::Ptr(p) => Ok(p),
            _ => Err(self.mismatch(index)),
        }
    }
}

impl ImageModule for NativeModule {
    fn malloc(&mut self, len: usize) -> Ptr {
        self.memory.malloc(len)
    }

    fn free(&mut self, ptr: Ptr) -> Result<(), ModuleError> {
        self.memory.free(ptr)
    }

    fn write(&mut self, ptr: Ptr, bytes: &[u8]) -> Result<(), ModuleError> {
        self.memory
            .slice_mut(ptr, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, ptr: Ptr, len: usize) -> Result<Vec<u8>, ModuleError> {
        Ok(self.memory.slice(ptr, len)?.to_vec())
    }

    fn call(&mut self, symbol: &str, args: &[Arg]) -> Result<Ptr, ModuleError> {
        match symbol {
            GRAYSCALE => {
                let a = Args::new(symbol, args, 3)?;
                self.grayscale(a.u32(0)?, a.u32(1)?, a.ptr(2)?)
            }
            GAUSSIAN_BLUR => {
                let a = Args::new(symbol, args, 4)?;
                self.gaussian_blur(a.u32(0)?, a.u32(1)?, a.f64(2)?, a.ptr(3)?)
            }
            SOBEL => {
                let a = Args::new(symbol, args, 4)?;
                self.sobel(a.u32(0)?, a.u32(1)?, a.u32(2)?, a.ptr(3)?)
            }
            OTSU_THRESHOLD => {
                let a = Args::new(symbol, args, 4)?;
                self.otsu_threshold(a.u32(0)?, a.u32(1)?, a.u32(2)?, a.ptr(3)?)
            }
            _ => Err(ModuleError::UnknownSymbol(symbol.to_string())),
        }
    }

    fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }
}

/// Loads a fresh [`NativeModule`] with a fixed heap cap.
pub struct NativeLoader {
    memory_limit: usize,
}

impl NativeLoader {
    pub fn new(memory_limit: usize) -> Self {
        Self { memory_limit }
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

impl ModuleLoader for NativeLoader {
    fn load(&self) -> Result<Box<dyn ImageModule>, ModuleError> {
        Ok(Box::new(NativeModule::new(self.memory_limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(module: &mut NativeModule, bytes: &[u8]) -> Ptr {
        let ptr = module.malloc(bytes.len());
        module.write(ptr, bytes).unwrap();
        ptr
    }

    fn checker(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let v = if (i % width + i / width) % 2 == 0 { 0 } else { 255 };
                [v, v, v, 255]
            })
            .collect()
    }

    #[test]
    fn grayscale_export_returns_full_frame() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &checker(4, 3));
        let out = module
            .call(GRAYSCALE, &[Arg::U32(4), Arg::U32(3), Arg::Ptr(input)])
            .unwrap();
        assert!(!out.is_null());
        assert_eq!(module.read(out, 48).unwrap().len(), 48);
        assert!(module.read(out, 49).is_err());
    }

    #[test]
    fn sobel_export_returns_single_channel() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &checker(4, 3));
        let out = module
            .call(
                SOBEL,
                &[Arg::U32(4), Arg::U32(3), Arg::U32(4), Arg::Ptr(input)],
            )
            .unwrap();
        assert_eq!(module.read(out, 12).unwrap().len(), 12);
        assert!(module.read(out, 13).is_err());
    }

    #[test]
    fn sobel_rejects_three_channels() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &[0; 36]);
        let out = module
            .call(
                SOBEL,
                &[Arg::U32(4), Arg::U32(3), Arg::U32(3), Arg::Ptr(input)],
            )
            .unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn blur_accepts_integer_radius() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &checker(2, 2));
        let out = module
            .call(
                GAUSSIAN_BLUR,
                &[Arg::U32(2), Arg::U32(2), Arg::U32(1), Arg::Ptr(input)],
            )
            .unwrap();
        assert!(!out.is_null());
    }

    #[test]
    fn blur_negative_radius_is_null() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &checker(2, 2));
        let out = module
            .call(
                GAUSSIAN_BLUR,
                &[Arg::U32(2), Arg::U32(2), Arg::F64(-1.0), Arg::Ptr(input)],
            )
            .unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn empty_frame_is_null() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &[0; 4]);
        let out = module
            .call(GRAYSCALE, &[Arg::U32(0), Arg::U32(1), Arg::Ptr(input)])
            .unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn undersized_input_is_out_of_bounds() {
        let mut module = NativeModule::default();
        let input = upload(&mut module, &[0; 8]);
        let err = module
            .call(GRAYSCALE, &[Arg::U32(4), Arg::U32(4), Arg::Ptr(input)])
            .unwrap_err();
        assert!(matches!(err, ModuleError::OutOfBounds { len: 64, .. }));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let mut module = NativeModule::default();
        let err = module.call(GRAYSCALE, &[Arg::U32(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "fcv_grayscale: expected 3 arguments, got 1"
        );
    }

    #[test]
    fn wrong_argument_type_is_reported() {
        let mut module = NativeModule::default();
        let err = module
            .call(GRAYSCALE, &[Arg::U32(1), Arg::U32(1), Arg::U32(8)])
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::ArgumentType {
                symbol: GRAYSCALE.into(),
                index: 2
            }
        );
    }

    #[test]
    fn unknown_symbol_is_reported() {
        let mut module = NativeModule::default();
        let err = module.call("fcv_rotate", &[]).unwrap_err();
        assert_eq!(err, ModuleError::UnknownSymbol("fcv_rotate".into()));
    }

    #[test]
    fn exhausted_heap_returns_null_result() {
        // room for the 64-byte input but not the 64-byte output
        let mut module = NativeModule::new(8 + 64 + 32);
        let input = upload(&mut module, &checker(4, 4));
        let out = module
            .call(GRAYSCALE, &[Arg::U32(4), Arg::U32(4), Arg::Ptr(input)])
            .unwrap();
        assert!(out.is_null());
        assert_eq!(module.memory_stats().live_allocations, 1);
    }

    #[test]
    fn loader_builds_fresh_module() {
        let loader = NativeLoader::default();
        let module = loader.load().unwrap();
        assert_eq!(module.memory_stats().live_allocations, 0);
    }
}
