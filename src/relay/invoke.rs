//! One `process` request against an [`ImageModule`].
//!
//! The sequence mirrors how a compiled module is driven from outside:
//!
//! ```text
//! malloc(W*H*4) → write pixels → call symbol(args…) → read W*H*C → free both
//! ```
//!
//! Both the input region and (when one was returned) the output region are
//! freed exactly once on every exit path, including a null result, a module
//! fault and a panic inside the module.

use crate::imaging::native::{GAUSSIAN_BLUR, GRAYSCALE, OTSU_THRESHOLD, SOBEL};
use crate::imaging::{Arg, ImageModule, ModuleError, Ptr};
use crate::relay::protocol::Payload;
use crate::types::{ImageBuffer, Operation, UnknownOperation};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperation),
    #[error("image module not initialized")]
    NotInitialized,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("image module out of memory")]
    OutOfMemory,
    #[error("Failed to process image")]
    NullResult,
    #[error("image module fault: {0}")]
    Module(#[from] ModuleError),
    #[error("image module panicked: {0}")]
    Panicked(String),
}

/// Tunable arguments forwarded to the entry points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub blur_radius: f64,
    pub use_double_threshold: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            blur_radius: 5.0,
            use_double_threshold: false,
        }
    }
}

/// Calling convention of one operation.
struct CallSpec {
    symbol: &'static str,
    args: Vec<Arg>,
    channels: u8,
}

impl CallSpec {
    fn new(op: Operation, width: u32, height: u32, input: Ptr, params: &FilterParams) -> Self {
        let (w, h, data) = (Arg::U32(width), Arg::U32(height), Arg::Ptr(input));
        let (symbol, args) = match op {
            Operation::Grayscale => (GRAYSCALE, vec![w, h, data]),
            Operation::Blur => (GAUSSIAN_BLUR, vec![w, h, Arg::F64(params.blur_radius), data]),
            Operation::Sobel => (SOBEL, vec![w, h, Arg::U32(4), data]),
            Operation::Binary => (
                OTSU_THRESHOLD,
                vec![w, h, Arg::U32(params.use_double_threshold as u32), data],
            ),
        };
        Self {
            symbol,
            args,
            channels: op.output_channels(),
        }
    }
}

/// Run `operation` over an RGBA frame inside `module`.
pub fn process(
    module: &mut dyn ImageModule,
    operation: &str,
    pixels: &[u8],
    width: u32,
    height: u32,
    params: &FilterParams,
) -> Result<Payload, RelayError> {
    let op: Operation = operation.parse()?;
    let image = ImageBuffer::expected_len(width, height, 4)
        .filter(|&n| n > 0)
        .ok_or_else(|| RelayError::InvalidInput(format!("{width}x{height} is not a valid frame size")))?;
    if pixels.len() != image {
        return Err(RelayError::InvalidInput(format!(
            "expected {image} bytes for a {width}x{height} RGBA frame, got {}",
            pixels.len()
        )));
    }

    let input = module.malloc(pixels.len());
    if input.is_null() {
        return Err(RelayError::OutOfMemory);
    }

    let mut output = Ptr::NULL;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run(&mut *module, op, input, pixels, width, height, params, &mut output)
    }));
    let released = release(module, input, output);

    let payload = match outcome {
        Ok(result) => result?,
        Err(panic) => return Err(RelayError::Panicked(panic_message(panic.as_ref()))),
    };
    released?;
    Ok(payload)
}

#[allow(clippy::too_many_arguments)]
fn run(
    module: &mut dyn ImageModule,
    op: Operation,
    input: Ptr,
    pixels: &[u8],
    width: u32,
    height: u32,
    params: &FilterParams,
    output: &mut Ptr,
) -> Result<Payload, RelayError> {
    module.write(input, pixels)?;

    let spec = CallSpec::new(op, width, height, input, params);
    *output = module.call(spec.symbol, &spec.args)?;
    if output.is_null() {
        return Err(RelayError::NullResult);
    }

    let len = width as usize * height as usize * spec.channels as usize;
    Ok(Payload {
        pixels: module.read(*output, len)?,
        width,
        height,
        channels: spec.channels,
    })
}

fn release(module: &mut dyn ImageModule, input: Ptr, output: Ptr) -> Result<(), ModuleError> {
    let freed_input = module.free(input);
    let freed_output = if output.is_null() {
        Ok(())
    } else {
        module.free(output)
    };
    freed_input.and(freed_output)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::NativeModule;
    use crate::imaging::backend::tests::{MockModule, RecordedOp};

    fn frame(width: u32, height: u32) -> Vec<u8> {
        (0..width * height * 4).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn frees(ops: &[RecordedOp]) -> Vec<Ptr> {
        ops.iter()
            .filter_map(|op| match op {
                RecordedOp::Free(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_operation_returns_declared_length() {
        let mut module = NativeModule::default();
        for op in Operation::ALL {
            let payload = process(
                &mut module,
                op.name(),
                &frame(5, 3),
                5,
                3,
                &FilterParams::default(),
            )
            .unwrap();
            assert_eq!(payload.channels, op.output_channels(), "{op}");
            assert_eq!(payload.pixels.len(), 15 * op.output_channels() as usize);
            assert_eq!((payload.width, payload.height), (5, 3));
        }
        assert_eq!(module.memory_stats().live_allocations, 0);
    }

    #[test]
    fn blur_passes_radius_and_sobel_passes_channels() {
        let mut module = MockModule::new();
        let params = FilterParams {
            blur_radius: 2.5,
            use_double_threshold: true,
        };
        process(&mut module, "blur", &frame(2, 2), 2, 2, &params).unwrap();
        process(&mut module, "sobel", &frame(2, 2), 2, 2, &params).unwrap();
        process(&mut module, "binary", &frame(2, 2), 2, 2, &params).unwrap();

        let calls: Vec<(String, Arg)> = module
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Call { symbol, args } => Some((symbol, args[2])),
                _ => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![
                (GAUSSIAN_BLUR.to_string(), Arg::F64(2.5)),
                (SOBEL.to_string(), Arg::U32(4)),
                (OTSU_THRESHOLD.to_string(), Arg::U32(1)),
            ]
        );
    }

    #[test]
    fn success_frees_input_and_output_once() {
        let mut module = MockModule::new();
        process(&mut module, "grayscale", &frame(2, 2), 2, 2, &FilterParams::default()).unwrap();

        let ops = module.get_operations();
        let mallocs: Vec<Ptr> = ops
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Malloc { ptr, .. } => Some(*ptr),
                _ => None,
            })
            .collect();
        assert_eq!(mallocs.len(), 2);
        assert_eq!(frees(&ops), mallocs);
        assert_eq!(module.live(), 0);
    }

    #[test]
    fn null_result_still_frees_input() {
        let mut module = MockModule::failing(GRAYSCALE);
        let err =
            process(&mut module, "grayscale", &frame(2, 2), 2, 2, &FilterParams::default()).unwrap_err();
        assert_eq!(err, RelayError::NullResult);
        assert_eq!(err.to_string(), "Failed to process image");
        assert_eq!(frees(&module.get_operations()).len(), 1);
        assert_eq!(module.live(), 0);
    }

    #[test]
    fn panic_in_module_is_caught_and_input_freed() {
        let mut module = MockModule::panicking(SOBEL);
        let err =
            process(&mut module, "sobel", &frame(2, 2), 2, 2, &FilterParams::default()).unwrap_err();
        assert_eq!(
            err,
            RelayError::Panicked("mock module exploded in fcv_sobel_edge_detection".into())
        );
        assert_eq!(module.live(), 0);
    }

    #[test]
    fn unknown_operation_names_itself_and_allocates_nothing() {
        let mut module = MockModule::new();
        let err =
            process(&mut module, "unknown", &frame(1, 1), 1, 1, &FilterParams::default()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown operation: unknown");
        assert!(module.get_operations().is_empty());
    }

    #[test]
    fn wrong_buffer_length_is_invalid_input() {
        let mut module = MockModule::new();
        let err = process(&mut module, "blur", &[0; 15], 2, 2, &FilterParams::default()).unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
        assert!(module.get_operations().is_empty());
    }

    #[test]
    fn zero_sized_frame_is_invalid_input() {
        let mut module = MockModule::new();
        let err = process(&mut module, "blur", &[], 0, 4, &FilterParams::default()).unwrap_err();
        assert_eq!(
            err,
            RelayError::InvalidInput("0x4 is not a valid frame size".into())
        );
    }

    #[test]
    fn heap_stays_bounded_over_repeated_calls() {
        let mut module = NativeModule::default();
        let input = frame(16, 16);
        for op in Operation::ALL.iter().cycle().take(200) {
            process(&mut module, op.name(), &input, 16, 16, &FilterParams::default()).unwrap();
        }
        let stats = module.memory_stats();
        assert_eq!(stats.live_allocations, 0);
        assert_eq!(stats.bytes_in_use, 0);
        assert!(stats.heap_size <= 16, "heap grew to {}", stats.heap_size);
    }

    #[test]
    fn oversized_blur_radius_still_renders() {
        let mut module = NativeModule::default();
        let params = FilterParams {
            blur_radius: 1e13,
            ..FilterParams::default()
        };
        let payload = process(&mut module, "blur", &[10; 16], 2, 2, &params).unwrap();
        assert_eq!((payload.width, payload.height, payload.channels), (2, 2, 4));
        assert_eq!(payload.pixels, [10, 10, 10, 255].repeat(4));
        assert_eq!(module.memory_stats().live_allocations, 0);
    }

    #[test]
    fn out_of_memory_before_copy() {
        let mut module = NativeModule::new(32);
        let err = process(&mut module, "grayscale", &frame(4, 4), 4, 4, &FilterParams::default())
            .unwrap_err();
        assert_eq!(err, RelayError::OutOfMemory);
    }

    #[test]
    fn panic_message_handles_both_string_kinds() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }
}
