//! CLI output formatting.
//!
//! Every `format_*` function is pure and returns lines; the `print_*`
//! wrappers write them to stdout. Tests assert on the lines directly.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! Image module ready
//! Source: bundled default (96x64)
//! Grayscale filter   96x64  4ch  1.2ms → out/grayscale.png
//! Edge detection     96x64  4ch  0.9ms → out/sobel.png
//! Blur filter        failed: Failed to apply blur filter: Failed to process image
//! ```

use crate::controller::DefaultImage;
use crate::session::FilterOutcome;
use crate::types::ImageBuffer;
use std::path::Path;
use std::time::Duration;

/// Width of the operation column, wide enough for every display name.
const NAME_WIDTH: usize = 18;

fn format_duration(elapsed: Duration) -> String {
    let ms = elapsed.as_secs_f64() * 1000.0;
    if ms < 1000.0 {
        format!("{ms:.1}ms")
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

fn dimensions(image: &ImageBuffer) -> String {
    format!("{}x{}", image.width(), image.height())
}

pub fn format_source(source: &DefaultImage, image: Option<&ImageBuffer>) -> Vec<String> {
    let label = match source {
        DefaultImage::Bundled => "bundled default".to_string(),
        DefaultImage::Path(path) => path.display().to_string(),
    };
    let line = match image {
        Some(image) => format!("Source: {label} ({})", dimensions(image)),
        None => format!("Source: {label} (not loaded)"),
    };
    vec!["Image module ready".to_string(), line]
}

pub fn print_source(source: &DefaultImage, image: Option<&ImageBuffer>) {
    for line in format_source(source, image) {
        println!("{}", line);
    }
}

pub fn format_outcome(outcome: &FilterOutcome, written: Option<&Path>) -> Vec<String> {
    let mut line = format!(
        "{:<NAME_WIDTH$} {}  {}ch  {}",
        outcome.operation.display_name(),
        dimensions(&outcome.image),
        outcome.image.channels(),
        format_duration(outcome.elapsed),
    );
    if let Some(path) = written {
        line.push_str(&format!(" → {}", path.display()));
    }
    vec![line]
}

pub fn print_outcome(outcome: &FilterOutcome, written: Option<&Path>) {
    for line in format_outcome(outcome, written) {
        println!("{}", line);
    }
}

pub fn format_failure(display_name: &str, message: &str) -> Vec<String> {
    vec![format!("{display_name:<NAME_WIDTH$} failed: {message}")]
}

pub fn print_failure(display_name: &str, message: &str) {
    for line in format_failure(display_name, message) {
        println!("{}", line);
    }
}
