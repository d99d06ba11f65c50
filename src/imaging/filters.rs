//! Pixel kernels behind the native module's entry points.
//!
//! Pure functions over row-major byte slices. Input slices are RGBA unless
//! the name says otherwise; callers guarantee `len == width * height * 4`.
//!
//! | Kernel | Output |
//! |---|---|
//! | [`grayscale`] | RGBA, R=G=B=luma, A=255 |
//! | [`gaussian_blur`] | RGBA, separable gaussian, A=255 |
//! | [`sobel`] | one channel, normalised gradient magnitude |
//! | [`otsu_threshold`] | RGBA, black/white split at Otsu's level |
//!
//! Luma is the fixed-point BT.601 approximation `(76 R + 150 G + 30 B) >> 8`.

use crate::types::gray_to_rgba;
use rayon::prelude::*;

const R_WEIGHT: u32 = 76;
const G_WEIGHT: u32 = 150;
const B_WEIGHT: u32 = 30;

/// Offset around Otsu's level used by the double threshold ramp.
const DOUBLE_THRESHOLD_OFFSET: i32 = 16;

fn luma_of(px: &[u8]) -> u8 {
    ((px[0] as u32 * R_WEIGHT + px[1] as u32 * G_WEIGHT + px[2] as u32 * B_WEIGHT) >> 8) as u8
}

/// Single-channel luma of an RGBA buffer.
pub fn luma(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4).map(luma_of).collect()
}

pub fn grayscale(rgba: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; rgba.len()];
    out.par_chunks_mut(4)
        .zip(rgba.par_chunks(4))
        .for_each(|(dst, src)| {
            let gray = luma_of(src);
            dst.copy_from_slice(&[gray, gray, gray, 255]);
        });
    out
}

/// 1D gaussian kernel of `2 * reach + 1` taps and its reach.
///
/// The reach is `trunc(radius)` capped at `extent`; taps past the frame
/// edge are never read, so the cap leaves the output unchanged.
fn gaussian_kernel(radius: f64, extent: usize) -> (Vec<f32>, usize) {
    let reach = (radius.trunc() as usize).min(extent);
    let sigma = (radius / 3.0) as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    // unnormalised; callers divide by the sum of the taps they use
    let kernel = (0..=2 * reach)
        .map(|i| {
            let x = i as f32 - reach as f32;
            (-(x * x) / two_sigma_sq).exp()
        })
        .collect();
    (kernel, reach)
}

/// Gaussian blur with `sigma = radius / 3`, applied horizontally then
/// vertically. Taps falling outside the frame are dropped and the remaining
/// weights renormalised. A radius of zero copies the input.
pub fn gaussian_blur(rgba: &[u8], width: usize, height: usize, radius: f64) -> Vec<u8> {
    if radius == 0.0 {
        return rgba.to_vec();
    }
    let (kernel, reach) = gaussian_kernel(radius, width.max(height));
    let stride = width * 4;

    let mut horizontal = vec![0u8; rgba.len()];
    horizontal
        .par_chunks_mut(stride)
        .zip(rgba.par_chunks(stride))
        .for_each(|(dst, src)| {
            for x in 0..width {
                let lo = x.saturating_sub(reach);
                let hi = (x + reach).min(width - 1);
                let mut sums = [0f32; 3];
                let mut weight_sum = 0f32;
                for sx in lo..=hi {
                    let weight = kernel[sx + reach - x];
                    weight_sum += weight;
                    for c in 0..3 {
                        sums[c] += src[sx * 4 + c] as f32 * weight;
                    }
                }
                write_pixel(&mut dst[x * 4..x * 4 + 4], sums, weight_sum);
            }
        });

    let mut out = vec![0u8; rgba.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, dst)| {
        let lo = y.saturating_sub(reach);
        let hi = (y + reach).min(height - 1);
        for x in 0..width {
            let mut sums = [0f32; 3];
            let mut weight_sum = 0f32;
            for sy in lo..=hi {
                let weight = kernel[sy + reach - y];
                weight_sum += weight;
                let i = sy * stride + x * 4;
                for c in 0..3 {
                    sums[c] += horizontal[i + c] as f32 * weight;
                }
            }
            write_pixel(&mut dst[x * 4..x * 4 + 4], sums, weight_sum);
        }
    });
    out
}

fn write_pixel(dst: &mut [u8], sums: [f32; 3], weight_sum: f32) {
    for c in 0..3 {
        dst[c] = (sums[c] / weight_sum) as u8;
    }
    dst[3] = 255;
}

/// Sobel gradient magnitude of a single-channel image.
///
/// Borders clamp to the nearest pixel. Magnitudes are stretched so the
/// weakest edge maps to 0 and the strongest to 255; a flat image is all 0.
pub fn sobel(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    const KX: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const KY: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    let at = |x: isize, y: isize| -> i32 {
        let cx = x.clamp(0, width as isize - 1) as usize;
        let cy = y.clamp(0, height as isize - 1) as usize;
        gray[cy * width + cx] as i32
    };

    let magnitudes: Vec<f64> = (0..width * height)
        .into_par_iter()
        .map(|i| {
            let (x, y) = ((i % width) as isize, (i / width) as isize);
            let mut gx = 0;
            let mut gy = 0;
            for ky in 0..3 {
                for kx in 0..3 {
                    let pixel = at(x + kx as isize - 1, y + ky as isize - 1);
                    gx += pixel * KX[ky][kx];
                    gy += pixel * KY[ky][kx];
                }
            }
            ((gx * gx + gy * gy) as f64).sqrt()
        })
        .collect();

    let min = magnitudes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = magnitudes.iter().copied().fold(0.0, f64::max);
    let range = if max - min == 0.0 { 1.0 } else { max - min };

    magnitudes
        .iter()
        .map(|m| (((m - min) / range) * 255.0).clamp(0.0, 255.0) as u8)
        .collect()
}

/// Otsu's threshold level for a single-channel image.
pub fn otsu_level(gray: &[u8]) -> u8 {
    let mut histogram = [0u32; 256];
    for &value in gray {
        histogram[value as usize] += 1;
    }
    let total = gray.len() as f32;
    let probability: Vec<f32> = histogram.iter().map(|&n| n as f32 / total).collect();
    let global_mean: f32 = probability
        .iter()
        .enumerate()
        .map(|(i, p)| i as f32 * p)
        .sum();

    let mut weight = 0f32;
    let mut cumulative_mean = 0f32;
    let mut best_variance = 0f32;
    let mut level = 0u8;
    for (i, p) in probability.iter().enumerate() {
        weight += p;
        cumulative_mean += i as f32 * p;
        if weight == 0.0 || weight == 1.0 {
            continue;
        }
        let mean_low = cumulative_mean / weight;
        let mean_high = (global_mean - cumulative_mean) / (1.0 - weight);
        let variance = weight * (1.0 - weight) * (mean_low - mean_high).powi(2);
        if variance > best_variance {
            best_variance = variance;
            level = i as u8;
        }
    }
    level
}

/// Binarise the luma of an RGBA image at Otsu's level.
///
/// With `double_threshold`, values within 16 levels of the threshold are
/// ramped linearly instead of snapped, which keeps anti-aliased edges.
pub fn otsu_threshold(rgba: &[u8], double_threshold: bool) -> Vec<u8> {
    let mut gray = luma(rgba);
    let level = otsu_level(&gray) as i32;

    if double_threshold {
        let lower = (level - DOUBLE_THRESHOLD_OFFSET).clamp(0, 255);
        let upper = (level + DOUBLE_THRESHOLD_OFFSET).clamp(0, 255);
        for value in gray.iter_mut() {
            let v = *value as i32;
            *value = if v < lower {
                0
            } else if v > upper {
                255
            } else if upper == lower {
                255
            } else {
                ((v - lower) * 255 / (upper - lower)) as u8
            };
        }
    } else {
        for value in gray.iter_mut() {
            *value = if *value as i32 > level { 255 } else { 0 };
        }
    }

    gray_to_rgba(&gray)
}
