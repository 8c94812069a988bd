//! Deterministic visual descriptor for images with no usable OCR text.
//!
//! Rather than load a learned vision encoder, this computes a coarse pixel
//! histogram over the raw bytes and projects it into `dim` with a fixed,
//! seeded pseudo-random matrix. Two images with similar byte-level content
//! land near each other; the same image always lands in the same place.
//! This is deliberately cheap: it exists to give un-OCR'able images a
//! stable position in the shared space, not to capture visual semantics.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const HISTOGRAM_BUCKETS: usize = 64;
const PROJECTION_SEED: u64 = 0x5653_554f_5250_4a31; // fixed, arbitrary

pub fn visual_descriptor(bytes: &[u8], dim: usize) -> Vec<f32> {
    let histogram = byte_histogram(bytes);
    project(&histogram, dim)
}

fn byte_histogram(bytes: &[u8]) -> [f32; HISTOGRAM_BUCKETS] {
    let mut buckets = [0u32; HISTOGRAM_BUCKETS];
    for &b in bytes {
        let idx = (b as usize * HISTOGRAM_BUCKETS) / 256;
        buckets[idx] += 1;
    }
    let total = bytes.len().max(1) as f32;
    let mut out = [0.0f32; HISTOGRAM_BUCKETS];
    for (i, count) in buckets.iter().enumerate() {
        out[i] = *count as f32 / total;
    }
    out
}

/// Projects `histogram` into `dim` dimensions with a matrix seeded once at
/// compile-time-equivalent precision, so the same input always maps to the
/// same output vector regardless of process or platform.
fn project(histogram: &[f32; HISTOGRAM_BUCKETS], dim: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(PROJECTION_SEED);
    let matrix: Vec<f32> = (0..dim * HISTOGRAM_BUCKETS)
        .map(|_| rng.gen_range(-1.0f32..1.0f32))
        .collect();

    let mut out = vec![0.0f32; dim];
    for (row, slot) in out.iter_mut().enumerate() {
        let base = row * HISTOGRAM_BUCKETS;
        *slot = histogram
            .iter()
            .zip(&matrix[base..base + HISTOGRAM_BUCKETS])
            .map(|(h, w)| h * w)
            .sum();
    }

    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in out.iter_mut() {
            *v /= norm;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_same_input() {
        let a = visual_descriptor(b"some image bytes", 32);
        let b = visual_descriptor(b"some image bytes", 32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_inputs_diverge() {
        let a = visual_descriptor(b"aaaaaaaaaaaaaaaa", 32);
        let b = visual_descriptor(b"zzzzzzzzzzzzzzzz", 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_output_is_unit_normalized() {
        let v = visual_descriptor(b"some bytes that are not all zero", 48);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
