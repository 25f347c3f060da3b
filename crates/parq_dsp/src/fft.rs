//! Real FFT Engine
//!
//! Forward real-input transform used by the spectrum analyser. The analyser
//! only depends on the [`RealFft`] trait so hosts can plug in another
//! backend; [`RustFftEngine`] is the default built on `rustfft`.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Reference transform length for output normalisation
///
/// Every engine scales its output by `1/sqrt(FFT_REFERENCE_SIZE)` so band
/// magnitudes do not depend on the configured FFT size.
pub const FFT_REFERENCE_SIZE: usize = 1 << 14;

/// Forward real FFT of a fixed size
///
/// # Real-time Safety
/// `forward` is called from the audio thread and must not allocate.
pub trait RealFft: Send {
    /// Transform length N
    fn size(&self) -> usize;

    /// Transform `input` (N samples) into `output` (N values): interleaved
    /// re/im pairs for bins `0..N/2`, scaled by `1/sqrt(FFT_REFERENCE_SIZE)`
    fn forward(&mut self, input: &[f32], output: &mut [f32]);
}

/// Periodic Hann window `0.5 − 0.5·cos(2πi/N)`
#[inline]
fn hann_window(n: usize, size: usize) -> f32 {
    0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / size as f32).cos()
}

/// Pre-computed Hann window lookup table
#[derive(Debug, Clone)]
pub struct HannWindow {
    coeffs: Vec<f32>,
}

impl HannWindow {
    pub fn new(size: usize) -> Self {
        let coeffs = (0..size).map(|i| hann_window(i, size)).collect();
        Self { coeffs }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn coeffs(&self) -> &[f32] {
        &self.coeffs
    }

    /// Write `input * window` into `output`
    #[inline]
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        for ((out, &x), &w) in output.iter_mut().zip(input).zip(&self.coeffs) {
            *out = x * w;
        }
    }
}

/// `rustfft`-backed engine with pre-planned transform and scratch
pub struct RustFftEngine {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    scale: f32,
}

impl RustFftEngine {
    /// Plan a forward transform of `size` points. Allocates.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            size,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            scale: 1.0 / (FFT_REFERENCE_SIZE as f32).sqrt(),
        }
    }
}

impl RealFft for RustFftEngine {
    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn forward(&mut self, input: &[f32], output: &mut [f32]) {
        for (c, &x) in self.buffer.iter_mut().zip(input) {
            *c = Complex::new(x, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Rust pattern: chunks_exact_mut gives (re, im) pairs without index math
        for (pair, bin) in output
            .chunks_exact_mut(2)
            .zip(&self.buffer[..self.size / 2])
        {
            pair[0] = bin.re * self.scale;
            pair[1] = bin.im * self.scale;
        }
    }
}
