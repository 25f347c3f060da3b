//! Spectrum Analyser
//!
//! Turns the live signal into log-spaced band magnitudes for display:
//! downmix to mono, integer decimation, 75%-overlapped Hann-windowed FFTs,
//! per-band mean magnitude with a `sqrt(f/1000)` tilt, instant attack with
//! exponential release, and a peak hold.
//!
//! # Real-time Safety
//!
//! Everything is allocated in [`SpectrumAnalyser::new`]. `process_block`,
//! `clear` and `clear_peaks` never allocate or lock.

use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::fft::{HannWindow, RealFft, RustFftEngine};

/// Rate the analyser decimates towards
pub const ANALYSER_BASE_RATE: u32 = 44100;

/// Lowest band centre; bands span three decades from here
pub const ANALYSER_START_HZ: f32 = 20.0;

const MIN_FFT_ORDER: u32 = 4;
const MAX_FFT_ORDER: u32 = 16;

/// Optional pre-filter run on each mono chunk before subsampling
pub type DecimationFilter = Box<dyn FnMut(&mut [f32]) + Send>;

/// Analyser configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    /// FFT size is `2^fft_order`
    pub fft_order: u32,
    /// FFTs per window length (4 ⇒ 75% overlap)
    pub overlap_ratio: usize,
    /// Number of display bands
    pub num_bands: usize,
    /// Release time in seconds
    pub release_time: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_order: 13,
            overlap_ratio: 4,
            num_bands: 61,
            release_time: 0.3,
        }
    }
}

impl AnalyserSettings {
    pub fn fft_size(&self) -> usize {
        1 << self.fft_order
    }

    pub fn validate(&self) -> Result<(), DspError> {
        if !(MIN_FFT_ORDER..=MAX_FFT_ORDER).contains(&self.fft_order) {
            return Err(DspError::InvalidFftOrder(self.fft_order));
        }
        let ratio = self.overlap_ratio;
        if ratio == 0 || !ratio.is_power_of_two() || ratio > self.fft_size() {
            return Err(DspError::InvalidOverlapRatio(ratio));
        }
        if self.num_bands < 2 {
            return Err(DspError::TooFewAnalyserBands(self.num_bands));
        }
        if !(self.release_time.is_finite() && self.release_time > 0.0) {
            return Err(DspError::InvalidReleaseTime(self.release_time));
        }
        Ok(())
    }
}

/// `max(1, floor(sample_rate / 44100))`
pub fn downsampling_factor(sample_rate: u32) -> usize {
    (sample_rate / ANALYSER_BASE_RATE).max(1) as usize
}

/// Band centres and upper bin borders for the given (decimated) rate
///
/// Borders increase strictly until they reach the last bin below Nyquist
/// (only possible at low sample rates). Where bins are too sparse for the nominal
/// centre, the border is pushed to the next free bin and the reported centre
/// moves to the geometric mean of the previous centre and that bin's frequency.
fn layout_bands(num_bands: usize, fft_size: usize, sample_rate: f32) -> (Vec<f32>, Vec<usize>) {
    let n = fft_size as f32;
    let last = num_bands - 1;
    let max_border = fft_size / 2 - 1;

    let mut freqs: Vec<f32> = (0..num_bands)
        .map(|i| ANALYSER_START_HZ * 10.0_f32.powf(3.0 * i as f32 / last as f32))
        .collect();
    let mut borders = vec![0usize; num_bands];

    let bin_of = |freq: f32| (n * freq / sample_rate + 0.5) as usize;

    let mut last_idx = 1usize;
    let mut last_freq = freqs[0] * freqs[0] / freqs[1];

    for i in 0..last {
        let next_idx = bin_of((freqs[i] * freqs[i + 1]).sqrt());

        if next_idx >= last_idx {
            borders[i] = next_idx.min(max_border);
        } else {
            borders[i] = last_idx.min(max_border);
            let border_freq = sample_rate * borders[i] as f32 / n;
            freqs[i] = (border_freq * last_freq).sqrt();
        }

        last_idx = borders[i] + 1;
        last_freq = freqs[i];
    }

    let outer = freqs[last] * freqs[last] / (freqs[last] * freqs[last - 1]).sqrt();
    borders[last] = bin_of(outer).min(max_border);

    (freqs, borders)
}

/// Log-band FFT analyser with smoothing and peak hold
pub struct SpectrumAnalyser {
    settings: AnalyserSettings,
    downsampling: usize,
    sample_rate: f32,
    hop: usize,
    fft: Box<dyn RealFft>,
    window: HannWindow,
    /// Overlap buffer being filled with decimated samples
    buffer: Vec<f32>,
    buffer_pos: usize,
    decimation_index: usize,
    /// Mono chunk scratch
    mono: Vec<f32>,
    windowed: Vec<f32>,
    spectrum: Vec<f32>,
    freqs: Vec<f32>,
    borders: Vec<usize>,
    mags: Vec<f32>,
    peak_mags: Vec<f32>,
    release_coeff: f32,
    new_data: bool,
    decimation_filter: Option<DecimationFilter>,
}

impl SpectrumAnalyser {
    /// Build an analyser for a device running at `sample_rate` using the
    /// default `rustfft` engine. Allocates.
    pub fn new(settings: AnalyserSettings, sample_rate: u32) -> Result<Self, DspError> {
        settings.validate()?;
        let fft = Box::new(RustFftEngine::new(settings.fft_size()));
        Self::with_fft(settings, sample_rate, fft)
    }

    /// Build an analyser around a caller-supplied FFT engine
    pub fn with_fft(
        settings: AnalyserSettings,
        sample_rate: u32,
        fft: Box<dyn RealFft>,
    ) -> Result<Self, DspError> {
        settings.validate()?;
        if sample_rate == 0 {
            return Err(DspError::InvalidSampleRate(0.0));
        }

        let fft_size = settings.fft_size();
        if fft.size() != fft_size {
            return Err(DspError::BufferSizeMismatch {
                expected: fft_size,
                got: fft.size(),
            });
        }

        let downsampling = downsampling_factor(sample_rate);
        let decimated_rate = (sample_rate / downsampling as u32) as f32;

        let block_rate = decimated_rate * settings.overlap_ratio as f32 / fft_size as f32;
        let release_coeff = 1.0 - (-1.0 / (settings.release_time * block_rate)).exp();

        let (freqs, borders) = layout_bands(settings.num_bands, fft_size, decimated_rate);

        Ok(Self {
            settings,
            downsampling,
            sample_rate: decimated_rate,
            hop: fft_size / settings.overlap_ratio,
            fft,
            window: HannWindow::new(fft_size),
            buffer: vec![0.0; fft_size],
            buffer_pos: 0,
            decimation_index: 0,
            mono: vec![0.0; fft_size],
            windowed: vec![0.0; fft_size],
            spectrum: vec![0.0; fft_size],
            freqs,
            borders,
            mags: vec![0.0; settings.num_bands],
            peak_mags: vec![0.0; settings.num_bands],
            release_coeff,
            new_data: false,
            decimation_filter: None,
        })
    }

    /// Install a pre-filter run on each mono chunk before subsampling
    ///
    /// Only used when the downsampling factor is above 1.
    pub fn set_decimation_filter(&mut self, filter: DecimationFilter) {
        self.decimation_filter = Some(filter);
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn downsampling_factor(&self) -> usize {
        self.downsampling
    }

    /// Effective rate after decimation
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Reported band centre frequencies
    pub fn freqs(&self) -> &[f32] {
        &self.freqs
    }

    /// Upper FFT bin (inclusive) of each band
    pub fn band_borders(&self) -> &[usize] {
        &self.borders
    }

    /// Smoothed band magnitudes
    pub fn mags(&self) -> &[f32] {
        &self.mags
    }

    pub fn peak_mags(&self) -> &[f32] {
        &self.peak_mags
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff
    }

    /// Returns and clears the "new data" flag set by every FFT
    pub fn take_new_data(&mut self) -> bool {
        std::mem::take(&mut self.new_data)
    }

    /// Reset fill position, decimation phase, magnitudes and peaks
    pub fn clear(&mut self) {
        self.buffer_pos = 0;
        self.decimation_index = 0;
        self.new_data = false;
        self.mags.fill(0.0);
        self.clear_peaks();
    }

    pub fn clear_peaks(&mut self) {
        self.peak_mags.fill(0.0);
    }

    /// Feed one block; stereo input is downmixed as `0.5·(L+R)`
    ///
    /// # Real-time Safety
    /// No allocations, no locks.
    pub fn process_block(&mut self, left: &[f32], right: Option<&[f32]>) {
        let len = right.map_or(left.len(), |r| left.len().min(r.len()));
        let chunk = self.mono.len();
        let mut offset = 0;

        while offset < len {
            let n = chunk.min(len - offset);
            let l = &left[offset..offset + n];

            match right {
                Some(right) => {
                    let r = &right[offset..offset + n];
                    for ((m, a), b) in self.mono.iter_mut().zip(l).zip(r) {
                        *m = 0.5 * (a + b);
                    }
                }
                None => self.mono[..n].copy_from_slice(l),
            }

            self.ingest(n);
            offset += n;
        }
    }

    /// Decimate the first `n` mono samples into the overlap buffer
    fn ingest(&mut self, n: usize) {
        if self.downsampling > 1 {
            if let Some(filter) = self.decimation_filter.as_mut() {
                filter(&mut self.mono[..n]);
            }
        }

        while self.decimation_index < n {
            self.buffer[self.buffer_pos] = self.mono[self.decimation_index];
            self.buffer_pos += 1;
            self.decimation_index += self.downsampling;

            if self.buffer_pos >= self.buffer.len() {
                self.process_fft();
                self.buffer_pos = self.buffer.len() - self.hop;
            }
        }

        self.decimation_index -= n;
    }

    fn process_fft(&mut self) {
        self.window.apply(&self.buffer, &mut self.windowed);
        self.buffer.copy_within(self.hop.., 0);

        self.fft.forward(&self.windowed, &mut self.spectrum);

        let mut first = 1usize;
        for (i, &border) in self.borders.iter().enumerate() {
            let current = if border >= first {
                let sum: f32 = self.spectrum[2 * first..2 * (border + 1)]
                    .chunks_exact(2)
                    .map(|bin| (bin[0] * bin[0] + bin[1] * bin[1]).sqrt())
                    .sum();
                let tilt = (self.freqs[i] / 1000.0).sqrt();
                tilt * sum / (border + 1 - first) as f32
            } else {
                0.0
            };

            let held = self.mags[i];
            self.mags[i] = if current > held {
                current
            } else {
                held + (current - held) * self.release_coeff
            };
            self.peak_mags[i] = self.peak_mags[i].max(self.mags[i]);

            first = border + 1;
        }

        self.new_data = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn small_settings() -> AnalyserSettings {
        AnalyserSettings {
            fft_order: 10,
            ..Default::default()
        }
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq as f64 * t).sin() as f32
            })
            .collect()
    }

    /// Deterministic pseudo-random noise in [-1, 1)
    fn noise(seed: &mut u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (*seed >> 8) as f32 / (1u32 << 23) as f32 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_downsampling_factor() {
        assert_eq!(downsampling_factor(44100), 1);
        assert_eq!(downsampling_factor(48000), 1);
        assert_eq!(downsampling_factor(88200), 2);
        assert_eq!(downsampling_factor(96000), 2);
        assert_eq!(downsampling_factor(192000), 4);
        assert_eq!(downsampling_factor(22050), 1);
    }

    #[test]
    fn test_settings_validation() {
        assert!(AnalyserSettings::default().validate().is_ok());

        let bad_order = AnalyserSettings {
            fft_order: 30,
            ..Default::default()
        };
        assert_eq!(bad_order.validate(), Err(DspError::InvalidFftOrder(30)));

        let bad_overlap = AnalyserSettings {
            overlap_ratio: 3,
            ..Default::default()
        };
        assert_eq!(bad_overlap.validate(), Err(DspError::InvalidOverlapRatio(3)));

        let one_band = AnalyserSettings {
            num_bands: 1,
            ..Default::default()
        };
        assert!(one_band.validate().is_err());

        let no_release = AnalyserSettings {
            release_time: 0.0,
            ..Default::default()
        };
        assert!(no_release.validate().is_err());
    }

    #[test]
    fn test_settings_from_partial_json() {
        let settings: AnalyserSettings = serde_json::from_str(r#"{"fft_order": 11}"#).unwrap();
        assert_eq!(settings.fft_size(), 2048);
        assert_eq!(settings.num_bands, 61);
    }

    #[test]
    fn test_band_layout() {
        let analyser = SpectrumAnalyser::new(AnalyserSettings::default(), 48000).unwrap();
        let freqs = analyser.freqs();
        let borders = analyser.band_borders();

        assert_eq!(freqs.len(), 61);
        assert!((freqs[60] - 20000.0).abs() < 1.0);
        assert!((freqs[40] - 2000.0).abs() < 1.0);

        for pair in borders.windows(2) {
            assert!(pair[1] > pair[0], "borders must increase: {pair:?}");
        }
        assert!(borders[0] >= 1);
        assert!(*borders.last().unwrap() <= 8192 / 2 - 1);
    }

    #[test]
    fn test_sparse_bins_move_band_centres() {
        // 1024 points at 44.1 kHz: bins are 43 Hz wide, so the lowest bands collide
        let sample_rate = 44100.0_f32;
        let n = 1024.0_f32;
        let analyser = SpectrumAnalyser::new(small_settings(), 44100).unwrap();
        let borders = analyser.band_borders();
        let freqs = analyser.freqs();
        let last = freqs.len() - 1;

        let mut forced = 0;
        for i in 1..last {
            let nominal = ANALYSER_START_HZ * 10.0_f32.powf(3.0 * i as f32 / last as f32);
            if (freqs[i] - nominal).abs() <= 1e-3 * nominal {
                continue;
            }

            forced += 1;
            assert_eq!(borders[i], borders[i - 1] + 1, "band {i} border");
            let border_freq = sample_rate * borders[i] as f32 / n;
            let expected = (border_freq * freqs[i - 1]).sqrt();
            assert!(
                (freqs[i] - expected).abs() <= 1e-3 * expected,
                "band {i}: {} vs {expected}",
                freqs[i]
            );
        }
        assert!(forced >= 5, "only {forced} bands were moved");
    }

    #[test]
    fn test_release_coefficient() {
        let analyser = SpectrumAnalyser::new(AnalyserSettings::default(), 96000).unwrap();
        assert_eq!(analyser.downsampling_factor(), 2);
        assert_eq!(analyser.sample_rate(), 48000.0);

        let block_rate = 48000.0 * 4.0 / 8192.0;
        let expected = 1.0 - (-1.0_f32 / (0.3 * block_rate)).exp();
        assert!((analyser.release_coeff() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_new_data_is_one_shot() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 48000).unwrap();

        analyser.process_block(&vec![0.1; 1023], None);
        assert!(!analyser.take_new_data());

        analyser.process_block(&[0.1], None);
        assert!(analyser.take_new_data());
        assert!(!analyser.take_new_data());

        // After the first FFT only a hop of new samples is needed
        analyser.process_block(&vec![0.1; 256], None);
        assert!(analyser.take_new_data());
    }

    #[test]
    fn test_sine_at_band_centre_dominates() {
        let sample_rate = 48000;
        let mut analyser = SpectrumAnalyser::new(AnalyserSettings::default(), sample_rate).unwrap();
        let target = 40;
        let freq = analyser.freqs()[target];

        let tone = sine(freq, sample_rate, 8192 * 4);
        for block in tone.chunks(512) {
            analyser.process_block(block, Some(block));
        }

        let mags = analyser.mags();
        assert!(mags[target] > 0.0);
        for (i, &mag) in mags.iter().enumerate() {
            if i.abs_diff(target) > 1 {
                assert!(mags[target] > mag, "band {i} ({mag}) >= target ({})", mags[target]);
            }
        }
    }

    #[test]
    fn test_magnitude_settles() {
        let sample_rate = 48000;
        let mut analyser = SpectrumAnalyser::new(small_settings(), sample_rate).unwrap();
        let target = 45;
        let tone = sine(analyser.freqs()[target], sample_rate, 1024 * 12);

        analyser.process_block(&tone[..1024 * 6], None);
        let first = analyser.mags()[target];
        analyser.process_block(&tone[1024 * 6..], None);
        let second = analyser.mags()[target];

        assert!(first > 0.0);
        assert!((first - second).abs() / first < 0.05);
    }

    #[test]
    fn test_peak_hold_monotonic_until_cleared() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 48000).unwrap();
        let mut seed = 7;
        let mut previous = analyser.peak_mags().to_vec();

        for round in 0..20 {
            let gain = if round % 3 == 0 { 1.0 } else { 0.05 };
            let block: Vec<f32> = noise(&mut seed, 700).iter().map(|x| x * gain).collect();
            analyser.process_block(&block, None);

            let peaks = analyser.peak_mags();
            for (now, before) in peaks.iter().zip(&previous) {
                assert!(now >= before);
            }
            for (peak, mag) in peaks.iter().zip(analyser.mags()) {
                assert!(peak >= mag);
            }
            previous = peaks.to_vec();
        }
        assert!(previous.iter().any(|&p| p > 0.0));

        analyser.clear_peaks();
        assert!(analyser.peak_mags().iter().all(|&p| p == 0.0));
        assert!(analyser.mags().iter().any(|&m| m > 0.0));

        analyser.process_block(&noise(&mut seed, 1024), None);
        assert!(analyser.peak_mags().iter().any(|&p| p > 0.0));
    }

    #[test]
    fn test_release_decays_towards_silence() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 48000).unwrap();
        let target = 40;
        let tone = sine(analyser.freqs()[target], 48000, 4096);
        analyser.process_block(&tone, None);
        assert!(analyser.mags()[target] > 0.0);

        // One full window of silence leaves nothing but zeros in the buffer
        analyser.process_block(&vec![0.0; 1024], None);
        assert!(analyser.mags()[target] > 0.0);

        // Each further FFT of silence scales every band by (1 - release)
        let keep = 1.0 - analyser.release_coeff();
        for _ in 0..3 {
            let before = analyser.mags().to_vec();
            analyser.process_block(&vec![0.0; 256], None);
            assert!(analyser.take_new_data());

            for (i, (&now, &was)) in analyser.mags().iter().zip(&before).enumerate() {
                assert!(
                    (now - was * keep).abs() <= 1e-5 * was.max(1e-12),
                    "band {i}: {now} vs {}",
                    was * keep
                );
            }
        }
        assert!(analyser.mags()[target] > 0.0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 48000).unwrap();
        analyser.process_block(&sine(500.0, 48000, 3000), None);
        assert!(analyser.mags().iter().any(|&m| m > 0.0));

        analyser.clear();
        assert!(analyser.mags().iter().all(|&m| m == 0.0));
        assert!(analyser.peak_mags().iter().all(|&m| m == 0.0));
        assert!(!analyser.take_new_data());

        // Fill restarts from an empty buffer
        analyser.process_block(&vec![0.2; 1023], None);
        assert!(!analyser.take_new_data());
    }

    #[test]
    fn test_silence_gives_zero() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 48000).unwrap();
        analyser.process_block(&vec![0.0; 4096], Some(&vec![0.0; 4096]));
        assert!(analyser.mags().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_opposite_channels_cancel() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 48000).unwrap();
        let left = sine(1000.0, 48000, 4096);
        let right: Vec<f32> = left.iter().map(|x| -x).collect();
        analyser.process_block(&left, Some(&right));
        assert!(analyser.mags().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_decimation_filter_only_when_downsampling() {
        let calls = Arc::new(AtomicUsize::new(0));

        let mut plain = SpectrumAnalyser::new(small_settings(), 48000).unwrap();
        let counter = Arc::clone(&calls);
        plain.set_decimation_filter(Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        plain.process_block(&vec![0.0; 256], None);
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let mut decimating = SpectrumAnalyser::new(small_settings(), 96000).unwrap();
        let counter = Arc::clone(&calls);
        decimating.set_decimation_filter(Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        decimating.process_block(&vec![0.0; 256], None);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_decimation_takes_every_nth_sample() {
        // Factor 2: 2046 input samples yield 1023 decimated ones
        let mut analyser = SpectrumAnalyser::new(small_settings(), 96000).unwrap();
        analyser.process_block(&vec![0.3; 2046], None);
        assert!(!analyser.take_new_data());
        analyser.process_block(&[0.3, 0.3], None);
        assert!(analyser.take_new_data());
    }

    #[test]
    fn test_low_sample_rate_layout_is_safe() {
        let mut analyser = SpectrumAnalyser::new(small_settings(), 8000).unwrap();
        let borders = analyser.band_borders();
        assert!(borders.iter().all(|&b| b <= 511));

        analyser.process_block(&sine(3000.0, 8000, 4096), None);
        assert!(analyser.mags().iter().all(|m| m.is_finite()));
    }

    struct ConstantFft {
        size: usize,
    }

    impl RealFft for ConstantFft {
        fn size(&self) -> usize {
            self.size
        }

        fn forward(&mut self, _input: &[f32], output: &mut [f32]) {
            // Every bin has magnitude 1 (re = 1, im = 0)
            for pair in output.chunks_exact_mut(2) {
                pair[0] = 1.0;
                pair[1] = 0.0;
            }
        }
    }

    #[test]
    fn test_custom_fft_engine() {
        let settings = small_settings();
        let engine = Box::new(ConstantFft {
            size: settings.fft_size(),
        });
        let mut analyser = SpectrumAnalyser::with_fft(settings, 48000, engine).unwrap();
        analyser.process_block(&vec![0.0; 1024], None);

        // Flat unit spectrum: each band reports its tilt sqrt(f/1000)
        let (freqs, borders) = (analyser.freqs().to_vec(), analyser.band_borders().to_vec());
        let mut first = 1;
        for (i, &border) in borders.iter().enumerate() {
            if border >= first {
                let expected = (freqs[i] / 1000.0).sqrt();
                assert!((analyser.mags()[i] - expected).abs() < 1e-4);
            }
            first = border + 1;
        }
    }

    #[test]
    fn test_fft_size_mismatch_rejected() {
        let engine = Box::new(ConstantFft { size: 512 });
        let result = SpectrumAnalyser::with_fft(small_settings(), 48000, engine);
        assert!(matches!(
            result,
            Err(DspError::BufferSizeMismatch {
                expected: 1024,
                got: 512
            })
        ));
    }
}
