//! Response Curves
//!
//! The shared log-spaced frequency grid every band evaluates its response on,
//! and the aggregation of per-band curves into the five display buckets
//! (stereo, left, right, mid, side).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::params::Routing;

/// Default grid resolution and range
pub const RESPONSE_POINTS: usize = 300;
pub const RESPONSE_START_HZ: f32 = 20.0;
pub const RESPONSE_END_HZ: f32 = 20_000.0;

/// Log-spaced frequency points shared by all bands
///
/// Owned by the engine; bands only read it. The digital angular frequencies
/// are recomputed when the sample rate changes (setup phase).
#[derive(Debug, Clone)]
pub struct FrequencyGrid {
    freqs: Vec<f32>,
    omegas: Vec<f64>,
    sample_rate: f32,
}

impl FrequencyGrid {
    /// `num_points` frequencies from `start_hz` to `end_hz`, geometrically spaced
    pub fn new(num_points: usize, start_hz: f32, end_hz: f32) -> Self {
        let num_points = num_points.max(2);
        let ratio = (end_hz / start_hz) as f64;
        let freqs = (0..num_points)
            .map(|i| {
                let t = i as f64 / (num_points - 1) as f64;
                (start_hz as f64 * ratio.powf(t)) as f32
            })
            .collect();

        let mut grid = Self {
            freqs,
            omegas: vec![0.0; num_points],
            sample_rate: 0.0,
        };
        grid.set_sample_rate(crate::processor::DEFAULT_SAMPLE_RATE);
        grid
    }

    /// Recompute the angular frequencies for a new sample rate
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        let scale = 2.0 * PI / sample_rate as f64;
        for (omega, &freq) in self.omegas.iter_mut().zip(&self.freqs) {
            *omega = freq as f64 * scale;
        }
    }

    pub fn freqs(&self) -> &[f32] {
        &self.freqs
    }

    /// Angular frequency (rad/sample) of each grid point
    pub fn omegas(&self) -> &[f64] {
        &self.omegas
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Index of the grid point closest to `freq` on a log scale
    pub fn nearest_index(&self, freq: f32) -> usize {
        let target = freq.max(f32::MIN_POSITIVE).ln();
        self.freqs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.ln() - target)
                    .abs()
                    .total_cmp(&(b.ln() - target).abs())
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl Default for FrequencyGrid {
    fn default() -> Self {
        Self::new(RESPONSE_POINTS, RESPONSE_START_HZ, RESPONSE_END_HZ)
    }
}

/// Grid configuration as stored in engine config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseGridConfig {
    pub num_points: usize,
    pub start_hz: f32,
    pub end_hz: f32,
}

impl Default for ResponseGridConfig {
    fn default() -> Self {
        Self {
            num_points: RESPONSE_POINTS,
            start_hz: RESPONSE_START_HZ,
            end_hz: RESPONSE_END_HZ,
        }
    }
}

impl ResponseGridConfig {
    pub fn validate(&self) -> Result<(), DspError> {
        let range_ok = self.start_hz.is_finite()
            && self.end_hz.is_finite()
            && self.start_hz > 0.0
            && self.end_hz > self.start_hz;

        if self.num_points < 2 || !range_ok {
            return Err(DspError::InvalidResponseGrid {
                points: self.num_points,
                start_hz: self.start_hz,
                end_hz: self.end_hz,
            });
        }
        Ok(())
    }

    pub fn build(&self) -> FrequencyGrid {
        FrequencyGrid::new(self.num_points, self.start_hz, self.end_hz)
    }
}

/// One aggregated curve plus whether any band contributed to it
///
/// When `used` is false the gains are stale filler and must not be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBucket {
    pub used: bool,
    pub gains: Vec<f32>,
}

impl ResponseBucket {
    fn new(num_points: usize) -> Self {
        Self {
            used: false,
            gains: vec![1.0; num_points],
        }
    }

    fn reset(&mut self) {
        self.used = false;
        self.gains.fill(1.0);
    }

    /// Curve in dB (`10·log10` of the power gain)
    pub fn to_db(&self) -> Vec<f32> {
        self.gains
            .iter()
            .map(|&g| 10.0 * g.max(1.0e-12).log10())
            .collect()
    }
}

/// The five composite EQ curves
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurves {
    pub stereo: ResponseBucket,
    pub left: ResponseBucket,
    pub right: ResponseBucket,
    pub mid: ResponseBucket,
    pub side: ResponseBucket,
}

impl ResponseCurves {
    pub fn new(num_points: usize) -> Self {
        Self {
            stereo: ResponseBucket::new(num_points),
            left: ResponseBucket::new(num_points),
            right: ResponseBucket::new(num_points),
            mid: ResponseBucket::new(num_points),
            side: ResponseBucket::new(num_points),
        }
    }

    pub fn bucket(&self, routing: Routing) -> &ResponseBucket {
        match routing {
            Routing::Stereo => &self.stereo,
            Routing::Left => &self.left,
            Routing::Right => &self.right,
            Routing::Mid => &self.mid,
            Routing::Side => &self.side,
        }
    }

    fn bucket_mut(&mut self, routing: Routing) -> &mut ResponseBucket {
        match routing {
            Routing::Stereo => &mut self.stereo,
            Routing::Left => &mut self.left,
            Routing::Right => &mut self.right,
            Routing::Mid => &mut self.mid,
            Routing::Side => &mut self.side,
        }
    }

    fn reset(&mut self) {
        for routing in Routing::ALL {
            self.bucket_mut(routing).reset();
        }
    }

    /// Copy every bucket from `other` without reallocating
    ///
    /// Both sets must have been built for the same grid length.
    pub fn copy_from(&mut self, other: &ResponseCurves) {
        for routing in Routing::ALL {
            let src = other.bucket(routing);
            let dst = self.bucket_mut(routing);
            dst.used = src.used;
            dst.gains.copy_from_slice(&src.gains);
        }
    }

    /// Routings whose curve should be displayed
    pub fn used_routings(&self) -> impl Iterator<Item = Routing> + '_ {
        Routing::ALL
            .into_iter()
            .filter(move |&r| self.bucket(r).used)
    }

    pub fn num_points(&self) -> usize {
        self.stereo.gains.len()
    }
}

/// A band's contribution to aggregation
#[derive(Debug, Clone, Copy)]
pub struct BandResponse<'a> {
    pub enabled: bool,
    pub routing: Routing,
    pub gains: &'a [f32],
}

/// Combines enabled bands' curves into the five buckets
#[derive(Debug, Clone)]
pub struct ResponseAggregator {
    curves: ResponseCurves,
}

impl ResponseAggregator {
    pub fn new(num_points: usize) -> Self {
        let mut curves = ResponseCurves::new(num_points);
        curves.stereo.used = true;
        Self { curves }
    }

    /// Recompute all five buckets from scratch
    ///
    /// Each enabled band's curve is multiplied into the bucket of its routing.
    /// If no left/right/mid/side bucket ends up used, the stereo bucket is
    /// marked used so a flat or stereo-only setup always shows one curve.
    ///
    /// # Real-time Safety
    /// No allocations. O(bands × grid points).
    pub fn aggregate<'a, I>(&mut self, bands: I)
    where
        I: IntoIterator<Item = BandResponse<'a>>,
    {
        self.curves.reset();

        for band in bands.into_iter().filter(|b| b.enabled) {
            let bucket = self.curves.bucket_mut(band.routing);
            bucket.used = true;
            for (gain, &band_gain) in bucket.gains.iter_mut().zip(band.gains) {
                *gain *= band_gain;
            }
        }

        let curves = &mut self.curves;
        if !curves.left.used && !curves.right.used && !curves.mid.used && !curves.side.used {
            curves.stereo.used = true;
        }
    }

    pub fn curves(&self) -> &ResponseCurves {
        &self.curves
    }
}
