//! Filter Coefficient Library
//!
//! Builds cascades of second-order sections for every band type and
//! evaluates their magnitude response over a frequency grid.
//!
//! # Design method
//!
//! Every section starts from an analog prototype normalised to its design
//! frequency, `H(s) = (n0 + n1·s + n2·s²) / (d0 + d1·s + d2·s²)`, and is
//! mapped to the z-plane with a magnitude-matched Z transform:
//!
//! 1. Poles are placed by impulse invariance (`z = e^{sT}`), so the
//!    resonance keeps its shape near Nyquist instead of being warped as with
//!    the bilinear transform.
//! 2. The numerator is solved so the digital power response matches the
//!    prototype exactly at DC, at Nyquist and at the design frequency.
//!
//! Coefficients are normalised with `a0 = 1` and stored as
//! [`biquad::Coefficients`] so the band can run them through the `biquad`
//! crate's filter state. First-order sections are sections with `b2 = a2 = 0`.
//!
//! All functions here are pure: the same inputs always produce bit-identical
//! coefficients and curves.

use std::f64::consts::PI;

use biquad::Coefficients;

use crate::response::FrequencyGrid;

/// Lowest normalised design frequency (rad/sample) accepted by the mapping
const MIN_OMEGA: f64 = 1.0e-6;

/// Design frequencies are kept just below Nyquist
const MAX_OMEGA: f64 = 0.98 * PI;

/// The third magnitude-matching point never moves closer to Nyquist than this
const MAX_MATCH_OMEGA: f64 = 0.9 * PI;

/// Guard against division by a vanishing analog denominator
const MIN_POWER: f64 = 1.0e-30;

/// Number of second-order sections a band must be able to hold for `max_order`
///
/// A band shelf cascades two shelves of the selected order, each using
/// `⌈order/2⌉` sections.
pub fn stage_capacity(max_order: i32) -> usize {
    let max_order = max_order.max(2) as usize;
    2 * ((max_order + 1) / 2)
}

/// Pass-through section
pub fn identity_coefficients() -> Coefficients<f64> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Single-section designs used by the fixed-order band group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Peak,
    LowShelf,
    /// First-order (6 dB/oct) low shelf
    LowShelf6,
    HighShelf,
    /// First-order (6 dB/oct) high shelf
    HighShelf6,
    HighPass,
    /// First-order (6 dB/oct) high pass
    HighPass6,
    LowPass,
    /// First-order (6 dB/oct) low pass
    LowPass6,
}

/// Multi-section designs used by the variable-order band group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    HighPass,
    LowPass,
    LowShelf,
    HighShelf,
    BandShelf,
}

/// Ordered sequence of second-order sections with preallocated capacity
///
/// Rebuilding a cascade never allocates: sections beyond the capacity chosen
/// at construction are dropped.
#[derive(Debug, Clone)]
pub struct Cascade {
    stages: Vec<Coefficients<f64>>,
    capacity: usize,
}

impl Cascade {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stages: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn stages(&self) -> &[Coefficients<f64>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    fn push(&mut self, stage: Coefficients<f64>) {
        debug_assert!(self.stages.len() < self.capacity, "cascade capacity exceeded");
        if self.stages.len() < self.capacity {
            self.stages.push(stage);
        }
    }
}

/// Analog prototype normalised to the design frequency (coefficients of s⁰, s¹, s²)
#[derive(Debug, Clone, Copy)]
struct Prototype {
    num: [f64; 3],
    den: [f64; 3],
}

impl Prototype {
    fn new(kind: StageKind, gain_db: f64, q: f64) -> Self {
        // Shelf/peak amplitude factor A = 10^(dB/40), so A² is the linear gain
        let a = 10.0_f64.powf(gain_db / 40.0);
        let sqrt_a = a.sqrt();

        let (num, den) = match kind {
            StageKind::Peak => ([1.0, a / q, 1.0], [1.0, 1.0 / (a * q), 1.0]),
            StageKind::LowShelf => (
                [a * a, a * sqrt_a / q, a],
                [1.0, sqrt_a / q, a],
            ),
            StageKind::HighShelf => (
                [a, a * sqrt_a / q, a * a],
                [a, sqrt_a / q, 1.0],
            ),
            StageKind::LowShelf6 => ([a, 1.0, 0.0], [1.0 / a, 1.0, 0.0]),
            StageKind::HighShelf6 => ([a, a * a, 0.0], [a, 1.0, 0.0]),
            StageKind::HighPass => ([0.0, 0.0, 1.0], [1.0, 1.0 / q, 1.0]),
            StageKind::LowPass => ([1.0, 0.0, 0.0], [1.0, 1.0 / q, 1.0]),
            StageKind::HighPass6 => ([0.0, 1.0, 0.0], [1.0, 1.0, 0.0]),
            StageKind::LowPass6 => ([1.0, 0.0, 0.0], [1.0, 1.0, 0.0]),
        };

        Self { num, den }
    }

    fn is_first_order(&self) -> bool {
        self.num[2] == 0.0 && self.den[2] == 0.0
    }

    /// |H(jw)|² with `w` relative to the design frequency
    fn power(&self, w: f64) -> f64 {
        let w2 = w * w;
        let num_re = self.num[0] - self.num[2] * w2;
        let num_im = self.num[1] * w;
        let den_re = self.den[0] - self.den[2] * w2;
        let den_im = self.den[1] * w;
        (num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im).max(MIN_POWER)
    }
}

/// Basis functions of the digital power response at `w` (rad/sample)
///
/// |b0 + b1 z⁻¹ + b2 z⁻²|² = B0·φ0 + B1·φ1 + B2·φ2 with
/// B0 = (b0+b1+b2)², B1 = (b0−b1+b2)², B2 = −4·b0·b2.
#[inline]
fn phi(w: f64) -> (f64, f64, f64) {
    let s = (0.5 * w).sin();
    let phi1 = s * s;
    let phi0 = 1.0 - phi1;
    (phi0, phi1, 4.0 * phi0 * phi1)
}

/// Map one analog prototype section to digital coefficients
fn matched_stage(proto: &Prototype, frequency: f64, sample_rate: f64) -> Coefficients<f64> {
    let w0 = (2.0 * PI * frequency / sample_rate).clamp(MIN_OMEGA, MAX_OMEGA);

    // Poles: impulse invariance
    let (a1, a2) = if proto.den[2] != 0.0 {
        let wn = w0 * (proto.den[0] / proto.den[2]).sqrt();
        let zeta = proto.den[1] / (2.0 * (proto.den[0] * proto.den[2]).sqrt());
        let decay = (-zeta * wn).exp();
        let a1 = if zeta <= 1.0 {
            -2.0 * decay * (wn * (1.0 - zeta * zeta).sqrt()).cos()
        } else {
            -2.0 * decay * (wn * (zeta * zeta - 1.0).sqrt()).cosh()
        };
        (a1, decay * decay)
    } else {
        let wp = w0 * proto.den[0] / proto.den[1];
        (-(-wp).exp(), 0.0)
    };

    let den0 = (1.0 + a1 + a2) * (1.0 + a1 + a2);
    let den1 = (1.0 - a1 + a2) * (1.0 - a1 + a2);
    let den2 = -4.0 * a2;

    // Numerator: match DC, Nyquist and the design frequency
    let big_b0 = den0 * proto.power(0.0);
    let big_b1 = den1 * proto.power(PI / w0);
    let big_b2 = if proto.is_first_order() {
        0.0
    } else {
        let wm = w0.min(MAX_MATCH_OMEGA);
        let (p0, p1, p2) = phi(wm);
        let target = proto.power(wm / w0) * (den0 * p0 + den1 * p1 + den2 * p2);
        if p2 > 1.0e-12 {
            (target - big_b0 * p0 - big_b1 * p1) / p2
        } else {
            0.0
        }
    };

    let r0 = big_b0.max(0.0).sqrt();
    let r1 = big_b1.max(0.0).sqrt();
    let w = 0.5 * (r0 + r1);
    let b0 = 0.5 * (w + (w * w + big_b2).max(0.0).sqrt());

    Coefficients {
        a1,
        a2,
        b0,
        b1: 0.5 * (r0 - r1),
        b2: w - b0,
    }
}

/// Q of the k-th second-order section of an order-N Butterworth decomposition
fn butterworth_q(order: usize, k: usize) -> f64 {
    let angle = (2 * k + 1) as f64 * PI / (2 * order) as f64;
    1.0 / (2.0 * angle.sin())
}

/// Replace the cascade with a single fixed-order section
///
/// # Real-time Safety
/// No allocations; the cascade reuses its preallocated storage.
pub fn build_fixed_stage(
    cascade: &mut Cascade,
    kind: StageKind,
    frequency: f64,
    gain_db: f64,
    q: f64,
    sample_rate: f64,
) {
    cascade.clear();
    let proto = Prototype::new(kind, gain_db, q);
    cascade.push(matched_stage(&proto, frequency, sample_rate));
}

/// Append an order-N Butterworth pass or shelf at `frequency`
///
/// Shelf gain is split across sections in proportion to their order so the
/// sections sum to `gain_db`.
fn push_butterworth(
    cascade: &mut Cascade,
    second_order: StageKind,
    first_order: StageKind,
    frequency: f64,
    gain_db: f64,
    order: usize,
    sample_rate: f64,
) {
    let order = order.max(1);
    let section_gain = 2.0 * gain_db / order as f64;

    for k in 0..order / 2 {
        let proto = Prototype::new(second_order, section_gain, butterworth_q(order, k));
        cascade.push(matched_stage(&proto, frequency, sample_rate));
    }

    if order % 2 == 1 {
        let proto = Prototype::new(first_order, gain_db / order as f64, 1.0);
        cascade.push(matched_stage(&proto, frequency, sample_rate));
    }
}

/// Replace the cascade with a variable-order design
///
/// Pass and shelf kinds ignore `q` (the Butterworth decomposition fixes the
/// section Qs). The band shelf uses `q` to place its edges around
/// `frequency`: `f_hi − f_lo = f/Q` and `f_hi·f_lo = f²`.
///
/// # Real-time Safety
/// No allocations; the cascade reuses its preallocated storage.
pub fn build_variable_cascade(
    cascade: &mut Cascade,
    kind: VariableKind,
    frequency: f64,
    gain_db: f64,
    q: f64,
    order: i32,
    sample_rate: f64,
) {
    cascade.clear();
    let order = order.max(1) as usize;

    match kind {
        VariableKind::HighPass => push_butterworth(
            cascade,
            StageKind::HighPass,
            StageKind::HighPass6,
            frequency,
            0.0,
            order,
            sample_rate,
        ),
        VariableKind::LowPass => push_butterworth(
            cascade,
            StageKind::LowPass,
            StageKind::LowPass6,
            frequency,
            0.0,
            order,
            sample_rate,
        ),
        VariableKind::LowShelf => push_butterworth(
            cascade,
            StageKind::LowShelf,
            StageKind::LowShelf6,
            frequency,
            gain_db,
            order,
            sample_rate,
        ),
        VariableKind::HighShelf => push_butterworth(
            cascade,
            StageKind::HighShelf,
            StageKind::HighShelf6,
            frequency,
            gain_db,
            order,
            sample_rate,
        ),
        VariableKind::BandShelf => {
            let half_bandwidth = 0.5 / q.max(1.0e-3);
            let centre = (1.0 + half_bandwidth * half_bandwidth).sqrt();
            let f_low = frequency * (centre - half_bandwidth);
            let f_high = frequency * (centre + half_bandwidth);

            // Rise at the lower edge, fall back at the upper edge
            push_butterworth(
                cascade,
                StageKind::HighShelf,
                StageKind::HighShelf6,
                f_low,
                gain_db,
                order,
                sample_rate,
            );
            push_butterworth(
                cascade,
                StageKind::HighShelf,
                StageKind::HighShelf6,
                f_high,
                -gain_db,
                order,
                sample_rate,
            );
        }
    }
}

/// Power gain |H|² of one section at the given angle terms
#[inline]
fn section_power(c: &Coefficients<f64>, cos1: f64, sin1: f64, cos2: f64, sin2: f64) -> f64 {
    let num_re = c.b0 + c.b1 * cos1 + c.b2 * cos2;
    let num_im = c.b1 * sin1 + c.b2 * sin2;
    let den_re = 1.0 + c.a1 * cos1 + c.a2 * cos2;
    let den_im = c.a1 * sin1 + c.a2 * sin2;
    (num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im).max(MIN_POWER)
}

/// Evaluate the cascade's power response at every grid point
///
/// Values are linear power gains (`10·log10(value)` is the response in dB);
/// an empty cascade yields unity everywhere.
///
/// # Panics
/// Panics if `out` is shorter than the grid (debug builds only); extra
/// entries are left untouched.
pub fn evaluate_response(cascade: &Cascade, grid: &FrequencyGrid, out: &mut [f32]) {
    debug_assert!(out.len() >= grid.len(), "response buffer shorter than grid");

    for (value, &w) in out.iter_mut().zip(grid.omegas()) {
        let (sin1, cos1) = w.sin_cos();
        let (sin2, cos2) = (2.0 * w).sin_cos();
        let power: f64 = cascade
            .stages()
            .iter()
            .map(|c| section_power(c, cos1, sin1, cos2, sin2))
            .product();
        *value = power as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 48000.0;

    fn power_db_at(cascade: &Cascade, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / FS;
        let (sin1, cos1) = w.sin_cos();
        let (sin2, cos2) = (2.0 * w).sin_cos();
        let power: f64 = cascade
            .stages()
            .iter()
            .map(|c| section_power(c, cos1, sin1, cos2, sin2))
            .product();
        10.0 * power.log10()
    }

    fn fixed(kind: StageKind, frequency: f64, gain_db: f64, q: f64) -> Cascade {
        let mut cascade = Cascade::with_capacity(8);
        build_fixed_stage(&mut cascade, kind, frequency, gain_db, q, FS);
        cascade
    }

    fn variable(kind: VariableKind, frequency: f64, gain_db: f64, q: f64, order: i32) -> Cascade {
        let mut cascade = Cascade::with_capacity(stage_capacity(8));
        build_variable_cascade(&mut cascade, kind, frequency, gain_db, q, order, FS);
        cascade
    }

    #[test]
    fn test_stage_capacity() {
        assert_eq!(stage_capacity(8), 8);
        assert_eq!(stage_capacity(7), 8);
        assert_eq!(stage_capacity(1), 2);
    }

    #[test]
    fn test_peak_matches_gain_at_centre() {
        let cascade = fixed(StageKind::Peak, 1000.0, 6.0, 0.707);
        assert_eq!(cascade.len(), 1);
        assert!((power_db_at(&cascade, 1000.0) - 6.0).abs() < 0.01);
        assert!(power_db_at(&cascade, 20.0).abs() < 0.1);
        assert!(power_db_at(&cascade, 20000.0).abs() < 0.5);
    }

    #[test]
    fn test_peak_cut_is_symmetric() {
        let boost = fixed(StageKind::Peak, 2000.0, 9.0, 2.0);
        let cut = fixed(StageKind::Peak, 2000.0, -9.0, 2.0);
        assert!((power_db_at(&boost, 2000.0) + power_db_at(&cut, 2000.0)).abs() < 0.05);
    }

    #[test]
    fn test_shelves_reach_full_gain() {
        let low = fixed(StageKind::LowShelf, 200.0, 8.0, 0.707);
        assert!((power_db_at(&low, 10.0) - 8.0).abs() < 0.2);
        assert!(power_db_at(&low, 15000.0).abs() < 0.2);

        let high = fixed(StageKind::HighShelf, 4000.0, -6.0, 0.707);
        assert!(power_db_at(&high, 30.0).abs() < 0.1);
        assert!((power_db_at(&high, 22000.0) + 6.0).abs() < 0.5);

        let low6 = fixed(StageKind::LowShelf6, 200.0, 8.0, 0.707);
        assert!((power_db_at(&low6, 5.0) - 8.0).abs() < 0.3);
        assert!((power_db_at(&low6, 200.0) - 4.0).abs() < 0.3);
    }

    #[test]
    fn test_pass_filters_attenuate_stop_band() {
        let hp = fixed(StageKind::HighPass, 1000.0, 0.0, 0.707);
        assert!(power_db_at(&hp, 100.0) < -35.0);
        assert!(power_db_at(&hp, 10000.0).abs() < 0.5);
        assert!((power_db_at(&hp, 1000.0) + 3.01).abs() < 0.1);

        let lp6 = fixed(StageKind::LowPass6, 1000.0, 0.0, 0.707);
        assert!(power_db_at(&lp6, 20.0).abs() < 0.1);
        assert!(power_db_at(&lp6, 10000.0) < -15.0);
    }

    #[test]
    fn test_butterworth_sections() {
        assert_eq!(variable(VariableKind::LowPass, 1000.0, 0.0, 1.0, 4).len(), 2);
        assert_eq!(variable(VariableKind::LowPass, 1000.0, 0.0, 1.0, 5).len(), 3);
        assert_eq!(variable(VariableKind::HighShelf, 1000.0, 6.0, 1.0, 1).len(), 1);
        assert!((butterworth_q(2, 0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((butterworth_q(4, 0) - 1.3066).abs() < 1e-3);
        assert!((butterworth_q(4, 1) - 0.5412).abs() < 1e-3);
    }

    #[test]
    fn test_higher_order_is_steeper() {
        let order2 = variable(VariableKind::LowPass, 1000.0, 0.0, 1.0, 2);
        let order8 = variable(VariableKind::LowPass, 1000.0, 0.0, 1.0, 8);
        assert!(power_db_at(&order8, 4000.0) < power_db_at(&order2, 4000.0) - 40.0);
        // Butterworth passes -3 dB at the corner regardless of order
        assert!((power_db_at(&order8, 1000.0) + 3.01).abs() < 0.3);
    }

    #[test]
    fn test_variable_shelf_gain_sums() {
        let shelf = variable(VariableKind::LowShelf, 300.0, 12.0, 1.0, 5);
        assert!((power_db_at(&shelf, 5.0) - 12.0).abs() < 0.3);
        assert!(power_db_at(&shelf, 15000.0).abs() < 0.3);
    }

    #[test]
    fn test_band_shelf_plateau() {
        let shelf = variable(VariableKind::BandShelf, 1000.0, 6.0, 0.5, 8);
        assert_eq!(shelf.len(), 8);
        assert!((power_db_at(&shelf, 1000.0) - 6.0).abs() < 0.5);
        assert!(power_db_at(&shelf, 20.0).abs() < 0.3);
        assert!(power_db_at(&shelf, 20000.0).abs() < 0.5);
    }

    #[test]
    fn test_design_is_deterministic() {
        let a = variable(VariableKind::BandShelf, 740.0, -5.5, 1.3, 6);
        let b = variable(VariableKind::BandShelf, 740.0, -5.5, 1.3, 6);
        for (x, y) in a.stages().iter().zip(b.stages()) {
            assert_eq!(x.b0.to_bits(), y.b0.to_bits());
            assert_eq!(x.b1.to_bits(), y.b1.to_bits());
            assert_eq!(x.b2.to_bits(), y.b2.to_bits());
            assert_eq!(x.a1.to_bits(), y.a1.to_bits());
            assert_eq!(x.a2.to_bits(), y.a2.to_bits());
        }
    }

    #[test]
    fn test_poles_are_stable() {
        for kind in [VariableKind::LowPass, VariableKind::HighShelf, VariableKind::BandShelf] {
            for order in 1..=8 {
                let cascade = variable(kind, 19000.0, 12.0, 10.0, order);
                for c in cascade.stages() {
                    assert!(c.a2.abs() < 1.0, "{kind:?} order {order}: a2 = {}", c.a2);
                    assert!(c.a1.abs() < 1.0 + c.a2, "{kind:?} order {order}: a1 = {}", c.a1);
                }
            }
        }
    }

    #[test]
    fn test_empty_cascade_is_unity() {
        let mut grid = FrequencyGrid::new(16, 20.0, 20000.0);
        grid.set_sample_rate(FS as f32);
        let cascade = Cascade::with_capacity(2);
        let mut out = vec![0.0_f32; 16];
        evaluate_response(&cascade, &grid, &mut out);
        assert!(out.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_capacity_never_grows() {
        let mut cascade = Cascade::with_capacity(stage_capacity(8));
        let capacity = cascade.capacity();
        for order in 1..=8 {
            build_variable_cascade(&mut cascade, VariableKind::BandShelf, 500.0, 3.0, 1.0, order, FS);
            assert!(cascade.len() <= capacity);
        }
    }
}
