//! Band Engine
//!
//! Owns one band's filter state. Per block it:
//! 1. compares the live parameters against the last applied copy,
//! 2. rebuilds the cascade only when something changed,
//! 3. refreshes its cached response curve when the cascade changed,
//! 4. routes the block (stereo / left / right / mid / side) through the cascade.
//!
//! # Real-time Safety
//!
//! All buffers (cascade, filter state, response curve, mid/side scratch) are
//! sized in [`BandEngine::new`] and [`BandEngine::prepare`]. Block processing
//! never allocates, locks or blocks.

use std::sync::Arc;

use biquad::{Biquad, DirectForm2Transposed};

use crate::coefficients::{
    build_fixed_stage, build_variable_cascade, evaluate_response, identity_coefficients,
    stage_capacity, Cascade, StageKind, VariableKind,
};
use crate::params::{BandParameters, BandType, Routing, SharedBandParameters};
use crate::processor::{sanitize_sample_rate, ProcessContext};
use crate::response::{BandResponse, FrequencyGrid};

/// Per-section filter state for the two processing lanes
type StageState = [DirectForm2Transposed<f64>; 2];

/// Processing recipe resolved once per rebuild
#[derive(Debug, Clone, Copy, PartialEq)]
enum Design {
    Fixed(StageKind),
    Variable(VariableKind),
}

impl Design {
    /// Fixed shelf/pass types switch to their first-order alias at order 1
    fn for_params(band_type: BandType, order: i32) -> Self {
        let pick = |two_pole: StageKind, one_pole: StageKind| {
            Design::Fixed(if order == 2 { two_pole } else { one_pole })
        };

        match band_type {
            BandType::Peak => Design::Fixed(StageKind::Peak),
            BandType::LowShelf => pick(StageKind::LowShelf, StageKind::LowShelf6),
            BandType::HighShelf => pick(StageKind::HighShelf, StageKind::HighShelf6),
            BandType::HighPass => pick(StageKind::HighPass, StageKind::HighPass6),
            BandType::LowPass => pick(StageKind::LowPass, StageKind::LowPass6),
            BandType::VariableHighPass => Design::Variable(VariableKind::HighPass),
            BandType::VariableLowPass => Design::Variable(VariableKind::LowPass),
            BandType::VariableLowShelf => Design::Variable(VariableKind::LowShelf),
            BandType::VariableHighShelf => Design::Variable(VariableKind::HighShelf),
            BandType::VariableBandShelf => Design::Variable(VariableKind::BandShelf),
        }
    }
}

/// Build the cascade for an applied parameter set
///
/// Pure function of its inputs: identical parameters give identical coefficients.
pub fn design_cascade(params: &BandParameters, sample_rate: f64, cascade: &mut Cascade) {
    let frequency = params.frequency as f64;
    let gain_db = params.gain_db as f64;
    let q = params.q as f64;

    match Design::for_params(params.band_type, params.order) {
        Design::Fixed(kind) => {
            build_fixed_stage(cascade, kind, frequency, gain_db, q, sample_rate);
        }
        Design::Variable(kind) => {
            build_variable_cascade(cascade, kind, frequency, gain_db, q, params.order, sample_rate);
        }
    }
}

/// Sample formats a band can filter in place
///
/// Filtering always runs in `f64`; `f32` buffers are widened per sample.
pub trait Sample: Copy + Send + 'static {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Sample for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Sample for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Run one sample through the first `active` sections of a lane
#[inline]
fn run_lane<S: Sample>(states: &mut [StageState], lane: usize, input: S) -> S {
    let mut x = input.to_f64();
    for state in states.iter_mut() {
        x = state[lane].run(x);
    }
    S::from_f64(x)
}

#[inline]
fn process_lane<S: Sample>(states: &mut [StageState], lane: usize, buffer: &mut [S]) {
    for sample in buffer.iter_mut() {
        *sample = run_lane(states, lane, *sample);
    }
}

/// Split L/R into mid `0.5·(L+R)` and side `0.5·(L−R)`
#[inline]
pub fn encode_mid_side<S: Sample>(left: &[S], right: &[S], mid: &mut [f64], side: &mut [f64]) {
    for (((l, r), m), s) in left.iter().zip(right).zip(mid.iter_mut()).zip(side.iter_mut()) {
        let (l, r) = (l.to_f64(), r.to_f64());
        *m = 0.5 * (l + r);
        *s = 0.5 * (l - r);
    }
}

/// Rebuild L = M+S and R = M−S
#[inline]
pub fn decode_mid_side<S: Sample>(mid: &[f64], side: &[f64], left: &mut [S], right: &mut [S]) {
    for (((l, r), m), s) in left.iter_mut().zip(right.iter_mut()).zip(mid).zip(side) {
        *l = S::from_f64(m + s);
        *r = S::from_f64(m - s);
    }
}

/// Filter engine for one band
pub struct BandEngine {
    index: usize,
    params: Arc<SharedBandParameters>,
    max_order: i32,
    sample_rate: f64,
    /// Last applied parameters (order already clamped); None forces a rebuild
    applied: Option<BandParameters>,
    cascade: Cascade,
    states: Vec<StageState>,
    active_stages: usize,
    response: Vec<f32>,
    response_dirty: bool,
    response_updated: bool,
    scratch_mid: Vec<f64>,
    scratch_side: Vec<f64>,
}

impl BandEngine {
    /// Create a band reading its live parameters from `params`
    ///
    /// `response_points` must equal the length of the grid later passed to
    /// [`BandEngine::process_block`].
    pub fn new(
        index: usize,
        params: Arc<SharedBandParameters>,
        max_order: i32,
        response_points: usize,
    ) -> Self {
        let capacity = stage_capacity(max_order);
        let identity = DirectForm2Transposed::<f64>::new(identity_coefficients());

        Self {
            index,
            params,
            max_order,
            sample_rate: crate::processor::DEFAULT_SAMPLE_RATE as f64,
            applied: None,
            cascade: Cascade::with_capacity(capacity),
            states: vec![[identity, identity]; capacity],
            active_stages: 0,
            response: vec![1.0; response_points],
            response_dirty: false,
            response_updated: false,
            scratch_mid: Vec::new(),
            scratch_side: Vec::new(),
        }
    }

    /// Setup phase: size scratch buffers, store the sample rate and force a
    /// rebuild on the next block. Allocates.
    pub fn prepare(&mut self, context: &ProcessContext) {
        self.sample_rate = sanitize_sample_rate(context.sample_rate) as f64;
        let block = context.max_block_size.max(1);
        self.scratch_mid.resize(block, 0.0);
        self.scratch_side.resize(block, 0.0);
        self.reset();
        self.invalidate();
    }

    /// Forget the applied parameters so the next block rebuilds everything
    pub fn invalidate(&mut self) {
        self.applied = None;
    }

    /// Clear filter delay lines
    pub fn reset(&mut self) {
        for state in &mut self.states {
            state[0].reset_state();
            state[1].reset_state();
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Live parameter store shared with the control side
    pub fn shared_params(&self) -> &Arc<SharedBandParameters> {
        &self.params
    }

    /// Parameters the current cascade was built from
    pub fn applied_params(&self) -> Option<&BandParameters> {
        self.applied.as_ref()
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Cached response curve (power gain per grid point)
    pub fn response(&self) -> &[f32] {
        &self.response
    }

    pub fn is_enabled(&self) -> bool {
        self.applied.map(|p| p.enabled).unwrap_or(false)
    }

    pub fn routing(&self) -> Routing {
        self.applied.map(|p| p.routing).unwrap_or_default()
    }

    /// This band's input to response aggregation
    pub fn contribution(&self) -> BandResponse<'_> {
        BandResponse {
            enabled: self.is_enabled(),
            routing: self.routing(),
            gains: &self.response,
        }
    }

    /// Returns and clears the "response updated" flag
    pub fn take_response_updated(&mut self) -> bool {
        std::mem::take(&mut self.response_updated)
    }

    /// Apply a parameter snapshot, rebuilding the cascade if it differs from
    /// the applied copy. Returns true when a rebuild happened.
    ///
    /// The order is clamped to the type's legal range before comparing, so a
    /// raw order change that clamps to the applied value is not a change.
    ///
    /// # Real-time Safety
    /// No allocations.
    pub fn sync(&mut self, live: &BandParameters) -> bool {
        let order = live.clamped_order(self.max_order);

        if let Some(applied) = &self.applied {
            if applied.enabled == live.enabled
                && applied.band_type == live.band_type
                && applied.routing == live.routing
                && applied.frequency == live.frequency
                && applied.gain_db == live.gain_db
                && applied.q == live.q
                && applied.order == order
            {
                return false;
            }
        }

        let applied = BandParameters { order, ..*live };
        self.applied = Some(applied);
        self.response_dirty = true;

        design_cascade(&applied, self.sample_rate, &mut self.cascade);
        self.install_cascade();
        true
    }

    /// Load the cascade into the filter state; sections that just became
    /// active start from silence
    fn install_cascade(&mut self) {
        let previous = self.active_stages;
        let active = self.cascade.len().min(self.states.len());

        for (i, (state, coeffs)) in self
            .states
            .iter_mut()
            .zip(self.cascade.stages())
            .enumerate()
        {
            for lane in state.iter_mut() {
                lane.update_coefficients(*coeffs);
                if i >= previous {
                    lane.reset_state();
                }
            }
        }

        self.active_stages = active;
    }

    /// Recompute the cached curve if the cascade changed since the last evaluation
    pub fn refresh_response(&mut self, grid: &FrequencyGrid) {
        if !self.response_dirty {
            return;
        }
        evaluate_response(&self.cascade, grid, &mut self.response);
        self.response_dirty = false;
        self.response_updated = true;
    }

    /// Process one block using the band's live parameter store
    ///
    /// `right` is None for mono input.
    ///
    /// # Real-time Safety
    /// No allocations, no locks.
    #[inline]
    pub fn process_block<S: Sample>(
        &mut self,
        grid: &FrequencyGrid,
        left: &mut [S],
        right: Option<&mut [S]>,
    ) {
        let live = self.params.snapshot();
        self.process_with(&live, grid, left, right);
    }

    /// Process one block with an explicitly supplied parameter snapshot
    pub fn process_with<S: Sample>(
        &mut self,
        live: &BandParameters,
        grid: &FrequencyGrid,
        left: &mut [S],
        right: Option<&mut [S]>,
    ) {
        self.begin_block(live, grid);
        self.filter(left, right);
    }

    /// Block-boundary half of processing: apply the snapshot and refresh the
    /// cached response
    ///
    /// Call once per block before any [`BandEngine::filter`] calls, so a block
    /// split into several chunks still sees a single parameter set.
    pub fn begin_block(&mut self, live: &BandParameters, grid: &FrequencyGrid) {
        self.sync(live);
        self.refresh_response(grid);
    }

    /// Run samples through the current cascade according to the routing
    ///
    /// Does nothing while the band is disabled.
    pub fn filter<S: Sample>(&mut self, left: &mut [S], right: Option<&mut [S]>) {
        if !self.is_enabled() {
            return;
        }

        let routing = self.routing();
        let states = &mut self.states[..self.active_stages];

        match right {
            None => process_lane(states, 0, left),
            Some(right) => {
                let len = left.len().min(right.len());
                let (left, right) = (&mut left[..len], &mut right[..len]);

                match routing {
                    Routing::Stereo => {
                        process_lane(states, 0, left);
                        process_lane(states, 1, right);
                    }
                    Routing::Left => process_lane(states, 0, left),
                    Routing::Right => process_lane(states, 0, right),
                    Routing::Mid | Routing::Side => {
                        let chunk = self.scratch_mid.len().min(self.scratch_side.len());
                        if chunk == 0 {
                            // Not prepared: nothing to decode into
                            return;
                        }

                        for (l, r) in left.chunks_mut(chunk).zip(right.chunks_mut(chunk)) {
                            let n = l.len();
                            let mid = &mut self.scratch_mid[..n];
                            let side = &mut self.scratch_side[..n];

                            encode_mid_side(l, r, mid, side);
                            if routing == Routing::Mid {
                                process_lane(states, 0, mid);
                            } else {
                                process_lane(states, 0, side);
                            }
                            decode_mid_side(mid, side, l, r);
                        }
                    }
                }
            }
        }
    }
}
