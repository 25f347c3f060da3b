//! Shared Presentation State
//!
//! Everything the control/presentation side and the audio thread both touch:
//! - per-band parameter stores (atomics, written by control, read per block)
//! - analyser tap selection and the clear-peaks request (atomics)
//! - published response curves and analyser frames (mutex slots)
//!
//! # Real-time Safety
//!
//! The audio thread only ever calls `try_lock` on the slots. When the
//! presentation side holds a slot, publishing is skipped and retried on the
//! next block, so the audio thread never waits. Freshness is signalled with
//! one-shot `AtomicBool` flags.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use parq_dsp::{BandParameters, ResponseCurves, SharedBandParameters};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::message::Event;

/// Which signal feeds the spectrum analyser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalyserTap {
    #[default]
    Disabled,
    /// Input before the bands
    Pre,
    /// Output after the bands
    Post,
}

impl AnalyserTap {
    pub const ALL: [AnalyserTap; 3] = [AnalyserTap::Disabled, AnalyserTap::Pre, AnalyserTap::Post];

    /// Out-of-range indices read as Disabled
    pub fn from_index(index: u32) -> Self {
        Self::ALL.get(index as usize).copied().unwrap_or_default()
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            AnalyserTap::Disabled => "Off",
            AnalyserTap::Pre => "Pre",
            AnalyserTap::Post => "Post",
        }
    }
}

/// One published analyser snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyserFrame {
    /// Reported band centre frequencies
    pub freqs: Vec<f32>,
    /// Smoothed magnitudes
    pub mags: Vec<f32>,
    /// Peak-hold magnitudes
    pub peak_mags: Vec<f32>,
}

impl AnalyserFrame {
    pub fn new(num_bands: usize) -> Self {
        Self {
            freqs: vec![0.0; num_bands],
            mags: vec![0.0; num_bands],
            peak_mags: vec![0.0; num_bands],
        }
    }

    /// Copy without reallocating; slices must match the frame's band count
    pub(crate) fn copy_from(&mut self, freqs: &[f32], mags: &[f32], peak_mags: &[f32]) {
        self.freqs.copy_from_slice(freqs);
        self.mags.copy_from_slice(mags);
        self.peak_mags.copy_from_slice(peak_mags);
    }

    /// Band magnitudes in dB
    pub fn mags_db(&self) -> Vec<f32> {
        self.mags
            .iter()
            .map(|&m| 20.0 * m.max(1.0e-9).log10())
            .collect()
    }
}

/// State shared between the engine and its handles
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) bands: Vec<Arc<SharedBandParameters>>,
    analyser_tap: AtomicU32,
    clear_peaks: AtomicBool,
    pub(crate) response: Mutex<ResponseCurves>,
    response_fresh: AtomicBool,
    pub(crate) analyser: Mutex<AnalyserFrame>,
    analyser_fresh: AtomicBool,
}

impl SharedState {
    pub(crate) fn new(num_bands: usize, response_points: usize, analyser_bands: usize) -> Self {
        let mut curves = ResponseCurves::new(response_points);
        curves.stereo.used = true;

        Self {
            bands: (0..num_bands)
                .map(|_| Arc::new(SharedBandParameters::default()))
                .collect(),
            analyser_tap: AtomicU32::new(AnalyserTap::Disabled.index()),
            clear_peaks: AtomicBool::new(false),
            response: Mutex::new(curves),
            response_fresh: AtomicBool::new(false),
            analyser: Mutex::new(AnalyserFrame::new(analyser_bands)),
            analyser_fresh: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn analyser_tap(&self) -> AnalyserTap {
        AnalyserTap::from_index(self.analyser_tap.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn take_clear_peaks(&self) -> bool {
        self.clear_peaks.swap(false, Ordering::AcqRel)
    }

    /// Audio thread: copy curves into the slot if it is free
    ///
    /// Returns false when the slot was busy; the caller retries next block.
    #[inline]
    pub(crate) fn try_publish_response(&self, curves: &ResponseCurves) -> bool {
        match self.response.try_lock() {
            Some(mut slot) => {
                slot.copy_from(curves);
                drop(slot);
                self.response_fresh.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Audio thread: copy analyser output into the slot if it is free
    #[inline]
    pub(crate) fn try_publish_analyser(
        &self,
        freqs: &[f32],
        mags: &[f32],
        peak_mags: &[f32],
    ) -> bool {
        match self.analyser.try_lock() {
            Some(mut slot) => {
                slot.copy_from(freqs, mags, peak_mags);
                drop(slot);
                self.analyser_fresh.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

/// Control/presentation access to a running engine
///
/// Cheap to clone; every clone talks to the same engine.
#[derive(Debug, Clone)]
pub struct EqualizerHandle {
    shared: Arc<SharedState>,
    events: Receiver<Event>,
    max_order: i32,
}

impl EqualizerHandle {
    pub(crate) fn new(shared: Arc<SharedState>, events: Receiver<Event>, max_order: i32) -> Self {
        Self {
            shared,
            events,
            max_order,
        }
    }

    pub fn num_bands(&self) -> usize {
        self.shared.bands.len()
    }

    pub fn max_order(&self) -> i32 {
        self.max_order
    }

    /// Live parameter store of one band, for per-field automation writes
    pub fn band(&self, index: usize) -> EngineResult<&SharedBandParameters> {
        self.shared
            .bands
            .get(index)
            .map(Arc::as_ref)
            .ok_or(EngineError::InvalidBandIndex {
                index,
                count: self.shared.bands.len(),
            })
    }

    /// Overwrite every field of one band
    pub fn set_band(&self, index: usize, params: &BandParameters) -> EngineResult<()> {
        self.band(index)?.store(params);
        Ok(())
    }

    /// Current (sanitised) parameters of one band
    pub fn band_params(&self, index: usize) -> EngineResult<BandParameters> {
        Ok(self.band(index)?.snapshot())
    }

    /// Parameters of every band, in band order
    pub fn all_band_params(&self) -> Vec<BandParameters> {
        self.shared.bands.iter().map(|b| b.snapshot()).collect()
    }

    pub fn set_analyser_tap(&self, tap: AnalyserTap) {
        self.shared.analyser_tap.store(tap.index(), Ordering::Relaxed);
    }

    pub fn analyser_tap(&self) -> AnalyserTap {
        self.shared.analyser_tap()
    }

    /// Ask the audio thread to reset peak-hold at the next block
    pub fn request_clear_peaks(&self) {
        self.shared.clear_peaks.store(true, Ordering::Release);
    }

    /// Returns the curves if new ones were published since the last call
    pub fn take_response(&self) -> Option<ResponseCurves> {
        if self.shared.response_fresh.swap(false, Ordering::Acquire) {
            Some(self.shared.response.lock().clone())
        } else {
            None
        }
    }

    /// Latest published curves, fresh or not
    pub fn response(&self) -> ResponseCurves {
        self.shared.response.lock().clone()
    }

    /// Returns the analyser frame if a new one was published since the last call
    pub fn take_analyser_frame(&self) -> Option<AnalyserFrame> {
        if self.shared.analyser_fresh.swap(false, Ordering::Acquire) {
            Some(self.shared.analyser.lock().clone())
        } else {
            None
        }
    }

    /// Latest published analyser frame, fresh or not
    pub fn analyser_frame(&self) -> AnalyserFrame {
        self.shared.analyser.lock().clone()
    }

    /// Engine notifications
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Drain all pending notifications
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }
}
