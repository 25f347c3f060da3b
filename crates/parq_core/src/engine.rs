//! Equalizer Engine - Main Entry Point
//!
//! The EqualizerEngine is the only component the audio callback drives. Each
//! block it:
//!
//! ```text
//!   analyser tap change? ──▶ clear analyser
//!   tap = Pre  ──▶ SpectrumAnalyser
//!   BandEngine 0..N  (sync params, rebuild, refresh response)
//!   BandEngine 0..N  filter in place, chained in f64
//!   any response updated? ──▶ ResponseAggregator ──▶ publish curves
//!   tap = Post ──▶ SpectrumAnalyser ──▶ publish frame
//! ```
//!
//! The control/presentation side talks to the engine through an
//! [`EqualizerHandle`]: band parameters and the analyser tap are atomics,
//! curves and analyser frames are published into `try_lock` slots.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parq_dsp::{
    sanitize_sample_rate, AudioProcessor, BandEngine, DspError, FrequencyGrid, ProcessContext,
    ResponseAggregator, ResponseCurves, SpectrumAnalyser,
};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, StreamConfig};
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::shared::{AnalyserTap, EqualizerHandle, SharedState};

/// Multi-band equalizer with response curves and spectrum analyser
pub struct EqualizerEngine {
    config: EngineConfig,
    stream: StreamConfig,
    grid: FrequencyGrid,
    bands: Vec<BandEngine>,
    aggregator: ResponseAggregator,
    analyser: SpectrumAnalyser,
    active_tap: AnalyserTap,
    shared: Arc<SharedState>,
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
    /// Curves aggregated but not yet published (slot was busy)
    response_pending: bool,
    /// Analyser output changed but not yet published
    analyser_pending: bool,
    /// Double-precision working buffers the whole band chain runs on
    work_left: Vec<f64>,
    work_right: Vec<f64>,
}

impl EqualizerEngine {
    /// Create an engine prepared for the default stream (48 kHz stereo, 512 frames)
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let grid = config.response.build();
        let shared = Arc::new(SharedState::new(
            config.num_bands,
            grid.len(),
            config.analyser.num_bands,
        ));

        let bands = shared
            .bands
            .iter()
            .enumerate()
            .map(|(i, params)| BandEngine::new(i, Arc::clone(params), config.max_order, grid.len()))
            .collect();

        let stream = StreamConfig::default();
        let analyser = SpectrumAnalyser::new(config.analyser, stream.sample_rate as u32)?;
        let (event_sender, event_receiver) = bounded(config.event_capacity);

        info!(
            "Creating equalizer engine: {} bands, max order {}, {} response points",
            config.num_bands,
            config.max_order,
            grid.len()
        );

        let mut engine = Self {
            aggregator: ResponseAggregator::new(grid.len()),
            config,
            stream,
            grid,
            bands,
            analyser,
            active_tap: AnalyserTap::Disabled,
            shared,
            event_sender,
            event_receiver,
            response_pending: false,
            analyser_pending: false,
            work_left: Vec::new(),
            work_right: Vec::new(),
        };
        engine.prepare(&stream)?;
        Ok(engine)
    }

    /// Setup phase: adopt a new sample rate / block size / layout
    ///
    /// Allocates. Resets filter state, rebuilds the analyser for the new rate
    /// and forces every band to rebuild on the next block. A sample rate
    /// below `MIN_SAMPLE_RATE` or non-finite falls back to the default.
    pub fn prepare(&mut self, stream: &StreamConfig) -> EngineResult<()> {
        if let Err(e) = stream.validate() {
            warn!("Rejected stream configuration {:?}: {}", stream, e);
            return Err(e);
        }

        let sample_rate = sanitize_sample_rate(stream.sample_rate);
        if sample_rate != stream.sample_rate {
            warn!(
                "Unusable sample rate {} Hz, falling back to {} Hz",
                stream.sample_rate, sample_rate
            );
        }
        let stream = StreamConfig {
            sample_rate,
            ..*stream
        };

        self.analyser = SpectrumAnalyser::new(self.config.analyser, sample_rate.round() as u32)?;
        self.active_tap = self.shared.analyser_tap();
        self.grid.set_sample_rate(sample_rate);

        self.work_left.resize(stream.max_block_size, 0.0);
        self.work_right.resize(stream.max_block_size, 0.0);

        let context = stream.context();
        for band in &mut self.bands {
            band.prepare(&context);
        }

        {
            // Setup phase: a blocking lock is fine here
            let mut frame = self.shared.analyser.lock();
            frame.copy_from(
                self.analyser.freqs(),
                self.analyser.mags(),
                self.analyser.peak_mags(),
            );
        }
        self.response_pending = false;
        self.analyser_pending = false;
        self.stream = stream;

        info!(
            "Prepared: {} Hz, {} channel(s), max block {} frames, analyser downsampling x{}",
            sample_rate,
            stream.output_channels,
            stream.max_block_size,
            self.analyser.downsampling_factor()
        );

        let _ = self.event_sender.try_send(Event::Prepared {
            sample_rate,
            max_block_size: stream.max_block_size,
            downsampling_factor: self.analyser.downsampling_factor(),
        });
        Ok(())
    }

    /// Process one block in place; `right` is None for mono streams
    ///
    /// Slices of different length are processed up to the shorter one.
    ///
    /// # Real-time Safety
    /// No allocations, no blocking locks, no logging.
    pub fn process_block(&mut self, left: &mut [f32], right: Option<&mut [f32]>) {
        let (left, mut right) = match right {
            Some(right) => {
                let len = left.len().min(right.len());
                (&mut left[..len], Some(&mut right[..len]))
            }
            None => (left, None),
        };

        let tap = self.shared.analyser_tap();
        if tap != self.active_tap {
            self.analyser.clear();
            self.active_tap = tap;
            self.analyser_pending = true;
            let _ = self.event_sender.try_send(Event::AnalyserTapChanged(tap));
        }

        if self.shared.take_clear_peaks() {
            self.analyser.clear_peaks();
            self.analyser_pending = true;
        }

        if tap == AnalyserTap::Pre {
            self.analyser.process_block(left, right.as_deref());
        }

        for band in &mut self.bands {
            let live = band.shared_params().snapshot();
            band.begin_block(&live, &self.grid);
        }
        self.run_bands(left, right.as_deref_mut());

        // Every flag must be consumed, so no short-circuit
        let mut changed = false;
        for band in &mut self.bands {
            changed |= band.take_response_updated();
        }

        if changed {
            self.aggregator
                .aggregate(self.bands.iter().map(BandEngine::contribution));
            self.response_pending = true;
        }

        if self.response_pending && self.shared.try_publish_response(self.aggregator.curves()) {
            self.response_pending = false;
            let _ = self.event_sender.try_send(Event::ResponseChanged);
        }

        if tap == AnalyserTap::Post {
            self.analyser.process_block(left, right.as_deref());
        }

        if self.analyser.take_new_data() {
            self.analyser_pending = true;
        }

        if self.analyser_pending
            && self.shared.try_publish_analyser(
                self.analyser.freqs(),
                self.analyser.mags(),
                self.analyser.peak_mags(),
            )
        {
            self.analyser_pending = false;
            let _ = self.event_sender.try_send(Event::AnalyserUpdated);
        }
    }

    /// Run the band chain in double precision, one working-buffer chunk at a time
    ///
    /// Samples are rounded back to `f32` only after the last band.
    fn run_bands(&mut self, left: &mut [f32], mut right: Option<&mut [f32]>) {
        let chunk = self.work_left.len().min(self.work_right.len());
        if chunk == 0 {
            for band in &mut self.bands {
                band.filter(&mut *left, right.as_deref_mut());
            }
            return;
        }

        for (index, left) in left.chunks_mut(chunk).enumerate() {
            let n = left.len();
            let start = index * chunk;

            let work_left = &mut self.work_left[..n];
            widen(left, work_left);

            let mut right = right.as_deref_mut().map(|r| &mut r[start..start + n]);
            let mut work_right = match right.as_deref() {
                Some(right) => {
                    let work = &mut self.work_right[..n];
                    widen(right, work);
                    Some(work)
                }
                None => None,
            };

            for band in &mut self.bands {
                band.filter(&mut *work_left, work_right.as_deref_mut());
            }

            narrow(work_left, left);
            if let (Some(right), Some(work)) = (right.as_deref_mut(), work_right.as_deref()) {
                narrow(work, right);
            }
        }
    }

    /// Clear filter delay lines and analyser history
    pub fn reset(&mut self) {
        debug!("Resetting filter and analyser state");
        for band in &mut self.bands {
            band.reset();
        }
        self.analyser.clear();
        self.analyser_pending = true;
    }

    /// Control/presentation handle onto this engine
    pub fn handle(&self) -> EqualizerHandle {
        EqualizerHandle::new(
            Arc::clone(&self.shared),
            self.event_receiver.clone(),
            self.config.max_order,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stream setup after sample-rate sanitising
    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn sample_rate(&self) -> f32 {
        self.stream.sample_rate
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> EngineResult<&BandEngine> {
        self.bands.get(index).ok_or(EngineError::InvalidBandIndex {
            index,
            count: self.bands.len(),
        })
    }

    pub fn grid(&self) -> &FrequencyGrid {
        &self.grid
    }

    /// Latest aggregated curves as seen by the audio thread
    pub fn response_curves(&self) -> &ResponseCurves {
        self.aggregator.curves()
    }

    pub fn analyser(&self) -> &SpectrumAnalyser {
        &self.analyser
    }

    /// Mutable analyser access, e.g. to install a decimation filter
    ///
    /// `prepare` rebuilds the analyser, so setup done here must be repeated
    /// after each `prepare`.
    pub fn analyser_mut(&mut self) -> &mut SpectrumAnalyser {
        &mut self.analyser
    }
}

#[inline]
fn widen(src: &[f32], dst: &mut [f64]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s as f64;
    }
}

#[inline]
fn narrow(src: &[f64], dst: &mut [f32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s as f32;
    }
}

impl AudioProcessor for EqualizerEngine {
    fn prepare(&mut self, context: &ProcessContext) -> Result<(), DspError> {
        let stream = StreamConfig {
            sample_rate: context.sample_rate,
            input_channels: context.input_channels,
            output_channels: context.output_channels,
            max_block_size: context.max_block_size,
        };

        match EqualizerEngine::prepare(self, &stream) {
            Ok(()) => Ok(()),
            Err(EngineError::DspError(e)) => Err(e),
            // Config was validated at construction; only DSP errors remain
            Err(e) => {
                warn!("Unexpected prepare failure: {}", e);
                Err(DspError::InvalidSampleRate(context.sample_rate))
            }
        }
    }

    fn process(&mut self, left: &mut [f32], right: Option<&mut [f32]>) {
        self.process_block(left, right);
    }

    fn reset(&mut self) {
        EqualizerEngine::reset(self);
    }

    fn name(&self) -> &'static str {
        "Parametric Equalizer"
    }
}
