//! Parq DSP - Digital Signal Processing Module
//!
//! This crate provides the signal path of the Parq multi-band equalizer:
//! - Band parameters with atomic per-field storage for control threads
//! - Magnitude-matched biquad design and variable-order cascades
//! - Per-band filter engine with stereo/left/right/mid/side routing
//! - Log-spaced response curves aggregated per routing bucket
//! - FFT spectrum analyser with decimation, smoothing and peak hold
//!
//! # Architecture
//!
//! The DSP chain follows a strict "no allocation in audio callback" rule.
//! Buffers are sized in the setup phase (`prepare` / constructors); cascades
//! are rebuilt only when a band's parameter snapshot changes.

mod analyser;
mod band;
mod coefficients;
mod error;
mod fft;
mod params;
mod processor;
mod response;

pub use analyser::{
    downsampling_factor, AnalyserSettings, DecimationFilter, SpectrumAnalyser,
    ANALYSER_BASE_RATE, ANALYSER_START_HZ,
};
pub use band::{decode_mid_side, design_cascade, encode_mid_side, BandEngine, Sample};
pub use coefficients::{
    build_fixed_stage, build_variable_cascade, evaluate_response, identity_coefficients,
    stage_capacity, Cascade, StageKind, VariableKind,
};
pub use error::DspError;
pub use fft::{HannWindow, RealFft, RustFftEngine, FFT_REFERENCE_SIZE};
pub use params::{
    BandGroup, BandParameterIds, BandParameters, BandType, Routing, SharedBandParameters,
    DEFAULT_MAX_ORDER, FREQ_DEFAULT, FREQ_MAX, FREQ_MIN, GAIN_MAX, GAIN_MIN, ORDER_DEFAULT,
    Q_DEFAULT, Q_MAX, Q_MIN,
};
pub use processor::{
    sanitize_sample_rate, AudioProcessor, ProcessContext, DEFAULT_SAMPLE_RATE, MIN_SAMPLE_RATE,
};
pub use response::{
    BandResponse, FrequencyGrid, ResponseAggregator, ResponseBucket, ResponseCurves,
    ResponseGridConfig, RESPONSE_END_HZ, RESPONSE_POINTS, RESPONSE_START_HZ,
};
