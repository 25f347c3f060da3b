//! Parq Core - Equalizer Engine
//!
//! This crate wires the DSP building blocks into a complete equalizer:
//! - Per-block orchestration of the band engines
//! - Response curve aggregation and publishing
//! - Spectrum analyser tap (pre or post EQ)
//! - Lock-free parameter and notification paths to the presentation side
//! - JSON configuration and state persistence
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Control / Presentation                      │
//! │  EqualizerHandle ──atomics──▶ bands, tap, clear-peaks       │
//! │        ▲   ◀──try_lock slots── curves, analyser frame        │
//! └────────┼────────────────────────────────────────────────────┘
//!          │ crossbeam-channel (Event)
//!          │
//! ┌────────┴────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │   Pre tap ──▶ Band 1 ─▶ ... ─▶ Band N ──▶ Post tap          │
//! │      │                                       │              │
//! │      └──────────▶ SpectrumAnalyser ◀─────────┘              │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod engine;
mod error;
mod message;
mod shared;
mod state;

pub use config::{EngineConfig, StreamConfig, DEFAULT_NUM_BANDS, MAX_BANDS};
pub use engine::EqualizerEngine;
pub use error::{EngineError, EngineResult};
pub use message::Event;
pub use shared::{AnalyserFrame, AnalyserTap, EqualizerHandle};
pub use state::EqualizerState;

// Re-export DSP types for convenience
pub use parq_dsp::{
    AnalyserSettings, AudioProcessor, BandParameters, BandType, ResponseCurves,
    ResponseGridConfig, Routing,
};
