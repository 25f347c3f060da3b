//! Message Types for Thread Communication
//!
//! Events flow from the audio thread to the presentation side over a bounded
//! channel. They only announce that fresh data is waiting in the shared
//! state; the data itself is read through `EqualizerHandle`.

use serde::{Deserialize, Serialize};

use crate::shared::AnalyserTap;

/// Events sent from the engine to the presentation side
///
/// Variants carry only `Copy` payloads so sending never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// `prepare` finished with this (sanitised) stream setup
    Prepared {
        sample_rate: f32,
        max_block_size: usize,
        downsampling_factor: usize,
    },

    /// New composite response curves were published
    ResponseChanged,

    /// A new analyser frame was published
    AnalyserUpdated,

    /// The analyser switched feed and was cleared
    AnalyserTapChanged(AnalyserTap),
}
