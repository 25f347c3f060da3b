//! DSP Error Types
//!
//! Only the setup phase reports errors. Block processing never fails:
//! out-of-range parameters are clamped instead.

use thiserror::Error;

/// Errors that can occur while configuring DSP components
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("Unsupported channel layout: {inputs} in / {outputs} out (mono or stereo, equal counts)")]
    UnsupportedLayout { inputs: usize, outputs: usize },

    #[error("Block size must be at least 1 frame, got {0}")]
    InvalidBlockSize(usize),

    #[error("FFT order {0} out of range (must be 4-16)")]
    InvalidFftOrder(u32),

    #[error("Overlap ratio {0} must be a power of two between 1 and the FFT size")]
    InvalidOverlapRatio(usize),

    #[error("Analyser needs at least 2 display bands, got {0}")]
    TooFewAnalyserBands(usize),

    #[error("Release time must be positive, got {0}s")]
    InvalidReleaseTime(f32),

    #[error("Maximum filter order must be at least 2, got {0}")]
    InvalidMaxOrder(i32),

    #[error("Response grid needs at least 2 points between {start_hz}Hz and {end_hz}Hz, got {points}")]
    InvalidResponseGrid {
        points: usize,
        start_hz: f32,
        end_hz: f32,
    },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DspError::InvalidFftOrder(22);
        assert!(err.to_string().contains("22"));

        let err = DspError::UnsupportedLayout {
            inputs: 2,
            outputs: 6,
        };
        assert!(err.to_string().contains("2 in / 6 out"));

        let err = DspError::BufferSizeMismatch {
            expected: 4096,
            got: 12,
        };
        assert!(err.to_string().contains("4096"));
    }
}
