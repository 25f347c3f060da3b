//! Audio Processor Trait
//!
//! Defines the setup context and the block-processing interface shared by
//! the equalizer engine and anything a host chains around it.

use crate::error::DspError;

/// Lowest sample rate the engine accepts; anything below falls back to the default
pub const MIN_SAMPLE_RATE: f32 = 8000.0;

/// Sample rate used before `prepare` and as a fallback for invalid rates
pub const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

/// Replace a missing or unusable sample rate with [`DEFAULT_SAMPLE_RATE`]
#[inline]
pub fn sanitize_sample_rate(sample_rate: f32) -> f32 {
    if sample_rate.is_finite() && sample_rate >= MIN_SAMPLE_RATE {
        sample_rate
    } else {
        DEFAULT_SAMPLE_RATE
    }
}

/// Context passed to processors containing stream metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: f32,
    pub input_channels: usize,
    pub output_channels: usize,
    pub max_block_size: usize,
}

impl ProcessContext {
    pub fn new(
        sample_rate: f32,
        input_channels: usize,
        output_channels: usize,
        max_block_size: usize,
    ) -> Self {
        Self {
            sample_rate,
            input_channels,
            output_channels,
            max_block_size,
        }
    }

    /// Only mono or stereo with equal input and output channel counts is
    /// supported, and blocks must hold at least one frame
    pub fn validate(&self) -> Result<(), DspError> {
        if self.max_block_size == 0 {
            return Err(DspError::InvalidBlockSize(0));
        }

        let supported = matches!(self.output_channels, 1 | 2)
            && self.input_channels == self.output_channels;

        if supported {
            Ok(())
        } else {
            Err(DspError::UnsupportedLayout {
                inputs: self.input_channels,
                outputs: self.output_channels,
            })
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.output_channels == 2
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, 2, 2, 512)
    }
}

/// Trait for block-based audio processors
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no blocking locks)
/// - Constant or O(n) time complexity where n = block size
///
/// `prepare()` is the setup phase and may allocate.
pub trait AudioProcessor: Send {
    /// Setup phase: size buffers for the given stream
    fn prepare(&mut self, context: &ProcessContext) -> Result<(), DspError>;

    /// Process one block in place; `right` is None for mono streams
    fn process(&mut self, left: &mut [f32], right: Option<&mut [f32]>);

    /// Reset internal state (delay lines, analyser history)
    fn reset(&mut self);

    /// Human-readable name for debugging/UI
    fn name(&self) -> &'static str;

    /// Whether this processor is currently enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test processor that just inverts audio
    struct InvertProcessor {
        prepared: bool,
    }

    impl AudioProcessor for InvertProcessor {
        fn prepare(&mut self, context: &ProcessContext) -> Result<(), DspError> {
            context.validate()?;
            self.prepared = true;
            Ok(())
        }

        fn process(&mut self, left: &mut [f32], right: Option<&mut [f32]>) {
            left.iter_mut().for_each(|s| *s = -*s);
            if let Some(right) = right {
                right.iter_mut().for_each(|s| *s = -*s);
            }
        }

        fn reset(&mut self) {}

        fn name(&self) -> &'static str {
            "Inverter"
        }
    }

    #[test]
    fn test_process_context() {
        let ctx = ProcessContext::new(44100.0, 2, 2, 256);
        assert_eq!(ctx.sample_rate, 44100.0);
        assert_eq!(ctx.max_block_size, 256);
        assert!(ctx.is_stereo());
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_layout_validation() {
        assert!(ProcessContext::new(48000.0, 1, 1, 64).validate().is_ok());
        assert!(ProcessContext::new(48000.0, 1, 2, 64).validate().is_err());
        assert!(ProcessContext::new(48000.0, 6, 6, 64).validate().is_err());
        assert!(ProcessContext::new(48000.0, 0, 0, 64).validate().is_err());
        assert_eq!(
            ProcessContext::new(48000.0, 2, 2, 0).validate(),
            Err(DspError::InvalidBlockSize(0))
        );
    }

    #[test]
    fn test_sanitize_sample_rate() {
        assert_eq!(sanitize_sample_rate(96000.0), 96000.0);
        assert_eq!(sanitize_sample_rate(0.0), DEFAULT_SAMPLE_RATE);
        assert_eq!(sanitize_sample_rate(-44100.0), DEFAULT_SAMPLE_RATE);
        assert_eq!(sanitize_sample_rate(f32::NAN), DEFAULT_SAMPLE_RATE);
        assert_eq!(sanitize_sample_rate(f32::INFINITY), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_trait_object() {
        let mut processor: Box<dyn AudioProcessor> = Box::new(InvertProcessor { prepared: false });
        assert!(processor.prepare(&ProcessContext::default()).is_ok());
        assert!(processor.is_enabled());

        let mut left = vec![0.5, -0.25];
        let mut right = vec![1.0, 0.0];
        processor.process(&mut left, Some(&mut right));
        assert_eq!(left, vec![-0.5, 0.25]);
        assert_eq!(right, vec![-1.0, 0.0]);
        assert_eq!(processor.name(), "Inverter");
    }

    #[test]
    fn test_bad_layout_rejected() {
        let mut processor = InvertProcessor { prepared: false };
        let err = processor.prepare(&ProcessContext::new(48000.0, 2, 1, 64));
        assert!(err.is_err());
        assert!(!processor.prepared);
    }
}
