//! Engine and Stream Configuration

use std::fs;
use std::path::Path;

use parq_dsp::{
    AnalyserSettings, ProcessContext, ResponseGridConfig, DEFAULT_MAX_ORDER, DEFAULT_SAMPLE_RATE,
};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default number of bands
pub const DEFAULT_NUM_BANDS: usize = 12;

/// Upper bound on the band count
pub const MAX_BANDS: usize = 64;

/// Audio stream configuration handed to `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: f32,

    /// Input channel count (1 = mono, 2 = stereo)
    pub input_channels: usize,

    /// Output channel count; must equal the input count
    pub output_channels: usize,

    /// Largest block the host will deliver, in frames
    pub max_block_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            input_channels: 2,
            output_channels: 2,
            max_block_size: 512,
        }
    }
}

impl StreamConfig {
    pub fn stereo(sample_rate: f32, max_block_size: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            ..Default::default()
        }
    }

    pub fn mono(sample_rate: f32, max_block_size: usize) -> Self {
        Self {
            sample_rate,
            input_channels: 1,
            output_channels: 1,
            max_block_size,
        }
    }

    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.max_block_size as f32 / self.sample_rate) * 1000.0
    }

    /// Validate layout and block size
    ///
    /// The sample rate is not checked here: unusable rates fall back to the
    /// default when the engine prepares.
    pub fn validate(&self) -> EngineResult<()> {
        self.context().validate()?;
        Ok(())
    }

    pub fn context(&self) -> ProcessContext {
        ProcessContext::new(
            self.sample_rate,
            self.input_channels,
            self.output_channels,
            self.max_block_size,
        )
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of bands
    pub num_bands: usize,

    /// Highest order a variable-order band may use
    pub max_order: i32,

    /// Frequency grid the response curves are evaluated on
    pub response: ResponseGridConfig,

    /// Spectrum analyser setup
    pub analyser: AnalyserSettings,

    /// Capacity of the engine → presentation event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_bands: DEFAULT_NUM_BANDS,
            max_order: DEFAULT_MAX_ORDER,
            response: ResponseGridConfig::default(),
            analyser: AnalyserSettings::default(),
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Lighter setup for tests and quick previews: fewer grid points and a
    /// smaller FFT
    pub fn lightweight() -> Self {
        Self {
            response: ResponseGridConfig {
                num_points: 120,
                ..Default::default()
            },
            analyser: AnalyserSettings {
                fft_order: 11,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.num_bands == 0 || self.num_bands > MAX_BANDS {
            return Err(EngineError::InvalidBandCount {
                got: self.num_bands,
                max: MAX_BANDS,
            });
        }
        if self.max_order < 2 {
            return Err(parq_dsp::DspError::InvalidMaxOrder(self.max_order).into());
        }
        if self.event_capacity == 0 {
            return Err(EngineError::ConfigError(
                "event channel capacity must be at least 1".into(),
            ));
        }
        self.response.validate()?;
        self.analyser.validate()?;
        Ok(())
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parq_dsp::DspError;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.num_bands, 12);
        assert_eq!(config.max_order, 8);
        assert_eq!(config.response.num_points, 300);
        assert_eq!(config.analyser.fft_size(), 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_validation() {
        assert!(StreamConfig::default().validate().is_ok());
        assert!(StreamConfig::mono(44100.0, 128).validate().is_ok());

        let zero_block = StreamConfig::stereo(48000.0, 0);
        assert!(matches!(
            zero_block.validate(),
            Err(EngineError::DspError(DspError::InvalidBlockSize(0)))
        ));

        let mismatched = StreamConfig {
            input_channels: 1,
            ..Default::default()
        };
        assert!(matches!(mismatched.validate(), Err(EngineError::DspError(_))));

        let surround = StreamConfig {
            input_channels: 6,
            output_channels: 6,
            ..Default::default()
        };
        assert!(surround.validate().is_err());
    }

    #[test]
    fn test_latency_calculation() {
        let config = StreamConfig::stereo(48000.0, 480);
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_engine_config_validation() {
        let no_bands = EngineConfig {
            num_bands: 0,
            ..Default::default()
        };
        assert!(matches!(
            no_bands.validate(),
            Err(EngineError::InvalidBandCount { got: 0, .. })
        ));

        let low_order = EngineConfig {
            max_order: 1,
            ..Default::default()
        };
        assert!(low_order.validate().is_err());

        let mut bad_fft = EngineConfig::default();
        bad_fft.analyser.fft_order = 40;
        assert!(matches!(bad_fft.validate(), Err(EngineError::DspError(_))));
    }

    #[test]
    fn test_json_roundtrip_and_partial() {
        let config = EngineConfig::lightweight();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);

        let partial = EngineConfig::from_json(r#"{ "num_bands": 4 }"#).unwrap();
        assert_eq!(partial.num_bands, 4);
        assert_eq!(partial.max_order, 8);

        assert!(EngineConfig::from_json(r#"{ "num_bands": 500 }"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(Path::new("/nonexistent/parq/config.json"));
        assert!(matches!(result, Err(EngineError::Io(_))));
    }
}
