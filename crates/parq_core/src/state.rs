//! Persistent Equalizer State
//!
//! Band parameters plus the analyser tap, saved and restored as JSON the
//! same way a host stores plugin state between sessions.

use std::fs;
use std::path::Path;

use parq_dsp::BandParameters;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::shared::{AnalyserTap, EqualizerHandle};

/// Snapshot of everything a user can change
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EqualizerState {
    #[serde(default)]
    pub analyser_tap: AnalyserTap,
    pub bands: Vec<BandParameters>,
}

impl EqualizerState {
    /// Read the current parameters from a running engine
    pub fn capture(handle: &EqualizerHandle) -> Self {
        Self {
            analyser_tap: handle.analyser_tap(),
            bands: handle.all_band_params(),
        }
    }

    /// Push this state into a running engine
    ///
    /// Extra bands beyond the engine's band count are ignored; bands the
    /// state does not mention keep their current values.
    pub fn apply(&self, handle: &EqualizerHandle) -> EngineResult<()> {
        if self.bands.len() > handle.num_bands() {
            warn!(
                "State has {} bands, engine has {}; ignoring the rest",
                self.bands.len(),
                handle.num_bands()
            );
        }

        for (index, params) in self.bands.iter().take(handle.num_bands()).enumerate() {
            handle.set_band(index, &params.sanitized())?;
        }
        handle.set_analyser_tap(self.analyser_tap);
        Ok(())
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = fs::File::open(path)?;
        let state = serde_json::from_reader(file)?;
        info!("State loaded from {:?}", path);
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;

        info!("State saved to {:?}", path);
        Ok(())
    }
}
