//! Band Parameters
//!
//! Value holder and validity rules for one EQ band, plus the lock-free
//! parameter store the automation/control side writes into.
//!
//! The audio thread never reads the store field-by-field during processing:
//! it takes one [`BandParameters`] snapshot per block via
//! [`SharedBandParameters::snapshot`]. Torn reads across fields are tolerated
//! (each field is individually atomic), they never crash and are corrected on
//! the next block.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Plugin-wide default for the highest selectable filter order (6 dB/oct per order)
pub const DEFAULT_MAX_ORDER: i32 = 8;

/// Frequency parameter range (Hz)
pub const FREQ_MIN: f32 = 20.0;
pub const FREQ_MAX: f32 = 20_000.0;
pub const FREQ_DEFAULT: f32 = 1000.0;

/// Gain parameter range (dB)
pub const GAIN_MIN: f32 = -24.0;
pub const GAIN_MAX: f32 = 24.0;

/// Q parameter range
pub const Q_MIN: f32 = 0.1;
pub const Q_MAX: f32 = 10.0;
pub const Q_DEFAULT: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Default order (12 dB/oct)
pub const ORDER_DEFAULT: i32 = 2;

/// Design family a band type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandGroup {
    /// Single second-order section (or its first-order alias)
    Fixed2ndOrder,
    /// Butterworth-decomposed cascade of selectable order
    VariableOrder,
}

impl BandGroup {
    pub fn name(self) -> &'static str {
        match self {
            BandGroup::Fixed2ndOrder => "Basic",
            BandGroup::VariableOrder => "Variable Order",
        }
    }
}

/// Filter type of a band
///
/// The discriminant order is the automation index order and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BandType {
    #[default]
    Peak,
    LowShelf,
    HighShelf,
    /// Second-order high pass ("Low Cut")
    HighPass,
    /// Second-order low pass ("High Cut")
    LowPass,
    VariableHighPass,
    VariableLowPass,
    VariableLowShelf,
    VariableHighShelf,
    VariableBandShelf,
}

impl BandType {
    pub const ALL: [BandType; 10] = [
        BandType::Peak,
        BandType::LowShelf,
        BandType::HighShelf,
        BandType::HighPass,
        BandType::LowPass,
        BandType::VariableHighPass,
        BandType::VariableLowPass,
        BandType::VariableLowShelf,
        BandType::VariableHighShelf,
        BandType::VariableBandShelf,
    ];

    /// Map an automation index to a type. Out-of-range indices fall back to
    /// the first enumerant instead of failing on the audio thread.
    pub fn from_index(index: u32) -> Self {
        Self::ALL.get(index as usize).copied().unwrap_or_default()
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn group(self) -> BandGroup {
        match self {
            BandType::Peak
            | BandType::LowShelf
            | BandType::HighShelf
            | BandType::HighPass
            | BandType::LowPass => BandGroup::Fixed2ndOrder,
            BandType::VariableHighPass
            | BandType::VariableLowPass
            | BandType::VariableLowShelf
            | BandType::VariableHighShelf
            | BandType::VariableBandShelf => BandGroup::VariableOrder,
        }
    }

    /// Whether the gain parameter affects this type
    pub fn has_gain(self) -> bool {
        !matches!(
            self,
            BandType::HighPass
                | BandType::LowPass
                | BandType::VariableHighPass
                | BandType::VariableLowPass
        )
    }

    /// Whether the Q parameter affects this type
    pub fn has_q_factor(self) -> bool {
        !matches!(
            self,
            BandType::VariableLowShelf
                | BandType::VariableHighShelf
                | BandType::VariableHighPass
                | BandType::VariableLowPass
        )
    }

    /// Whether the order parameter affects this type
    pub fn has_order(self) -> bool {
        self.group() == BandGroup::VariableOrder
    }

    pub fn min_order(self) -> i32 {
        if self == BandType::Peak {
            2
        } else {
            1
        }
    }

    pub fn max_order(self, max_order: i32) -> i32 {
        match self.group() {
            BandGroup::Fixed2ndOrder => 2,
            BandGroup::VariableOrder => max_order.max(1),
        }
    }

    /// Clamp a raw order value to the legal range of this type
    pub fn clamp_order(self, order: i32, max_order: i32) -> i32 {
        order.clamp(self.min_order(), self.max_order(max_order))
    }

    pub fn name(self) -> &'static str {
        match self {
            BandType::Peak => "Peak",
            BandType::LowShelf | BandType::VariableLowShelf => "Low Shelf",
            BandType::HighShelf | BandType::VariableHighShelf => "High Shelf",
            BandType::HighPass | BandType::VariableHighPass => "Low Cut",
            BandType::LowPass | BandType::VariableLowPass => "High Cut",
            BandType::VariableBandShelf => "Band Shelf",
        }
    }

    /// Name shown in type menus; variable-order types carry a "BW " prefix
    pub fn display_name(self) -> String {
        match self.group() {
            BandGroup::VariableOrder => format!("BW {}", self.name()),
            BandGroup::Fixed2ndOrder => self.name().to_string(),
        }
    }

    /// Look a type up by name, ignoring case and spaces. Unknown names map to Peak.
    ///
    /// Several types share a base name; the first match in index order wins.
    pub fn from_name(name: &str) -> Self {
        let wanted = normalize_name(name);
        Self::ALL
            .iter()
            .copied()
            .find(|t| normalize_name(t.name()) == wanted)
            .unwrap_or_default()
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Which derived signal a band's filter acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Routing {
    #[default]
    Stereo,
    Left,
    Right,
    Mid,
    Side,
}

impl Routing {
    pub const ALL: [Routing; 5] = [
        Routing::Stereo,
        Routing::Left,
        Routing::Right,
        Routing::Mid,
        Routing::Side,
    ];

    /// Out-of-range indices fall back to Stereo
    pub fn from_index(index: u32) -> Self {
        Self::ALL.get(index as usize).copied().unwrap_or_default()
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Routing::Stereo => "Normal",
            Routing::Left => "Left",
            Routing::Right => "Right",
            Routing::Mid => "Mid",
            Routing::Side => "Side",
        }
    }
}

/// One band's configuration as read at a block boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandParameters {
    pub enabled: bool,
    pub band_type: BandType,
    pub routing: Routing,
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
    pub order: i32,
}

impl Default for BandParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            band_type: BandType::Peak,
            routing: Routing::Stereo,
            frequency: FREQ_DEFAULT,
            gain_db: 0.0,
            q: Q_DEFAULT,
            order: ORDER_DEFAULT,
        }
    }
}

impl BandParameters {
    /// Enabled band with the given type, frequency, gain and Q
    pub fn new(band_type: BandType, frequency: f32, gain_db: f32, q: f32) -> Self {
        Self {
            enabled: true,
            band_type,
            frequency,
            gain_db,
            q,
            ..Default::default()
        }
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Order clamped to the legal range of the current type
    pub fn clamped_order(&self, max_order: i32) -> i32 {
        self.band_type.clamp_order(self.order, max_order)
    }

    /// Clamp numeric fields to the host parameter ranges; NaN falls back to defaults
    pub fn sanitized(mut self) -> Self {
        self.frequency = clamp_or(self.frequency, FREQ_MIN, FREQ_MAX, FREQ_DEFAULT);
        self.gain_db = clamp_or(self.gain_db, GAIN_MIN, GAIN_MAX, 0.0);
        self.q = clamp_or(self.q, Q_MIN, Q_MAX, Q_DEFAULT);
        self
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Host-facing parameter identifiers of one band ("Band 3 Freq", ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandParameterIds {
    pub band: String,
    pub enabled: String,
    pub band_type: String,
    pub routing: String,
    pub frequency: String,
    pub gain: String,
    pub q: String,
    pub order: String,
}

impl BandParameterIds {
    /// Identifiers for the band at zero-based `index` (displayed one-based)
    pub fn for_band(index: usize) -> Self {
        let band = format!("Band {}", index + 1);
        Self {
            enabled: format!("{band} Enabled"),
            band_type: format!("{band} Type"),
            routing: format!("{band} Routing"),
            frequency: format!("{band} Freq"),
            gain: format!("{band} Gain"),
            q: format!("{band} Q"),
            order: format!("{band} Order"),
            band,
        }
    }
}

/// Lock-free per-field parameter storage for one band
///
/// Written by the control/automation context at arbitrary times, read by the
/// audio thread once per block.
/// Rust pattern: AtomicF32 doesn't exist, so floats are stored as their bit patterns.
#[derive(Debug)]
pub struct SharedBandParameters {
    enabled: AtomicBool,
    band_type: AtomicU32,
    routing: AtomicU32,
    frequency_bits: AtomicU32,
    gain_bits: AtomicU32,
    q_bits: AtomicU32,
    order: AtomicI32,
}

impl SharedBandParameters {
    pub fn new(initial: BandParameters) -> Self {
        Self {
            enabled: AtomicBool::new(initial.enabled),
            band_type: AtomicU32::new(initial.band_type.index()),
            routing: AtomicU32::new(initial.routing.index()),
            frequency_bits: AtomicU32::new(initial.frequency.to_bits()),
            gain_bits: AtomicU32::new(initial.gain_db.to_bits()),
            q_bits: AtomicU32::new(initial.q.to_bits()),
            order: AtomicI32::new(initial.order),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_band_type(&self, band_type: BandType) {
        self.band_type.store(band_type.index(), Ordering::Relaxed);
    }

    /// Store a raw automation index; invalid indices read back as Peak
    pub fn set_band_type_index(&self, index: u32) {
        self.band_type.store(index, Ordering::Relaxed);
    }

    pub fn set_routing(&self, routing: Routing) {
        self.routing.store(routing.index(), Ordering::Relaxed);
    }

    /// Store a raw automation index; invalid indices read back as Stereo
    pub fn set_routing_index(&self, index: u32) {
        self.routing.store(index, Ordering::Relaxed);
    }

    pub fn set_frequency(&self, frequency: f32) {
        self.frequency_bits
            .store(frequency.to_bits(), Ordering::Relaxed);
    }

    pub fn set_gain_db(&self, gain_db: f32) {
        self.gain_bits.store(gain_db.to_bits(), Ordering::Relaxed);
    }

    pub fn set_q(&self, q: f32) {
        self.q_bits.store(q.to_bits(), Ordering::Relaxed);
    }

    /// Store the raw order; clamping happens when the band consumes it
    pub fn set_order(&self, order: i32) {
        self.order.store(order, Ordering::Relaxed);
    }

    /// Overwrite every field
    pub fn store(&self, params: &BandParameters) {
        self.set_enabled(params.enabled);
        self.set_band_type(params.band_type);
        self.set_routing(params.routing);
        self.set_frequency(params.frequency);
        self.set_gain_db(params.gain_db);
        self.set_q(params.q);
        self.set_order(params.order);
    }

    /// Read all fields as one block snapshot
    ///
    /// # Real-time Safety
    /// Relaxed atomic loads only. Numeric fields are clamped to the parameter
    /// ranges; the order stays raw so the band can clamp it per type.
    #[inline]
    pub fn snapshot(&self) -> BandParameters {
        BandParameters {
            enabled: self.enabled.load(Ordering::Relaxed),
            band_type: BandType::from_index(self.band_type.load(Ordering::Relaxed)),
            routing: Routing::from_index(self.routing.load(Ordering::Relaxed)),
            frequency: f32::from_bits(self.frequency_bits.load(Ordering::Relaxed)),
            gain_db: f32::from_bits(self.gain_bits.load(Ordering::Relaxed)),
            q: f32::from_bits(self.q_bits.load(Ordering::Relaxed)),
            order: self.order.load(Ordering::Relaxed),
        }
        .sanitized()
    }
}

impl Default for SharedBandParameters {
    fn default() -> Self {
        Self::new(BandParameters::default())
    }
}
