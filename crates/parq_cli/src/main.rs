//! Parq offline driver
//!
//! Renders a test signal through the equalizer engine and prints the
//! composite response curves plus the analyser bands.
//!
//! Usage: `parq [config.json] [state.json]`
//!
//! Without a state file a small demonstration curve is applied.

use std::f32::consts::PI;
use std::path::Path;

use anyhow::{Context, Result};
use parq_core::{
    AnalyserTap, BandParameters, BandType, EngineConfig, EqualizerEngine, EqualizerState, Event,
    Routing, StreamConfig,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZE: usize = 512;
const RENDER_SECONDS: f32 = 2.0;

/// Frequencies at which the curves are printed
const REPORT_FREQS: [f32; 10] = [
    20.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 20000.0,
];

fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parq_core=info,parq_cli=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match args.first() {
        Some(path) => EngineConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load engine config from {}", path))?,
        None => EngineConfig::default(),
    };

    let mut engine = EqualizerEngine::new(config).context("Failed to create engine")?;
    engine
        .prepare(&StreamConfig::stereo(SAMPLE_RATE, BLOCK_SIZE))
        .context("Failed to prepare engine")?;

    let handle = engine.handle();
    match args.get(1) {
        Some(path) => {
            let state = EqualizerState::load(Path::new(path))
                .with_context(|| format!("Failed to load state from {}", path))?;
            state.apply(&handle)?;
        }
        None => apply_demo_curve(&engine)?,
    }
    if handle.analyser_tap() == AnalyserTap::Disabled {
        handle.set_analyser_tap(AnalyserTap::Post);
    }

    render(&mut engine);

    for event in handle.drain_events() {
        debug!("Engine event: {:?}", event);
        if let Event::Prepared {
            downsampling_factor,
            ..
        } = event
        {
            info!("Analyser decimation factor: {}", downsampling_factor);
        }
    }

    print_curves(&engine);
    print_analyser(&handle.analyser_frame());
    Ok(())
}

fn apply_demo_curve(engine: &EqualizerEngine) -> Result<()> {
    let handle = engine.handle();
    let bands = [
        BandParameters::new(BandType::VariableHighPass, 30.0, 0.0, 0.707).with_order(4),
        BandParameters::new(BandType::LowShelf, 100.0, 3.0, 0.707),
        BandParameters::new(BandType::Peak, 400.0, -3.5, 1.4),
        BandParameters::new(BandType::Peak, 3000.0, 2.0, 1.0).with_routing(Routing::Mid),
        BandParameters::new(BandType::HighShelf, 9000.0, -2.0, 0.707).with_routing(Routing::Side),
    ];

    for (index, params) in bands.iter().enumerate() {
        handle.set_band(index, params)?;
    }
    info!("Applied demonstration curve to {} bands", bands.len());
    Ok(())
}

/// Pink-ish test signal: a few tones plus deterministic noise
fn render(engine: &mut EqualizerEngine) {
    let total = (SAMPLE_RATE * RENDER_SECONDS) as usize;
    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    let mut noise_state = 0x1234_5678u32;
    let mut position = 0usize;

    while position < total {
        let frames = BLOCK_SIZE.min(total - position);
        for i in 0..frames {
            let t = (position + i) as f32 / SAMPLE_RATE;
            // xorshift32
            noise_state ^= noise_state << 13;
            noise_state ^= noise_state >> 17;
            noise_state ^= noise_state << 5;
            let noise = noise_state as f32 / u32::MAX as f32 - 0.5;

            let tones = 0.2 * (2.0 * PI * 100.0 * t).sin() + 0.1 * (2.0 * PI * 3000.0 * t).sin();
            left[i] = tones + 0.05 * noise;
            right[i] = tones - 0.05 * noise;
        }

        engine.process_block(&mut left[..frames], Some(&mut right[..frames]));
        position += frames;
    }

    info!(
        "Rendered {:.1}s at {}Hz in blocks of {}",
        RENDER_SECONDS, SAMPLE_RATE, BLOCK_SIZE
    );
}

fn print_curves(engine: &EqualizerEngine) {
    let curves = engine.handle().response();
    let grid = engine.grid();

    print!("{:>10}", "Hz");
    for routing in curves.used_routings() {
        print!("{:>10}", routing.name());
    }
    println!();

    for freq in REPORT_FREQS {
        let index = grid.nearest_index(freq);
        print!("{:>10.0}", grid.freqs()[index]);
        for routing in curves.used_routings() {
            let gain = curves.bucket(routing).gains[index];
            print!("{:>10.2}", 10.0 * gain.max(1.0e-12).log10());
        }
        println!();
    }
}

fn print_analyser(frame: &parq_core::AnalyserFrame) {
    println!();
    println!("{:>10}{:>10}{:>10}", "Hz", "dB", "peak dB");
    for ((freq, mag), peak) in frame.freqs.iter().zip(frame.mags_db()).zip(&frame.peak_mags) {
        let peak_db = 20.0 * peak.max(1.0e-9).log10();
        println!("{:>10.0}{:>10.1}{:>10.1}", freq, mag, peak_db);
    }
}
