//! Prints tempo and beat positions of a WAV file.
//!
//! Usage: `cargo run --release --example analyze-wav -- <file.wav>`

use beat_tracker::{
    i16_sample_to_f32, AnalysisSession, ChannelCount, DetectionFunctionKind, SessionConfig,
};
use log::LevelFilter;
use std::process::exit;

/// Frames per `process_samples` call, similar to what audio hosts use.
const CHUNK_FRAMES: usize = 4096;

fn init_logger() {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .with_colors(true)
        .with_utc_timestamps()
        .init()
        .unwrap();
}

fn main() {
    init_logger();
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: analyze-wav <file.wav> [detection function]");
        exit(1);
    };
    let kind = std::env::args()
        .nth(2)
        .map(|name| parse_kind(&name))
        .unwrap_or_default();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    log::info!("{path}: {spec:?}");

    let samples = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample == 16 => reader
            .samples::<i16>()
            .map(|s| i16_sample_to_f32(s.unwrap()))
            .collect::<Vec<_>>(),
        hound::SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap()).collect(),
        _ => {
            eprintln!("Only 16-bit integer and 32-bit float WAV files are supported");
            exit(1);
        }
    };

    let channels = ChannelCount::new(spec.channels).unwrap();
    let mut config = SessionConfig::with_channels(channels);
    config.detection.kind = kind;
    let mut session = AnalysisSession::new(config);
    session.initialize(spec.sample_rate).unwrap();
    for chunk in samples.chunks(CHUNK_FRAMES * channels.get()) {
        session
            .process_samples(chunk, chunk.len() / channels.get())
            .unwrap();
    }
    session.finalize().unwrap();

    let sample_rate = session.sample_rate().unwrap();
    match session.tempo() {
        Some(tempo) => {
            println!("tempo: {:.2} BPM (confidence {:.2})", tempo.bpm, tempo.confidence);
            for candidate in &tempo.candidates {
                println!("  candidate: {:.2} BPM (score {:.2})", candidate.bpm, candidate.score);
            }
        }
        None => println!("tempo: unknown"),
    }
    for beat in session.beats() {
        println!("{:>10} {:>9.3}s", beat.value(), beat.as_secs_f64(sample_rate));
    }
}

fn parse_kind(name: &str) -> DetectionFunctionKind {
    match name {
        "spectral-difference" => DetectionFunctionKind::SpectralDifference,
        "phase-deviation" => DetectionFunctionKind::PhaseDeviation,
        "complex-domain" => DetectionFunctionKind::ComplexDomain,
        "rectified-complex-domain" => DetectionFunctionKind::RectifiedComplexDomain,
        "broadband" => DetectionFunctionKind::BroadbandEnergyRise,
        _ => {
            eprintln!("Unknown detection function: {name}");
            exit(1);
        }
    }
}
