//! Renders a click track with a given tempo, optionally writes it to a WAV
//! file, and feeds it through the [`BeatAnalyzer`] interface.
//!
//! Usage: `cargo run --release --example click-track -- [bpm] [out.wav]`

use beat_tracker::{BeatAnalyzer, ComplexDomainAnalyzer, SessionConfig};
use log::LevelFilter;

const SAMPLE_RATE: u32 = 44100;
const DURATION_SECS: u32 = 20;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_utc_timestamps()
        .init()
        .unwrap();

    let bpm = std::env::args()
        .nth(1)
        .map(|bpm| bpm.parse::<f64>().expect("bpm must be a number"))
        .unwrap_or(120.0);
    let interval = (60.0 / bpm * f64::from(SAMPLE_RATE)).round() as usize;

    // interleaved stereo
    let frames = (DURATION_SECS * SAMPLE_RATE) as usize;
    let mut audio = vec![0.0_f32; 2 * frames];
    for frame in (0..frames).step_by(interval) {
        audio[2 * frame] = 1.0;
        audio[2 * frame + 1] = 1.0;
    }

    if let Some(path) = std::env::args().nth(2) {
        write_wav(&path, &audio);
        println!("wrote {path}");
    }

    let mut analyzer = ComplexDomainAnalyzer::new(SessionConfig::default());
    println!("{}", analyzer.info().name);
    assert!(analyzer.initialize(SAMPLE_RATE));
    for chunk in audio.chunks(2 * 512) {
        assert!(analyzer.process_samples(chunk, chunk.len() / 2));
    }
    assert!(analyzer.finalize());

    if let Some(tempo) = analyzer.session().tempo() {
        println!("expected {bpm:.2} BPM, estimated {:.2} BPM", tempo.bpm);
    }
    for beat in analyzer.beats() {
        let click = (beat.value() as f64 / interval as f64).round() * interval as f64;
        println!("{beat}: {:+} frames from the nearest click", beat.value() as f64 - click);
    }
}

fn write_wav(path: &str, audio: &[f32]) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in audio {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}
