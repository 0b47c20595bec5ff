/*
MIT License

Copyright (c) 2024 Philipp Schuster

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! End-to-end tests of the public API.

use assert2::{check, let_assert};
use beat_tracker::{
    i16_sample_to_f32, AnalysisSession, BeatAnalyzer, ChannelCount, ComplexDomainAnalyzer,
    DetectionConfig, DetectionFunctionKind, FramePos, SessionConfig, SessionError,
};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

const SAMPLE_RATE: u32 = 44100;

/// Clicks of decaying noise, like a dry hi-hat, every `interval` frames.
fn hihat_track(frames: usize, interval: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames)
        .map(|frame| {
            let since_click = frame % interval;
            let envelope = (-(since_click as f32) / 300.0).exp();
            rng.random_range(-1.0..=1.0) * envelope
        })
        .collect()
}

/// Writes mono audio to an in-memory 16-bit WAV file and reads it back as
/// interleaved stereo `f32`.
fn wav_roundtrip(mono: &[f32]) -> (Vec<f32>, hound::WavSpec) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut bytes, spec).unwrap();
        for &sample in mono {
            let sample = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes.set_position(0);

    let mut reader = hound::WavReader::new(bytes).unwrap();
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .map(|s| i16_sample_to_f32(s.unwrap()))
        .collect::<Vec<_>>();
    (samples, spec)
}

fn analyze(config: SessionConfig, interleaved: &[f32], chunk_frames: usize) -> AnalysisSession {
    let channels = config.channels.get();
    let mut session = AnalysisSession::new(config);
    session.initialize(SAMPLE_RATE).unwrap();
    for chunk in interleaved.chunks(chunk_frames * channels) {
        session.process_samples(chunk, chunk.len() / channels).unwrap();
    }
    session.finalize().unwrap();
    session
}

fn assert_valid_beats(beats: &[FramePos], frames: u64) {
    check!(beats.iter().tuple_windows::<(_, _)>().all(|(a, b)| a < b));
    check!(beats.iter().all(|beat| beat.value() <= frames));
}

#[test]
fn hihat_from_wav_file() {
    // 100 BPM
    let interval = 26460;
    let mono = hihat_track(12 * SAMPLE_RATE as usize, interval, 42);
    let (interleaved, spec) = wav_roundtrip(&mono);
    check!(spec.channels == 2);

    let session = analyze(SessionConfig::default(), &interleaved, 1024);
    let_assert!(Some(tempo) = session.tempo());
    check!((tempo.bpm - 100.0).abs() < 3.0, "bpm={}", tempo.bpm);
    check!(!tempo.candidates.is_empty());
    check!((0.0..=1.0).contains(&tempo.confidence));

    let beats = session.beats();
    assert_valid_beats(beats, session.frames_processed());
    check!(beats.len() >= 15);
    // the interval is not a multiple of the hop, so each beat may be off by
    // up to one hop
    for (a, b) in beats.iter().tuple_windows() {
        check!((b.value() - a.value()).abs_diff(interval as u64) <= 2 * 512);
    }
}

#[test]
fn all_detection_functions_find_the_grid() {
    let interval = 22050;
    let mono = hihat_track(10 * SAMPLE_RATE as usize, interval, 7);
    for kind in [
        DetectionFunctionKind::SpectralDifference,
        DetectionFunctionKind::PhaseDeviation,
        DetectionFunctionKind::ComplexDomain,
        DetectionFunctionKind::RectifiedComplexDomain,
        DetectionFunctionKind::BroadbandEnergyRise,
    ] {
        for adaptive_whitening in [false, true] {
            let config = SessionConfig {
                channels: ChannelCount::MONO,
                detection: DetectionConfig {
                    kind,
                    adaptive_whitening,
                    ..DetectionConfig::default()
                },
                ..SessionConfig::default()
            };
            let session = analyze(config, &mono, 2048);
            check!(session.detection_series().iter().all(|x| x.is_finite()));
            assert_valid_beats(session.beats(), session.frames_processed());
            check!(!session.beats().is_empty(), "{kind:?}, whitening={adaptive_whitening}");
        }
    }
}

#[test]
fn beats_do_not_depend_on_chunking() {
    let mono = hihat_track(9 * SAMPLE_RATE as usize, 20000, 3);
    let config = SessionConfig::with_channels(ChannelCount::MONO);

    let reference = analyze(config, &mono, mono.len());
    for chunk_frames in [64, 1000, 44100] {
        let session = analyze(config, &mono, chunk_frames);
        check!(session.beats() == reference.beats());
        check!(session.detection_series() == reference.detection_series());
    }
}

#[test]
fn capability_interface() {
    let mono = hihat_track(10 * SAMPLE_RATE as usize, 22050, 11);
    let mut analyzer = ComplexDomainAnalyzer::new(SessionConfig::with_channels(ChannelCount::MONO));
    check!(analyzer.supports_beat_tracking());
    check!(analyzer.beats().is_empty());
    check!(analyzer.initialize(SAMPLE_RATE));
    for chunk in mono.chunks(777) {
        check!(analyzer.process_samples(chunk, chunk.len()));
    }
    check!(analyzer.finalize());
    check!(!analyzer.beats().is_empty());
    check!(analyzer.beats() == analyzer.session().beats());
    // finalized analyzers reject more audio
    check!(!analyzer.process_samples(&mono[..100], 100));
}

#[test]
fn session_errors_are_displayable() {
    let mut session = AnalysisSession::default();
    let_assert!(Err(e) = session.process_samples(&[], 0));
    check!(e == SessionError::NotInitialized);
    check!(e.to_string() == "the session was not initialized");
    let_assert!(Err(e) = session.initialize(4000));
    check!(e.to_string() == "the sample rate is not supported");
    check!(std::error::Error::source(&e).is_some());
}
