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
//! beat-tracker estimates the tempo and the beat grid of audio tracks.
//!
//! It consumes interleaved audio in chunks of any size and works in four
//! stages:
//!
//! 1. [`OverlapBuffer`]: downmixes the input to mono and cuts it into
//!    overlapping analysis windows (1024 frames with a hop of 512 frames at
//!    44.1 kHz).
//! 2. [`DetectionFunction`]: reduces each window to one onset strength value.
//!    The default novelty measure is the rectified complex domain distance,
//!    i.e., how much each frequency bin deviates from what a steady signal
//!    would look like.
//! 3. [`TempoTracker`]: finds the beat period of the complete detection
//!    function by comb-filtering its autocorrelation, frame by frame, and
//!    decoding a smooth tempo path.
//! 4. [`BeatLocator`]: places the beats on the onsets using dynamic
//!    programming.
//!
//! [`AnalysisSession`] drives all stages with the lifecycle
//! `initialize` → `process_samples` → `finalize` → `beats`. Hosts that only
//! care about success or failure use the [`BeatAnalyzer`] trait.
//!
//! # Example
//! ```rust
//! use beat_tracker::{AnalysisSession, ChannelCount, SessionConfig};
//!
//! let mut session = AnalysisSession::new(SessionConfig::with_channels(ChannelCount::MONO));
//! session.initialize(44100).unwrap();
//! // 10 seconds of mono audio with a click every half second
//! let mut audio = vec![0.0_f32; 10 * 44100];
//! audio.iter_mut().step_by(22050).for_each(|s| *s = 1.0);
//!
//! for chunk in audio.chunks(4096) {
//!     session.process_samples(chunk, chunk.len()).unwrap();
//! }
//! session.finalize().unwrap();
//!
//! let tempo = session.tempo().unwrap();
//! assert!((tempo.bpm - 120.0).abs() < 3.0);
//! for beat in session.beats() {
//!     println!("beat at {:.2}s", beat.as_secs_f64(session.sample_rate().unwrap()));
//! }
//! ```
//!
//! # Tempo octaves
//!
//! A tempo of 60 BPM and one of 120 BPM explain a steady pulse about equally
//! well. The tracker resolves this with a prior centered on
//! [`TempoConfig::input_tempo_bpm`] (120 BPM by default). Slow material is
//! therefore reported at twice its tempo, and every other beat lands between
//! the onsets. Set `input_tempo_bpm` (and [`TempoConfig::constrain_tempo`])
//! when the rough tempo is known.
//!
//! A tempo needs a detection function of at least 513 values, i.e., about six
//! seconds of audio with onsets. Shorter streams have no beats.
//!
//! The library logs through the [`log`] facade and never installs a logger.

#![warn(
    clippy::all,
    clippy::nursery,
    clippy::must_use_candidate,
    // clippy::restriction,
    // clippy::pedantic
)]
// now allow a few rules which are enabled by the above statement
#![allow(
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::cast_precision_loss
)]
#![deny(missing_debug_implementations)]

mod analyzer;
mod beat_locator;
mod detection_function;
mod overlap_buffer;
mod session;
mod tempo_tracker;
mod units;
mod util;

#[cfg(test)]
mod test_utils;

pub use analyzer::{AnalyzerInfo, BeatAnalyzer, ComplexDomainAnalyzer};
pub use beat_locator::{BeatLocator, BeatLocatorConfig};
pub use detection_function::{
    DetectionConfig, DetectionError, DetectionFunction, DetectionFunctionKind,
};
pub use overlap_buffer::{AnalysisWindow, BufferError, BufferGeometry, OverlapBuffer, Windows};
pub use session::{AnalysisParams, AnalysisSession, SessionConfig, SessionError, SessionState};
pub use tempo_tracker::{TempoCandidate, TempoConfig, TempoError, TempoEstimate, TempoTracker};
pub use units::{ChannelCount, FramePos, InvalidSampleRateError, SampleRate};
pub use util::{downmix_frame, i16_sample_to_f32};
