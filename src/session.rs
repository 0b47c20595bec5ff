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
//! Module for [`AnalysisSession`].
//!
//! A session drives the whole pipeline for one audio stream:
//!
//! ```text
//! interleaved audio ─▶ OverlapBuffer ─▶ DetectionFunction ─▶ detection series
//!                                                                  │ (finalize)
//!                              beats ◀─ BeatLocator ◀─ TempoTracker ◀┘
//! ```
//!
//! The detection function is computed incrementally while audio arrives. Tempo
//! and beats need the complete detection function and are computed exactly
//! once, when the session is finalized.

use crate::beat_locator::{BeatLocator, BeatLocatorConfig};
use crate::detection_function::{DetectionConfig, DetectionError, DetectionFunction};
use crate::overlap_buffer::{BufferError, OverlapBuffer};
use crate::tempo_tracker::{TempoConfig, TempoEstimate, TempoTracker};
use crate::units::{ChannelCount, FramePos, InvalidSampleRateError, SampleRate};
use thiserror::Error;

/// Hop between two analysis windows, in seconds. About 11.6 ms, i.e., 512
/// frames at 44.1 kHz.
const STEP_SECS: f64 = 0.01161;

/// The window is the next power of two that holds `1 / MIN_WINDOW_HZ`
/// seconds of audio.
const MIN_WINDOW_HZ: u32 = 50;

/// Number of leading detection function values that are ignored. The first
/// windows are compared against silence and carry start-up transients.
const LEADING_SKIP: usize = 2;

/// Possible errors of an [`AnalysisSession`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Audio was provided or the session was finalized before
    /// [`AnalysisSession::initialize`].
    #[error("the session was not initialized")]
    NotInitialized,
    /// [`AnalysisSession::initialize`] was called twice.
    #[error("the session is already initialized")]
    AlreadyInitialized,
    /// The session doesn't accept audio or a second finalization after it
    /// was finalized.
    #[error("the session is already finalized")]
    AlreadyFinalized,
    #[error("the sample rate is not supported")]
    UnsupportedSampleRate(#[from] InvalidSampleRateError),
    /// The BPM range or the input tempo of the [`TempoConfig`] is invalid.
    #[error("invalid tempo configuration: {0:?}")]
    InvalidTempoConfig(TempoConfig),
    #[error("the audio input was rejected")]
    Buffer(#[from] BufferError),
    #[error("the detection function failed")]
    Detection(#[from] DetectionError),
}

/// Lifecycle state of an [`AnalysisSession`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, but no sample rate known yet.
    #[default]
    Uninitialized,
    /// Ready to accept audio.
    Initialized,
    /// Audio was provided at least once.
    Processing,
    /// Tempo and beats are available.
    Finalized,
}

/// Configuration of an [`AnalysisSession`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Channel layout of the interleaved input.
    pub channels: ChannelCount,
    /// Onset novelty measure and its tuning.
    pub detection: DetectionConfig,
    /// Tempo prior and BPM range.
    pub tempo: TempoConfig,
    /// Beat grid alignment.
    pub beats: BeatLocatorConfig,
    /// Analyze the frames after the last complete window by padding them
    /// with silence. If unset, they are ignored.
    pub zero_pad_tail: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channels: ChannelCount::default(),
            detection: DetectionConfig::default(),
            tempo: TempoConfig::default(),
            beats: BeatLocatorConfig::default(),
            zero_pad_tail: true,
        }
    }
}

impl SessionConfig {
    /// Convenience constructor for input with `channels` channels and
    /// defaults otherwise.
    #[must_use]
    pub fn with_channels(channels: ChannelCount) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }
}

/// Window geometry derived from the sample rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnalysisParams {
    /// Frames per analysis window.
    pub window_size: usize,
    /// Frames between the starts of two consecutive windows.
    pub step_size: usize,
}

impl AnalysisParams {
    /// Derives the window geometry for a sample rate.
    #[must_use]
    pub fn from_sample_rate(sample_rate: SampleRate) -> Self {
        let step_size = (f64::from(sample_rate.hz()) * STEP_SECS) as usize;
        let window_size = (sample_rate.hz() / MIN_WINDOW_HZ).next_power_of_two() as usize;
        Self {
            window_size,
            step_size,
        }
    }

    /// Detection function values per second.
    #[must_use]
    pub fn frame_rate(&self, sample_rate: SampleRate) -> f64 {
        f64::from(sample_rate.hz()) / self.step_size as f64
    }

    /// Frame position that a detection function value represents: the center
    /// of its window.
    #[must_use]
    pub const fn window_center(&self, window_index: usize) -> u64 {
        (window_index * self.step_size + self.window_size / 2) as u64
    }
}

/// State that only exists while audio is accepted.
#[derive(Debug)]
struct Streaming {
    buffer: OverlapBuffer,
    detection_function: DetectionFunction,
}

/// Beat tracking session for a single audio stream.
///
/// # Example
/// ```rust
/// use beat_tracker::{AnalysisSession, SessionConfig};
///
/// let mut session = AnalysisSession::new(SessionConfig::default());
/// session.initialize(44100).unwrap();
/// // interleaved stereo audio
/// let audio = vec![0.0; 2 * 44100];
/// for chunk in audio.chunks(2 * 1024) {
///     session.process_samples(chunk, chunk.len() / 2).unwrap();
/// }
/// session.finalize().unwrap();
/// // silence has no beats
/// assert!(session.beats().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct AnalysisSession {
    config: SessionConfig,
    state: SessionState,
    sample_rate: Option<SampleRate>,
    params: Option<AnalysisParams>,
    streaming: Option<Streaming>,
    detection: Vec<f64>,
    frames_processed: u64,
    tempo: Option<TempoEstimate>,
    beats: Vec<FramePos>,
}

impl AnalysisSession {
    /// Creates a new uninitialized session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Derives the window geometry from the sample rate and prepares the
    /// session for audio.
    pub fn initialize(&mut self, sample_rate: u32) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::AlreadyInitialized);
        }
        let sample_rate = SampleRate::new(sample_rate)?;
        if !self.config.tempo.is_valid() {
            return Err(SessionError::InvalidTempoConfig(self.config.tempo));
        }

        let params = AnalysisParams::from_sample_rate(sample_rate);
        let buffer = OverlapBuffer::new(self.config.channels.get(), params.window_size, params.step_size)?;
        let detection_function = DetectionFunction::new(params.window_size, self.config.detection);

        log::debug!(
            "Initialized session: {sample_rate}, {}, window={}, step={}, {:?}",
            self.config.channels,
            params.window_size,
            params.step_size,
            self.config.detection.kind
        );

        self.sample_rate = Some(sample_rate);
        self.params = Some(params);
        self.streaming = Some(Streaming {
            buffer,
            detection_function,
        });
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Feeds `frame_count` frames of interleaved audio. The slice must hold at
    /// least `frame_count * channels` samples. All windows that became
    /// complete are analyzed right away; the rest is kept for the next call.
    pub fn process_samples(&mut self, interleaved: &[f32], frame_count: usize) -> Result<(), SessionError> {
        let streaming = self.streaming_mut()?;
        let Streaming {
            buffer,
            detection_function,
        } = streaming;

        let mut novelty = Vec::new();
        for window in buffer.push(interleaved, frame_count)? {
            novelty.push(detection_function.process(&window)?);
        }
        let frames_processed = buffer.frames_consumed();

        log::trace!(
            "Processed {frame_count} frames, {} new detection values",
            novelty.len()
        );

        self.detection.extend(novelty);
        self.frames_processed = frames_processed;
        self.state = SessionState::Processing;
        Ok(())
    }

    /// Analyzes the remaining audio, estimates the tempo, and places the
    /// beats. Afterwards, the session doesn't accept any more audio.
    ///
    /// A stream that is too short or too quiet for a tempo estimate is not an
    /// error. It simply has no beats.
    pub fn finalize(&mut self) -> Result<(), SessionError> {
        let (sample_rate, params) = match (self.sample_rate, self.params) {
            (Some(sample_rate), Some(params)) => (sample_rate, params),
            _ => return Err(SessionError::NotInitialized),
        };
        let zero_pad = self.config.zero_pad_tail;
        let streaming = self.streaming_mut()?;

        let mut novelty = Vec::new();
        for window in streaming.buffer.drain_final(zero_pad) {
            novelty.push(streaming.detection_function.process(&window)?);
        }
        let frames_processed = streaming.buffer.frames_consumed();
        self.streaming = None;
        self.detection.extend(novelty);
        self.frames_processed = frames_processed;

        self.track(sample_rate, params);
        self.state = SessionState::Finalized;
        Ok(())
    }

    /// Runs tempo estimation and beat placement on the complete detection
    /// function.
    fn track(&mut self, sample_rate: SampleRate, params: AnalysisParams) {
        let end = self
            .detection
            .iter()
            .rposition(|&value| value > 0.0)
            .map_or(0, |index| index + 1);
        let series = self.detection.get(LEADING_SKIP..end).unwrap_or(&[]);

        let tracker = TempoTracker::new(params.frame_rate(sample_rate), self.config.tempo);
        let tempo = match tracker.estimate(series) {
            Ok(tempo) => Some(tempo),
            Err(e) => {
                log::info!("No tempo: {e}");
                None
            }
        };

        let frames_processed = self.frames_processed;
        self.beats = BeatLocator::new(self.config.beats)
            .locate(series, tempo.as_ref())
            .into_iter()
            .map(|index| params.window_center(index + LEADING_SKIP))
            .filter(|&frame| frame <= frames_processed)
            .map(FramePos)
            .collect();

        if let Some(tempo) = &tempo {
            log::info!(
                "Tempo {:.2} BPM (confidence {:.2}), {} beats in {} frames",
                tempo.bpm,
                tempo.confidence,
                self.beats.len(),
                frames_processed
            );
        }
        self.tempo = tempo;
    }

    fn streaming_mut(&mut self) -> Result<&mut Streaming, SessionError> {
        match self.state {
            SessionState::Uninitialized => Err(SessionError::NotInitialized),
            SessionState::Finalized => Err(SessionError::AlreadyFinalized),
            SessionState::Initialized | SessionState::Processing => {
                self.streaming.as_mut().ok_or(SessionError::NotInitialized)
            }
        }
    }

    /// Beat positions in strictly increasing order. Empty until the session
    /// is finalized.
    #[must_use]
    pub fn beats(&self) -> &[FramePos] {
        &self.beats
    }

    /// The detection function computed so far, one value per analysis
    /// window.
    #[must_use]
    pub fn detection_series(&self) -> &[f64] {
        &self.detection
    }

    /// The tempo estimate. Only available after finalization, and only if the
    /// stream was long enough.
    #[must_use]
    pub const fn tempo(&self) -> Option<&TempoEstimate> {
        self.tempo.as_ref()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of frames provided so far.
    #[must_use]
    pub const fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    #[must_use]
    pub const fn sample_rate(&self) -> Option<SampleRate> {
        self.sample_rate
    }

    /// Analysis window length in frames, once initialized.
    #[must_use]
    pub fn window_size(&self) -> Option<usize> {
        self.params.map(|params| params.window_size)
    }

    /// Hop between analysis windows in frames, once initialized.
    #[must_use]
    pub fn step_size(&self) -> Option<usize> {
        self.params.map(|params| params.step_size)
    }
}
