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
//! Host-facing capability interface of the beat tracker.
//!
//! Hosts that drive several kinds of analyzers only care whether a call
//! succeeded. The [`BeatAnalyzer`] trait therefore reports success as `bool`
//! and logs the cause of failures instead of returning it.

use crate::session::{AnalysisSession, SessionConfig};
use crate::units::FramePos;

/// Static description of an analyzer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnalyzerInfo {
    /// Stable identifier. Hosts use it to tell which analyzer produced a
    /// stored result.
    pub id: &'static str,
    pub author: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    pub supports_beat_tracking: bool,
}

/// Capabilities of a streaming beat analyzer.
///
/// The lifecycle is `initialize`, any number of `process_samples`,
/// `finalize`, and finally `beats`.
pub trait BeatAnalyzer {
    /// Static metadata.
    fn info(&self) -> AnalyzerInfo;

    /// Prepares the analyzer for a stream with the given sample rate.
    fn initialize(&mut self, sample_rate: u32) -> bool;

    /// Feeds `frame_count` frames of interleaved audio.
    fn process_samples(&mut self, interleaved: &[f32], frame_count: usize) -> bool;

    /// Completes the analysis. Afterwards, [`Self::beats`] is available.
    fn finalize(&mut self) -> bool;

    fn supports_beat_tracking(&self) -> bool {
        self.info().supports_beat_tracking
    }

    /// Beat positions in strictly increasing order. Empty before
    /// [`Self::finalize`].
    fn beats(&self) -> &[FramePos];
}

/// The [`BeatAnalyzer`] of this crate: onset detection in the complex
/// domain, tempo tracking, and dynamic programming beat placement. Wraps an
/// [`AnalysisSession`].
///
/// With the default configuration, onsets are measured with
/// [`RectifiedComplexDomain`](crate::DetectionFunctionKind::RectifiedComplexDomain), i.e., only bins with
/// rising magnitude count. The plain complex domain measure and the other
/// kinds are available through [`SessionConfig::detection`].
#[derive(Debug, Default)]
pub struct ComplexDomainAnalyzer {
    session: AnalysisSession,
}

impl ComplexDomainAnalyzer {
    /// Metadata of this analyzer.
    pub const INFO: AnalyzerInfo = AnalyzerInfo {
        id: "beat-tracker:complex-domain:0",
        author: "Philipp Schuster",
        name: "Rectified complex domain beat tracker",
        supports_beat_tracking: true,
    };

    /// Creates a new analyzer.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: AnalysisSession::new(config),
        }
    }

    /// The underlying session, e.g., to query the tempo estimate.
    #[must_use]
    pub const fn session(&self) -> &AnalysisSession {
        &self.session
    }

    /// Consumes the analyzer and returns the underlying session.
    #[must_use]
    pub fn into_session(self) -> AnalysisSession {
        self.session
    }
}

impl BeatAnalyzer for ComplexDomainAnalyzer {
    fn info(&self) -> AnalyzerInfo {
        Self::INFO
    }

    fn initialize(&mut self, sample_rate: u32) -> bool {
        self.session
            .initialize(sample_rate)
            .inspect_err(|e| log::warn!("Failed to initialize beat tracker: {e}"))
            .is_ok()
    }

    fn process_samples(&mut self, interleaved: &[f32], frame_count: usize) -> bool {
        self.session
            .process_samples(interleaved, frame_count)
            .inspect_err(|e| log::warn!("Failed to process {frame_count} frames: {e}"))
            .is_ok()
    }

    fn finalize(&mut self) -> bool {
        self.session
            .finalize()
            .inspect_err(|e| log::warn!("Failed to finalize beat tracker: {e}"))
            .is_ok()
    }

    fn beats(&self) -> &[FramePos] {
        self.session.beats()
    }
}
