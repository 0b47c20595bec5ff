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
//! Module for convenient handling of the primitive units this crate works
//! with: sample rates, channel counts, and frame positions.
//!
//! The wrappers are validated on construction, so that the rest of the crate
//! can rely on them.

use core::fmt::{Display, Formatter};
use core::ops::RangeInclusive;
use thiserror::Error;

/// The sample rate is not in the supported range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("sample rate {0} Hz is not in the supported range {min}..={max} Hz", min = SampleRate::SUPPORTED_RANGE.start(), max = SampleRate::SUPPORTED_RANGE.end())]
pub struct InvalidSampleRateError(pub u32);

/// A sample rate in frames per second (Hertz).
///
/// Typically, this is a value such as `44100`.
#[derive(Copy, Clone, Debug, PartialOrd, PartialEq, Ord, Eq, Hash)]
#[repr(transparent)]
pub struct SampleRate(u32);

impl SampleRate {
    /// Range of sample rates the analysis is tuned for.
    pub const SUPPORTED_RANGE: RangeInclusive<u32> = 8_000..=384_000;

    /// Creates a new validated sample rate.
    pub fn new(hz: u32) -> Result<Self, InvalidSampleRateError> {
        if Self::SUPPORTED_RANGE.contains(&hz) {
            Ok(Self(hz))
        } else {
            Err(InvalidSampleRateError(hz))
        }
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn hz(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = InvalidSampleRateError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Display for SampleRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Number of interleaved channels of the audio input. Always at least one.
#[derive(Copy, Clone, Debug, PartialOrd, PartialEq, Ord, Eq, Hash)]
#[repr(transparent)]
pub struct ChannelCount(u16);

impl ChannelCount {
    /// Single channel audio.
    pub const MONO: Self = Self(1);
    /// Interleaved LRLR audio.
    pub const STEREO: Self = Self(2);

    /// Creates a new channel count. Returns `None` for zero.
    #[must_use]
    pub const fn new(channels: u16) -> Option<Self> {
        if channels == 0 {
            None
        } else {
            Some(Self(channels))
        }
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

impl Default for ChannelCount {
    fn default() -> Self {
        Self::STEREO
    }
}

impl Display for ChannelCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            1 => f.write_str("mono"),
            2 => f.write_str("stereo"),
            n => write!(f, "{n} channels"),
        }
    }
}

/// Position in the audio stream, counted in frames since the beginning of the
/// stream. A frame is one sample instant across all channels.
#[derive(Copy, Clone, Debug, Default, PartialOrd, PartialEq, Ord, Eq, Hash)]
#[repr(transparent)]
pub struct FramePos(pub u64);

impl FramePos {
    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Converts the position to seconds for the given sample rate.
    #[must_use]
    pub fn as_secs_f64(self, sample_rate: SampleRate) -> f64 {
        self.0 as f64 / f64::from(sample_rate.hz())
    }
}

impl From<u64> for FramePos {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for FramePos {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "frame {}", self.0)
    }
}
