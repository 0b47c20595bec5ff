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
//! Module for [`OverlapBuffer`].
//!
//! The buffer turns a stream of interleaved audio, chunked arbitrarily by the
//! audio source, into mono analysis windows of a fixed size that advance by a
//! fixed step:
//!
//! ```text
//! input frames: |-----------------------------------------------|
//! window 0:     |=========|
//! window 1:          |=========|
//! window 2:               |=========|
//!               <-step->
//!               <-window->
//! ```
//!
//! Window `i` covers the input frames `i * step..i * step + window`, no matter
//! how the input was chunked.

use crate::util::downmix_frame;
use core::fmt::{Display, Formatter};
use core::ops::Deref;
use ringbuffer::{GrowableAllocRingBuffer, RingBuffer};
use thiserror::Error;

/// Possible errors when configuring or feeding an [`OverlapBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The requested geometry is not valid.
    #[error("invalid buffer configuration: {0}")]
    InvalidConfiguration(BufferGeometry),
    /// The geometry was changed while the buffer was in the middle of a
    /// stream.
    #[error("buffer configuration changed mid-stream from ({from}) to ({to})")]
    ConfigurationChanged {
        from: BufferGeometry,
        to: BufferGeometry,
    },
    /// The provided slice holds fewer samples than the frame count promises.
    #[error("expected at least {expected} interleaved samples, but only {actual} were provided")]
    InputTooShort { expected: usize, actual: usize },
}

/// Channel layout and window geometry of an [`OverlapBuffer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferGeometry {
    /// Number of interleaved channels per frame.
    pub channels: usize,
    /// Length of each analysis window in frames.
    pub window_size: usize,
    /// Frames between the beginnings of two consecutive windows.
    pub step_size: usize,
}

impl BufferGeometry {
    /// Creates a validated geometry. Requires `channels >= 1`,
    /// `window_size >= 1`, and `1 <= step_size <= window_size`.
    pub fn new(
        channels: usize,
        window_size: usize,
        step_size: usize,
    ) -> Result<Self, BufferError> {
        let geometry = Self {
            channels,
            window_size,
            step_size,
        };
        if channels == 0 || window_size == 0 || step_size == 0 || step_size > window_size {
            Err(BufferError::InvalidConfiguration(geometry))
        } else {
            Ok(geometry)
        }
    }

    /// Number of frames two consecutive windows have in common.
    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.window_size - self.step_size
    }
}

impl Display for BufferGeometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "channels={}, window_size={}, step_size={}",
            self.channels, self.window_size, self.step_size
        )
    }
}

/// One mono analysis window emitted by the [`OverlapBuffer`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisWindow {
    index: usize,
    padding: usize,
    samples: Vec<f32>,
}

impl AnalysisWindow {
    /// Index of the window in the stream. The window begins at input frame
    /// `index * step_size`.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of trailing zero samples that were appended at the end of the
    /// stream to fill the window.
    #[must_use]
    pub const fn padding(&self) -> usize {
        self.padding
    }

    /// Returns the mono samples.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl Deref for AnalysisWindow {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.samples
    }
}

/// Downmixes interleaved audio and segments it into overlapping mono windows.
/// See the [module description] for details.
///
/// [module description]: crate::overlap_buffer
#[derive(Debug)]
pub struct OverlapBuffer {
    geometry: BufferGeometry,
    /// Mono samples that were not yet consumed by a window step. The front
    /// always belongs to frame `windows_emitted * step_size`.
    pending: GrowableAllocRingBuffer<f32>,
    frames_consumed: u64,
    windows_emitted: usize,
    reported_non_finite: bool,
}

impl OverlapBuffer {
    /// Creates a new buffer with a validated geometry.
    pub fn new(channels: usize, window_size: usize, step_size: usize) -> Result<Self, BufferError> {
        let geometry = BufferGeometry::new(channels, window_size, step_size)?;
        Ok(Self {
            geometry,
            pending: GrowableAllocRingBuffer::new(),
            frames_consumed: 0,
            windows_emitted: 0,
            reported_non_finite: false,
        })
    }

    /// Reconfigures the buffer and restarts the stream.
    ///
    /// Using the same geometry again is always possible. A different geometry
    /// is rejected with [`BufferError::ConfigurationChanged`] once frames were
    /// consumed; call [`Self::reset`] first to start a new stream.
    pub fn configure(
        &mut self,
        channels: usize,
        window_size: usize,
        step_size: usize,
    ) -> Result<(), BufferError> {
        let geometry = BufferGeometry::new(channels, window_size, step_size)?;
        if geometry != self.geometry && self.frames_consumed > 0 {
            return Err(BufferError::ConfigurationChanged {
                from: self.geometry,
                to: geometry,
            });
        }
        self.geometry = geometry;
        self.reset();
        Ok(())
    }

    /// Discards all buffered audio and bookkeeping.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.frames_consumed = 0;
        self.windows_emitted = 0;
        self.reported_non_finite = false;
    }

    /// Consumes `frame_count` frames of interleaved audio and returns a lazy
    /// iterator over the windows that became complete.
    ///
    /// Windows that are not pulled from the iterator stay buffered. They are
    /// returned by the next iterator, i.e., from the next call to this
    /// function, from [`Self::windows`], or from [`Self::drain_final`].
    pub fn push(&mut self, interleaved: &[f32], frame_count: usize) -> Result<Windows<'_>, BufferError> {
        let channels = self.geometry.channels;
        let expected = frame_count.saturating_mul(channels);
        if interleaved.len() < expected {
            return Err(BufferError::InputTooShort {
                expected,
                actual: interleaved.len(),
            });
        }
        let interleaved = &interleaved[..expected];

        if !self.reported_non_finite && interleaved.iter().any(|sample| !sample.is_finite()) {
            log::warn!("Audio input contains non-finite samples; treating them as silence");
            self.reported_non_finite = true;
        }

        interleaved
            .chunks_exact(channels)
            .map(downmix_frame)
            .for_each(|sample| self.pending.push(sample));
        self.frames_consumed += frame_count as u64;

        Ok(self.windows())
    }

    /// Returns a lazy iterator over the complete windows currently buffered.
    pub fn windows(&mut self) -> Windows<'_> {
        Windows { buffer: self }
    }

    /// Finishes the stream.
    ///
    /// Returns all complete windows that are still buffered. If there are
    /// frames left that no window has covered so far and `zero_pad` is set,
    /// they are padded with silence to one final window so that no trailing
    /// audio gets lost. The remainder is discarded otherwise.
    pub fn drain_final(&mut self, zero_pad: bool) -> Vec<AnalysisWindow> {
        let mut windows = self.windows().collect::<Vec<_>>();

        let covered = if self.windows_emitted == 0 {
            0
        } else {
            self.geometry.overlap()
        };
        let uncovered = self.pending.len().saturating_sub(covered);

        if zero_pad && uncovered > 0 {
            let mut samples = self.pending.iter().copied().collect::<Vec<_>>();
            let padding = self.geometry.window_size - samples.len();
            samples.resize(self.geometry.window_size, 0.0);
            log::trace!("Padding final window with {padding} frames of silence");
            windows.push(AnalysisWindow {
                index: self.windows_emitted,
                padding,
                samples,
            });
            self.windows_emitted += 1;
        } else if uncovered > 0 {
            log::trace!("Discarding {uncovered} trailing frames");
        }

        self.pending.clear();
        windows
    }

    /// Takes the next complete window, if there is one, and advances the read
    /// position by one step.
    fn next_window(&mut self) -> Option<AnalysisWindow> {
        let BufferGeometry {
            window_size,
            step_size,
            ..
        } = self.geometry;

        if self.pending.len() < window_size {
            return None;
        }

        let samples = self
            .pending
            .iter()
            .take(window_size)
            .copied()
            .collect::<Vec<_>>();
        for _ in 0..step_size {
            let _ = self.pending.dequeue();
        }

        let index = self.windows_emitted;
        self.windows_emitted += 1;
        Some(AnalysisWindow {
            index,
            padding: 0,
            samples,
        })
    }

    /// Returns the geometry.
    #[must_use]
    pub const fn geometry(&self) -> BufferGeometry {
        self.geometry
    }

    /// Total number of frames consumed since the stream began.
    #[must_use]
    pub const fn frames_consumed(&self) -> u64 {
        self.frames_consumed
    }

    /// Number of windows emitted since the stream began.
    #[must_use]
    pub const fn windows_emitted(&self) -> usize {
        self.windows_emitted
    }

    /// Number of mono frames currently held back.
    #[must_use]
    pub fn buffered_frames(&self) -> usize {
        self.pending.len()
    }
}

/// Lazy iterator over the complete windows of an [`OverlapBuffer`]. Created by
/// [`OverlapBuffer::push`] and [`OverlapBuffer::windows`].
#[derive(Debug)]
pub struct Windows<'a> {
    buffer: &'a mut OverlapBuffer,
}

impl Iterator for Windows<'_> {
    type Item = AnalysisWindow;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_window()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let BufferGeometry {
            window_size,
            step_size,
            ..
        } = self.buffer.geometry;
        let len = self.buffer.pending.len();
        let count = if len < window_size {
            0
        } else {
            (len - window_size) / step_size + 1
        };
        (count, Some(count))
    }
}

impl ExactSizeIterator for Windows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use assert2::check;
    use std::vec::Vec;

    /// Mono test signal where each sample encodes its frame number.
    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn is_send_and_sync() {
        fn accept<I: Send + Sync>() {}

        accept::<OverlapBuffer>();
    }

    #[test]
    fn rejects_invalid_configuration() {
        check!(matches!(
            OverlapBuffer::new(0, 4, 2),
            Err(BufferError::InvalidConfiguration(_))
        ));
        check!(matches!(
            OverlapBuffer::new(1, 0, 0),
            Err(BufferError::InvalidConfiguration(_))
        ));
        check!(matches!(
            OverlapBuffer::new(1, 4, 0),
            Err(BufferError::InvalidConfiguration(_))
        ));
        check!(matches!(
            OverlapBuffer::new(1, 4, 5),
            Err(BufferError::InvalidConfiguration(_))
        ));
        check!(OverlapBuffer::new(2, 4, 4).is_ok());
        check!(OverlapBuffer::new(1, 1, 1).is_ok());
    }

    #[test]
    fn window_count_matches_formula() {
        for (len, window, step) in [
            (0, 4, 2),
            (3, 4, 2),
            (4, 4, 2),
            (5, 4, 2),
            (6, 4, 2),
            (100, 16, 4),
            (100, 16, 16),
            (1000, 1024, 512),
            (4410, 1024, 512),
        ] {
            let mut buffer = OverlapBuffer::new(1, window, step).unwrap();
            let full = buffer.push(&ramp(len), len).unwrap().count();
            let expected = if len < window {
                0
            } else {
                (len - window) / step + 1
            };
            check!(full == expected, "len={len} window={window} step={step}");

            let tail = buffer.drain_final(true);
            check!(tail.len() <= 1);
            if len > 0 {
                // Every frame must be covered by a window.
                let covered_until = (full + tail.len() - 1) * step + window;
                check!(covered_until >= len, "len={len} window={window} step={step}");
            } else {
                check!(tail.is_empty());
            }
        }
    }

    #[test]
    fn windows_are_placed_at_their_frame_offsets() {
        let mut buffer = OverlapBuffer::new(1, 8, 3).unwrap();
        let input = ramp(40);
        let windows = buffer.push(&input, input.len()).unwrap().collect::<Vec<_>>();
        check!(windows.len() == 11);
        for window in &windows {
            let start = window.index() * 3;
            check!(window.samples() == &input[start..start + 8]);
            check!(window.padding() == 0);
        }
    }

    #[test]
    fn stereo_input_is_averaged() {
        let left = ramp(12);
        let right = left.iter().map(|x| x + 1.0).collect::<Vec<_>>();
        let interleaved = test_utils::interleave(&left, &right);

        let mut buffer = OverlapBuffer::new(2, 4, 2).unwrap();
        let windows = buffer.push(&interleaved, 12).unwrap().collect::<Vec<_>>();
        check!(windows.len() == 5);
        check!(windows[0].samples() == &[0.5, 1.5, 2.5, 3.5]);
        check!(windows[4].samples() == &[8.5, 9.5, 10.5, 11.5]);
    }

    #[test]
    fn chunking_does_not_change_windows() {
        let input = test_utils::noise(10_000, 7);
        let mut reference = OverlapBuffer::new(1, 1024, 512).unwrap();
        let mut expected = reference.push(&input, input.len()).unwrap().collect::<Vec<_>>();
        expected.extend(reference.drain_final(true));

        for chunk_size in [1, 7, 511, 512, 513, 4096] {
            let mut buffer = OverlapBuffer::new(1, 1024, 512).unwrap();
            let mut actual = Vec::new();
            for chunk in input.chunks(chunk_size) {
                actual.extend(buffer.push(chunk, chunk.len()).unwrap());
            }
            actual.extend(buffer.drain_final(true));
            check!(actual == expected, "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn unpulled_windows_stay_buffered() {
        let input = ramp(20);
        let mut buffer = OverlapBuffer::new(1, 4, 4).unwrap();

        let mut iter = buffer.push(&input, input.len()).unwrap();
        check!(iter.len() == 5);
        let first = iter.next().unwrap();
        check!(first.index() == 0);
        drop(iter);

        check!(buffer.buffered_frames() == 16);
        let rest = buffer.windows().map(|w| w.index()).collect::<Vec<_>>();
        check!(rest == [1, 2, 3, 4]);
        check!(buffer.windows_emitted() == 5);
    }

    #[test]
    fn zero_length_push_is_noop() {
        let mut buffer = OverlapBuffer::new(2, 4, 2).unwrap();
        check!(buffer.push(&[], 0).unwrap().count() == 0);
        check!(buffer.push(&[1.0, 1.0], 0).unwrap().count() == 0);
        check!(buffer.frames_consumed() == 0);
        check!(buffer.buffered_frames() == 0);
    }

    #[test]
    fn input_shorter_than_frame_count_is_rejected() {
        let mut buffer = OverlapBuffer::new(2, 4, 2).unwrap();
        check!(
            buffer.push(&[0.0; 5], 3).err()
                == Some(BufferError::InputTooShort {
                    expected: 6,
                    actual: 5
                })
        );
        // Surplus samples are ignored.
        check!(buffer.push(&[0.0; 7], 3).is_ok());
        check!(buffer.frames_consumed() == 3);
    }

    #[test]
    fn drain_final_pads_uncovered_frames() {
        let mut buffer = OverlapBuffer::new(1, 4, 2).unwrap();
        check!(buffer.push(&ramp(7), 7).unwrap().count() == 2);
        // Frames 4..7 are buffered, frames 4 and 5 were covered by window 1.
        let tail = buffer.drain_final(true);
        check!(tail.len() == 1);
        check!(tail[0].index() == 2);
        check!(tail[0].samples() == &[4.0, 5.0, 6.0, 0.0]);
        check!(tail[0].padding() == 1);
        check!(buffer.buffered_frames() == 0);
    }

    #[test]
    fn drain_final_without_uncovered_frames() {
        let mut buffer = OverlapBuffer::new(1, 4, 2).unwrap();
        check!(buffer.push(&ramp(6), 6).unwrap().count() == 2);
        check!(buffer.drain_final(true).is_empty());
    }

    #[test]
    fn drain_final_short_stream() {
        let mut buffer = OverlapBuffer::new(1, 4, 2).unwrap();
        check!(buffer.push(&[0.5, 0.5], 2).unwrap().count() == 0);
        let tail = buffer.drain_final(true);
        check!(tail.len() == 1);
        check!(tail[0].samples() == &[0.5, 0.5, 0.0, 0.0]);

        let mut buffer = OverlapBuffer::new(1, 4, 2).unwrap();
        check!(buffer.push(&[0.5, 0.5], 2).unwrap().count() == 0);
        check!(buffer.drain_final(false).is_empty());
        check!(buffer.buffered_frames() == 0);
    }

    #[test]
    fn drain_final_returns_unpulled_windows() {
        let mut buffer = OverlapBuffer::new(1, 4, 2).unwrap();
        drop(buffer.push(&ramp(9), 9).unwrap());
        let windows = buffer.drain_final(false);
        check!(windows.iter().map(|w| w.index()).collect::<Vec<_>>() == [0, 1, 2]);
    }

    #[test]
    fn configuration_change_mid_stream_is_rejected() {
        let mut buffer = OverlapBuffer::new(2, 4, 2).unwrap();
        // Nothing consumed yet: a new geometry is fine.
        check!(buffer.configure(1, 4, 2).is_ok());
        check!(buffer.geometry().channels == 1);

        let _ = buffer.push(&[0.0; 3], 3).unwrap();
        check!(matches!(
            buffer.configure(2, 4, 2),
            Err(BufferError::ConfigurationChanged { .. })
        ));
        check!(matches!(
            buffer.configure(1, 0, 2),
            Err(BufferError::InvalidConfiguration(_))
        ));
        // The same geometry restarts the stream.
        check!(buffer.configure(1, 4, 2).is_ok());
        check!(buffer.frames_consumed() == 0);

        let _ = buffer.push(&[0.0; 3], 3).unwrap();
        buffer.reset();
        check!(buffer.configure(2, 8, 8).is_ok());
    }

    #[test]
    fn non_finite_samples_become_silence() {
        let mut buffer = OverlapBuffer::new(1, 4, 4).unwrap();
        let windows = buffer
            .push(&[f32::NAN, 0.5, f32::NEG_INFINITY, 0.25], 4)
            .unwrap()
            .collect::<Vec<_>>();
        check!(windows[0].samples() == &[0.0, 0.5, 0.0, 0.25]);
    }
}
