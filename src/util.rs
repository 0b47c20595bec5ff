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
//! Some common utilities required internally but also useful for external
//! users, when working with this library.

use core::f64::consts::PI;

/// Transforms an audio sample in range `i16::MIN..=i16::MAX` to a `f32` in
/// range `-1.0..1.0`.
#[inline]
pub fn i16_sample_to_f32(val: i16) -> f32 {
    // If to prevent division result >1.0.
    if val == i16::MIN {
        -1.0
    } else {
        val as f32 / i16::MAX as f32
    }
}

/// Downmixes the samples of one frame (one sample per channel) into a single
/// mono sample by averaging them. Non-finite samples count as silence.
///
/// Returns `0.0` for an empty frame.
#[inline]
pub fn downmix_frame(frame: &[f32]) -> f32 {
    match frame {
        [] => 0.0,
        [mono] => finite_or_silence(*mono),
        [l, r] => (finite_or_silence(*l) + finite_or_silence(*r)) / 2.0,
        frame => {
            let sum = frame.iter().copied().map(finite_or_silence).sum::<f32>();
            sum / frame.len() as f32
        }
    }
}

#[inline]
fn finite_or_silence(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}

/// Maps a phase value to the principal range `(-π, π]`.
#[inline]
pub fn princarg(phase: f64) -> f64 {
    let wrapped = (phase + PI).rem_euclid(2.0 * PI) - PI;
    // The lower bound belongs to the upper one.
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

/// Subtracts a moving average (8 values before, 7 after the current value)
/// from each value and rectifies the result, i.e. clamps negative values to
/// zero. Keeps only the values that stick out of their neighbourhood.
pub fn adaptive_threshold(data: &mut [f64]) {
    const PRE: usize = 8;
    const POST: usize = 7;

    if data.is_empty() {
        return;
    }

    let smoothed = (0..data.len())
        .map(|i| {
            let first = i.saturating_sub(PRE);
            let last = (i + POST).min(data.len() - 1);
            let neighbourhood = &data[first..=last];
            neighbourhood.iter().sum::<f64>() / neighbourhood.len() as f64
        })
        .collect::<Vec<_>>();

    data.iter_mut()
        .zip(smoothed)
        .for_each(|(value, mean)| *value = (*value - mean).max(0.0));
}

/// Returns the index of the first maximum of the provided values. Ties
/// resolve to the lowest index. Returns `0` for an empty slice.
#[inline]
pub fn first_max_index(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best), (i, &value)| {
            if value > best {
                (i, value)
            } else {
                (best_i, best)
            }
        })
        .0
}
