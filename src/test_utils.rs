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
//! Signal generators shared by the unit tests of this crate.

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::vec::Vec;

/// Returns `len` samples of uniform white noise in `[-1.0, 1.0]`. The same
/// seed always produces the same samples.
pub fn noise(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1.0..=1.0)).collect()
}

/// Interleaves two channels of equal length to `LRLR..`.
pub fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
    assert_eq!(left.len(), right.len());
    itertools::interleave(left.iter().copied(), right.iter().copied()).collect()
}

/// Returns a detection-function-like series of `len` values that is zero
/// everywhere except at `round(k * period)` for `k = 0, 1, ..`.
pub fn pulse_train(len: usize, period: f64, amplitude: f64) -> Vec<f64> {
    assert!(period > 0.0);
    let mut series = vec![0.0; len];
    (0_usize..)
        .map(|k| (k as f64 * period).round() as usize)
        .take_while(|&index| index < len)
        .for_each(|index| series[index] = amplitude);
    series
}

/// Returns interleaved audio of `frames` frames with `channels` channels that
/// is silent except for single-sample clicks of full amplitude every
/// `interval` frames, starting at frame 0.
pub fn click_track(frames: usize, channels: usize, interval: usize) -> Vec<f32> {
    assert!(interval > 0);
    let mut audio = vec![0.0; frames * channels];
    (0..frames)
        .step_by(interval)
        .flat_map(|frame| (0..channels).map(move |ch| frame * channels + ch))
        .for_each(|index| audio[index] = 1.0);
    audio
}

/// Returns `frames` frames of a sine with the given frequency, duplicated to
/// `channels` interleaved channels.
pub fn sine(frames: usize, channels: usize, frequency: f32, sample_rate: u32) -> Vec<f32> {
    (0..frames)
        .map(|frame| {
            let t = frame as f32 / sample_rate as f32;
            (2.0 * core::f32::consts::PI * frequency * t).sin()
        })
        .flat_map(|sample| core::iter::repeat(sample).take(channels))
        .collect()
}

/// Mixes white noise with the given gain into interleaved audio.
pub fn add_noise(audio: &[f32], gain: f32, seed: u64) -> Vec<f32> {
    audio
        .iter()
        .zip_eq(noise(audio.len(), seed))
        .map(|(sample, noise)| sample + noise * gain)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn noise_is_seeded() {
        check!(noise(64, 1) == noise(64, 1));
        check!(noise(64, 1) != noise(64, 2));
        check!(noise(1000, 3).iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn pulse_train_places_rounded_pulses() {
        let series = pulse_train(10, 2.5, 3.0);
        let pulses = series.iter().positions(|&x| x == 3.0).collect::<Vec<_>>();
        // 0.0, 2.5, 5.0, 7.5 rounded half away from zero
        check!(pulses == [0, 3, 5, 8]);
        check!(series.iter().filter(|&&x| x == 0.0).count() == 6);
    }

    #[test]
    fn click_track_sets_all_channels() {
        let audio = click_track(10, 2, 4);
        check!(audio.len() == 20);
        let clicks = audio.iter().positions(|&x| x == 1.0).collect::<Vec<_>>();
        check!(clicks == [0, 1, 8, 9, 16, 17]);
    }
}
