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
//! Module for [`TempoTracker`].
//!
//! The tempo tracker looks at the complete detection function of a track and
//! estimates its beat period. It works on overlapping frames of the detection
//! function (each a few seconds long):
//!
//! 1. The autocorrelation of each frame is fed into a comb filter bank. Each
//!    filter sums the autocorrelation at one candidate period and its first
//!    multiples. The filter outputs are weighted with a prior that favours
//!    musically common tempi.
//! 2. A Viterbi decoder finds the most likely path of beat periods through all
//!    frames, assuming the tempo changes slowly.
//!
//! Periods are measured in detection function frames, i.e., in hops of the
//! analysis window.

use crate::util::{adaptive_threshold, first_max_index};
use biquad::{Biquad, Coefficients, DirectForm1};
use core::ops::RangeInclusive;
use thiserror::Error;

/// Length of a detection function frame (roughly six seconds at the default
/// analysis hop). Also the shortest detection function that gets a tempo.
const FRAME_LEN: usize = 512;

/// Hop between detection function frames (roughly 1.5 seconds).
const FRAME_STEP: usize = 128;

/// Number of multiples of the period each comb filter looks at.
const COMB_ELEMENTS: usize = 4;

/// Width (in period bins) of the Gaussian tempo transition between frames.
const TRANSITION_SIGMA: f64 = 8.0;

/// Keeps normalizations away from divisions by zero.
const EPS: f64 = 8e-7;

/// Maximum number of [`TempoCandidate`]s reported.
const MAX_CANDIDATES: usize = 3;

/// The detection function is too short or carries no energy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TempoError {
    #[error("detection function with {len} frames is too short or silent for tempo estimation (requires more than {required} frames with energy)")]
    InsufficientData { len: usize, required: usize },
}

/// Configuration of the [`TempoTracker`].
///
/// The default prior is a broad curve around 120 BPM. Like any prior, it
/// decides between octaves: a clean 60 BPM click track is reported as
/// 120 BPM, with every other beat on a silent frame. If the rough tempo of
/// the material is known, set [`Self::input_tempo_bpm`] (and, to stay close
/// to it, [`Self::constrain_tempo`]).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TempoConfig {
    /// Tempo the prior is centered on.
    pub input_tempo_bpm: f64,
    /// If set, the prior is a narrow Gaussian around
    /// [`Self::input_tempo_bpm`] instead of a broad Rayleigh curve, i.e.,
    /// the result stays close to the input tempo.
    pub constrain_tempo: bool,
    /// Slowest tempo considered.
    pub min_bpm: f64,
    /// Fastest tempo considered.
    pub max_bpm: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            input_tempo_bpm: 120.0,
            constrain_tempo: false,
            min_bpm: 40.0,
            max_bpm: 240.0,
        }
    }
}

impl TempoConfig {
    /// Tempi the tracker can be configured for. Slower tempi have periods
    /// longer than half a detection function frame.
    pub const SUPPORTED_BPM: RangeInclusive<f64> = 20.0..=480.0;

    /// Checks that the BPM range is not empty and that all tempi lie in
    /// [`Self::SUPPORTED_BPM`]. NaN and infinity are never valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let supported = |bpm: f64| Self::SUPPORTED_BPM.contains(&bpm);
        supported(self.min_bpm)
            && supported(self.max_bpm)
            && supported(self.input_tempo_bpm)
            && self.min_bpm < self.max_bpm
    }
}

/// One tempo hypothesis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TempoCandidate {
    /// Beat period in detection function frames.
    pub period: f64,
    /// Tempo in beats per minute.
    pub bpm: f64,
    /// Support of the hypothesis relative to the best one, in `0.0..=1.0`.
    pub score: f64,
}

/// Result of [`TempoTracker::estimate`].
#[derive(Clone, Debug, PartialEq)]
pub struct TempoEstimate {
    /// Dominant beat period in detection function frames.
    pub period: f64,
    /// Dominant tempo in beats per minute.
    pub bpm: f64,
    /// How clearly the decoded periods stood out, in `0.0..=1.0`.
    pub confidence: f64,
    /// Local beat period for each detection function frame.
    pub beat_periods: Vec<f64>,
    /// Alternative hypotheses, best first. The first one usually matches
    /// [`Self::period`].
    pub candidates: Vec<TempoCandidate>,
}

impl TempoEstimate {
    /// Local tempo in beats per minute for each detection function frame.
    pub fn local_tempi(&self, frame_rate: f64) -> impl Iterator<Item = f64> + '_ {
        self.beat_periods
            .iter()
            .map(move |period| 60.0 * frame_rate / period)
    }
}

/// Estimates the beat period of a detection function. See the
/// [module description] for details.
///
/// [module description]: crate::tempo_tracker
#[derive(Clone, Debug)]
pub struct TempoTracker {
    config: TempoConfig,
    /// Detection function frames per second.
    frame_rate: f64,
    /// Smallest period (in frames) a beat may have.
    min_period: usize,
    /// Largest period (in frames) a beat may have.
    max_period: usize,
    /// Prior weight of each period.
    prior: Vec<f64>,
    /// Length of the frames the detection function is split into.
    frame_len: usize,
}

impl TempoTracker {
    /// Creates a new tempo tracker for a detection function with the given
    /// number of values per second.
    ///
    /// # Panics
    /// If the frame rate is not a positive number or if the configuration is
    /// not [valid](TempoConfig::is_valid).
    pub fn new(frame_rate: f64, config: TempoConfig) -> Self {
        assert!(frame_rate.is_normal() && frame_rate > 0.0);
        assert!(config.is_valid(), "invalid tempo configuration: {config:?}");

        let max_period = ((60.0 * frame_rate / config.min_bpm).floor() as usize)
            .min(FRAME_LEN - 1)
            .max(2);
        let min_period = ((60.0 * frame_rate / config.max_bpm).ceil() as usize)
            .max(2)
            .min(max_period);
        let period_bins = max_period + 1;
        let frame_len = FRAME_LEN;
        let prior = tempo_prior(period_bins, 60.0 * frame_rate / config.input_tempo_bpm, config.constrain_tempo);

        log::debug!(
            "Tempo tracker: {frame_rate:.2} frames/s, periods {min_period}..={max_period}, frame length {frame_len}"
        );

        Self {
            config,
            frame_rate,
            min_period,
            max_period,
            prior,
            frame_len,
        }
    }

    /// Detection function frames per second.
    #[must_use]
    pub const fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TempoConfig {
        &self.config
    }

    /// Minimum number of detection function values [`Self::estimate`] needs.
    #[must_use]
    pub const fn min_len(&self) -> usize {
        self.frame_len + 1
    }

    /// Converts a beat period (in frames) to beats per minute.
    #[must_use]
    pub fn period_to_bpm(&self, period: f64) -> f64 {
        60.0 * self.frame_rate / period
    }

    /// Estimates the tempo of the complete detection function.
    ///
    /// Fails with [`TempoError::InsufficientData`] if the detection function
    /// is shorter than [`Self::min_len`] or carries no energy.
    pub fn estimate(&self, detection: &[f64]) -> Result<TempoEstimate, TempoError> {
        let insufficient = || TempoError::InsufficientData {
            len: detection.len(),
            required: self.min_len() - 1,
        };

        if detection.len() < self.min_len() || !detection.iter().any(|&v| v > 0.0) {
            return Err(insufficient());
        }

        let smoothed = smooth(detection);

        let comb_outputs = (0..)
            .map(|i| i * FRAME_STEP)
            .take_while(|start| start + self.frame_len < smoothed.len())
            .map(|start| self.comb_filter(&smoothed[start..start + self.frame_len]))
            .collect::<Vec<_>>();
        if comb_outputs.is_empty() {
            return Err(insufficient());
        }

        let path = self.decode(&comb_outputs);

        let mut beat_periods = path
            .iter()
            .flat_map(|&period| core::iter::repeat(period as f64).take(FRAME_STEP))
            .collect::<Vec<_>>();
        let last = beat_periods.last().copied().unwrap_or_default();
        beat_periods.resize(detection.len(), last);

        let period = dominant_period(&path) as f64;
        let confidence = path
            .iter()
            .zip(&comb_outputs)
            .map(|(&p, output)| {
                let allowed = &output[self.min_period..=self.max_period];
                let max = allowed.iter().copied().fold(0.0, f64::max);
                output[p] / (max + EPS)
            })
            .sum::<f64>()
            / path.len() as f64;
        let candidates = self.candidates(&comb_outputs);

        let estimate = TempoEstimate {
            period,
            bpm: self.period_to_bpm(period),
            confidence: confidence.clamp(0.0, 1.0),
            beat_periods,
            candidates,
        };
        log::debug!(
            "Estimated period of {} frames ({:.1} BPM), confidence {:.2}",
            estimate.period,
            estimate.bpm,
            estimate.confidence
        );
        Ok(estimate)
    }

    /// Returns the prior weighted comb filter output for each period of one
    /// frame of the detection function, normalized to sum up to one.
    fn comb_filter(&self, frame: &[f64]) -> Vec<f64> {
        let mut frame = frame.to_vec();
        adaptive_threshold(&mut frame);

        let acf = autocorrelation(&frame);

        let mut output = vec![0.0; self.prior.len()];
        for (period, out) in output.iter_mut().enumerate().skip(1) {
            *out = (1..=COMB_ELEMENTS)
                .map(|a| {
                    let spread = a as isize - 1;
                    let sum = (-spread..=spread)
                        // multiples beyond the frame don't contribute
                        .filter_map(|b| acf.get((a * period).saturating_add_signed(b)))
                        .sum::<f64>();
                    sum / (2 * a - 1) as f64
                })
                .sum::<f64>()
                * self.prior[period];
        }

        adaptive_threshold(&mut output);

        output.iter_mut().for_each(|value| *value += EPS);
        let sum = output.iter().sum::<f64>();
        output.iter_mut().for_each(|value| *value /= sum + EPS);
        output
    }

    /// Viterbi decoding of the most likely sequence of periods. Periods
    /// outside the allowed range are never chosen.
    fn decode(&self, comb_outputs: &[Vec<f64>]) -> Vec<usize> {
        let bins = self.prior.len();
        let allowed = self.min_period..=self.max_period;

        // transition[to][from]
        let transition = (0..bins)
            .map(|to| {
                (0..bins)
                    .map(|from| {
                        if allowed.contains(&to) && allowed.contains(&from) {
                            let d = from as f64 - to as f64;
                            (-d * d / (2.0 * TRANSITION_SIGMA * TRANSITION_SIGMA)).exp()
                        } else {
                            0.0
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let mut delta = vec![vec![0.0; bins]; comb_outputs.len()];
        let mut psi = vec![vec![0_usize; bins]; comb_outputs.len()];

        for period in allowed.clone() {
            delta[0][period] = self.prior[period] * comb_outputs[0][period];
        }
        normalize(&mut delta[0]);

        let mut candidates = vec![0.0; bins];
        for t in 1..comb_outputs.len() {
            for to in 0..bins {
                candidates
                    .iter_mut()
                    .zip(&delta[t - 1])
                    .zip(&transition[to])
                    .for_each(|((candidate, &previous), &weight)| *candidate = previous * weight);
                let from = self.min_period + first_max_index(&candidates[allowed.clone()]);
                psi[t][to] = from;
                delta[t][to] = candidates[from] * comb_outputs[t][to];
            }
            normalize(&mut delta[t]);
        }

        let mut path = vec![0; comb_outputs.len()];
        let last = comb_outputs.len() - 1;
        path[last] = self.min_period + first_max_index(&delta[last][allowed]);
        for t in (0..last).rev() {
            path[t] = psi[t + 1][path[t + 1]];
        }
        path
    }

    /// Ranks the local maxima of the comb filter output accumulated over all
    /// frames.
    fn candidates(&self, comb_outputs: &[Vec<f64>]) -> Vec<TempoCandidate> {
        let mut total = vec![0.0; self.prior.len()];
        for output in comb_outputs {
            total
                .iter_mut()
                .zip(output)
                .for_each(|(sum, value)| *sum += value);
        }

        let mut peaks = (self.min_period..=self.max_period)
            .filter(|&p| {
                let left = total.get(p - 1).copied().unwrap_or(0.0);
                let right = total.get(p + 1).copied().unwrap_or(0.0);
                total[p] > left && total[p] >= right
            })
            .collect::<Vec<_>>();
        // Highest support first, shorter period on ties.
        peaks.sort_by(|&a, &b| total[b].total_cmp(&total[a]).then(a.cmp(&b)));

        let best = peaks.first().map(|&p| total[p]).unwrap_or(0.0);
        peaks
            .into_iter()
            .take(MAX_CANDIDATES)
            .map(|p| TempoCandidate {
                period: p as f64,
                bpm: self.period_to_bpm(p as f64),
                score: if best > 0.0 { total[p] / best } else { 0.0 },
            })
            .collect()
    }
}

/// Weight of each period before looking at the audio. Either a Rayleigh curve
/// or a Gaussian, both peaking at `center`.
fn tempo_prior(bins: usize, center: f64, constrain: bool) -> Vec<f64> {
    (0..bins)
        .map(|i| {
            let i = i as f64;
            if constrain {
                let width = center / 4.0;
                (-(i - center).powi(2) / (2.0 * width * width)).exp()
            } else {
                i / (center * center) * (-(i * i) / (2.0 * center * center)).exp()
            }
        })
        .collect()
}

/// Unbiased autocorrelation for all lags of the frame.
fn autocorrelation(frame: &[f64]) -> Vec<f64> {
    let len = frame.len();
    (0..len)
        .map(|lag| {
            let sum = frame[..len - lag]
                .iter()
                .zip(&frame[lag..])
                .map(|(a, b)| a * b)
                .sum::<f64>();
            sum / (len - lag) as f64
        })
        .collect()
}

/// Zero-phase low-pass filter: the detection function is filtered forward and
/// backward, so the peaks stay where they are.
fn smooth(detection: &[f64]) -> Vec<f64> {
    let mut forward = DirectForm1::<f64>::new(smoothing_coefficients());
    let mut smoothed = detection
        .iter()
        .map(|&value| forward.run(value))
        .collect::<Vec<_>>();

    let mut backward = DirectForm1::<f64>::new(smoothing_coefficients());
    smoothed
        .iter_mut()
        .rev()
        .for_each(|value| *value = backward.run(*value));
    smoothed
}

/// Second order Butterworth-like low-pass.
const fn smoothing_coefficients() -> Coefficients<f64> {
    Coefficients {
        a1: -0.3695,
        a2: 0.1958,
        b0: 0.2066,
        b1: 0.4131,
        b2: 0.2066,
    }
}

fn normalize(values: &mut [f64]) {
    let sum = values.iter().sum::<f64>();
    values.iter_mut().for_each(|value| *value /= sum + EPS);
}

/// Most frequent period of the path. Ties resolve to the shorter period.
fn dominant_period(path: &[usize]) -> usize {
    let mut counts = std::collections::BTreeMap::new();
    for &period in path {
        *counts.entry(period).or_insert(0_usize) += 1;
    }
    counts
        .into_iter()
        .fold((0, 0), |(best, best_count), (period, count)| {
            if count > best_count {
                (period, count)
            } else {
                (best, best_count)
            }
        })
        .0
}
