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
//! Module for [`DetectionFunction`].
//!
//! A detection function maps one analysis window to one scalar that describes
//! how likely a note onset happened in that window. Each window is multiplied
//! with a Hann window, rotated so that the phase is measured relative to the
//! center of the window, and transformed to the frequency domain. The onset
//! strength is derived from how the magnitude and phase of each frequency bin
//! changed compared to the previous windows.
//!
//! The engine keeps the magnitudes and phases of the two previous windows.
//! Initially, that history is silence. Hence, the first window is compared
//! against silence and yields the rectified energy of its own spectrum.

use crate::util::princarg;
use core::fmt::{Debug, Formatter};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use thiserror::Error;

/// Only bins with a magnitude above this value contribute to
/// [`DetectionFunctionKind::PhaseDeviation`].
const PHASE_DEVIATION_MIN_MAGNITUDE: f64 = 0.1;

/// Possible errors of [`DetectionFunction::process`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// The window doesn't have the configured length.
    #[error("window has {actual} samples, but the detection function expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// The onset novelty measures the [`DetectionFunction`] can compute.
///
/// In the following, `X` is the spectrum of the current window, `X'` and `X''`
/// are the spectra of the two previous windows, `φ` denotes phases, and
/// `dev = princarg(φ - 2φ' + φ'')` is the deviation from the phase that a
/// steady sinusoid would have.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DetectionFunctionKind {
    /// `Σ max(0, |X| - |X'|)`: the half-wave rectified increase of the
    /// magnitude spectrum, also known as spectral flux.
    SpectralDifference,
    /// `Σ |dev|` over all bins with a significant magnitude.
    PhaseDeviation,
    /// `Σ | |X'| - |X| e^(j dev) |`: distance between the observed bin and the
    /// bin predicted from the previous windows.
    ComplexDomain,
    /// Like [`Self::ComplexDomain`] but only bins whose magnitude did not
    /// decrease contribute. Onsets raise energy, offsets don't count.
    #[default]
    RectifiedComplexDomain,
    /// Number of bins whose energy rose by more than
    /// [`DetectionConfig::db_rise`].
    BroadbandEnergyRise,
}

/// Configuration of the [`DetectionFunction`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectionConfig {
    /// Novelty measure.
    pub kind: DetectionFunctionKind,
    /// Normalize each bin by a slowly decaying peak of its own history before
    /// computing the novelty. Helps for recordings with a strong spectral
    /// tilt.
    pub adaptive_whitening: bool,
    /// Per-window relaxation of the whitening peak follower.
    pub whitening_relaxation: f64,
    /// Lower bound of the whitening peak follower.
    pub whitening_floor: f64,
    /// Energy rise in dB a bin needs for
    /// [`DetectionFunctionKind::BroadbandEnergyRise`].
    pub db_rise: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            kind: DetectionFunctionKind::default(),
            adaptive_whitening: false,
            whitening_relaxation: 0.9997,
            whitening_floor: 0.01,
            db_rise: 3.0,
        }
    }
}

/// Spectral state of the previous windows.
#[derive(Clone, Debug)]
struct SpectralHistory {
    magnitude: Vec<f64>,
    phase: Vec<f64>,
    phase_old: Vec<f64>,
    whitening_peaks: Vec<f64>,
}

impl SpectralHistory {
    fn new(bins: usize) -> Self {
        Self {
            magnitude: vec![0.0; bins],
            phase: vec![0.0; bins],
            phase_old: vec![0.0; bins],
            whitening_peaks: vec![0.0; bins],
        }
    }

    fn clear(&mut self) {
        self.magnitude.fill(0.0);
        self.phase.fill(0.0);
        self.phase_old.fill(0.0);
        self.whitening_peaks.fill(0.0);
    }
}

/// Computes one onset strength value per analysis window. See the
/// [module description] for details.
///
/// [module description]: crate::detection_function
pub struct DetectionFunction {
    config: DetectionConfig,
    window_size: usize,
    fft: Arc<dyn Fft<f64>>,
    hann: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    magnitude: Vec<f64>,
    phase: Vec<f64>,
    history: SpectralHistory,
}

impl DetectionFunction {
    /// Creates a new detection function for windows of `window_size` samples.
    ///
    /// # Panics
    /// If `window_size` is zero.
    pub fn new(window_size: usize, config: DetectionConfig) -> Self {
        assert!(window_size > 0, "window size must not be zero");

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        let bins = window_size / 2 + 1;

        Self {
            config,
            window_size,
            fft,
            hann: hann_window(window_size),
            spectrum: vec![Complex::default(); window_size],
            scratch,
            magnitude: vec![0.0; bins],
            phase: vec![0.0; bins],
            history: SpectralHistory::new(bins),
        }
    }

    /// Forgets the spectra of previous windows. The next window is treated as
    /// the first one.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Computes the onset strength of the next window of the stream. The
    /// result is always finite and non-negative.
    pub fn process(&mut self, window: &[f32]) -> Result<f64, DetectionError> {
        if window.len() != self.window_size {
            return Err(DetectionError::SizeMismatch {
                expected: self.window_size,
                actual: window.len(),
            });
        }

        self.analyze_spectrum(window);
        if self.config.adaptive_whitening {
            self.whiten();
        }

        let value = match self.config.kind {
            DetectionFunctionKind::SpectralDifference => self.spectral_difference(),
            DetectionFunctionKind::PhaseDeviation => self.phase_deviation(),
            DetectionFunctionKind::ComplexDomain => self.complex_domain(false),
            DetectionFunctionKind::RectifiedComplexDomain => self.complex_domain(true),
            DetectionFunctionKind::BroadbandEnergyRise => self.broadband_energy_rise(),
        };

        self.history.phase_old.copy_from_slice(&self.history.phase);
        self.history.phase.copy_from_slice(&self.phase);
        self.history.magnitude.copy_from_slice(&self.magnitude);

        if value.is_finite() {
            Ok(value.max(0.0))
        } else {
            log::warn!("Detection function produced {value}; using 0.0 instead");
            Ok(0.0)
        }
    }

    /// Returns the configured window size.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Applies the Hann window, rotates the window by half its length, and
    /// fills `magnitude` and `phase` with the polar form of the non-negative
    /// frequency bins.
    fn analyze_spectrum(&mut self, window: &[f32]) {
        let n = self.window_size;
        let shift = n - n / 2;
        window
            .iter()
            .zip(&self.hann)
            .enumerate()
            .for_each(|(i, (&sample, &weight))| {
                self.spectrum[(i + shift) % n] = Complex::new(f64::from(sample) * weight, 0.0);
            });

        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        self.spectrum
            .iter()
            .zip(self.magnitude.iter_mut().zip(self.phase.iter_mut()))
            .for_each(|(bin, (magnitude, phase))| {
                *magnitude = bin.norm();
                *phase = bin.arg();
            });
    }

    fn whiten(&mut self) {
        let relaxation = self.config.whitening_relaxation;
        let floor = self.config.whitening_floor;
        self.magnitude
            .iter_mut()
            .zip(self.history.whitening_peaks.iter_mut())
            .for_each(|(magnitude, peak)| {
                let mut m = *magnitude;
                if m < *peak {
                    m += (*peak - m) * relaxation;
                }
                let m = m.max(floor);
                *peak = m;
                *magnitude /= m;
            });
    }

    fn spectral_difference(&self) -> f64 {
        self.magnitude
            .iter()
            .zip(&self.history.magnitude)
            .map(|(current, previous)| (current - previous).max(0.0))
            .sum()
    }

    /// Phase deviation of each bin from a steady sinusoid.
    #[inline]
    fn deviation(&self, bin: usize) -> f64 {
        princarg(self.phase[bin] - 2.0 * self.history.phase[bin] + self.history.phase_old[bin])
    }

    fn phase_deviation(&self) -> f64 {
        (0..self.magnitude.len())
            .filter(|&bin| self.magnitude[bin] > PHASE_DEVIATION_MIN_MAGNITUDE)
            .map(|bin| self.deviation(bin).abs())
            .sum()
    }

    fn complex_domain(&self, rectified: bool) -> f64 {
        (0..self.magnitude.len())
            .filter(|&bin| !rectified || self.magnitude[bin] >= self.history.magnitude[bin])
            .map(|bin| {
                let predicted = Complex::new(self.history.magnitude[bin], 0.0);
                let observed = Complex::from_polar(self.magnitude[bin], self.deviation(bin));
                (predicted - observed).norm()
            })
            .sum()
    }

    fn broadband_energy_rise(&self) -> f64 {
        let db_rise = self.config.db_rise;
        self.magnitude
            .iter()
            .zip(&self.history.magnitude)
            .filter(|(&current, &previous)| {
                previous > 0.0 && current > 0.0 && 20.0 * (current / previous).log10() > db_rise
            })
            .count() as f64
    }
}

impl Debug for DetectionFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DetectionFunction")
            .field("config", &self.config)
            .field("window_size", &self.window_size)
            .finish_non_exhaustive()
    }
}

/// Symmetric Hann window of the given size.
fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * core::f64::consts::PI * i as f64 / (size - 1) as f64).cos())
        .collect()
}
