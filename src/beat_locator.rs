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
//! Module for [`BeatLocator`].
//!
//! Places beats on a detection function, given a (local) beat period. The
//! beats are found by dynamic programming: every detection function frame gets
//! a cumulative score that combines its own onset strength with the best
//! score of a previous frame roughly one beat period earlier. The further the
//! distance to that previous frame deviates from the expected beat period, the
//! more its score is penalized. Following the back links from the best frame
//! near the end of the track yields the globally best beat sequence.

use crate::tempo_tracker::TempoEstimate;

/// Configuration of the [`BeatLocator`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BeatLocatorConfig {
    /// Weight of the cumulative score of the previous beat versus the onset
    /// strength of the current frame, in `0.0..=1.0`. Higher values favor a
    /// steady grid over single strong onsets.
    pub alpha: f64,
    /// How strongly deviations from the beat period are penalized.
    pub tightness: f64,
}

impl Default for BeatLocatorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            tightness: 4.0,
        }
    }
}

/// Aligns the beat period to the onsets of a detection function. See the
/// [module description] for details.
///
/// [module description]: crate::beat_locator
#[derive(Copy, Clone, Debug, Default)]
pub struct BeatLocator {
    config: BeatLocatorConfig,
}

impl BeatLocator {
    /// Creates a new beat locator.
    #[must_use]
    pub const fn new(config: BeatLocatorConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BeatLocatorConfig {
        &self.config
    }

    /// Returns the indices of the detection function frames that carry a
    /// beat, in strictly increasing order.
    ///
    /// Without a tempo estimate, for an empty detection function, or if the
    /// detection function carries no energy, there are no beats.
    pub fn locate(&self, detection: &[f64], estimate: Option<&TempoEstimate>) -> Vec<usize> {
        let Some(estimate) = estimate else {
            return Vec::new();
        };
        if detection.is_empty() || !(estimate.period >= 1.0) {
            return Vec::new();
        }

        let period_at = |i: usize| {
            estimate
                .beat_periods
                .get(i)
                .or(estimate.beat_periods.last())
                .copied()
                .filter(|period| *period >= 1.0)
                .unwrap_or(estimate.period)
        };

        let alpha = self.config.alpha;
        let tightness = self.config.tightness;

        let mut cumulative = vec![0.0; detection.len()];
        let mut backlink = vec![None; detection.len()];

        for (i, &onset) in detection.iter().enumerate() {
            let period = period_at(i);
            let nearest = ((0.5 * period).round() as usize).max(1);
            let farthest = ((2.0 * period).round() as usize).max(nearest);

            // Farthest predecessor first, so ties resolve to it.
            let mut best: Option<(usize, f64)> = None;
            for distance in (nearest..=farthest).rev().filter(|&d| d <= i) {
                let deviation = tightness * (distance as f64 / period).ln();
                let weight = (-0.5 * deviation * deviation).exp();
                let score = weight * cumulative[i - distance];
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((i - distance, score));
                }
            }

            let best = best.filter(|(_, score)| *score > 0.0);
            cumulative[i] = alpha * best.map_or(0.0, |(_, score)| score) + (1.0 - alpha) * onset;
            backlink[i] = best.map(|(index, _)| index);
        }

        // The last beat is the best scoring frame within the final period.
        let last_period = (period_at(detection.len() - 1).round() as usize).max(1);
        let search_begin = detection.len().saturating_sub(last_period);
        let last_beat = search_begin + crate::util::first_max_index(&cumulative[search_begin..]);
        if cumulative[last_beat] <= 0.0 {
            return Vec::new();
        }

        let mut beats = vec![last_beat];
        let mut current = last_beat;
        while let Some(previous) = backlink[current] {
            debug_assert!(previous < current);
            beats.push(previous);
            current = previous;
        }
        beats.reverse();

        log::trace!("Located {} beats", beats.len());
        beats
    }
}
