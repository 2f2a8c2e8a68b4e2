//! Harmonic detection over separation series.
//!
//! For every harmonic n the targets are the n even divisions of the circle
//! folded into [0, 180]. Each consecutive pair of samples is checked against
//! each target: a sign change of `separation − target` is a crossing, and a
//! sample within the orb is a hit even without a crossing (separations bounce
//! off 0° and 180° rather than passing through them).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::angle::{harmonic_targets, signed_distance};
use crate::body::BodyPair;
use crate::constants::{DEFAULT_HARMONICS, DEFAULT_ORB, HALF_CIRCLE};
use crate::projector::{PairSeries, Projection, SeparationSample};

/// Sorted, deduplicated set of harmonic numbers, each ≥ 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct HarmonicSet(Vec<u32>);

impl HarmonicSet {
    pub fn new(harmonics: impl IntoIterator<Item = u32>) -> Result<Self, String> {
        let mut values: Vec<u32> = harmonics.into_iter().collect();
        if values.contains(&0) {
            return Err("harmonic 0 does not divide the circle".to_string());
        }
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err("harmonic set must not be empty".to_string());
        }
        Ok(Self(values))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, n: u32) -> bool {
        self.0.binary_search(&n).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for HarmonicSet {
    fn default() -> Self {
        Self(DEFAULT_HARMONICS.to_vec())
    }
}

impl fmt::Display for HarmonicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// Parses `"4,8"`, `"2-12"` or a mix such as `"2-4,8,12"`.
impl FromStr for HarmonicSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut values = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.trim().parse().map_err(|e| format!("bad harmonic '{part}': {e}"))?;
                let hi: u32 = hi.trim().parse().map_err(|e| format!("bad harmonic '{part}': {e}"))?;
                if lo > hi {
                    return Err(format!("harmonic range '{part}' is inverted"));
                }
                values.extend(lo..=hi);
            } else {
                values.push(part.parse().map_err(|e| format!("bad harmonic '{part}': {e}"))?);
            }
        }
        Self::new(values)
    }
}

impl TryFrom<Vec<u32>> for HarmonicSet {
    type Error = String;

    fn try_from(value: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HarmonicSet> for Vec<u32> {
    fn from(set: HarmonicSet) -> Self {
        set.0
    }
}

/// Where an event is placed in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPlacement {
    /// At the sample closest to the target; reproducible with coarse steps.
    #[default]
    NearestSample,
    /// At the linearly interpolated zero crossing.
    Interpolated,
}

/// One crossing of a harmonic division within the orb.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonicEvent {
    pub pair: BodyPair,
    pub harmonic_n: u32,
    pub instant: DateTime<Utc>,
    /// Reduced target angle in [0, 180].
    pub target_angle: f64,
    /// Separation at the event instant.
    pub exact_angle: f64,
    /// |exact_angle − target_angle|, never above the configured orb.
    pub orb_delta: f64,
    pub days_from_anchor: f64,
}

impl HarmonicEvent {
    fn at_sample(sample: &SeparationSample, harmonic_n: u32, target: f64) -> Self {
        Self {
            pair: sample.pair,
            harmonic_n,
            instant: sample.instant,
            target_angle: target,
            exact_angle: sample.separation_degrees,
            orb_delta: signed_distance(sample.separation_degrees, target).abs(),
            days_from_anchor: sample.days_from_anchor,
        }
    }

    /// Linear zero crossing of `separation − target` between two samples
    /// that straddle the target.
    fn interpolated(s0: &SeparationSample, s1: &SeparationSample, harmonic_n: u32, target: f64) -> Self {
        let d0 = signed_distance(s0.separation_degrees, target);
        let d1 = signed_distance(s1.separation_degrees, target);
        let frac = d0 / (d0 - d1);
        let span = (s1.instant - s0.instant).num_seconds() as f64;
        Self {
            pair: s0.pair,
            harmonic_n,
            instant: s0.instant + Duration::seconds((span * frac).round() as i64),
            target_angle: target,
            exact_angle: target,
            orb_delta: 0.0,
            days_from_anchor: s0.days_from_anchor + frac * (s1.days_from_anchor - s0.days_from_anchor),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub harmonics: HarmonicSet,
    /// Tolerance in degrees.
    pub orb: f64,
    pub placement: EventPlacement,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            harmonics: HarmonicSet::default(),
            orb: DEFAULT_ORB,
            placement: EventPlacement::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.orb.is_finite() || self.orb < 0.0 || self.orb > HALF_CIRCLE {
            return Err(format!("orb must be within [0, 180] degrees, got {}", self.orb));
        }
        Ok(())
    }
}

pub struct HarmonicDetector {
    config: DetectorConfig,
    targets: Vec<(u32, Vec<f64>)>,
}

impl HarmonicDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let targets = config.harmonics.iter().map(|n| (n, harmonic_targets(n))).collect();
        Self { config, targets }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Events for one pair, sorted by (instant, harmonic, target).
    pub fn detect(&self, series: &PairSeries) -> Vec<HarmonicEvent> {
        let samples = series.as_slice();
        let mut events = Vec::new();
        for (n, targets) in &self.targets {
            for &target in targets {
                self.scan_target(samples, *n, target, &mut events);
            }
        }
        events.sort_by(|a, b| {
            a.instant
                .cmp(&b.instant)
                .then(a.harmonic_n.cmp(&b.harmonic_n))
                .then(a.target_angle.total_cmp(&b.target_angle))
        });
        events
    }

    /// Events for every series of a projection, in series order.
    pub fn detect_all(&self, projection: &Projection) -> Vec<HarmonicEvent> {
        projection.series().flat_map(|s| self.detect(s)).collect()
    }

    fn scan_target(&self, samples: &[SeparationSample], n: u32, target: f64, out: &mut Vec<HarmonicEvent>) {
        let orb = self.config.orb;

        if let [only] = samples {
            if signed_distance(only.separation_degrees, target).abs() <= orb {
                out.push(HarmonicEvent::at_sample(only, n, target));
            }
            return;
        }

        let mut last_instant: Option<DateTime<Utc>> = None;
        for pair in samples.windows(2) {
            let (s0, s1) = (&pair[0], &pair[1]);
            let d0 = signed_distance(s0.separation_degrees, target);
            let d1 = signed_distance(s1.separation_degrees, target);
            let straddles = (d0 < 0.0 && d1 > 0.0) || (d0 > 0.0 && d1 < 0.0);
            if !straddles && d0.abs() > orb && d1.abs() > orb {
                continue;
            }

            let (closer, closer_delta) = if d0.abs() <= d1.abs() { (s0, d0.abs()) } else { (s1, d1.abs()) };
            let event = match self.config.placement {
                EventPlacement::Interpolated if straddles => HarmonicEvent::interpolated(s0, s1, n, target),
                // No sampled instant is inside the orb, but the exact aspect
                // lies between the two samples.
                EventPlacement::NearestSample if closer_delta > orb => {
                    HarmonicEvent::interpolated(s0, s1, n, target)
                }
                _ => HarmonicEvent::at_sample(closer, n, target),
            };

            if last_instant == Some(event.instant) {
                continue;
            }
            last_instant = Some(event.instant);
            out.push(event);
        }
    }
}
