//! Cycle projection: sample positions over a range and derive pairwise
//! separations, anchored at a reference instant.
//!
//! Position fetches for independent (body, instant) pairs fan out across a
//! bounded rayon pool; the assembled series are always re-sorted by instant
//! before anything downstream sees them, so the degree of parallelism never
//! changes the output.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::angle::separation;
use crate::body::{BodyPair, CelestialBody, ReferenceFrame};
use crate::constants::DEFAULT_CONCURRENCY;
use crate::error::{Diagnostic, EngineError, ProviderError, Result};
use crate::position::{Position, PositionProvider};
use crate::time::{DateRange, SampleGrid, Step, days_between};

/// User-chosen reference instant for one asset. Every projection of a
/// request is measured from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorDate {
    pub instant: DateTime<Utc>,
    pub asset_id: String,
}

impl AnchorDate {
    pub fn new(instant: DateTime<Utc>, asset_id: impl Into<String>) -> Self {
        Self {
            instant,
            asset_id: asset_id.into(),
        }
    }
}

/// Reduced angular distance between two bodies at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeparationSample {
    pub pair: BodyPair,
    pub instant: DateTime<Utc>,
    /// Always in [0, 180].
    pub separation_degrees: f64,
    pub days_from_anchor: f64,
}

impl SeparationSample {
    pub fn from_angles(
        pair: BodyPair,
        instant: DateTime<Utc>,
        angle_a: f64,
        angle_b: f64,
        anchor: DateTime<Utc>,
    ) -> Self {
        Self {
            pair,
            instant,
            separation_degrees: separation(angle_a, angle_b),
            days_from_anchor: days_between(anchor, instant),
        }
    }

    pub fn from_positions(pair: BodyPair, a: &Position, b: &Position, anchor: DateTime<Utc>) -> Self {
        Self::from_angles(pair, a.instant, a.angle_degrees, b.angle_degrees, anchor)
    }
}

/// Instant-ordered samples of one body pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairSeries {
    pub pair: BodyPair,
    samples: Vec<SeparationSample>,
}

impl PairSeries {
    /// Builds a series, sorting samples by instant.
    pub fn new(pair: BodyPair, mut samples: Vec<SeparationSample>) -> Self {
        samples.sort_by_key(|s| s.instant);
        Self { pair, samples }
    }

    /// Restartable: every call walks the series from the start.
    pub fn samples(&self) -> impl ExactSizeIterator<Item = &SeparationSample> + '_ {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[SeparationSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Output of one projection pass.
#[derive(Clone, Debug, Default)]
pub struct Projection {
    series: Vec<PairSeries>,
    pub diagnostics: Vec<Diagnostic>,
    /// Grid instants visited.
    pub instants_sampled: usize,
    /// Grid instants at which at least one pair had to be skipped.
    pub failed_instants: usize,
}

impl Projection {
    pub fn series(&self) -> impl Iterator<Item = &PairSeries> + '_ {
        self.series.iter()
    }

    pub fn series_for(&self, pair: BodyPair) -> Option<&PairSeries> {
        self.series.iter().find(|s| s.pair == pair)
    }

    pub fn total_samples(&self) -> usize {
        self.series.iter().map(PairSeries::len).sum()
    }

    pub fn into_series(self) -> Vec<PairSeries> {
        self.series
    }
}

/// What to project.
#[derive(Clone, Copy, Debug)]
pub struct ProjectionSpec<'a> {
    pub anchor: &'a AnchorDate,
    pub range: DateRange,
    pub step: Step,
    pub pairs: &'a [BodyPair],
    pub frame: ReferenceFrame,
}

#[derive(Clone, Copy, Debug)]
pub struct ProjectorConfig {
    /// Upper bound on concurrent position fetches.
    pub concurrency: usize,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Positions fetched for every body of interest at one grid instant.
struct InstantFetch {
    instant: DateTime<Utc>,
    angles: Vec<(CelestialBody, Option<f64>)>,
}

impl InstantFetch {
    fn angle(&self, body: CelestialBody) -> Option<f64> {
        self.angles
            .iter()
            .find(|(b, _)| *b == body)
            .and_then(|(_, angle)| *angle)
    }
}

pub struct CycleProjector {
    config: ProjectorConfig,
}

impl CycleProjector {
    pub fn new(config: ProjectorConfig) -> Self {
        Self { config }
    }

    pub fn project<P>(
        &self,
        spec: &ProjectionSpec<'_>,
        provider: &P,
        cancel: &CancellationToken,
    ) -> Result<Projection>
    where
        P: PositionProvider + ?Sized,
    {
        let grid = SampleGrid::new(spec.range, spec.step);
        let bodies: Vec<CelestialBody> = spec
            .pairs
            .iter()
            .flat_map(|p| [p.a, p.b])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency.max(1))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        let fetched: Result<Vec<InstantFetch>> = pool.install(|| {
            (0..grid.len())
                .into_par_iter()
                .filter_map(|i| grid.instant(i))
                .map(|instant| fetch_instant(provider, &bodies, spec.frame, instant, cancel))
                .collect::<Result<Vec<_>>>()
        });
        provider.flush();
        let mut fetched = fetched?;
        fetched.sort_by_key(|f| f.instant);

        let mut projection = Projection {
            instants_sampled: fetched.len(),
            ..Projection::default()
        };
        let mut per_pair: Vec<Vec<SeparationSample>> = vec![Vec::with_capacity(fetched.len()); spec.pairs.len()];

        for fetch in &fetched {
            let mut skipped = false;
            for (body, angle) in &fetch.angles {
                if angle.is_none() {
                    tracing::debug!(%body, instant = %fetch.instant, "ephemeris gap, skipping instant");
                    projection.diagnostics.push(Diagnostic::ephemeris_gap(*body, fetch.instant));
                }
            }
            for (pair, samples) in spec.pairs.iter().zip(per_pair.iter_mut()) {
                match (fetch.angle(pair.a), fetch.angle(pair.b)) {
                    (Some(a), Some(b)) => samples.push(SeparationSample::from_angles(
                        *pair,
                        fetch.instant,
                        a,
                        b,
                        spec.anchor.instant,
                    )),
                    _ => skipped = true,
                }
            }
            if skipped {
                projection.failed_instants += 1;
            }
        }

        projection.series = spec
            .pairs
            .iter()
            .zip(per_pair)
            .map(|(pair, samples)| PairSeries::new(*pair, samples))
            .collect();

        tracing::debug!(
            provider = provider.name(),
            instants = projection.instants_sampled,
            failed = projection.failed_instants,
            samples = projection.total_samples(),
            "projection complete"
        );
        Ok(projection)
    }
}

impl Default for CycleProjector {
    fn default() -> Self {
        Self::new(ProjectorConfig::default())
    }
}

fn fetch_instant<P>(
    provider: &P,
    bodies: &[CelestialBody],
    frame: ReferenceFrame,
    instant: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<InstantFetch>
where
    P: PositionProvider + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    let mut angles = Vec::with_capacity(bodies.len());
    for &body in bodies {
        match provider.get_position(body, frame, instant) {
            Ok(p) => angles.push((body, Some(p.angle_degrees))),
            Err(ProviderError::EphemerisUnavailable { .. }) => angles.push((body, None)),
            Err(ProviderError::UnsupportedFrame { body, frame }) => {
                return Err(EngineError::UnsupportedFrame {
                    body,
                    frame,
                    instant,
                });
            }
        }
    }
    Ok(InstantFetch { instant, angles })
}

/// Lazy, sequential separation samples for one pair, pulled from the
/// provider on demand. Gaps come through as `Err` items.
pub struct SeparationStream<'a, P: ?Sized> {
    provider: &'a P,
    pair: BodyPair,
    frame: ReferenceFrame,
    anchor: DateTime<Utc>,
    grid: SampleGrid,
    cursor: usize,
}

impl<'a, P: PositionProvider + ?Sized> SeparationStream<'a, P> {
    pub fn new(
        provider: &'a P,
        pair: BodyPair,
        frame: ReferenceFrame,
        anchor: DateTime<Utc>,
        range: DateRange,
        step: Step,
    ) -> Self {
        Self {
            provider,
            pair,
            frame,
            anchor,
            grid: SampleGrid::new(range, step),
            cursor: 0,
        }
    }

    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    /// Separation at an arbitrary instant, outside the grid.
    pub fn sample_at(&self, instant: DateTime<Utc>) -> std::result::Result<SeparationSample, ProviderError> {
        let a = self.provider.get_position(self.pair.a, self.frame, instant)?;
        let b = self.provider.get_position(self.pair.b, self.frame, instant)?;
        Ok(SeparationSample::from_positions(self.pair, &a, &b, self.anchor))
    }
}

impl<P: PositionProvider + ?Sized> Iterator for SeparationStream<'_, P> {
    type Item = std::result::Result<SeparationSample, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let instant = self.grid.instant(self.cursor)?;
        self.cursor += 1;
        Some(self.sample_at(instant))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.grid.len().saturating_sub(self.cursor);
        (left, Some(left))
    }
}
