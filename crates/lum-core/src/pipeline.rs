//! Request → report orchestration: projection, detection, clustering, scoring.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::body::{BodyPair, CelestialBody, ReferenceFrame};
use crate::cluster::{Cluster, ClusterConfig, ClusterEngine};
use crate::constants::{DEFAULT_CONCURRENCY, DEFAULT_ORB, DEFAULT_TIME_TOLERANCE_STEPS, MAX_GRID_SAMPLES};
use crate::error::{Diagnostic, EngineError, ProviderError, Result};
use crate::harmonic::{DetectorConfig, EventPlacement, HarmonicDetector, HarmonicEvent, HarmonicSet};
use crate::position::{Position, PositionProvider};
use crate::projector::{AnchorDate, CycleProjector, ProjectionSpec, ProjectorConfig};
use crate::scoring::{ReactionWeights, Score, ScoringConfig, ScoringEngine};
use crate::time::{DateRange, SampleGrid, Step};

/// How clusters are ordered in a report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterOrder {
    /// Strongest first; ties by start instant.
    #[default]
    Strength,
    Chronological,
}

fn default_orb() -> f64 {
    DEFAULT_ORB
}

fn default_time_tolerance_steps() -> u32 {
    DEFAULT_TIME_TOLERANCE_STEPS
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Everything one analysis needs. Only `anchor`, `range` and `body_pairs`
/// are required when deserializing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub anchor: AnchorDate,
    #[serde(default)]
    pub frame: ReferenceFrame,
    pub range: DateRange,
    #[serde(default)]
    pub step: Step,
    pub body_pairs: Vec<BodyPair>,
    #[serde(default)]
    pub harmonics: HarmonicSet,
    #[serde(default = "default_orb")]
    pub orb: f64,
    #[serde(default)]
    pub placement: EventPlacement,
    /// Cluster time tolerance, in sampling steps.
    #[serde(default = "default_time_tolerance_steps")]
    pub time_tolerance_steps: u32,
    #[serde(default)]
    pub angle_tolerance: Option<f64>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub reaction_weights: Option<ReactionWeights>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub order: ClusterOrder,
}

impl AnalysisRequest {
    pub fn new(anchor: AnchorDate, range: DateRange, body_pairs: Vec<BodyPair>) -> Self {
        Self {
            anchor,
            frame: ReferenceFrame::default(),
            range,
            step: Step::default(),
            body_pairs,
            harmonics: HarmonicSet::default(),
            orb: DEFAULT_ORB,
            placement: EventPlacement::default(),
            time_tolerance_steps: DEFAULT_TIME_TOLERANCE_STEPS,
            angle_tolerance: None,
            scoring: ScoringConfig::default(),
            reaction_weights: None,
            concurrency: DEFAULT_CONCURRENCY,
            order: ClusterOrder::default(),
        }
    }

    fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            harmonics: self.harmonics.clone(),
            orb: self.orb,
            placement: self.placement,
        }
    }

    fn cluster_config(&self) -> Result<ClusterConfig> {
        ClusterConfig::from_steps(self.time_tolerance_steps, self.step, self.angle_tolerance)
            .map_err(EngineError::InvalidRequest)
    }

    /// Structural checks, run after scoring validation.
    pub fn validate(&self) -> Result<()> {
        if self.body_pairs.is_empty() {
            return Err(EngineError::InvalidRequest("at least one body pair is required".to_string()));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = self.body_pairs.iter().find(|p| !seen.insert(**p)) {
            return Err(EngineError::InvalidRequest(format!("body pair {dup} is listed more than once")));
        }
        if !self.range.is_ordered() {
            return Err(EngineError::InvalidRequest(format!(
                "range start {} is after end {}",
                self.range.start.to_rfc3339(),
                self.range.end.to_rfc3339()
            )));
        }
        let samples = SampleGrid::new(self.range, self.step)
            .len()
            .saturating_mul(self.body_pairs.len());
        if samples > MAX_GRID_SAMPLES {
            return Err(EngineError::InvalidRequest(format!(
                "{samples} samples requested ({} pairs at step {}), at most {MAX_GRID_SAMPLES} allowed",
                self.body_pairs.len(),
                self.step
            )));
        }
        self.cluster_config()?;
        if self.concurrency == 0 {
            return Err(EngineError::InvalidRequest("concurrency must be at least 1".to_string()));
        }
        match self.angle_tolerance {
            Some(tol) if !tol.is_finite() || tol < 0.0 => {
                return Err(EngineError::InvalidRequest(format!(
                    "angle tolerance must be a non-negative number, got {tol}"
                )));
            }
            _ => {}
        }
        self.detector_config().validate().map_err(EngineError::InvalidRequest)
    }

    /// Distinct bodies across all requested pairs, sorted.
    pub fn bodies(&self) -> Vec<CelestialBody> {
        self.body_pairs
            .iter()
            .flat_map(|p| [p.a, p.b])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    /// Some instants were skipped; see diagnostics.
    Partial,
    /// No sample could be produced at all.
    EmptyRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredCluster {
    pub cluster: Cluster,
    pub score: Score,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub anchor: AnchorDate,
    pub frame: ReferenceFrame,
    /// Position of every requested body at the anchor instant.
    pub anchor_positions: Vec<Position>,
    /// Separation samples produced across all pairs.
    pub samples: usize,
    pub events: Vec<HarmonicEvent>,
    pub clusters: Vec<ScoredCluster>,
    pub diagnostics: Vec<Diagnostic>,
    pub status: AnalysisStatus,
}

impl AnalysisReport {
    pub fn is_empty_range(&self) -> bool {
        self.status == AnalysisStatus::EmptyRange
    }

    pub fn cluster(&self, id: u32) -> Option<&ScoredCluster> {
        self.clusters.iter().find(|c| c.cluster.id == id)
    }
}

/// Run one analysis end to end.
///
/// Scoring configuration is validated before anything else, so a bad weight
/// set fails without touching the provider. Ephemeris gaps are reported in
/// `diagnostics`; a range with no usable instant yields an `EmptyRange`
/// report rather than an error.
pub fn analyze<P>(request: &AnalysisRequest, provider: &P, cancel: &CancellationToken) -> Result<AnalysisReport>
where
    P: PositionProvider + ?Sized,
{
    let scoring = ScoringEngine::new(request.scoring)?;
    request.validate()?;

    tracing::info!(
        asset = %request.anchor.asset_id,
        anchor = %request.anchor.instant.to_rfc3339(),
        frame = %request.frame,
        pairs = request.body_pairs.len(),
        step = %request.step,
        provider = provider.name(),
        "analysis started"
    );

    let projector = CycleProjector::new(ProjectorConfig {
        concurrency: request.concurrency,
    });
    let spec = ProjectionSpec {
        anchor: &request.anchor,
        range: request.range,
        step: request.step,
        pairs: &request.body_pairs,
        frame: request.frame,
    };
    let projection = projector.project(&spec, provider, cancel)?;

    let mut report = AnalysisReport {
        anchor: request.anchor.clone(),
        frame: request.frame,
        anchor_positions: Vec::new(),
        samples: projection.total_samples(),
        events: Vec::new(),
        clusters: Vec::new(),
        diagnostics: projection.diagnostics.clone(),
        status: AnalysisStatus::Complete,
    };
    let anchored = anchor_positions(request, provider, &mut report);
    provider.flush();
    anchored?;

    if report.samples == 0 {
        tracing::warn!(failed = projection.failed_instants, "no samples produced for the requested range");
        report.diagnostics.push(Diagnostic::empty_range(projection.failed_instants));
        report.status = AnalysisStatus::EmptyRange;
        return Ok(report);
    }

    let detector = HarmonicDetector::new(request.detector_config());
    let mut events = detector.detect_all(&projection);
    events.sort_by(|a, b| {
        a.instant
            .cmp(&b.instant)
            .then(a.pair.cmp(&b.pair))
            .then(a.harmonic_n.cmp(&b.harmonic_n))
            .then(a.target_angle.total_cmp(&b.target_angle))
    });
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let engine = ClusterEngine::new(request.cluster_config()?);
    let clusters = engine.cluster(&events);
    let scores = scoring.score(&clusters, request.reaction_weights.as_ref());

    let mut scored: Vec<ScoredCluster> = clusters
        .into_iter()
        .zip(scores)
        .map(|(cluster, score)| ScoredCluster { cluster, score })
        .collect();
    match request.order {
        ClusterOrder::Strength => scored.sort_by(|a, b| {
            b.score
                .strength
                .total_cmp(&a.score.strength)
                .then(a.cluster.start().cmp(&b.cluster.start()))
                .then(a.cluster.id.cmp(&b.cluster.id))
        }),
        ClusterOrder::Chronological => scored.sort_by_key(|c| (c.cluster.start(), c.cluster.id)),
    }

    report.events = events;
    report.clusters = scored;
    if projection.failed_instants > 0 {
        report.status = AnalysisStatus::Partial;
        tracing::warn!(
            failed = projection.failed_instants,
            sampled = projection.instants_sampled,
            "partial result: some instants were skipped"
        );
    }

    tracing::info!(
        samples = report.samples,
        events = report.events.len(),
        clusters = report.clusters.len(),
        "analysis complete"
    );
    Ok(report)
}

fn anchor_positions<P>(request: &AnalysisRequest, provider: &P, report: &mut AnalysisReport) -> Result<()>
where
    P: PositionProvider + ?Sized,
{
    let instant = request.anchor.instant;
    for body in request.bodies() {
        match provider.get_position(body, request.frame, instant) {
            Ok(p) => report.anchor_positions.push(p),
            Err(ProviderError::EphemerisUnavailable { .. }) => {
                tracing::debug!(%body, "no anchor position");
                report.diagnostics.push(Diagnostic::ephemeris_gap(body, instant));
            }
            Err(ProviderError::UnsupportedFrame { body, frame }) => {
                return Err(EngineError::UnsupportedFrame { body, frame, instant });
            }
        }
    }
    Ok(())
}
