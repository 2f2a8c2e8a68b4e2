//! Greedy single-link clustering of harmonic events.
//!
//! Events are sorted once by a total key, then swept left to right: the
//! earliest unassigned event seeds a cluster, which absorbs every later
//! unassigned event within the time tolerance of its latest member (and,
//! when configured, within the angular tolerance). No randomness, no
//! minimum size.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::body::BodyPair;
use crate::constants::{DEFAULT_TIME_TOLERANCE_STEPS, EPSILON};
use crate::harmonic::HarmonicEvent;
use crate::time::Step;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterConfig {
    /// Maximum gap between a candidate and the cluster's latest member.
    pub time_tolerance: Duration,
    /// Optional bound on |exact_angle − cluster mean angle|.
    pub angle_tolerance: Option<f64>,
    /// Sampling step, used to express span and density in steps.
    pub step: Step,
}

impl ClusterConfig {
    /// Tolerance of `steps` sampling steps. Fails when the product does not
    /// fit a `Duration`.
    pub fn from_steps(steps: u32, step: Step, angle_tolerance: Option<f64>) -> Result<Self, String> {
        let time_tolerance = i32::try_from(steps)
            .ok()
            .and_then(|n| step.duration().checked_mul(n))
            .filter(|d| *d <= Duration::MAX)
            .ok_or_else(|| format!("time tolerance of {steps} steps of {step} is out of range"))?;
        Ok(Self {
            time_tolerance,
            angle_tolerance,
            step,
        })
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let step = Step::daily();
        Self {
            time_tolerance: step.duration() * DEFAULT_TIME_TOLERANCE_STEPS as i32,
            angle_tolerance: None,
            step,
        }
    }
}

/// A time-proximate group of harmonic events. Never empty: deserialization
/// rejects a cluster without members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClusterRecord")]
pub struct Cluster {
    pub id: u32,
    members: Vec<HarmonicEvent>,
    pub span_days: f64,
    pub span_steps: f64,
    /// max − min of member exact angles.
    pub angular_spread: f64,
    pub member_count: usize,
    /// member_count / max(span_steps, 1).
    pub density: f64,
    pub mean_orb_delta: f64,
    pub mean_angle: f64,
}

impl Cluster {
    /// Build a cluster from time-ordered members. Returns `None` for an
    /// empty member list.
    pub fn from_members(id: u32, members: Vec<HarmonicEvent>, step: Step) -> Option<Self> {
        let first = members.first()?.instant;
        let last = members.last()?.instant;
        let span = last - first;
        let span_steps = step.steps_in(span);
        let count = members.len();

        let (min_angle, max_angle) = members.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
            (lo.min(e.exact_angle), hi.max(e.exact_angle))
        });
        let mean_orb_delta = members.iter().map(|e| e.orb_delta).sum::<f64>() / count as f64;
        let mean_angle = members.iter().map(|e| e.exact_angle).sum::<f64>() / count as f64;

        Some(Self {
            id,
            span_days: span.num_seconds() as f64 / 86_400.0,
            span_steps,
            angular_spread: max_angle - min_angle,
            member_count: count,
            density: count as f64 / span_steps.max(1.0),
            mean_orb_delta,
            mean_angle,
            members,
        })
    }

    pub fn members(&self) -> &[HarmonicEvent] {
        &self.members
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.members.first().map_or(DateTime::<Utc>::MIN_UTC, |e| e.instant)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.members.last().map_or(DateTime::<Utc>::MIN_UTC, |e| e.instant)
    }

    pub fn span(&self) -> Duration {
        self.end() - self.start()
    }

    /// Distinct pairs among the members, sorted.
    pub fn pairs(&self) -> Vec<BodyPair> {
        self.members.iter().map(|e| e.pair).collect::<BTreeSet<_>>().into_iter().collect()
    }

    /// Distinct harmonic numbers among the members, sorted.
    pub fn harmonics(&self) -> Vec<u32> {
        self.members.iter().map(|e| e.harmonic_n).collect::<BTreeSet<_>>().into_iter().collect()
    }
}

/// Wire form of a `Cluster`, checked before it becomes one.
#[derive(Deserialize)]
struct ClusterRecord {
    id: u32,
    members: Vec<HarmonicEvent>,
    span_days: f64,
    span_steps: f64,
    angular_spread: f64,
    member_count: usize,
    density: f64,
    mean_orb_delta: f64,
    mean_angle: f64,
}

impl TryFrom<ClusterRecord> for Cluster {
    type Error = String;

    fn try_from(r: ClusterRecord) -> Result<Self, Self::Error> {
        if r.members.is_empty() {
            return Err(format!("cluster {} has no members", r.id));
        }
        if r.members.len() != r.member_count {
            return Err(format!(
                "cluster {} lists {} members but member_count is {}",
                r.id,
                r.members.len(),
                r.member_count
            ));
        }
        if r.members.windows(2).any(|w| w[0].instant > w[1].instant) {
            return Err(format!("cluster {} members are not in time order", r.id));
        }
        Ok(Self {
            id: r.id,
            members: r.members,
            span_days: r.span_days,
            span_steps: r.span_steps,
            angular_spread: r.angular_spread,
            member_count: r.member_count,
            density: r.density,
            mean_orb_delta: r.mean_orb_delta,
            mean_angle: r.mean_angle,
        })
    }
}

/// Total order used before sweeping; makes clustering independent of input order.
fn event_order(a: &HarmonicEvent, b: &HarmonicEvent) -> Ordering {
    a.instant
        .cmp(&b.instant)
        .then(a.pair.cmp(&b.pair))
        .then(a.harmonic_n.cmp(&b.harmonic_n))
        .then(a.target_angle.total_cmp(&b.target_angle))
        .then(a.exact_angle.total_cmp(&b.exact_angle))
}

pub struct ClusterEngine {
    config: ClusterConfig,
}

/// Running state of the cluster being grown.
struct Open {
    members: Vec<HarmonicEvent>,
    seen: HashSet<(BodyPair, u32, i64)>,
    latest: DateTime<Utc>,
    seed_target: f64,
    angle_sum: f64,
}

impl Open {
    fn seed(event: HarmonicEvent) -> Self {
        let mut seen = HashSet::new();
        seen.insert((event.pair, event.harmonic_n, event.instant.timestamp()));
        Self {
            latest: event.instant,
            seed_target: event.target_angle,
            angle_sum: event.exact_angle,
            members: vec![event],
            seen,
        }
    }

    fn mean_angle(&self) -> f64 {
        self.angle_sum / self.members.len() as f64
    }

    fn push(&mut self, event: HarmonicEvent) {
        self.seen.insert((event.pair, event.harmonic_n, event.instant.timestamp()));
        self.latest = self.latest.max(event.instant);
        self.angle_sum += event.exact_angle;
        self.members.push(event);
    }
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Group events into clusters, ordered by start instant, ids from 1.
    pub fn cluster(&self, events: &[HarmonicEvent]) -> Vec<Cluster> {
        let mut sorted = events.to_vec();
        sorted.sort_by(event_order);

        let mut assigned = vec![false; sorted.len()];
        let mut clusters = Vec::new();

        for i in 0..sorted.len() {
            if assigned[i] {
                continue;
            }
            assigned[i] = true;
            let mut open = Open::seed(sorted[i]);

            for j in (i + 1)..sorted.len() {
                if assigned[j] {
                    continue;
                }
                let candidate = &sorted[j];
                // sorted input: nothing later can be closer
                if candidate.instant - open.latest > self.config.time_tolerance {
                    break;
                }
                if self.qualifies(&open, candidate) {
                    assigned[j] = true;
                    open.push(*candidate);
                }
            }

            let id = clusters.len() as u32 + 1;
            if let Some(cluster) = Cluster::from_members(id, open.members, self.config.step) {
                clusters.push(cluster);
            }
        }

        tracing::debug!(events = sorted.len(), clusters = clusters.len(), "clustering complete");
        clusters
    }

    fn qualifies(&self, open: &Open, candidate: &HarmonicEvent) -> bool {
        if open
            .seen
            .contains(&(candidate.pair, candidate.harmonic_n, candidate.instant.timestamp()))
        {
            return false;
        }
        match self.config.angle_tolerance {
            None => true,
            Some(tol) => {
                (candidate.target_angle - open.seed_target).abs() < EPSILON
                    || (candidate.exact_angle - open.mean_angle()).abs() <= tol
            }
        }
    }
}
