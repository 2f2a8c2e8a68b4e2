//! Cluster strength scoring.
//!
//! ```text
//! strength = w_d·norm(density) + w_t·(1 − norm(mean_orb_delta))
//!          + w_s·norm(member_count) + w_r·reaction
//! ```
//!
//! Weights are divided by their sum before use, so any non-negative set with
//! a positive sum keeps strength in [0, 1]. `norm` is min-max over the
//! clusters of one request; a metric every cluster shares normalizes to 1.
//! Singletons are scaled by `1 − singleton_penalty`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::constants::{DEFAULT_SINGLETON_PENALTY, EPSILON};
use crate::error::{EngineError, Result};
use crate::time::parse_instant;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub density: f64,
    pub tightness: f64,
    pub size: f64,
    pub reaction: f64,
}

impl ScoringWeights {
    pub fn new(density: f64, tightness: f64, size: f64, reaction: f64) -> Self {
        Self {
            density,
            tightness,
            size,
            reaction,
        }
    }

    /// Equal weights; the reaction weight is 0 when there is no reaction data.
    pub fn equal(with_reactions: bool) -> Self {
        if with_reactions {
            Self::new(0.25, 0.25, 0.25, 0.25)
        } else {
            let third = 1.0 / 3.0;
            Self::new(third, third, third, 0.0)
        }
    }

    pub fn sum(&self) -> f64 {
        self.density + self.tightness + self.size + self.reaction
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("density", self.density),
            ("tightness", self.tightness),
            ("size", self.size),
            ("reaction", self.reaction),
        ] {
            if !w.is_finite() {
                return Err(EngineError::InvalidScoringConfig(format!("{name} weight is not finite")));
            }
            if w < 0.0 {
                return Err(EngineError::InvalidScoringConfig(format!(
                    "{name} weight must not be negative, got {w}"
                )));
            }
        }
        if self.sum() <= 0.0 {
            return Err(EngineError::InvalidScoringConfig(
                "weights must sum to a positive value".to_string(),
            ));
        }
        Ok(())
    }

    /// Same proportions, summing to 1.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        Self::new(self.density / sum, self.tightness / sum, self.size / sum, self.reaction / sum)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// `None` picks equal weights based on whether reaction data is present.
    pub weights: Option<ScoringWeights>,
    pub singleton_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: None,
            singleton_penalty: DEFAULT_SINGLETON_PENALTY,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(weights) = &self.weights {
            weights.validate()?;
        }
        if !(0.0..=1.0).contains(&self.singleton_penalty) {
            return Err(EngineError::InvalidScoringConfig(format!(
                "singleton penalty must be within [0, 1], got {}",
                self.singleton_penalty
            )));
        }
        Ok(())
    }

    pub fn effective_weights(&self, with_reactions: bool) -> ScoringWeights {
        self.weights.unwrap_or_else(|| ScoringWeights::equal(with_reactions)).normalized()
    }
}

/// Historical reaction weights bucketed by calendar date (UTC).
///
/// Keys accept a bare date or any instant `parse_instant` understands; several
/// instants on one day keep the largest weight.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct ReactionWeights(BTreeMap<NaiveDate, f64>);

impl ReactionWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instant: DateTime<Utc>, weight: f64) {
        let slot = self.0.entry(instant.date_naive()).or_insert(weight);
        *slot = slot.max(weight);
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.0.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest weight on any member day, clamped to [0, 1]; 0 when none.
    pub fn weight_for(&self, cluster: &Cluster) -> f64 {
        cluster
            .members()
            .iter()
            .filter_map(|e| self.get(e.instant.date_naive()))
            .fold(0.0, f64::max)
            .clamp(0.0, 1.0)
    }
}

impl FromIterator<(DateTime<Utc>, f64)> for ReactionWeights {
    fn from_iter<I: IntoIterator<Item = (DateTime<Utc>, f64)>>(iter: I) -> Self {
        let mut weights = Self::new();
        for (instant, w) in iter {
            weights.insert(instant, w);
        }
        weights
    }
}

impl TryFrom<BTreeMap<String, f64>> for ReactionWeights {
    type Error = String;

    fn try_from(raw: BTreeMap<String, f64>) -> std::result::Result<Self, Self::Error> {
        let mut weights = Self::new();
        for (key, w) in raw {
            if !w.is_finite() {
                return Err(format!("reaction weight for {key} is not finite"));
            }
            weights.insert(parse_instant(&key)?, w);
        }
        Ok(weights)
    }
}

impl From<ReactionWeights> for BTreeMap<String, f64> {
    fn from(weights: ReactionWeights) -> Self {
        weights.0.into_iter().map(|(d, w)| (d.to_string(), w)).collect()
    }
}

/// One term of the strength formula.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub raw: f64,
    /// The [0, 1] term entering the formula.
    pub term: f64,
    pub weight: f64,
    pub contribution: f64,
}

impl Factor {
    fn new(raw: f64, term: f64, weight: f64) -> Self {
        Self {
            raw,
            term,
            weight,
            contribution: term * weight,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub density: Factor,
    pub tightness: Factor,
    pub size: Factor,
    pub reaction: Factor,
    /// Multiplier applied after the weighted sum (1.0 unless singleton).
    pub multiplier: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub cluster_id: u32,
    pub strength: f64,
    pub factors: ScoreFactors,
}

/// Min and max of one metric across a request's clusters.
#[derive(Clone, Copy)]
struct Extent {
    min: f64,
    max: f64,
}

impl Extent {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        values.fold(
            Self {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            |e, v| Self {
                min: e.min.min(v),
                max: e.max.max(v),
            },
        )
    }

    fn normalize(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range.abs() < EPSILON {
            1.0
        } else {
            ((value - self.min) / range).clamp(0.0, 1.0)
        }
    }
}

pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    /// Fails with `InvalidScoringConfig` before anything is scored.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// One score per cluster, in input order.
    pub fn score(&self, clusters: &[Cluster], reactions: Option<&ReactionWeights>) -> Vec<Score> {
        let reactions = reactions.filter(|r| !r.is_empty());
        let w = self.config.effective_weights(reactions.is_some());

        let density = Extent::of(clusters.iter().map(|c| c.density));
        let orb = Extent::of(clusters.iter().map(|c| c.mean_orb_delta));
        let size = Extent::of(clusters.iter().map(|c| c.member_count as f64));

        clusters
            .iter()
            .map(|c| {
                let reaction_raw = reactions.map_or(0.0, |r| r.weight_for(c));
                let factors = ScoreFactors {
                    density: Factor::new(c.density, density.normalize(c.density), w.density),
                    tightness: Factor::new(c.mean_orb_delta, 1.0 - orb.normalize(c.mean_orb_delta), w.tightness),
                    size: Factor::new(c.member_count as f64, size.normalize(c.member_count as f64), w.size),
                    reaction: Factor::new(reaction_raw, reaction_raw, w.reaction),
                    multiplier: if c.member_count == 1 {
                        1.0 - self.config.singleton_penalty
                    } else {
                        1.0
                    },
                };
                let sum = factors.density.contribution
                    + factors.tightness.contribution
                    + factors.size.contribution
                    + factors.reaction.contribution;
                Score {
                    cluster_id: c.id,
                    strength: (sum * factors.multiplier).clamp(0.0, 1.0),
                    factors,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonic::HarmonicEvent;
    use crate::time::Step;
    use approx::assert_abs_diff_eq;
    use chrono::Duration;
    use proptest::prelude::*;

    fn cluster(id: u32, days: &[i64], orb: f64) -> Cluster {
        let start = parse_instant("2024-01-01").unwrap();
        let members = days
            .iter()
            .map(|d| HarmonicEvent {
                pair: "sun-moon".parse().unwrap(),
                harmonic_n: 4,
                instant: start + Duration::days(*d),
                target_angle: 90.0,
                exact_angle: 90.0 + orb,
                orb_delta: orb,
                days_from_anchor: *d as f64,
            })
            .collect();
        Cluster::from_members(id, members, Step::daily()).unwrap()
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoringConfig::default()).unwrap()
    }

    #[test]
    fn test_zero_weights_rejected() {
        let config = ScoringConfig {
            weights: Some(ScoringWeights::new(0.0, 0.0, 0.0, 0.0)),
            ..ScoringConfig::default()
        };
        assert!(matches!(ScoringEngine::new(config), Err(EngineError::InvalidScoringConfig(_))));
    }

    #[test]
    fn test_negative_and_nan_weights_rejected() {
        for w in [ScoringWeights::new(-0.1, 0.5, 0.5, 0.1), ScoringWeights::new(f64::NAN, 1.0, 0.0, 0.0)] {
            assert!(w.validate().is_err());
        }
        let config = ScoringConfig {
            weights: None,
            singleton_penalty: 1.5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_weights() {
        let c = ScoringConfig::default();
        assert_abs_diff_eq!(c.effective_weights(false).reaction, 0.0);
        assert_abs_diff_eq!(c.effective_weights(false).density, 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.effective_weights(true).reaction, 0.25);
    }

    #[test]
    fn test_weights_normalized_by_sum() {
        let w = ScoringWeights::new(2.0, 1.0, 1.0, 0.0).normalized();
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.density, 0.5);
    }

    #[test]
    fn test_denser_tighter_cluster_scores_higher() {
        let clusters = vec![cluster(1, &[0, 1, 2], 0.1), cluster(2, &[10, 13], 0.9)];
        let scores = engine().score(&clusters, None);
        assert_eq!(scores.len(), 2);
        assert!(scores[0].strength > scores[1].strength);
        assert_abs_diff_eq!(scores[0].strength, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singleton_penalized() {
        let clusters = vec![cluster(1, &[0], 0.2), cluster(2, &[5], 0.2)];
        let scores = engine().score(&clusters, None);
        // everything equal: density 1, tightness 0, size 1 => 2/3 before penalty
        assert_abs_diff_eq!(scores[0].strength, 2.0 / 3.0 * 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[0].factors.multiplier, 0.75);
    }

    #[test]
    fn test_reaction_term_uses_max_member_day() {
        let clusters = vec![cluster(1, &[0, 1], 0.5), cluster(2, &[20, 21], 0.5)];
        let reactions: ReactionWeights = [
            (parse_instant("2024-01-02T15:30:00Z").unwrap(), 0.8),
            (parse_instant("2024-01-01").unwrap(), 0.3),
            (parse_instant("2024-01-21").unwrap(), 4.0),
        ]
        .into_iter()
        .collect();
        let scores = engine().score(&clusters, Some(&reactions));
        assert_abs_diff_eq!(scores[0].factors.reaction.raw, 0.8);
        assert_abs_diff_eq!(scores[1].factors.reaction.raw, 1.0);
        assert_abs_diff_eq!(scores[0].factors.reaction.weight, 0.25);
    }

    #[test]
    fn test_empty_reactions_treated_as_absent() {
        let clusters = vec![cluster(1, &[0, 1], 0.5)];
        let scores = engine().score(&clusters, Some(&ReactionWeights::new()));
        assert_abs_diff_eq!(scores[0].factors.reaction.weight, 0.0);
    }

    #[test]
    fn test_reaction_weights_from_json() {
        let json = r#"{"2024-01-02": 0.5, "2024-01-02T18:00:00Z": 0.9, "2024-02-01": 0.1}"#;
        let weights: ReactionWeights = serde_json::from_str(json).unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights.get(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()), Some(0.9));
        assert!(serde_json::from_str::<ReactionWeights>(r#"{"soon": 1.0}"#).is_err());
    }

    fn arb_weights() -> impl Strategy<Value = ScoringWeights> {
        (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0)
            .prop_filter("positive sum", |(a, b, c, d)| a + b + c + d > 1e-6)
            .prop_map(|(a, b, c, d)| ScoringWeights::new(a, b, c, d))
    }

    fn arb_clusters() -> impl Strategy<Value = Vec<Cluster>> {
        prop::collection::vec((1usize..6, 0.0f64..2.0), 1..8).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (n, orb))| {
                    let days: Vec<i64> = (0..n as i64).map(|d| i as i64 * 30 + d).collect();
                    cluster(i as u32 + 1, &days, orb)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_strength_bounded(clusters in arb_clusters(), weights in arb_weights(), r in 0.0f64..3.0) {
            let engine = ScoringEngine::new(ScoringConfig { weights: Some(weights), ..ScoringConfig::default() }).unwrap();
            let reactions: ReactionWeights = [(parse_instant("2024-01-01").unwrap(), r)].into_iter().collect();
            for s in engine.score(&clusters, Some(&reactions)) {
                prop_assert!((0.0..=1.0).contains(&s.strength), "strength {}", s.strength);
            }
        }

        #[test]
        fn prop_density_monotone(clusters in arb_clusters(), idx in any::<prop::sample::Index>(), bump in 0.0f64..5.0) {
            let i = idx.index(clusters.len());
            let before = engine().score(&clusters, None)[i].strength;
            let mut raised = clusters.clone();
            raised[i].density += bump;
            let after = engine().score(&raised, None)[i].strength;
            prop_assert!(after + 1e-12 >= before);
        }

        #[test]
        fn prop_orb_monotone(clusters in arb_clusters(), idx in any::<prop::sample::Index>(), bump in 0.0f64..5.0) {
            let i = idx.index(clusters.len());
            let before = engine().score(&clusters, None)[i].strength;
            let mut loosened = clusters.clone();
            loosened[i].mean_orb_delta += bump;
            let after = engine().score(&loosened, None)[i].strength;
            prop_assert!(after <= before + 1e-12);
        }
    }
}
