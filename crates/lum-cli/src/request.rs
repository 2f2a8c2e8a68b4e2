//! Builds an `AnalysisRequest` from config defaults, an optional request
//! file, and per-call overrides (in rising precedence).

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use lum_core::{
    AnalysisRequest, AnchorDate, BodyPair, ClusterOrder, DateRange, EventPlacement, HarmonicSet,
    ReactionWeights, ReferenceFrame, ScoringWeights, Step,
};
use lum_store::LuminaraConfig;

pub const DEFAULT_DAYS_BEFORE: i64 = 30;
pub const DEFAULT_DAYS_AFTER: i64 = 90;
pub const DEFAULT_ASSET: &str = "unspecified";

/// Values given explicitly for one call. `None` leaves the lower layer alone.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub anchor: Option<DateTime<Utc>>,
    pub asset: Option<String>,
    pub pairs: Vec<BodyPair>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub days_before: Option<i64>,
    pub days_after: Option<i64>,
    pub step: Option<Step>,
    pub harmonics: Option<HarmonicSet>,
    pub orb: Option<f64>,
    pub frame: Option<ReferenceFrame>,
    pub time_tolerance_steps: Option<u32>,
    pub angle_tolerance: Option<f64>,
    pub weights: Option<ScoringWeights>,
    pub reactions: Option<ReactionWeights>,
    pub interpolate: bool,
    pub chronological: bool,
    pub concurrency: Option<usize>,
}

impl Overrides {
    fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some() || self.days_before.is_some() || self.days_after.is_some()
    }
}

fn around(anchor: DateTime<Utc>, before: i64, after: i64) -> Result<DateRange> {
    match DateRange::around(anchor, before, after) {
        Some(range) => Ok(range),
        None => bail!("{before} days before / {after} days after {anchor} leaves the supported calendar"),
    }
}

/// A request seeded from `config`, used when no request file is given.
fn from_config(config: &LuminaraConfig, anchor: DateTime<Utc>, pairs: Vec<BodyPair>) -> Result<AnalysisRequest> {
    let a = &config.analysis;
    let mut request = AnalysisRequest::new(
        AnchorDate::new(anchor, DEFAULT_ASSET),
        around(anchor, DEFAULT_DAYS_BEFORE, DEFAULT_DAYS_AFTER)?,
        pairs,
    );
    request.frame = a.frame;
    request.step = a.step;
    request.harmonics = a.harmonics.clone();
    request.orb = a.orb;
    request.placement = a.placement;
    request.time_tolerance_steps = a.time_tolerance_steps;
    request.angle_tolerance = a.angle_tolerance;
    request.concurrency = a.concurrency;
    request.scoring = config.scoring.to_scoring_config();
    Ok(request)
}

pub fn build_request(
    config: &LuminaraConfig,
    base: Option<AnalysisRequest>,
    overrides: Overrides,
) -> Result<AnalysisRequest> {
    let mut request = match base {
        Some(mut request) => {
            if let Some(anchor) = overrides.anchor {
                request.anchor.instant = anchor;
            }
            if !overrides.pairs.is_empty() {
                request.body_pairs = overrides.pairs.clone();
            }
            request
        }
        None => {
            let Some(anchor) = overrides.anchor else {
                bail!("an anchor date is required");
            };
            if overrides.pairs.is_empty() {
                bail!("at least one body pair is required");
            }
            from_config(config, anchor, overrides.pairs.clone())?
        }
    };

    if let Some(asset) = overrides.asset.as_ref() {
        request.anchor.asset_id = asset.clone();
    }
    if overrides.has_range() {
        let anchor = request.anchor.instant;
        let days = around(
            anchor,
            overrides.days_before.unwrap_or(DEFAULT_DAYS_BEFORE),
            overrides.days_after.unwrap_or(DEFAULT_DAYS_AFTER),
        )?;
        request.range = DateRange::new(overrides.from.unwrap_or(days.start), overrides.to.unwrap_or(days.end));
    }
    if let Some(step) = overrides.step {
        request.step = step;
    }
    if let Some(harmonics) = overrides.harmonics {
        request.harmonics = harmonics;
    }
    if let Some(orb) = overrides.orb {
        request.orb = orb;
    }
    if let Some(frame) = overrides.frame {
        request.frame = frame;
    }
    if let Some(steps) = overrides.time_tolerance_steps {
        request.time_tolerance_steps = steps;
    }
    if overrides.angle_tolerance.is_some() {
        request.angle_tolerance = overrides.angle_tolerance;
    }
    if let Some(weights) = overrides.weights {
        request.scoring.weights = Some(weights);
    }
    if overrides.reactions.is_some() {
        request.reaction_weights = overrides.reactions;
    }
    if overrides.interpolate {
        request.placement = EventPlacement::Interpolated;
    }
    if overrides.chronological {
        request.order = ClusterOrder::Chronological;
    }
    if let Some(concurrency) = overrides.concurrency {
        request.concurrency = concurrency;
    }
    Ok(request)
}

/// `d,t,s[,r]` into weights; a missing reaction weight is 0.
pub fn parse_weights(raw: &str) -> Result<ScoringWeights, String> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("invalid weight '{v}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [d, t, s] => Ok(ScoringWeights::new(*d, *t, *s, 0.0)),
        [d, t, s, r] => Ok(ScoringWeights::new(*d, *t, *s, *r)),
        _ => Err(format!("expected 3 or 4 comma-separated weights, got {}", values.len())),
    }
}

pub fn load_request(path: &Path) -> Result<AnalysisRequest> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid analysis request in {}", path.display()))
}

/// JSON object of `date → weight`.
pub fn load_reactions(path: &Path) -> Result<ReactionWeights> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid reaction weights in {}", path.display()))
}
