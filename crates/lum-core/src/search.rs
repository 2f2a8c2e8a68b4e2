//! Forward search for the next exact separation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::angle::reduce_to_half_circle;
use crate::body::{BodyPair, ReferenceFrame};
use crate::constants::{MAX_GRID_SAMPLES, REFINE_ITERATIONS};
use crate::error::{EngineError, ProviderError, Result};
use crate::position::PositionProvider;
use crate::projector::SeparationStream;
use crate::time::{DateRange, SampleGrid, Step};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchHit {
    pub pair: BodyPair,
    pub instant: DateTime<Utc>,
    pub target_angle: f64,
    pub separation_degrees: f64,
    /// |separation − target| in arc-minutes.
    pub miss_arcmin: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct MatchQuery {
    pub pair: BodyPair,
    pub frame: ReferenceFrame,
    pub anchor: DateTime<Utc>,
    /// Target separation; folded into [0, 180].
    pub target_angle: f64,
    /// How far past the anchor to look.
    pub window: Duration,
    pub step: Step,
    pub orb: f64,
}

/// First instant after `anchor` at which the pair's separation meets the
/// target within the orb, refined between the neighbouring steps.
///
/// Gaps in the provider are skipped; `None` means no sample in the window
/// came within the orb.
pub fn next_match_after<P>(provider: &P, query: &MatchQuery, cancel: &CancellationToken) -> Result<Option<MatchHit>>
where
    P: PositionProvider + ?Sized,
{
    let hit = scan(provider, query, cancel);
    provider.flush();
    hit
}

fn scan<P>(provider: &P, query: &MatchQuery, cancel: &CancellationToken) -> Result<Option<MatchHit>>
where
    P: PositionProvider + ?Sized,
{
    if !query.orb.is_finite() || query.orb < 0.0 {
        return Err(EngineError::InvalidRequest(format!("orb must be non-negative, got {}", query.orb)));
    }
    if !query.target_angle.is_finite() {
        return Err(EngineError::InvalidRequest(format!(
            "target angle must be a finite number, got {}",
            query.target_angle
        )));
    }
    let target = reduce_to_half_circle(query.target_angle);
    let step = query.step.duration();
    let range = match (query.anchor.checked_add_signed(step), query.anchor.checked_add_signed(query.window)) {
        (Some(start), Some(end)) => DateRange::new(start, end),
        _ => {
            return Err(EngineError::InvalidRequest(format!(
                "search window of {} days from {} leaves the supported calendar",
                query.window.num_days(),
                query.anchor.to_rfc3339()
            )));
        }
    };
    let steps = SampleGrid::new(range, query.step).len();
    if steps > MAX_GRID_SAMPLES {
        return Err(EngineError::InvalidRequest(format!(
            "search window holds {steps} steps of {}, at most {MAX_GRID_SAMPLES} allowed",
            query.step
        )));
    }
    let sampler = SeparationStream::new(provider, query.pair, query.frame, query.anchor, range, query.step);

    let miss_at = |instant: DateTime<Utc>| -> Option<(f64, f64)> {
        sampler
            .sample_at(instant)
            .ok()
            .map(|s| ((s.separation_degrees - target).abs(), s.separation_degrees))
    };

    let walker = SeparationStream::new(provider, query.pair, query.frame, query.anchor, range, query.step);
    for item in walker {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let sample = match item {
            Ok(sample) => sample,
            Err(ProviderError::EphemerisUnavailable { .. }) => continue,
            Err(ProviderError::UnsupportedFrame { body, frame }) => {
                return Err(EngineError::UnsupportedFrame {
                    body,
                    frame,
                    instant: query.anchor,
                });
            }
        };
        if (sample.separation_degrees - target).abs() > query.orb {
            continue;
        }

        // ternary search on |separation − target| over [t − step, t + step]
        let mut lo = sample.instant.checked_sub_signed(step).unwrap_or(sample.instant);
        let mut hi = sample.instant.checked_add_signed(step).unwrap_or(sample.instant);
        for _ in 0..REFINE_ITERATIONS {
            let third = (hi - lo) / 3;
            let m1 = lo + third;
            let m2 = hi - third;
            match (miss_at(m1), miss_at(m2)) {
                (Some((d1, _)), Some((d2, _))) if d1 <= d2 => hi = m2,
                (Some(_), Some(_)) => lo = m1,
                _ => break,
            }
        }
        let sampled_miss = (sample.separation_degrees - target).abs();
        let mid = lo + (hi - lo) / 2;
        let (instant, miss, separation) = match miss_at(mid) {
            Some((miss, separation)) if miss <= sampled_miss => (mid, miss, separation),
            _ => (sample.instant, sampled_miss, sample.separation_degrees),
        };

        tracing::debug!(pair = %query.pair, target, %instant, miss_arcmin = miss * 60.0, "match refined");
        return Ok(Some(MatchHit {
            pair: query.pair,
            instant,
            target_angle: target,
            separation_degrees: separation,
            miss_arcmin: miss * 60.0,
        }));
    }
    Ok(None)
}
