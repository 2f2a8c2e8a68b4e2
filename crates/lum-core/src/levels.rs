//! Price levels projected from an anchor price.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PERCENTS: [f64; 10] = [12.5, 25.0, 33.33, 37.5, 50.0, 62.5, 66.67, 75.0, 87.5, 100.0];
pub const DEFAULT_ROOT_STEP: f64 = 0.125;
pub const DEFAULT_TURNS: u32 = 5;

#[derive(Debug, Error, PartialEq)]
pub enum LevelsError {
    #[error("anchor price must be a positive number, got {0}")]
    InvalidPrice(f64),

    #[error("invalid percent {0}")]
    InvalidPercent(f64),

    #[error("root step must be a positive number, got {0}")]
    InvalidRootStep(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSide {
    Above,
    Below,
    Anchor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub label: String,
    pub level: f64,
    pub side: LevelSide,
    /// Signed distance from the anchor price, in percent.
    pub delta_pct: f64,
}

impl PriceLevel {
    fn new(label: String, level: f64, anchor: f64, side: LevelSide) -> Self {
        Self {
            label,
            level,
            side,
            delta_pct: (level - anchor) / anchor * 100.0,
        }
    }

    fn anchor(price: f64) -> Self {
        Self::new("Anchor".to_string(), price, price, LevelSide::Anchor)
    }
}

fn check_price(price: f64) -> Result<(), LevelsError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(LevelsError::InvalidPrice(price));
    }
    Ok(())
}

fn sort_levels(levels: &mut [PriceLevel]) {
    levels.sort_by(|a, b| a.level.total_cmp(&b.level));
}

/// Symmetric ±p% levels around `price`, plus the anchor.
///
/// A 100% (or larger) move down would reach zero or below and is omitted.
pub fn percent_grid(price: f64, percents: &[f64]) -> Result<Vec<PriceLevel>, LevelsError> {
    check_price(price)?;
    let mut levels = vec![PriceLevel::anchor(price)];
    for &p in percents {
        if !p.is_finite() || p <= 0.0 {
            return Err(LevelsError::InvalidPercent(p));
        }
        let offset = price * p / 100.0;
        levels.push(PriceLevel::new(format!("+{p:.2}%"), price + offset, price, LevelSide::Above));
        if p < 100.0 {
            levels.push(PriceLevel::new(format!("-{p:.2}%"), price - offset, price, LevelSide::Below));
        }
    }
    sort_levels(&mut levels);
    Ok(levels)
}

/// Square-root ladder: `(√price ± k·root_step)²` for k = 1..=turns.
///
/// Rungs are labelled `+k·√step` / `-k·√step`. Rungs whose root would fall
/// to zero or below are dropped.
pub fn sqrt_ladder(price: f64, root_step: f64, turns: u32) -> Result<Vec<PriceLevel>, LevelsError> {
    check_price(price)?;
    if !root_step.is_finite() || root_step <= 0.0 {
        return Err(LevelsError::InvalidRootStep(root_step));
    }
    let root = price.sqrt();
    let mut levels = vec![PriceLevel::anchor(price)];
    for k in 1..=turns {
        let delta = k as f64 * root_step;
        let up = root + delta;
        levels.push(PriceLevel::new(format!("+{k}·√step"), up * up, price, LevelSide::Above));
        let down = root - delta;
        if down > 0.0 {
            levels.push(PriceLevel::new(format!("-{k}·√step"), down * down, price, LevelSide::Below));
        }
    }
    sort_levels(&mut levels);
    Ok(levels)
}
