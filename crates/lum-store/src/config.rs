//! `luminara.toml` configuration and data-directory resolution.
//!
//! Every field has a default, so a missing file or an empty one is valid.
//!
//! ```toml
//! [analysis]
//! step = "1d"
//! orb = 1.0
//! harmonics = [2, 3, 4, 6, 8, 12]
//! time_tolerance_steps = 3
//! placement = "nearest_sample"
//! frame = "geocentric"
//!
//! [scoring]
//! density = 0.3
//! tightness = 0.3
//! size = 0.2
//! reaction = 0.2
//! singleton_penalty = 0.25
//!
//! [cache]
//! enabled = true
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lum_core::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_ORB, DEFAULT_SINGLETON_PENALTY, DEFAULT_TIME_TOLERANCE_STEPS,
};
use lum_core::{EventPlacement, HarmonicSet, ReferenceFrame, ScoringConfig, ScoringWeights, Step};

use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "luminara.toml";
pub const CACHE_FILE: &str = "positions.db";

/// `LUM_DATA_DIR`, else `~/.luminara`.
pub fn default_base_dir() -> PathBuf {
    if let Some(dir) = env::var_os("LUM_DATA_DIR").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs_home().join(".luminara")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub step: Step,
    pub orb: f64,
    pub harmonics: HarmonicSet,
    pub time_tolerance_steps: u32,
    pub angle_tolerance: Option<f64>,
    pub placement: EventPlacement,
    pub concurrency: usize,
    pub frame: ReferenceFrame,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            step: Step::default(),
            orb: DEFAULT_ORB,
            harmonics: HarmonicSet::default(),
            time_tolerance_steps: DEFAULT_TIME_TOLERANCE_STEPS,
            angle_tolerance: None,
            placement: EventPlacement::default(),
            concurrency: DEFAULT_CONCURRENCY,
            frame: ReferenceFrame::default(),
        }
    }
}

/// Weights left unset fall back to equal weighting chosen per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub density: Option<f64>,
    pub tightness: Option<f64>,
    pub size: Option<f64>,
    pub reaction: Option<f64>,
    pub singleton_penalty: f64,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            density: None,
            tightness: None,
            size: None,
            reaction: None,
            singleton_penalty: DEFAULT_SINGLETON_PENALTY,
        }
    }
}

impl ScoringSection {
    /// Explicit weights only when at least one is set; the rest become 0.
    pub fn to_scoring_config(&self) -> ScoringConfig {
        let any = [self.density, self.tightness, self.size, self.reaction]
            .iter()
            .any(Option::is_some);
        ScoringConfig {
            weights: any.then(|| {
                ScoringWeights::new(
                    self.density.unwrap_or(0.0),
                    self.tightness.unwrap_or(0.0),
                    self.size.unwrap_or(0.0),
                    self.reaction.unwrap_or(0.0),
                )
            }),
            singleton_penalty: self.singleton_penalty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    /// Overrides `<data dir>/positions.db`.
    pub path: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuminaraConfig {
    pub analysis: AnalysisSection,
    pub scoring: ScoringSection,
    pub cache: CacheSection,
}

impl LuminaraConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_toml(&text)
                    .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// `luminara.toml` inside `base_dir` (or the default data dir).
    pub fn load_default(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        Self::load(&base.join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if !a.orb.is_finite() || a.orb < 0.0 || a.orb > 180.0 {
            return Err(StoreError::Config(format!("analysis.orb must be within [0, 180], got {}", a.orb)));
        }
        if a.concurrency == 0 {
            return Err(StoreError::Config("analysis.concurrency must be at least 1".to_string()));
        }
        self.scoring
            .to_scoring_config()
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn cache_path(&self, base_dir: &Path) -> PathBuf {
        self.cache.path.clone().unwrap_or_else(|| base_dir.join(CACHE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let config = LuminaraConfig::from_toml("").unwrap();
        assert_eq!(config, LuminaraConfig::default());
        assert_eq!(config.analysis.step, Step::daily());
        assert!(config.cache.enabled);
        assert!(config.scoring.to_scoring_config().weights.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = LuminaraConfig::from_toml(
            r#"
            [analysis]
            step = "6h"
            harmonics = [4, 8]
            placement = "interpolated"
            frame = "helio"

            [scoring]
            density = 2.0
            tightness = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.step, Step::hours(6).unwrap());
        assert_eq!(config.analysis.harmonics.iter().collect::<Vec<_>>(), vec![4, 8]);
        assert_eq!(config.analysis.placement, EventPlacement::Interpolated);
        assert_eq!(config.analysis.frame, ReferenceFrame::Heliocentric);
        assert_eq!(config.analysis.orb, DEFAULT_ORB);

        let weights = config.scoring.to_scoring_config().weights.unwrap();
        assert_eq!(weights.density, 2.0);
        assert_eq!(weights.size, 0.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(LuminaraConfig::from_toml("[analysis]\norb = -1.0").is_err());
        assert!(LuminaraConfig::from_toml("[analysis]\nstep = \"0d\"").is_err());
        assert!(LuminaraConfig::from_toml("[analysis]\nharmonics = [0]").is_err());
        assert!(LuminaraConfig::from_toml("[scoring]\ndensity = 0.0").is_err());
        assert!(LuminaraConfig::from_toml("[scoring]\nsingleton_penalty = 2.0").is_err());
        assert!(LuminaraConfig::from_toml("not toml =").is_err());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = LuminaraConfig::load_default(Some(dir.path())).unwrap();
        assert_eq!(config, LuminaraConfig::default());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[cache]\nenabled = false\n").unwrap();
        let config = LuminaraConfig::load_default(Some(dir.path())).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache_path(dir.path()), dir.path().join(CACHE_FILE));
    }
}
