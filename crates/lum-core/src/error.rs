use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::body::{CelestialBody, ReferenceFrame};

/// Failure of a single position lookup.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    /// The instant is outside the data source's supported range.
    #[error("ephemeris unavailable for {body} at {instant}")]
    EphemerisUnavailable {
        body: CelestialBody,
        instant: DateTime<Utc>,
    },

    /// The body cannot be computed in this frame.
    #[error("{body} is not computable in the {frame} frame")]
    UnsupportedFrame {
        body: CelestialBody,
        frame: ReferenceFrame,
    },
}

/// Request-level outcome that stops an analysis.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported frame: {body} is not computable in the {frame} frame")]
    UnsupportedFrame {
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    },

    #[error("invalid scoring config: {0}")]
    InvalidScoringConfig(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Kind of a non-fatal failure recorded in a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EphemerisUnavailable,
    EmptyRangeResult,
}

/// A partial-failure record surfaced alongside results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub instant: Option<DateTime<Utc>>,
    pub body: Option<CelestialBody>,
    pub kind: FailureKind,
    pub message: String,
}

impl Diagnostic {
    pub fn ephemeris_gap(body: CelestialBody, instant: DateTime<Utc>) -> Self {
        Self {
            instant: Some(instant),
            body: Some(body),
            kind: FailureKind::EphemerisUnavailable,
            message: format!("ephemeris unavailable for {body} at {}", instant.to_rfc3339()),
        }
    }

    pub fn empty_range(failed_instants: usize) -> Self {
        Self {
            instant: None,
            body: None,
            kind: FailureKind::EmptyRangeResult,
            message: format!(
                "no separation samples could be produced ({failed_instants} instants failed)"
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
