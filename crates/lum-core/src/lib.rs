//! Cycle & harmonic analytics engine.
//!
//! Projects body positions around an anchor date, detects separations that
//! hit harmonic divisions of the circle, clusters those events in time, and
//! scores the clusters. Positions come from any `PositionProvider`; the
//! built-in `MeanElementsProvider` computes them analytically.
//!
//! Zero I/O: pure computation with no opinions about transport or persistence.

pub mod angle;
pub mod body;
pub mod cache;
pub mod cluster;
pub mod constants;
pub mod ephemeris;
pub mod error;
pub mod harmonic;
pub mod levels;
pub mod pipeline;
pub mod position;
pub mod projector;
pub mod report;
pub mod scoring;
pub mod search;
pub mod table;
pub mod time;

pub use angle::{harmonic_targets, normalize_degrees, separation};
pub use body::{BodyPair, CelestialBody, ReferenceFrame};
pub use cache::{CacheStats, CachedProvider, PositionCache};
pub use cluster::{Cluster, ClusterConfig, ClusterEngine};
pub use constants::{DEFAULT_CONCURRENCY, DEFAULT_HARMONICS, DEFAULT_ORB, DEFAULT_TIME_TOLERANCE_STEPS};
pub use ephemeris::MeanElementsProvider;
pub use error::{Diagnostic, EngineError, FailureKind, ProviderError, Result};
pub use harmonic::{DetectorConfig, EventPlacement, HarmonicDetector, HarmonicEvent, HarmonicSet};
pub use levels::{LevelSide, LevelsError, PriceLevel, percent_grid, sqrt_ladder};
pub use pipeline::{AnalysisReport, AnalysisRequest, AnalysisStatus, ClusterOrder, ScoredCluster, analyze};
pub use position::{Position, PositionProvider};
pub use projector::{
    AnchorDate, CycleProjector, PairSeries, Projection, ProjectionSpec, ProjectorConfig, SeparationSample,
    SeparationStream,
};
pub use report::{
    CURRENT_VERSION, JoinedRow, TimingRow, export_json, import_json, join_time_price, joined_csv, timing_csv, timing_rows,
    write_csv,
};
pub use scoring::{ReactionWeights, Score, ScoreFactors, ScoringConfig, ScoringEngine, ScoringWeights};
pub use search::{MatchHit, MatchQuery, next_match_after};
pub use table::TableProvider;
pub use time::{DateRange, SampleGrid, Step, parse_instant};

/// Re-exported so callers can cancel without depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
