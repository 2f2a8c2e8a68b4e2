/// Degrees in a full circle.
pub const FULL_CIRCLE: f64 = 360.0;

/// Upper bound of the separation comparison space.
pub const HALF_CIRCLE: f64 = 180.0;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-9;

/// Julian day of the J2000.0 epoch (2000-01-01T12:00:00 TT).
pub const J2000_JD: f64 = 2_451_545.0;

/// Julian day of the Unix epoch.
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Days per Julian century.
pub const DAYS_PER_CENTURY: f64 = 36_525.0;

/// General precession in longitude, degrees per Julian century.
pub const PRECESSION_PER_CENTURY: f64 = 1.396_971_3;

/// Default orb (degrees) within which a separation counts as "at" a target.
pub const DEFAULT_ORB: f64 = 1.0;

/// Classic minor/major harmonic range, 2..=12.
pub const DEFAULT_HARMONICS: [u32; 11] = [2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

/// Default cluster time proximity, in sampling steps.
pub const DEFAULT_TIME_TOLERANCE_STEPS: u32 = 3;

/// Default bound on concurrent position fetches.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default strength multiplier removed from single-member clusters.
pub const DEFAULT_SINGLETON_PENALTY: f64 = 0.25;

/// Bracketing iterations used when refining an exact match instant.
pub const REFINE_ITERATIONS: usize = 18;

/// Longest accepted sampling step, in seconds (one century).
pub const MAX_STEP_SECONDS: i64 = 36_525 * 86_400;

/// Upper bound on separation samples (grid instants × pairs) per request.
pub const MAX_GRID_SAMPLES: usize = 2_000_000;

/// Default number of positions held by an in-memory `PositionCache`.
pub const DEFAULT_CACHE_CAPACITY: usize = 250_000;
