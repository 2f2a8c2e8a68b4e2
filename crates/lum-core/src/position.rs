use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::angle::normalize_degrees;
use crate::body::{CelestialBody, ReferenceFrame};
use crate::error::ProviderError;

/// Angular position of a body in a frame at an instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub body: CelestialBody,
    pub frame: ReferenceFrame,
    pub instant: DateTime<Utc>,
    /// Always in [0, 360).
    pub angle_degrees: f64,
}

impl Position {
    pub fn new(body: CelestialBody, frame: ReferenceFrame, instant: DateTime<Utc>, angle: f64) -> Self {
        Self {
            body,
            frame,
            instant,
            angle_degrees: normalize_degrees(angle),
        }
    }
}

/// The engine's only data-source boundary.
///
/// Implementations must be deterministic for fixed inputs. Any ephemeris
/// backend (file, network, in-process) plugs in here.
pub trait PositionProvider: Send + Sync {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError>;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "provider"
    }

    /// Persist any buffered writes. Called once a projection or search has
    /// finished with the provider.
    fn flush(&self) {}
}

impl<P: PositionProvider + ?Sized> PositionProvider for &P {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        (**self).get_position(body, frame, instant)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn flush(&self) {
        (**self).flush()
    }
}

impl<P: PositionProvider + ?Sized> PositionProvider for Arc<P> {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        (**self).get_position(body, frame, instant)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn flush(&self) {
        (**self).flush()
    }
}

impl<P: PositionProvider + ?Sized> PositionProvider for Box<P> {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        (**self).get_position(body, frame, instant)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn flush(&self) {
        (**self).flush()
    }
}
