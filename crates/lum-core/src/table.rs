//! Provider over explicit, externally supplied position rows.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::body::{CelestialBody, ReferenceFrame};
use crate::error::ProviderError;
use crate::position::{Position, PositionProvider};

/// In-memory position table, e.g. loaded from an exported ephemeris dump.
///
/// A (body, frame) combination with no rows at all is reported as
/// `UnsupportedFrame`; a known combination missing an instant is an
/// `EphemerisUnavailable` gap.
#[derive(Clone, Debug, Default)]
pub struct TableProvider {
    rows: HashMap<(CelestialBody, ReferenceFrame), BTreeMap<DateTime<Utc>, f64>>,
}

impl TableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let mut table = Self::new();
        for p in positions {
            table.insert(p);
        }
        table
    }

    /// Parse a JSON array of `Position` records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let positions: Vec<Position> = serde_json::from_str(json)?;
        Ok(Self::from_positions(positions))
    }

    pub fn insert(&mut self, position: Position) {
        self.rows
            .entry((position.body, position.frame))
            .or_default()
            .insert(position.instant, position.angle_degrees);
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PositionProvider for TableProvider {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        let series = self
            .rows
            .get(&(body, frame))
            .ok_or(ProviderError::UnsupportedFrame { body, frame })?;
        let angle = series
            .get(&instant)
            .ok_or(ProviderError::EphemerisUnavailable { body, instant })?;
        Ok(Position::new(body, frame, instant, *angle))
    }

    fn name(&self) -> &str {
        "table"
    }
}
