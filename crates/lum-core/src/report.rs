//! JSON export of analysis reports, the flat timing table, its join with
//! price levels, and CSV rendering of both tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::body::BodyPair;
use crate::levels::{LevelSide, PriceLevel};
use crate::pipeline::AnalysisReport;

pub const CURRENT_VERSION: &str = "1";

#[derive(Serialize, Deserialize, Debug)]
pub struct ReportEnvelope {
    pub version: String,
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    pub report: AnalysisReport,
}

/// Deserialize an exported envelope back into its report.
pub fn import_json(json: &str) -> Result<AnalysisReport, serde_json::Error> {
    let envelope: ReportEnvelope = serde_json::from_str(json)?;
    Ok(envelope.report)
}

/// Serialize a report inside a versioned, timestamped envelope.
pub fn export_json(report: &AnalysisReport) -> Result<String, serde_json::Error> {
    let envelope = ReportEnvelope {
        version: CURRENT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        report: report.clone(),
    };
    serde_json::to_string_pretty(&envelope)
}

/// One harmonic event, flattened for tabular download.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingRow {
    pub instant: DateTime<Utc>,
    pub pair: BodyPair,
    pub harmonic_n: u32,
    pub target_angle: f64,
    pub exact_angle: f64,
    pub miss_arcmin: f64,
    pub cluster_id: Option<u32>,
}

/// Every event of the report in instant order, tagged with its cluster.
pub fn timing_rows(report: &AnalysisReport) -> Vec<TimingRow> {
    let mut owner: HashMap<(BodyPair, u32, i64, u64), u32> = HashMap::new();
    for scored in &report.clusters {
        for e in scored.cluster.members() {
            owner.insert(
                (e.pair, e.harmonic_n, e.instant.timestamp(), e.target_angle.to_bits()),
                scored.cluster.id,
            );
        }
    }

    let mut rows: Vec<TimingRow> = report
        .events
        .iter()
        .map(|e| TimingRow {
            instant: e.instant,
            pair: e.pair,
            harmonic_n: e.harmonic_n,
            target_angle: e.target_angle,
            exact_angle: e.exact_angle,
            miss_arcmin: e.orb_delta * 60.0,
            cluster_id: owner
                .get(&(e.pair, e.harmonic_n, e.instant.timestamp(), e.target_angle.to_bits()))
                .copied(),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.instant
            .cmp(&b.instant)
            .then(a.pair.cmp(&b.pair))
            .then(a.harmonic_n.cmp(&b.harmonic_n))
            .then(a.target_angle.total_cmp(&b.target_angle))
    });
    rows
}

/// A timing row paired with one price level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub instant: DateTime<Utc>,
    pub pair: BodyPair,
    pub harmonic_n: u32,
    pub target_angle: f64,
    pub exact_angle: f64,
    pub miss_arcmin: f64,
    pub cluster_id: Option<u32>,
    pub label: String,
    pub side: LevelSide,
    pub level: f64,
    pub anchor_price: f64,
    /// `(level / anchor_price - 1) · 100`
    pub distance_pct: f64,
}

/// Cross join of timing rows with price levels, ordered by instant then level.
///
/// Either side empty gives an empty table.
pub fn join_time_price(rows: &[TimingRow], levels: &[PriceLevel], anchor_price: f64) -> Vec<JoinedRow> {
    let mut joined: Vec<JoinedRow> = rows
        .iter()
        .flat_map(|row| {
            levels.iter().map(move |level| JoinedRow {
                instant: row.instant,
                pair: row.pair,
                harmonic_n: row.harmonic_n,
                target_angle: row.target_angle,
                exact_angle: row.exact_angle,
                miss_arcmin: row.miss_arcmin,
                cluster_id: row.cluster_id,
                label: level.label.clone(),
                side: level.side,
                level: level.level,
                anchor_price,
                distance_pct: (level.level / anchor_price - 1.0) * 100.0,
            })
        })
        .collect();
    joined.sort_by(|a, b| a.instant.cmp(&b.instant).then(a.level.total_cmp(&b.level)));
    joined
}

/// Render rows as CSV with a header line taken from the field names.
pub fn write_csv<T: Serialize>(rows: &[T]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

pub fn timing_csv(rows: &[TimingRow]) -> Result<String, csv::Error> {
    write_csv(rows)
}

pub fn joined_csv(rows: &[JoinedRow]) -> Result<String, csv::Error> {
    write_csv(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeris::MeanElementsProvider;
    use crate::levels::percent_grid;
    use crate::pipeline::{AnalysisRequest, analyze};
    use crate::projector::AnchorDate;
    use crate::time::{DateRange, parse_instant};
    use approx::assert_abs_diff_eq;
    use tokio_util::sync::CancellationToken;

    fn report() -> AnalysisReport {
        let anchor = AnchorDate::new(parse_instant("2024-01-01").unwrap(), "ETHUSD");
        let mut req = AnalysisRequest::new(
            anchor.clone(),
            DateRange::around(anchor.instant, 0, 45).unwrap(),
            vec!["sun-moon".parse().unwrap()],
        );
        req.harmonics = "4".parse().unwrap();
        analyze(&req, &MeanElementsProvider::new(), &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_export_import() {
        let original = report();
        let json = export_json(&original).unwrap();
        assert!(json.contains("\"version\": \"1\""));
        assert!(json.contains("generatedAt"));
        let restored = import_json(&json).unwrap();
        assert_eq!(restored.clusters.len(), original.clusters.len());
        assert_eq!(restored.events.len(), original.events.len());
        assert_eq!(restored.status, original.status);
    }

    #[test]
    fn test_import_rejects_garbage() {
        assert!(import_json("{\"version\": \"1\"}").is_err());
    }

    #[test]
    fn test_timing_rows_tagged_with_clusters() {
        let report = report();
        let rows = timing_rows(&report);
        assert_eq!(rows.len(), report.events.len());
        assert!(rows.iter().all(|r| r.cluster_id.is_some()));
        assert!(rows.windows(2).all(|w| w[0].instant <= w[1].instant));
        assert!(rows.iter().all(|r| r.miss_arcmin <= 60.0 + 1e-9));
    }

    #[test]
    fn test_join_every_row_with_every_level() {
        let rows = timing_rows(&report());
        let levels = percent_grid(200.0, &[10.0]).unwrap();
        let joined = join_time_price(&rows, &levels, 200.0);

        assert_eq!(joined.len(), rows.len() * levels.len());
        assert!(joined.windows(2).all(|w| {
            w[0].instant < w[1].instant || (w[0].instant == w[1].instant && w[0].level <= w[1].level)
        }));
        let first = &joined[0];
        assert_eq!(first.label, "-10.00%");
        assert_abs_diff_eq!(first.level, 180.0);
        assert_abs_diff_eq!(first.distance_pct, -10.0, epsilon = 1e-9);
        let at_anchor = joined.iter().find(|r| r.side == LevelSide::Anchor).unwrap();
        assert_eq!(at_anchor.label, "Anchor");
        assert_abs_diff_eq!(at_anchor.distance_pct, 0.0);
    }

    #[test]
    fn test_join_empty_side_is_empty() {
        let rows = timing_rows(&report());
        let levels = percent_grid(50.0, &[25.0]).unwrap();
        assert!(join_time_price(&[], &levels, 50.0).is_empty());
        assert!(join_time_price(&rows, &[], 50.0).is_empty());
    }

    #[test]
    fn test_csv_tables() {
        let rows = timing_rows(&report());
        let csv = timing_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("instant,pair,harmonic_n,target_angle,exact_angle,miss_arcmin,cluster_id")
        );
        assert_eq!(lines.count(), rows.len());

        let joined = join_time_price(&rows[..1], &percent_grid(100.0, &[50.0]).unwrap(), 100.0);
        let csv = joined_csv(&joined).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("label,side,level,anchor_price,distance_pct"));
        assert!(lines[1].contains("Sun-Moon"));
        assert!(lines[1].ends_with("-50.00%,below,50.0,100.0,-50.0"), "{}", lines[1]);
    }
}
