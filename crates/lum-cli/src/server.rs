use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lum_core::levels::{DEFAULT_PERCENTS, DEFAULT_ROOT_STEP, DEFAULT_TURNS};
use lum_core::{
    AnalysisReport, BodyPair, CancellationToken, CelestialBody, DateRange, EngineError, HarmonicSet, MatchQuery,
    Position, PositionProvider, PriceLevel, ProviderError, ReactionWeights, ReferenceFrame, SampleGrid,
    ScoringWeights, Step, analyze, export_json, join_time_price, joined_csv, next_match_after, parse_instant,
    percent_grid, sqrt_ladder, timing_rows,
};
use lum_store::LuminaraConfig;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::request::{Overrides, build_request};

pub const DEFAULT_SEARCH_DAYS: i64 = 200;
pub const DEFAULT_SEARCH_STEP: &str = "1h";
pub const DEFAULT_SEARCH_ORB: f64 = 0.5;

/// Upper bound on rows a single `lum_positions` call may return.
const MAX_POSITION_ROWS: usize = 100_000;

#[derive(Clone)]
pub struct LumServer {
    provider: Arc<dyn PositionProvider>,
    config: LuminaraConfig,
    shutdown: CancellationToken,
    tool_router: ToolRouter<Self>,
}

impl LumServer {
    pub fn new(provider: Arc<dyn PositionProvider>, config: LuminaraConfig) -> Self {
        Self {
            provider,
            config,
            shutdown: CancellationToken::new(),
            tool_router: Self::tool_router(),
        }
    }

    /// Cancels every analysis still running on a blocking worker.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Samples of one body over a grid. Ephemeris gaps are counted and skipped;
/// an unsupported frame fails the whole call.
pub fn sample_positions<P>(
    provider: &P,
    body: CelestialBody,
    frame: ReferenceFrame,
    grid: &SampleGrid,
) -> Result<(Vec<Position>, usize), ProviderError>
where
    P: PositionProvider + ?Sized,
{
    let mut positions = Vec::with_capacity(grid.len());
    let mut unavailable = 0;
    for instant in grid.iter() {
        match provider.get_position(body, frame, instant) {
            Ok(position) => positions.push(position),
            Err(ProviderError::EphemerisUnavailable { .. }) => {
                tracing::debug!(%body, %instant, "position unavailable");
                unavailable += 1;
            }
            Err(e) => {
                provider.flush();
                return Err(e);
            }
        }
    }
    provider.flush();
    Ok((positions, unavailable))
}

fn invalid(e: impl Display) -> McpError {
    McpError::invalid_params(e.to_string(), None)
}

fn internal(e: impl Display) -> McpError {
    McpError::internal_error(e.to_string(), None)
}

fn engine_error(e: EngineError) -> McpError {
    match e {
        EngineError::UnsupportedFrame { .. }
        | EngineError::InvalidScoringConfig(_)
        | EngineError::InvalidRequest(_) => invalid(e),
        EngineError::Cancelled | EngineError::WorkerPool(_) => internal(e),
    }
}

fn parse_opt<T>(raw: Option<&str>, parse: impl Fn(&str) -> Result<T, String>) -> Result<Option<T>, McpError> {
    raw.map(parse).transpose().map_err(invalid)
}

fn json_result(value: &impl serde::Serialize) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(internal)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

// --- Tool parameter types ---

#[derive(Debug, Default, Deserialize, JsonSchema)]
struct AnalyzeParams {
    /// Anchor instant: RFC 3339 or YYYY-MM-DD
    anchor: String,
    /// Asset the anchor belongs to
    asset: Option<String>,
    /// Body pairs such as "sun-moon" or "mars/saturn"
    pairs: Vec<String>,
    /// Range start; defaults to 30 days before the anchor
    from: Option<String>,
    /// Range end; defaults to 90 days after the anchor
    to: Option<String>,
    days_before: Option<i64>,
    days_after: Option<i64>,
    /// Sampling step such as "1d" or "6h"
    step: Option<String>,
    /// Harmonic numbers, e.g. [2, 3, 4, 8]
    harmonics: Option<Vec<u32>>,
    /// Orb in degrees
    orb: Option<f64>,
    /// "geo", "helio" or "ra"
    frame: Option<String>,
    /// Cluster time tolerance in sampling steps
    time_tolerance_steps: Option<u32>,
    /// Maximum angular distance from a cluster's mean angle, in degrees
    angle_tolerance: Option<f64>,
    /// [density, tightness, size] or [density, tightness, size, reaction]
    weights: Option<Vec<f64>>,
    /// Market reaction weight in [0, 1] keyed by date (YYYY-MM-DD)
    reactions: Option<BTreeMap<String, f64>>,
    /// Interpolate event instants between samples
    interpolate: Option<bool>,
    /// Order clusters by start instead of strength
    chronological: Option<bool>,
}

impl AnalyzeParams {
    fn into_overrides(self) -> Result<Overrides, McpError> {
        let pairs = self
            .pairs
            .iter()
            .map(|p| p.parse::<BodyPair>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        let weights = match self.weights.as_deref() {
            None => None,
            Some([d, t, s]) => Some(ScoringWeights::new(*d, *t, *s, 0.0)),
            Some([d, t, s, r]) => Some(ScoringWeights::new(*d, *t, *s, *r)),
            Some(other) => return Err(invalid(format!("expected 3 or 4 weights, got {}", other.len()))),
        };
        Ok(Overrides {
            anchor: Some(parse_instant(&self.anchor).map_err(invalid)?),
            asset: self.asset,
            pairs,
            from: parse_opt(self.from.as_deref(), parse_instant)?,
            to: parse_opt(self.to.as_deref(), parse_instant)?,
            days_before: self.days_before,
            days_after: self.days_after,
            step: parse_opt(self.step.as_deref(), str::parse::<Step>)?,
            harmonics: self.harmonics.map(HarmonicSet::new).transpose().map_err(invalid)?,
            orb: self.orb,
            frame: parse_opt(self.frame.as_deref(), str::parse::<ReferenceFrame>)?,
            time_tolerance_steps: self.time_tolerance_steps,
            angle_tolerance: self.angle_tolerance,
            weights,
            reactions: self.reactions.map(ReactionWeights::try_from).transpose().map_err(invalid)?,
            interpolate: self.interpolate.unwrap_or(false),
            chronological: self.chronological.unwrap_or(false),
            concurrency: None,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NextMatchParams {
    /// Body pair such as "sun-moon"
    pair: String,
    /// Target separation in degrees
    target: f64,
    /// Search starts one step after this instant
    anchor: String,
    /// Search window in days (default 200)
    days: Option<i64>,
    /// Scan step (default "1h")
    step: Option<String>,
    /// Orb in degrees (default 0.5)
    orb: Option<f64>,
    frame: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PositionsParams {
    /// Body name such as "mars" or "node"
    body: String,
    from: String,
    to: String,
    step: Option<String>,
    frame: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LevelsParams {
    /// Anchor price
    price: f64,
    /// "percent" (default) or "sqrt"
    method: Option<String>,
    /// Percent moves for the percent grid
    percents: Option<Vec<f64>>,
    /// Square-root increment for the sqrt ladder
    root_step: Option<f64>,
    /// Rungs on each side for the sqrt ladder
    turns: Option<u32>,
}

impl LevelsParams {
    fn project(&self) -> Result<Vec<PriceLevel>, McpError> {
        match self.method.as_deref().unwrap_or("percent") {
            "percent" => percent_grid(self.price, self.percents.as_deref().unwrap_or(&DEFAULT_PERCENTS)),
            "sqrt" => sqrt_ladder(
                self.price,
                self.root_step.unwrap_or(DEFAULT_ROOT_STEP),
                self.turns.unwrap_or(DEFAULT_TURNS),
            ),
            other => return Err(invalid(format!("unknown method '{other}', expected percent or sqrt"))),
        }
        .map_err(invalid)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct JoinParams {
    /// Analysis whose harmonic events form the time axis
    analysis: AnalyzeParams,
    /// Price levels crossed with every event
    levels: LevelsParams,
    /// Return CSV text instead of JSON rows
    csv: Option<bool>,
}

#[tool_router]
impl LumServer {
    #[tool(
        description = "Run a harmonic timing analysis around an anchor date. Projects each body pair's separation over the range, detects hits on harmonic divisions of the circle, clusters the hits in time and scores every cluster. Returns the full report as JSON."
    )]
    async fn lum_analyze(&self, Parameters(req): Parameters<AnalyzeParams>) -> Result<CallToolResult, McpError> {
        let report = self.run_analysis(req).await?;
        let json = export_json(&report).map_err(internal)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        description = "Find the next instant after an anchor at which a body pair's separation reaches a target angle. Returns the refined instant and the miss in arc-minutes, or found=false when the window holds no match."
    )]
    async fn lum_next_match(&self, Parameters(req): Parameters<NextMatchParams>) -> Result<CallToolResult, McpError> {
        let step: Step = req.step.as_deref().unwrap_or(DEFAULT_SEARCH_STEP).parse().map_err(invalid)?;
        let days = req.days.unwrap_or(DEFAULT_SEARCH_DAYS);
        let window = Duration::try_days(days).ok_or_else(|| invalid(format!("days {days} is out of range")))?;
        let query = MatchQuery {
            pair: req.pair.parse().map_err(invalid)?,
            frame: parse_opt(req.frame.as_deref(), str::parse::<ReferenceFrame>)?.unwrap_or(self.config.analysis.frame),
            anchor: parse_instant(&req.anchor).map_err(invalid)?,
            target_angle: req.target,
            window,
            step,
            orb: req.orb.unwrap_or(DEFAULT_SEARCH_ORB),
        };
        let provider = Arc::clone(&self.provider);
        let cancel = self.shutdown.child_token();

        let hit = tokio::task::spawn_blocking(move || next_match_after(&*provider, &query, &cancel))
            .await
            .map_err(internal)?
            .map_err(engine_error)?;

        json_result(&serde_json::json!({
            "found": hit.is_some(),
            "hit": hit,
        }))
    }

    #[tool(description = "List a body's angular positions over a date range at a fixed step.")]
    async fn lum_positions(&self, Parameters(req): Parameters<PositionsParams>) -> Result<CallToolResult, McpError> {
        let body: CelestialBody = req.body.parse().map_err(invalid)?;
        let frame = parse_opt(req.frame.as_deref(), str::parse::<ReferenceFrame>)?.unwrap_or(self.config.analysis.frame);
        let step = parse_opt(req.step.as_deref(), str::parse::<Step>)?.unwrap_or(self.config.analysis.step);
        let range = DateRange::new(parse_instant(&req.from).map_err(invalid)?, parse_instant(&req.to).map_err(invalid)?);
        if !range.is_ordered() {
            return Err(invalid("from must not be after to"));
        }
        let grid = SampleGrid::new(range, step);
        if grid.len() > MAX_POSITION_ROWS {
            return Err(invalid(format!(
                "{} samples requested, at most {MAX_POSITION_ROWS} allowed",
                grid.len()
            )));
        }

        let provider = Arc::clone(&self.provider);
        let (positions, unavailable) =
            tokio::task::spawn_blocking(move || sample_positions(&*provider, body, frame, &grid))
                .await
                .map_err(internal)?
                .map_err(invalid)?;

        let rows: Vec<(DateTime<Utc>, f64)> = positions.iter().map(|p| (p.instant, p.angle_degrees)).collect();
        json_result(&serde_json::json!({
            "body": body,
            "frame": frame,
            "positions": rows,
            "unavailable": unavailable,
        }))
    }

    #[tool(
        description = "Project price levels from an anchor price, either as a symmetric percent grid or as a square-root ladder."
    )]
    async fn lum_levels(&self, Parameters(req): Parameters<LevelsParams>) -> Result<CallToolResult, McpError> {
        json_result(&req.project()?)
    }

    #[tool(
        description = "Run an analysis and cross every harmonic event with a set of price levels. Each row carries the event timing, the level label, side and price, and its distance from the anchor price in percent. Rows are ordered by instant then level."
    )]
    async fn lum_join(&self, Parameters(req): Parameters<JoinParams>) -> Result<CallToolResult, McpError> {
        let levels = req.levels.project()?;
        let price = req.levels.price;
        let report = self.run_analysis(req.analysis).await?;
        let joined = join_time_price(&timing_rows(&report), &levels, price);

        if req.csv.unwrap_or(false) {
            let text = joined_csv(&joined).map_err(internal)?;
            return Ok(CallToolResult::success(vec![Content::text(text)]));
        }
        json_result(&joined)
    }
}

impl LumServer {
    async fn run_analysis(&self, params: AnalyzeParams) -> Result<AnalysisReport, McpError> {
        let request = build_request(&self.config, None, params.into_overrides()?).map_err(invalid)?;
        let provider = Arc::clone(&self.provider);
        let cancel = self.shutdown.child_token();

        tokio::task::spawn_blocking(move || analyze(&request, &*provider, &cancel))
            .await
            .map_err(internal)?
            .map_err(engine_error)
    }
}

#[tool_handler]
impl ServerHandler for LumServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Harmonic timing analytics over planetary cycles.\n\n\
                 TOOLS:\n\
                 1. lum_analyze: anchor date + body pairs -> harmonic events, clusters and scores. \
                    Clusters are ordered strongest first unless chronological=true.\n\
                 2. lum_next_match: the next exact hit of one separation after an anchor.\n\
                 3. lum_positions: raw body positions over a range.\n\
                 4. lum_levels: price projections from an anchor price.\n\
                 5. lum_join: analysis events crossed with price levels, as JSON rows or CSV.\n\n\
                 Dates accept RFC 3339 or YYYY-MM-DD (UTC). Diagnostics in a report mark instants \
                 the ephemeris could not cover; a report with status empty_range produced no samples."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lum_core::MeanElementsProvider;

    fn make_server() -> LumServer {
        LumServer::new(Arc::new(MeanElementsProvider::new()), LuminaraConfig::default())
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> serde_json::Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    fn lunation_params() -> AnalyzeParams {
        AnalyzeParams {
            anchor: "2024-01-01".to_string(),
            asset: Some("BTC".to_string()),
            pairs: vec!["sun-moon".to_string()],
            from: Some("2024-01-01".to_string()),
            to: Some("2024-03-30".to_string()),
            harmonics: Some(vec![4, 8]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lum_analyze_report_structure() {
        let server = make_server();
        let result = server.lum_analyze(Parameters(lunation_params())).await.unwrap();
        let json = parse_result(&result);

        assert_eq!(json["version"], lum_core::CURRENT_VERSION);
        let report = &json["report"];
        assert_eq!(report["anchor"]["asset_id"], "BTC");
        assert_eq!(report["status"], "complete");
        assert_eq!(report["samples"], 90);
        assert!(report["events"].as_array().unwrap().len() >= 18);

        let clusters = report["clusters"].as_array().unwrap();
        assert!(!clusters.is_empty());
        let strengths: Vec<f64> = clusters
            .iter()
            .map(|c| c["score"]["strength"].as_f64().unwrap())
            .collect();
        assert!(strengths.windows(2).all(|w| w[0] >= w[1]), "strongest first");
    }

    #[tokio::test]
    async fn test_lum_analyze_chronological() {
        let server = make_server();
        let params = AnalyzeParams {
            chronological: Some(true),
            ..lunation_params()
        };
        let json = parse_result(&server.lum_analyze(Parameters(params)).await.unwrap());
        let report: lum_core::AnalysisReport = serde_json::from_value(json["report"].clone()).unwrap();
        let starts: Vec<_> = report.clusters.iter().map(|c| c.cluster.start()).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_lum_analyze_rejects_bad_input() {
        let server = make_server();

        let same_body = AnalyzeParams {
            pairs: vec!["sun-sun".to_string()],
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(same_body)).await.is_err());

        let zero_weights = AnalyzeParams {
            weights: Some(vec![0.0, 0.0, 0.0]),
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(zero_weights)).await.is_err());

        let two_weights = AnalyzeParams {
            weights: Some(vec![1.0, 1.0]),
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(two_weights)).await.is_err());

        let helio_sun = AnalyzeParams {
            frame: Some("helio".to_string()),
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(helio_sun)).await.is_err());
    }

    #[tokio::test]
    async fn test_lum_analyze_rejects_unbounded_requests() {
        let server = make_server();

        let duplicate = AnalyzeParams {
            pairs: vec!["sun-moon".to_string(), "moon-sun".to_string()],
            ..lunation_params()
        };
        let err = server.lum_analyze(Parameters(duplicate)).await.unwrap_err();
        assert!(err.message.contains("more than once"), "{}", err.message);

        let far_future = AnalyzeParams {
            from: None,
            to: None,
            days_after: Some(10_000_000_000_000),
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(far_future)).await.is_err());

        let huge_step = AnalyzeParams {
            step: Some("99999999999999d".to_string()),
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(huge_step)).await.is_err());

        let dense_grid = AnalyzeParams {
            from: Some("1800-01-01".to_string()),
            to: Some("2050-01-01".to_string()),
            step: Some("1m".to_string()),
            ..lunation_params()
        };
        assert!(server.lum_analyze(Parameters(dense_grid)).await.is_err());
    }

    #[tokio::test]
    async fn test_lum_analyze_empty_range_is_structured() {
        let server = make_server();
        let params = AnalyzeParams {
            anchor: "1700-01-01".to_string(),
            from: Some("1700-01-01".to_string()),
            to: Some("1700-01-10".to_string()),
            ..lunation_params()
        };
        let json = parse_result(&server.lum_analyze(Parameters(params)).await.unwrap());
        assert_eq!(json["report"]["status"], "empty_range");
        assert!(json["report"]["clusters"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lum_next_match_full_moon() {
        let server = make_server();
        let result = server
            .lum_next_match(Parameters(NextMatchParams {
                pair: "sun-moon".to_string(),
                target: 180.0,
                anchor: "2024-01-20".to_string(),
                days: Some(10),
                step: None,
                orb: None,
                frame: None,
            }))
            .await
            .unwrap();
        let json = parse_result(&result);
        assert_eq!(json["found"], true);

        let hit: lum_core::MatchHit = serde_json::from_value(json["hit"].clone()).unwrap();
        let expected = parse_instant("2024-01-25T17:54:00Z").unwrap();
        assert!((hit.instant - expected).num_hours().abs() <= 6, "got {}", hit.instant);
    }

    #[tokio::test]
    async fn test_lum_next_match_not_found() {
        let server = make_server();
        let json = parse_result(
            &server
                .lum_next_match(Parameters(NextMatchParams {
                    pair: "sun-moon".to_string(),
                    target: 180.0,
                    anchor: "2024-01-27".to_string(),
                    days: Some(5),
                    step: None,
                    orb: None,
                    frame: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["found"], false);
        assert!(json["hit"].is_null());
    }

    #[tokio::test]
    async fn test_lum_next_match_window_out_of_range() {
        let server = make_server();
        let err = server
            .lum_next_match(Parameters(NextMatchParams {
                pair: "sun-moon".to_string(),
                target: 180.0,
                anchor: "2024-01-20".to_string(),
                days: Some(10_000_000_000_000),
                step: None,
                orb: None,
                frame: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_lum_positions() {
        let server = make_server();
        let json = parse_result(
            &server
                .lum_positions(Parameters(PositionsParams {
                    body: "mars".to_string(),
                    from: "2024-01-01".to_string(),
                    to: "2024-01-10".to_string(),
                    step: None,
                    frame: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["body"], "mars");
        assert_eq!(json["positions"].as_array().unwrap().len(), 10);
        assert_eq!(json["unavailable"], 0);
    }

    #[tokio::test]
    async fn test_lum_positions_unsupported_frame() {
        let server = make_server();
        let result = server
            .lum_positions(Parameters(PositionsParams {
                body: "moon".to_string(),
                from: "2024-01-01".to_string(),
                to: "2024-01-10".to_string(),
                step: None,
                frame: Some("helio".to_string()),
            }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lum_levels() {
        let server = make_server();
        let json = parse_result(
            &server
                .lum_levels(Parameters(LevelsParams {
                    price: 100.0,
                    method: Some("sqrt".to_string()),
                    percents: None,
                    root_step: Some(1.0),
                    turns: Some(2),
                }))
                .await
                .unwrap(),
        );
        let levels: Vec<f64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["level"].as_f64().unwrap())
            .collect();
        assert_eq!(levels, vec![64.0, 81.0, 100.0, 121.0, 144.0]);

        let bad = server
            .lum_levels(Parameters(LevelsParams {
                price: -1.0,
                method: None,
                percents: None,
                root_step: None,
                turns: None,
            }))
            .await;
        assert!(bad.is_err());
    }

    fn join_params(csv: bool) -> JoinParams {
        JoinParams {
            analysis: AnalyzeParams {
                to: Some("2024-01-31".to_string()),
                harmonics: Some(vec![4]),
                ..lunation_params()
            },
            levels: LevelsParams {
                price: 100.0,
                method: None,
                percents: Some(vec![10.0]),
                root_step: None,
                turns: None,
            },
            csv: Some(csv),
        }
    }

    #[tokio::test]
    async fn test_lum_join_rows() {
        let server = make_server();
        let json = parse_result(&server.lum_join(Parameters(join_params(false))).await.unwrap());
        let rows = json.as_array().unwrap();
        assert!(!rows.is_empty());
        assert_eq!(rows.len() % 3, 0);
        assert_eq!(rows[0]["label"], "-10.00%");
        assert_eq!(rows[0]["anchor_price"], 100.0);
        assert!((rows[0]["distance_pct"].as_f64().unwrap() + 10.0).abs() < 1e-9);
        assert_eq!(rows[0]["pair"], "Sun-Moon");
    }

    #[tokio::test]
    async fn test_lum_join_csv() {
        let server = make_server();
        let text = text_from_result(&server.lum_join(Parameters(join_params(true))).await.unwrap());
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("instant,pair,harmonic_n"));
        assert!(header.ends_with("distance_pct"));
        assert_eq!((text.lines().count() - 1) % 3, 0);
    }

    #[test]
    fn test_tool_registration() {
        let server = make_server();
        let info = server.get_info();

        assert!(info.instructions.is_some());
        assert!(info.capabilities.tools.is_some());
    }
}
