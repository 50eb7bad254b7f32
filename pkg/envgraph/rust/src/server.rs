// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! HTTP server and handlers for the dashboard charts.
//!
//! GET /image - serve one chart, legend or camera capture.
//! GET|POST /graphs - dashboard view; runs the render cycle when needed.
//! POST /graphs/custom - render charts over an explicit window.
//! GET /sensors/latest - most recent reading per sensor.
//! GET /logs/:category - tail of a merged log.
//! GET /api/health - liveness.

use std::future::Future;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::camera;
use crate::config::{Config, MAX_GRAPH_WIDTH};
use crate::error::Error;
use crate::fingerprint::{self, Fingerprint};
use crate::generate::{ChartOutcome, CustomLayout, Generator};
use crate::logs::{self, LogCategory, LogRecord, Reading};
use crate::request::{
    ChartKind, Preset, RenderRequest, SensorCategory, SensorSelector, TimeWindow, ValidationError,
};

/// Cookie holding the session fingerprint.
pub const SESSION_COOKIE: &str = "id";

const DEFAULT_TAIL_LINES: usize = 30;
const MAX_TAIL_LINES: usize = 1000;

/// Application state shared across handlers.
pub struct AppState {
    pub generator: Generator,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            generator: Generator::new(config),
        }
    }

    fn config(&self) -> &Config {
        self.generator.config()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/image", get(image_handler))
        .route("/graphs", get(graphs_handler).post(graphs_handler))
        .route("/graphs/custom", axum::routing::post(custom_handler))
        .route("/sensors/latest", get(latest_handler))
        .route("/logs/:category", get(logs_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn run_server(
    config: Arc<Config>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(Arc::clone(&config)));
    state.generator.cache().ensure_dir()?;

    let addr = format!("{}:{}", config.listen_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, artifact_dir = %config.artifact_dir.display(), "chart server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("chart server stopped");
    Ok(())
}

// --- Image route ---

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub kind: Option<String>,
    /// Session fingerprint.
    pub id: Option<String>,
    pub sensor: Option<String>,
    pub category: Option<String>,
    pub span: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Turn image-route parameters into a request for a cached chart.
///
/// Legend and camera kinds carry no fingerprint; for them only `kind` is read.
pub fn parse_image_request(
    query: &ImageQuery,
    config: &Config,
) -> Result<RenderRequest, ValidationError> {
    let kind = ChartKind::from_str(required(&query.kind, "kind")?)?;
    if kind.is_legend() || kind.is_camera() {
        return Ok(RenderRequest::legend(kind, Fingerprint::mint()));
    }

    let fingerprint = Fingerprint::parse(required(&query.id, "id")?)?;
    let window = match (&query.start, &query.end) {
        (Some(start), Some(end)) => Some(TimeWindow::parse_explicit(start, end)?),
        (None, None) => None,
        _ => return Err(ValidationError::MissingParameter("start and end")),
    };

    let span = || -> Result<Preset, ValidationError> {
        if window.is_some() {
            return Err(ValidationError::Unsupported {
                kind,
                what: "an explicit window",
            });
        }
        Preset::from_str(required(&query.span, "span")?)
    };

    match kind {
        ChartKind::Combined => Ok(RenderRequest::combined(span()?, fingerprint)),
        ChartKind::CustomCombined => Ok(RenderRequest::custom_combined(
            window.unwrap_or_default(),
            fingerprint,
        )),
        ChartKind::Separate | ChartKind::CustomSeparate => {
            let category = SensorCategory::from_str(required(&query.category, "category")?)?;
            let sensor = SensorSelector::parse(required(&query.sensor, "sensor")?)?;
            let configured = config.sensors(category).len();
            match sensor {
                SensorSelector::Sensor(number)
                    if number == 0 || usize::from(number) > configured =>
                {
                    return Err(ValidationError::SensorOutOfRange {
                        category,
                        number,
                        configured,
                    });
                }
                // Render cycles split `all` into one chart per sensor, so no
                // `all` artifact is ever cached.
                SensorSelector::None | SensorSelector::All => {
                    return Err(ValidationError::InvalidSensor(
                        query.sensor.clone().unwrap_or_default(),
                    ));
                }
                SensorSelector::Sensor(_) => {}
            }
            let mut request = if kind == ChartKind::Separate {
                RenderRequest::separate(category, span()?, 1, fingerprint)
            } else {
                RenderRequest::custom_separate(category, window.unwrap_or_default(), 1, fingerprint)
            };
            request.sensor = sensor;
            Ok(request)
        }
        ChartKind::LegendSmall
        | ChartKind::LegendFull
        | ChartKind::CamStill
        | ChartKind::CamHdr => Ok(RenderRequest::legend(kind, fingerprint)),
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingParameter(name))
}

/// GET /image - image bytes, or an empty body on any failure.
async fn image_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageQuery>,
) -> Response {
    let request = match parse_image_request(&query, state.config()) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejected image request");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if request.kind.is_legend() {
        return match state.generator.render_legend(request.kind).await {
            Ok(artifact) => serve_file(&artifact.path, "image/png").await,
            Err(e) => empty_for(&e),
        };
    }

    if request.kind.is_camera() {
        let Some(dir) = camera::capture_dir(state.config(), request.kind) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        let dir = dir.to_path_buf();
        return match tokio::task::spawn_blocking(move || camera::newest_capture(&dir)).await {
            Ok(Ok(Some(path))) => serve_file(&path, camera::content_type(&path)).await,
            Ok(Ok(None)) => StatusCode::NOT_FOUND.into_response(),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to scan capture directory");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Err(e) => {
                warn!(error = %e, "capture scan task failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

    let Some(key) = request.key() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.generator.cache().lookup(&key) {
        Ok(Some(artifact)) => serve_file(&artifact.path, "image/png").await,
        Ok(None) => {
            debug!(artifact = %key.file_name(), "chart not in cache");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => empty_for(&Error::Io(e)),
    }
}

async fn serve_file(path: &std::path::Path, content_type: &'static str) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        // Evicted between lookup and read.
        Err(e) if e.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read image");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Io(err) if err.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        Error::Render(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn empty_for(e: &Error) -> Response {
    status_for(e).into_response()
}

// --- Render cycle routes ---

#[derive(Debug, Default, Deserialize)]
struct GraphsQuery {
    refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartLink {
    pub kind: &'static str,
    pub url: String,
    /// Render error for this chart, when it was rendered in this cycle and failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphsResponse {
    pub fingerprint: String,
    /// Whether a new fingerprint was minted and the whole set rendered.
    pub regenerated: bool,
    /// Charts rendered while handling this request.
    pub rendered: usize,
    pub charts: Vec<ChartLink>,
    pub legends: Vec<String>,
}

/// Image route URL serving `request`'s artifact.
pub fn image_url(request: &RenderRequest) -> String {
    let mut url = format!("/image?kind={}&id={}", request.kind, request.fingerprint);
    if let Some(category) = request.category {
        url.push_str(&format!("&category={category}"));
    }
    if let Some(span) = request.key().and_then(|k| k.span) {
        url.push_str(&format!("&span={span}"));
    }
    if let SensorSelector::Sensor(n) = request.sensor {
        url.push_str(&format!("&sensor={n}"));
    }
    url
}

/// Session fingerprint from the request cookies. An unusable value counts as absent.
pub fn session_fingerprint(headers: &HeaderMap) -> Option<Fingerprint> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Fingerprint::parse(value.trim()).ok())
}

/// One link per request, carrying the render error of any outcome for it.
fn links(requests: &[RenderRequest], outcomes: &[ChartOutcome]) -> Vec<ChartLink> {
    requests
        .iter()
        .map(|r| ChartLink {
            kind: r.kind.as_str(),
            url: image_url(r),
            error: outcomes
                .iter()
                .find(|o| o.request == *r)
                .and_then(|o| o.result.as_ref().err())
                .map(|e| e.to_string()),
        })
        .collect()
}

fn legend_urls() -> Vec<String> {
    [ChartKind::LegendSmall, ChartKind::LegendFull]
        .iter()
        .map(|k| format!("/image?kind={k}"))
        .collect()
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "yes" | "on"))
}

/// GET|POST /graphs - dashboard view.
async fn graphs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GraphsQuery>,
    headers: HeaderMap,
) -> Response {
    let decision = fingerprint::decide(
        session_fingerprint(&headers),
        is_truthy(query.refresh.as_deref()),
    );
    let generator = &state.generator;

    if let Err(e) = generator.evict().await {
        warn!(error = %e, "artifact eviction failed");
    }

    let requests = generator.expand(&generator.dashboard_requests(&decision.fingerprint));
    let pending = if decision.must_regenerate {
        info!(
            fingerprint = %decision.fingerprint,
            charts = requests.len(),
            "regenerating dashboard"
        );
        requests.clone()
    } else {
        // Charts of a held fingerprint may have been evicted since they were drawn.
        let missing = generator.uncached(&requests);
        if !missing.is_empty() {
            info!(
                fingerprint = %decision.fingerprint,
                charts = missing.len(),
                "re-rendering evicted dashboard charts"
            );
        }
        missing
    };
    let outcomes = if pending.is_empty() {
        Vec::new()
    } else {
        generator.render_all(&pending, None).await
    };

    let body = GraphsResponse {
        fingerprint: decision.fingerprint.to_string(),
        regenerated: decision.must_regenerate,
        rendered: outcomes.len(),
        charts: links(&requests, &outcomes),
        legends: legend_urls(),
    };

    let mut response = Json(body).into_response();
    if decision.minted {
        let cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; SameSite=Lax",
            decision.fingerprint
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct CustomGraphRequest {
    /// Window start, `YYYY-MM-DDTHH:MM`.
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub layout: CustomLayout,
    pub width: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl ToString) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// POST /graphs/custom - render charts over an explicit window.
async fn custom_handler(
    State(state): State<Arc<AppState>>,
    Json(form): Json<CustomGraphRequest>,
) -> Response {
    let window = match TimeWindow::parse_explicit(&form.start, &form.end) {
        Ok(window) => window,
        Err(e) => return bad_request(e),
    };
    if let Some(width) = form.width
        && (width == 0 || width > MAX_GRAPH_WIDTH)
    {
        return bad_request(format!("width must be between 1 and {MAX_GRAPH_WIDTH}"));
    }

    let generator = &state.generator;
    let fingerprint = Fingerprint::mint();
    let requests = generator.custom_requests(form.layout, window, &fingerprint);
    info!(
        fingerprint = %fingerprint,
        window = %window.describe(),
        charts = requests.len(),
        "rendering custom charts"
    );
    let outcomes = generator.render_all(&requests, form.width).await;

    Json(GraphsResponse {
        fingerprint: fingerprint.to_string(),
        regenerated: true,
        rendered: outcomes.len(),
        charts: links(&requests, &outcomes),
        legends: legend_urls(),
    })
    .into_response()
}

// --- Header strip ---

#[derive(Debug, Serialize, PartialEq)]
pub struct LatestReading {
    pub category: &'static str,
    pub sensor: u8,
    pub name: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dew_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2_ppm: Option<f64>,
}

impl LatestReading {
    fn new(category: SensorCategory, name: &str, record: LogRecord) -> Self {
        let mut reading = Self {
            category: category.as_str(),
            sensor: record.sensor_id,
            name: name.to_string(),
            timestamp: record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            temperature: None,
            humidity: None,
            dew_point: None,
            co2_ppm: None,
        };
        match record.reading {
            Reading::Ht {
                temperature,
                humidity,
                dew_point,
            } => {
                reading.temperature = Some(temperature);
                reading.humidity = Some(humidity);
                reading.dew_point = Some(dew_point);
            }
            Reading::Co2 { ppm } => reading.co2_ppm = Some(ppm),
            Reading::Relay { .. } => {}
        }
        reading
    }
}

#[derive(Debug, Serialize)]
struct LatestResponse {
    sensors: Vec<LatestReading>,
}

/// GET /sensors/latest - most recent record for every configured sensor.
async fn latest_handler(State(state): State<Arc<AppState>>) -> Response {
    let generator = state.generator.clone();
    generator.merge_logs().await;

    let result = tokio::task::spawn_blocking(move || -> io::Result<Vec<LatestReading>> {
        let config = generator.config();
        let mut sensors = Vec::new();
        for category in SensorCategory::ALL {
            let log = LogCategory::from(category);
            let path = generator.paths().working(log);
            for (sensor, n) in config.sensors(category).iter().zip(1..=u8::MAX) {
                if let Some(record) = logs::latest(&path, log, n)? {
                    sensors.push(LatestReading::new(category, &sensor.name, record));
                }
            }
        }
        Ok(sensors)
    })
    .await;

    match result {
        Ok(Ok(sensors)) => Json(LatestResponse { sensors }).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to read latest readings");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            warn!(error = %e, "latest readings task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

/// GET /logs/:category - last lines of a merged log.
async fn logs_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let category = match LogCategory::from_str(&category) {
        Ok(category) => category,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let lines = query
        .lines
        .unwrap_or(DEFAULT_TAIL_LINES)
        .min(MAX_TAIL_LINES);

    state.generator.merge_logs().await;
    let path = state.generator.paths().working(category);
    match tokio::task::spawn_blocking(move || logs::tail_lines(&path, lines)).await {
        Ok(Ok(tail)) => {
            let mut body = tail.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
        }
        Ok(Err(e)) => {
            warn!(%category, error = %e, "failed to tail log");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            warn!(%category, error = %e, "log tail task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/health
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;

    fn config() -> Config {
        Config {
            ht_sensors: vec![
                SensorConfig {
                    name: "Tent".to_string(),
                    graph: true,
                },
                SensorConfig {
                    name: "Room".to_string(),
                    graph: true,
                },
            ],
            ..Config::default()
        }
    }

    fn query(pairs: &[(&str, &str)]) -> ImageQuery {
        let mut q = ImageQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "kind" => q.kind = v,
                "id" => q.id = v,
                "sensor" => q.sensor = v,
                "category" => q.category = v,
                "span" => q.span = v,
                "start" => q.start = v,
                "end" => q.end = v,
                other => panic!("unknown key {other}"),
            }
        }
        q
    }

    #[test]
    fn test_parse_separate() {
        let q = query(&[
            ("kind", "separate"),
            ("id", "abc"),
            ("category", "ht"),
            ("span", "1w"),
            ("sensor", "2"),
        ]);
        let request = parse_image_request(&q, &config()).unwrap();
        assert_eq!(
            request.key().unwrap().file_name(),
            "graph-htseparate1w-abc-2.png"
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_sensor() {
        let q = query(&[
            ("kind", "separate"),
            ("id", "abc"),
            ("category", "ht"),
            ("span", "1d"),
            ("sensor", "3"),
        ]);
        assert_eq!(
            parse_image_request(&q, &config()).unwrap_err(),
            ValidationError::SensorOutOfRange {
                category: SensorCategory::Ht,
                number: 3,
                configured: 2,
            }
        );
    }

    #[test]
    fn test_parse_rejects_all_sensors_selector() {
        for kind in ["separate", "custom-separate"] {
            let q = query(&[
                ("kind", kind),
                ("id", "abc"),
                ("category", "ht"),
                ("span", "1d"),
                ("start", "2026-03-14T10:00"),
                ("end", "2026-03-14T12:00"),
                ("sensor", "all"),
            ]);
            assert_eq!(
                parse_image_request(&q, &config()).unwrap_err(),
                ValidationError::InvalidSensor("all".to_string()),
                "{kind}"
            );
        }
    }

    #[test]
    fn test_parse_requires_fingerprint_for_cached_kinds() {
        let q = query(&[("kind", "combined"), ("span", "1d")]);
        assert_eq!(
            parse_image_request(&q, &config()).unwrap_err(),
            ValidationError::MissingParameter("id")
        );
    }

    #[test]
    fn test_parse_custom_validates_window() {
        let q = query(&[
            ("kind", "custom-combined"),
            ("id", "abc"),
            ("start", "2026-03-14T12:00"),
            ("end", "2026-03-14T11:00"),
        ]);
        assert!(matches!(
            parse_image_request(&q, &config()).unwrap_err(),
            ValidationError::EmptyWindow { .. }
        ));

        let q = query(&[
            ("kind", "custom-combined"),
            ("id", "abc"),
            ("start", "2026-03-14T12:00"),
        ]);
        assert!(parse_image_request(&q, &config()).is_err());
    }

    #[test]
    fn test_parse_legend_needs_only_kind() {
        let q = query(&[("kind", "legend-small")]);
        let request = parse_image_request(&q, &config()).unwrap();
        assert_eq!(request.kind, ChartKind::LegendSmall);
    }

    #[test]
    fn test_image_url_round_trips() {
        let fp = Fingerprint::parse("abc").unwrap();
        let request = RenderRequest::separate(SensorCategory::Co2, Preset::Days3, 1, fp);
        assert_eq!(
            image_url(&request),
            "/image?kind=separate&id=abc&category=co2&span=3d&sensor=1"
        );
    }

    #[test]
    fn test_session_fingerprint_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; id=5f3c2a; other=1"),
        );
        assert_eq!(
            session_fingerprint(&headers),
            Some(Fingerprint::parse("5f3c2a").unwrap())
        );

        let mut bad = HeaderMap::new();
        bad.insert(header::COOKIE, HeaderValue::from_static("id=../etc"));
        assert_eq!(session_fingerprint(&bad), None);
        assert_eq!(session_fingerprint(&HeaderMap::new()), None);
    }

    #[test]
    fn test_latest_reading_fields() {
        let record = LogRecord::parse(LogCategory::Co2, "2026 03 14 10 00 00 812 1").unwrap();
        let reading = LatestReading::new(SensorCategory::Co2, "Tent CO2", record);
        assert_eq!(reading.co2_ppm, Some(812.0));
        assert_eq!(reading.timestamp, "2026-03-14 10:00:00");
        assert_eq!(reading.temperature, None);
    }
}
