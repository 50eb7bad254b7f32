// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Chart request model.
//!
//! A [`RenderRequest`] names what to draw (kind, sensor category, time window,
//! sensor selector) and which session it belongs to (fingerprint). Its
//! [`ArtifactKey`] maps 1:1 onto the artifact file name, which is what makes a
//! previously rendered chart reusable.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// Minute-resolution timestamp format accepted for explicit windows
/// (the `datetime-local` form input format).
pub const WINDOW_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown chart kind: {0}")]
    UnknownKind(String),

    #[error("unknown time span: {0}, expected 1h, 6h, 1d, 3d, 1w, 1m or 3m")]
    UnknownSpan(String),

    #[error("unknown sensor category: {0}, expected ht or co2")]
    UnknownCategory(String),

    #[error("malformed time window bound: {0}")]
    MalformedWindow(String),

    #[error("time window start {start} is not before end {end}")]
    EmptyWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("invalid sensor selector: {0}")]
    InvalidSensor(String),

    #[error("sensor {number} is out of range, {configured} {category} sensor(s) configured")]
    SensorOutOfRange {
        category: SensorCategory,
        number: u8,
        configured: usize,
    },

    #[error("invalid fingerprint")]
    InvalidFingerprint,

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("{kind} charts do not accept {what}")]
    Unsupported { kind: ChartKind, what: &'static str },
}

// ============================================================================
// Chart kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    Separate,
    Combined,
    CustomCombined,
    CustomSeparate,
    LegendSmall,
    LegendFull,
    CamStill,
    CamHdr,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Separate => "separate",
            ChartKind::Combined => "combined",
            ChartKind::CustomCombined => "custom-combined",
            ChartKind::CustomSeparate => "custom-separate",
            ChartKind::LegendSmall => "legend-small",
            ChartKind::LegendFull => "legend-full",
            ChartKind::CamStill => "cam-still",
            ChartKind::CamHdr => "cam-hdr",
        }
    }

    pub fn is_legend(&self) -> bool {
        matches!(self, ChartKind::LegendSmall | ChartKind::LegendFull)
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, ChartKind::CamStill | ChartKind::CamHdr)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ChartKind::CustomCombined | ChartKind::CustomSeparate)
    }

    /// Kinds that draw one chart per sensor.
    pub fn is_per_sensor(&self) -> bool {
        matches!(self, ChartKind::Separate | ChartKind::CustomSeparate)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "separate" => Ok(ChartKind::Separate),
            "combined" => Ok(ChartKind::Combined),
            "custom-combined" => Ok(ChartKind::CustomCombined),
            "custom-separate" => Ok(ChartKind::CustomSeparate),
            "legend-small" => Ok(ChartKind::LegendSmall),
            "legend-full" => Ok(ChartKind::LegendFull),
            "cam-still" => Ok(ChartKind::CamStill),
            "cam-hdr" => Ok(ChartKind::CamHdr),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

// ============================================================================
// Sensor categories
// ============================================================================

/// Sensor families that get their own charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorCategory {
    /// Humidity/temperature sensors.
    Ht,
    Co2,
}

impl SensorCategory {
    pub const ALL: [SensorCategory; 2] = [SensorCategory::Ht, SensorCategory::Co2];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorCategory::Ht => "ht",
            SensorCategory::Co2 => "co2",
        }
    }
}

impl fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ht" => Ok(SensorCategory::Ht),
            "co2" => Ok(SensorCategory::Co2),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

// ============================================================================
// Time windows
// ============================================================================

/// Relative time span ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    Hour1,
    Hours6,
    #[default]
    Day1,
    Days3,
    Week1,
    Month1,
    Months3,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::Hour1,
        Preset::Hours6,
        Preset::Day1,
        Preset::Days3,
        Preset::Week1,
        Preset::Month1,
        Preset::Months3,
    ];

    pub fn to_duration(&self) -> Duration {
        match self {
            Preset::Hour1 => Duration::hours(1),
            Preset::Hours6 => Duration::hours(6),
            Preset::Day1 => Duration::days(1),
            Preset::Days3 => Duration::days(3),
            Preset::Week1 => Duration::weeks(1),
            Preset::Month1 => Duration::days(30),
            Preset::Months3 => Duration::days(90),
        }
    }

    /// Short form used in query strings and artifact names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Hour1 => "1h",
            Preset::Hours6 => "6h",
            Preset::Day1 => "1d",
            Preset::Days3 => "3d",
            Preset::Week1 => "1w",
            Preset::Month1 => "1m",
            Preset::Months3 => "3m",
        }
    }

    /// Human-readable form used in chart titles.
    pub fn describe(&self) -> &'static str {
        match self {
            Preset::Hour1 => "1 Hour",
            Preset::Hours6 => "6 Hours",
            Preset::Day1 => "1 Day",
            Preset::Days3 => "3 Days",
            Preset::Week1 => "1 Week",
            Preset::Month1 => "1 Month",
            Preset::Months3 => "3 Months",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownSpan(s.to_string()))
    }
}

/// Custom deserialize for the short format: "1h", "6h", "1d", ...
impl<'de> Deserialize<'de> for Preset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for Preset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// From `now - span` onwards, resolved when the window is used.
    Preset(Preset),
    /// Inclusive minute-resolution bounds.
    Explicit {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::Preset(Preset::default())
    }
}

impl TimeWindow {
    /// Build an explicit window, truncating both bounds to the minute.
    pub fn explicit(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ValidationError> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        if start >= end {
            return Err(ValidationError::EmptyWindow { start, end });
        }
        Ok(TimeWindow::Explicit { start, end })
    }

    /// Parse `YYYY-MM-DDTHH:MM` bounds as submitted by the custom graph form.
    pub fn parse_explicit(start: &str, end: &str) -> Result<Self, ValidationError> {
        let parse = |s: &str| {
            NaiveDateTime::parse_from_str(s.trim(), WINDOW_INPUT_FORMAT)
                .map_err(|_| ValidationError::MalformedWindow(s.to_string()))
        };
        Self::explicit(parse(start)?, parse(end)?)
    }

    pub fn preset(&self) -> Option<Preset> {
        match self {
            TimeWindow::Preset(p) => Some(*p),
            TimeWindow::Explicit { .. } => None,
        }
    }

    /// Lower bound and optional upper bound of the window as seen at `now`.
    pub fn bounds_at(&self, now: NaiveDateTime) -> (NaiveDateTime, Option<NaiveDateTime>) {
        match self {
            TimeWindow::Preset(p) => (now - p.to_duration(), None),
            TimeWindow::Explicit { start, end } => (*start, Some(*end)),
        }
    }

    /// Whether `ts` falls inside the window as seen at `now`.
    pub fn contains(&self, ts: NaiveDateTime, now: NaiveDateTime) -> bool {
        match self {
            TimeWindow::Preset(p) => ts >= now - p.to_duration(),
            TimeWindow::Explicit { start, end } => {
                let minute = truncate_to_minute(ts);
                *start <= minute && minute <= *end
            }
        }
    }

    /// Chart title fragment.
    pub fn describe(&self) -> String {
        match self {
            TimeWindow::Preset(p) => format!("Past {}", p.describe()),
            TimeWindow::Explicit { start, end } => format!(
                "{} - {}",
                start.format("%m/%d/%Y %H:%M"),
                end.format("%m/%d/%Y %H:%M")
            ),
        }
    }
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

// ============================================================================
// Sensor selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorSelector {
    /// One sensor, 1-based.
    Sensor(u8),
    All,
    /// Charts that are not tied to a sensor (combined, legends).
    #[default]
    None,
}

impl SensorSelector {
    /// Parse a query value: a sensor number, `all`, or empty/`0` for none.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim() {
            "" | "0" | "none" => Ok(SensorSelector::None),
            "all" => Ok(SensorSelector::All),
            n => n
                .parse::<u8>()
                .map(SensorSelector::Sensor)
                .map_err(|_| ValidationError::InvalidSensor(s.to_string())),
        }
    }

    pub fn sensor(&self) -> Option<u8> {
        match self {
            SensorSelector::Sensor(n) => Some(*n),
            _ => None,
        }
    }

    fn file_suffix(&self) -> String {
        match self {
            SensorSelector::Sensor(n) => format!("-{n}"),
            SensorSelector::All | SensorSelector::None => String::new(),
        }
    }
}

// ============================================================================
// Requests and artifact keys
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub kind: ChartKind,
    /// Sensor family for per-sensor kinds.
    pub category: Option<SensorCategory>,
    pub window: TimeWindow,
    pub sensor: SensorSelector,
    pub fingerprint: Fingerprint,
}

impl RenderRequest {
    /// A preset `separate` chart for one sensor.
    pub fn separate(
        category: SensorCategory,
        span: Preset,
        sensor: u8,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            kind: ChartKind::Separate,
            category: Some(category),
            window: TimeWindow::Preset(span),
            sensor: SensorSelector::Sensor(sensor),
            fingerprint,
        }
    }

    pub fn combined(span: Preset, fingerprint: Fingerprint) -> Self {
        Self {
            kind: ChartKind::Combined,
            category: None,
            window: TimeWindow::Preset(span),
            sensor: SensorSelector::None,
            fingerprint,
        }
    }

    pub fn custom_combined(window: TimeWindow, fingerprint: Fingerprint) -> Self {
        Self {
            kind: ChartKind::CustomCombined,
            category: None,
            window,
            sensor: SensorSelector::None,
            fingerprint,
        }
    }

    pub fn custom_separate(
        category: SensorCategory,
        window: TimeWindow,
        sensor: u8,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            kind: ChartKind::CustomSeparate,
            category: Some(category),
            window,
            sensor: SensorSelector::Sensor(sensor),
            fingerprint,
        }
    }

    pub fn legend(kind: ChartKind, fingerprint: Fingerprint) -> Self {
        Self {
            kind,
            category: None,
            window: TimeWindow::default(),
            sensor: SensorSelector::None,
            fingerprint,
        }
    }

    /// Split an `all` selector into one request per configured sensor.
    pub fn expand(&self, sensor_count: usize) -> Vec<RenderRequest> {
        if !self.kind.is_per_sensor() || self.sensor != SensorSelector::All {
            return vec![self.clone()];
        }
        (1..=sensor_count)
            .filter_map(|n| u8::try_from(n).ok())
            .map(|n| RenderRequest {
                sensor: SensorSelector::Sensor(n),
                ..self.clone()
            })
            .collect()
    }

    /// Cache key of the artifact this request renders to.
    ///
    /// Camera kinds have none, and neither does an `all` selector until
    /// [`RenderRequest::expand`] splits it into per-sensor requests.
    pub fn key(&self) -> Option<ArtifactKey> {
        if self.kind.is_camera() || self.sensor == SensorSelector::All {
            return None;
        }
        Some(ArtifactKey {
            kind: self.kind,
            category: self.category,
            span: match self.kind {
                ChartKind::Separate | ChartKind::Combined => self.window.preset(),
                _ => None,
            },
            fingerprint: self.fingerprint.clone(),
            sensor: self.sensor,
        })
    }
}

/// Identity of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub kind: ChartKind,
    pub category: Option<SensorCategory>,
    pub span: Option<Preset>,
    pub fingerprint: Fingerprint,
    pub sensor: SensorSelector,
}

impl ArtifactKey {
    /// Deterministic artifact file name, e.g. `graph-htseparate1d-<fp>-2.png`.
    pub fn file_name(&self) -> String {
        let category = match (self.category, self.kind.is_custom()) {
            (Some(c), true) => format!("{c}-"),
            (Some(c), false) => c.to_string(),
            (None, _) => String::new(),
        };
        let span = self.span.map(|s| s.as_str()).unwrap_or_default();
        format!(
            "graph-{category}{kind}{span}-{fp}{sensor}.png",
            kind = self.kind.as_str(),
            fp = self.fingerprint,
            sensor = self.sensor.file_suffix(),
        )
    }
}
