// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Plotting-script generation.
//!
//! Scripts target gnuplot. Chart data is embedded as inline datablocks built
//! from filtered [`LogRecord`]s, so a script never reaches back into the
//! log files or a shell. Axis bands are fixed per chart type to keep the
//! framing stable between renders.

use chrono::NaiveDateTime;
use std::path::Path;

use crate::logs::record::DATA_TIME_FORMAT;
use crate::logs::{LogCategory, LogRecord};
use crate::request::{ChartKind, RenderRequest, SensorCategory};

const COMBINED_HEIGHT: u32 = 1600;
const SEPARATE_HEIGHT: u32 = 490;
const LEGEND_SMALL_SIZE: (u32, u32) = (250, 300);
const LEGEND_FULL_SIZE: (u32, u32) = (400, 500);

/// Percentage band shared by humidity and relay panels.
const PERCENT_RANGE: (u32, u32) = (0, 100);
const TEMPERATURE_RANGE: (u32, u32, u32) = (0, 35, 5);
const CO2_RANGE: (u32, u32, u32) = (0, 5000, 500);

/// Line styles 1-4 for sensor series, 5-12 for relays.
const SERIES_COLORS: [&str; 4] = ["#7164a3", "#599e86", "#c3ae4f", "#c3744f"];
const RELAY_COLORS: [&str; 8] = [
    "#91180B", "#582557", "#04834C", "#DC32E6", "#957EF9", "#CC8D9C", "#717412", "#0B479B",
];
const RELAY_STYLE_OFFSET: usize = 5;

/// Presentation settings that are not part of a request.
#[derive(Debug, Clone)]
pub struct ChartStyle {
    pub width: u32,
    /// One label per relay column.
    pub relay_labels: Vec<String>,
}

/// Records for one plotted source.
#[derive(Debug, Clone)]
pub struct Series {
    pub category: LogCategory,
    /// Sensor the records belong to; `None` for records of every sensor.
    pub sensor: Option<u8>,
    pub title: String,
    pub records: Vec<LogRecord>,
}

impl Series {
    fn block_name(&self) -> String {
        let prefix = match self.category {
            LogCategory::HumidityTemperature => "ht",
            LogCategory::Co2 => "co2",
            LogCategory::Relay => "relay",
            LogCategory::Daemon => "daemon",
        };
        match self.sensor {
            Some(n) => format!("${prefix}{n}"),
            None => format!("${prefix}"),
        }
    }
}

/// Every series a render cycle resolved from the logs.
#[derive(Debug, Clone, Default)]
pub struct SeriesSources {
    pub series: Vec<Series>,
}

impl SeriesSources {
    fn find(&self, category: LogCategory, sensor: Option<u8>) -> Option<&Series> {
        self.series
            .iter()
            .find(|s| s.category == category && s.sensor == sensor)
    }

    fn per_sensor(&self, category: LogCategory) -> Vec<&Series> {
        let mut found: Vec<&Series> = self
            .series
            .iter()
            .filter(|s| s.category == category && s.sensor.is_some())
            .collect();
        found.sort_by_key(|s| s.sensor);
        found
    }
}

/// A built script, waiting for its output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Artifact file name the rendered image is published under.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    body: String,
}

impl Script {
    /// Full script text writing the PNG to `output`.
    pub fn text(&self, output: &Path) -> String {
        format!(
            "set terminal png size {},{}\nset output \"{}\"\n{}",
            self.width,
            self.height,
            quote(&output.to_string_lossy()),
            self.body
        )
    }

    #[cfg(test)]
    pub(crate) fn body(&self) -> &str {
        &self.body
    }
}

/// Build the script for `request`. Camera requests have no script.
///
/// Per-sensor kinds draw the single sensor named by the request's selector;
/// callers expand `all` into one request per sensor first.
pub fn build(
    request: &RenderRequest,
    sources: &SeriesSources,
    style: &ChartStyle,
    now: NaiveDateTime,
) -> Option<Script> {
    let file_name = request.key()?.file_name();
    let mut w = ScriptWriter::default();

    let (width, height) = match request.kind {
        ChartKind::Combined | ChartKind::CustomCombined => {
            write_combined(&mut w, request, sources, style, now);
            (style.width, COMBINED_HEIGHT)
        }
        ChartKind::Separate | ChartKind::CustomSeparate => {
            write_separate(&mut w, request, sources, style, now);
            (style.width, SEPARATE_HEIGHT)
        }
        ChartKind::LegendSmall => {
            write_legend(&mut w, style, false);
            LEGEND_SMALL_SIZE
        }
        ChartKind::LegendFull => {
            write_legend(&mut w, style, true);
            LEGEND_FULL_SIZE
        }
        ChartKind::CamStill | ChartKind::CamHdr => return None,
    };

    Some(Script {
        file_name,
        width,
        height,
        body: w.finish(),
    })
}

fn write_combined(
    w: &mut ScriptWriter,
    request: &RenderRequest,
    sources: &SeriesSources,
    style: &ChartStyle,
    now: NaiveDateTime,
) {
    let ht = sources.per_sensor(LogCategory::HumidityTemperature);
    let relay = sources.find(LogCategory::Relay, None);

    for series in ht.iter().copied().chain(relay) {
        w.datablock(series);
    }
    w.time_axis(request, now);
    w.bands(PERCENT_RANGE, TEMPERATURE_RANGE);
    w.styles(&SERIES_COLORS, 2);
    w.line(format!(
        "set multiplot layout 3, 1 title \"Combined Sensor Data - {}\"",
        quote(&request.window.describe())
    ));

    w.line("set title \"Combined Temperatures\"");
    w.line("unset key");
    w.plot(
        ht.iter()
            .enumerate()
            .filter(|(_, s)| !s.records.is_empty())
            .map(|(i, s)| {
                format!(
                    "{} using 1:2 title \"T{}\" w lp ls {} axes x1y2",
                    s.block_name(),
                    s.sensor.unwrap_or_default(),
                    style_index(i, SERIES_COLORS.len())
                )
            })
            .collect(),
    );

    w.line("set title \"Combined Humidities\"");
    w.plot(
        ht.iter()
            .enumerate()
            .filter(|(_, s)| !s.records.is_empty())
            .map(|(i, s)| {
                format!(
                    "{} using 1:3 title \"RH{}\" w lp ls {} axes x1y1",
                    s.block_name(),
                    s.sensor.unwrap_or_default(),
                    style_index(i, SERIES_COLORS.len())
                )
            })
            .collect(),
    );

    w.line("set key");
    w.line("set title \"Relay Run Time\"");
    w.plot(relay_clauses(relay, style));
    w.line("unset multiplot");
}

fn write_separate(
    w: &mut ScriptWriter,
    request: &RenderRequest,
    sources: &SeriesSources,
    style: &ChartStyle,
    now: NaiveDateTime,
) {
    let sensor = request.sensor.sensor();
    let category = request.category.unwrap_or(SensorCategory::Ht);
    let log_category = LogCategory::from(category);
    let series = sensor.and_then(|n| sources.find(log_category, Some(n)));
    let relay = sensor.and_then(|n| sources.find(LogCategory::Relay, Some(n)));

    for s in series.into_iter().chain(relay) {
        w.datablock(s);
    }
    w.time_axis(request, now);
    match category {
        SensorCategory::Ht => w.bands(PERCENT_RANGE, TEMPERATURE_RANGE),
        SensorCategory::Co2 => w.bands(PERCENT_RANGE, CO2_RANGE),
    }
    w.styles(&["#FF3100", "#0772A1", "#00B74A"], 2);

    let name = series.map(|s| s.title.as_str()).unwrap_or("");
    w.line(format!(
        "set title \"Sensor {}: {}  {}\"",
        sensor.unwrap_or_default(),
        quote(name),
        quote(&request.window.describe())
    ));
    w.line("set key");

    let mut clauses = Vec::new();
    if let Some(s) = series.filter(|s| !s.records.is_empty()) {
        let block = s.block_name();
        match category {
            SensorCategory::Ht => {
                clauses.push(format!("{block} using 1:3 title \"RH\" w lp ls 1 axes x1y1"));
                clauses.push(format!("{block} using 1:2 title \"T\" w lp ls 2 axes x1y2"));
                clauses.push(format!("{block} using 1:4 title \"DP\" w lp ls 3 axes x1y2"));
            }
            SensorCategory::Co2 => {
                clauses.push(format!("{block} using 1:2 title \"CO2\" w lp ls 1 axes x1y2"));
            }
        }
    }
    clauses.extend(relay_clauses(relay, style));
    w.plot(clauses);
}

fn write_legend(w: &mut ScriptWriter, style: &ChartStyle, full: bool) {
    w.styles(&SERIES_COLORS, 2);
    w.line("unset border");
    w.line("unset tics");
    w.line("set xrange [0:1]");
    w.line("set yrange [0:1]");
    w.line("set key center center box");

    let mut clauses = vec![
        "NaN title \"Temperature\" w lp ls 1".to_string(),
        "NaN title \"Relative Humidity\" w lp ls 2".to_string(),
        "NaN title \"Dew Point\" w lp ls 3".to_string(),
    ];
    if full {
        clauses.push("NaN title \"CO2\" w lp ls 4".to_string());
        for (i, label) in style.relay_labels.iter().enumerate() {
            clauses.push(format!(
                "NaN title \"{}\" w impulses ls {}",
                quote(label),
                RELAY_STYLE_OFFSET + i
            ));
        }
    }
    w.plot(clauses);
}

fn relay_clauses(relay: Option<&Series>, style: &ChartStyle) -> Vec<String> {
    let Some(series) = relay.filter(|s| !s.records.is_empty()) else {
        return Vec::new();
    };
    let block = series.block_name();
    style
        .relay_labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            format!(
                "{block} using 1:{} title \"{}\" w impulses ls {} axes x1y1",
                i + 2,
                quote(label),
                RELAY_STYLE_OFFSET + i
            )
        })
        .collect()
}

fn style_index(i: usize, palette: usize) -> usize {
    i % palette + 1
}

/// Escape `s` for a double-quoted gnuplot string.
fn quote(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '\\' => vec!['\\', '\\'],
            '"' => vec!['\\', '"'],
            '\n' | '\r' => vec![' '],
            c => vec![c],
        })
        .collect()
}

#[derive(Default)]
struct ScriptWriter {
    out: String,
}

impl ScriptWriter {
    fn line(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    fn datablock(&mut self, series: &Series) {
        if series.records.is_empty() {
            return;
        }
        self.line(format!("{} << EOD", series.block_name()));
        for record in &series.records {
            self.line(record.data_row());
        }
        self.line("EOD");
    }

    fn time_axis(&mut self, request: &RenderRequest, now: NaiveDateTime) {
        let (start, end) = request.window.bounds_at(now);
        let end = end.unwrap_or(now);
        self.line("set xdata time");
        self.line(format!("set timefmt \"{DATA_TIME_FORMAT}\""));
        self.line(format!(
            "set xrange [\"{}\":\"{}\"]",
            start.format(DATA_TIME_FORMAT),
            end.format(DATA_TIME_FORMAT)
        ));
        self.line("set format x \"%H:%M\\n%m/%d\"");
    }

    /// Fixed left band and right band `(low, high, tic step)`.
    fn bands(&mut self, y: (u32, u32), y2: (u32, u32, u32)) {
        self.line(format!("set yrange [{}:{}]", y.0, y.1));
        self.line(format!("set y2range [{}:{}]", y2.0, y2.1));
        self.line("set ytics 10");
        self.line(format!("set y2tics {}", y2.2));
        self.line("set my2tics 10");
        self.line("set style line 11 lc rgb '#808080' lt 1");
        self.line("set border 3 back ls 11");
        self.line("set tics nomirror");
        self.line("set style line 12 lc rgb '#808080' lt 0 lw 1");
        self.line("set grid xtics ytics back ls 12");
    }

    fn styles(&mut self, series_colors: &[&str], width: u32) {
        for (i, color) in series_colors.iter().enumerate() {
            self.line(format!(
                "set style line {} lc rgb '{color}' pt 0 ps 1 lt 1 lw {width}",
                i + 1
            ));
        }
        for (i, color) in RELAY_COLORS.iter().enumerate() {
            self.line(format!(
                "set style line {} lc rgb '{color}' pt 0 ps 1 lt 1 lw 1",
                RELAY_STYLE_OFFSET + i
            ));
        }
    }

    /// Emit a plot command, or an empty placeholder plot when there is no data.
    fn plot(&mut self, clauses: Vec<String>) {
        if clauses.is_empty() {
            self.line("plot NaN notitle");
        } else {
            self.line(format!("plot {}", clauses.join(", \\\n     ")));
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::request::{Preset, TimeWindow};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn style() -> ChartStyle {
        ChartStyle {
            width: 900,
            relay_labels: (1..=8).map(|i| format!("Relay {i}")).collect(),
        }
    }

    fn record(category: LogCategory, line: &str) -> LogRecord {
        LogRecord::parse(category, line).unwrap()
    }

    fn sources() -> SeriesSources {
        SeriesSources {
            series: vec![
                Series {
                    category: LogCategory::HumidityTemperature,
                    sensor: Some(1),
                    title: "Tent".to_string(),
                    records: vec![record(
                        LogCategory::HumidityTemperature,
                        "2026 03 14 11 00 00 23.0 52.0 12.2 1",
                    )],
                },
                Series {
                    category: LogCategory::HumidityTemperature,
                    sensor: Some(2),
                    title: "Closet \"B\"".to_string(),
                    records: vec![],
                },
                Series {
                    category: LogCategory::Relay,
                    sensor: None,
                    title: "Relays".to_string(),
                    records: vec![record(
                        LogCategory::Relay,
                        "2026 03 14 11 00 00 5 0 0 0 0 0 0 0 1",
                    )],
                },
            ],
        }
    }

    fn fp() -> Fingerprint {
        Fingerprint::parse("abc").unwrap()
    }

    #[test]
    fn test_combined_layout() {
        let req = RenderRequest::combined(Preset::Day1, fp());
        let script = build(&req, &sources(), &style(), now()).unwrap();
        let body = script.body();

        assert_eq!(script.file_name, "graph-combined1d-abc.png");
        assert_eq!((script.width, script.height), (900, COMBINED_HEIGHT));
        assert!(body.contains("set multiplot layout 3, 1"));
        assert!(body.contains("set yrange [0:100]"));
        assert!(body.contains("set y2range [0:35]"));
        assert!(body.contains("$ht1 << EOD\n2026-03-14T11:00:00 23 52 12.2\nEOD"));
        assert!(body.contains("$ht1 using 1:2 title \"T1\""));
        assert!(body.contains("$relay using 1:2 title \"Relay 1\" w impulses"));
        // Empty series are neither embedded nor plotted.
        assert!(!body.contains("$ht2"));
        assert!(body.contains("set xrange [\"2026-03-13T12:00:00\":\"2026-03-14T12:00:00\"]"));
    }

    #[test]
    fn test_separate_titles_sensor_and_window() {
        let req = RenderRequest::separate(SensorCategory::Ht, Preset::Hour1, 1, fp());
        let script = build(&req, &sources(), &style(), now()).unwrap();
        assert_eq!(script.height, SEPARATE_HEIGHT);
        assert!(script.body().contains("set title \"Sensor 1: Tent  Past 1 Hour\""));
        assert!(script.body().contains("$ht1 using 1:4 title \"DP\""));
    }

    #[test]
    fn test_separate_without_data_is_placeholder() {
        let req = RenderRequest::separate(SensorCategory::Ht, Preset::Hour1, 2, fp());
        let script = build(&req, &sources(), &style(), now()).unwrap();
        assert!(script.body().contains("Sensor 2: Closet \\\"B\\\""));
        assert!(script.body().contains("plot NaN notitle"));
    }

    #[test]
    fn test_empty_sources_still_build() {
        let req = RenderRequest::combined(Preset::Week1, fp());
        let script = build(&req, &SeriesSources::default(), &style(), now()).unwrap();
        assert_eq!(script.body().matches("plot NaN notitle").count(), 3);
    }

    #[test]
    fn test_co2_band() {
        let req = RenderRequest::separate(SensorCategory::Co2, Preset::Day1, 1, fp());
        let script = build(&req, &SeriesSources::default(), &style(), now()).unwrap();
        assert!(script.body().contains("set y2range [0:5000]"));
    }

    #[test]
    fn test_custom_window_bounds() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(8, 15, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let window = TimeWindow::explicit(start, end).unwrap();
        let req = RenderRequest::custom_combined(window, fp());
        let script = build(&req, &sources(), &style(), now()).unwrap();
        assert!(
            script
                .body()
                .contains("set xrange [\"2026-03-01T08:15:00\":\"2026-03-02T09:30:00\"]")
        );
        assert!(script.body().contains("03/01/2026 08:15 - 03/02/2026 09:30"));
    }

    #[test]
    fn test_legend_has_no_data() {
        let small = build(
            &RenderRequest::legend(ChartKind::LegendSmall, fp()),
            &sources(),
            &style(),
            now(),
        )
        .unwrap();
        assert!(!small.body().contains("EOD"));
        assert!(!small.body().contains("Relay 1"));

        let full = build(
            &RenderRequest::legend(ChartKind::LegendFull, fp()),
            &sources(),
            &style(),
            now(),
        )
        .unwrap();
        assert!(full.body().contains("NaN title \"Relay 8\""));
        assert_eq!(full.file_name, "graph-legend-full-abc.png");
    }

    #[test]
    fn test_camera_has_no_script() {
        let req = RenderRequest::legend(ChartKind::CamStill, fp());
        assert!(build(&req, &sources(), &style(), now()).is_none());
    }

    #[test]
    fn test_text_embeds_quoted_output() {
        let req = RenderRequest::legend(ChartKind::LegendSmall, fp());
        let script = build(&req, &sources(), &style(), now()).unwrap();
        let text = script.text(Path::new("/images/.graph.tmp"));
        assert!(
            text.starts_with("set terminal png size 250,300\nset output \"/images/.graph.tmp\"\n")
        );
    }

    #[test]
    fn test_deterministic_file_name() {
        let req = RenderRequest::separate(SensorCategory::Ht, Preset::Day1, 1, fp());
        let a = build(&req, &sources(), &style(), now()).unwrap();
        let b = build(&req, &SeriesSources::default(), &style(), now()).unwrap();
        assert_eq!(a.file_name, b.file_name);
    }
}
