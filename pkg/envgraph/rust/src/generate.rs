// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Render cycles: merge logs, resolve series, build, render and publish.

use std::io;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{Artifact, ArtifactCache};
use crate::config::{Config, DashboardLayout};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::logs::{self, LogCategory, LogPaths, LogRecord};
use crate::renderer::Renderer;
use crate::request::{
    ChartKind, Preset, RenderRequest, SensorCategory, TimeWindow, ValidationError,
};
use crate::script::{self, ChartStyle, Series, SeriesSources};

/// Chart arrangement for a custom-window render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomLayout {
    #[default]
    Combined,
    Separate,
}

/// Result of rendering one chart within a cycle.
#[derive(Debug)]
pub struct ChartOutcome {
    pub request: RenderRequest,
    pub result: Result<Artifact>,
}

/// Everything a render needs, derived once from the configuration.
#[derive(Debug, Clone)]
pub struct Generator {
    config: Arc<Config>,
    paths: LogPaths,
    cache: ArtifactCache,
    renderer: Renderer,
}

impl Generator {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            paths: LogPaths::from_config(&config),
            cache: ArtifactCache::from_config(&config),
            renderer: Renderer::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn paths(&self) -> &LogPaths {
        &self.paths
    }

    /// Chart style, optionally overriding the configured width.
    pub fn style(&self, width: Option<u32>) -> ChartStyle {
        ChartStyle {
            width: width.unwrap_or(self.config.graph_width),
            relay_labels: self.config.relay_labels(),
        }
    }

    /// Numbers of the sensors of `category` that appear on the dashboard.
    fn graphed(&self, category: SensorCategory) -> impl Iterator<Item = u8> + '_ {
        self.config
            .sensors(category)
            .iter()
            .zip(1..=u8::MAX)
            .filter(|(sensor, _)| sensor.graph)
            .map(|(_, n)| n)
    }

    /// Charts shown by the dashboard for the configured layout.
    pub fn dashboard_requests(&self, fingerprint: &Fingerprint) -> Vec<RenderRequest> {
        let dashboard = &self.config.dashboard;
        match dashboard.layout {
            DashboardLayout::Combined => {
                vec![RenderRequest::combined(dashboard.span, fingerprint.clone())]
            }
            DashboardLayout::Separate => self.separate_requests(&[dashboard.span], fingerprint),
            DashboardLayout::Default => {
                self.separate_requests(&[Preset::Day1, Preset::Week1], fingerprint)
            }
        }
    }

    fn separate_requests(&self, spans: &[Preset], fingerprint: &Fingerprint) -> Vec<RenderRequest> {
        let mut requests = Vec::new();
        for category in SensorCategory::ALL {
            for n in self.graphed(category) {
                for span in spans {
                    requests.push(RenderRequest::separate(
                        category,
                        *span,
                        n,
                        fingerprint.clone(),
                    ));
                }
            }
        }
        requests
    }

    /// Charts for a custom window render.
    pub fn custom_requests(
        &self,
        layout: CustomLayout,
        window: TimeWindow,
        fingerprint: &Fingerprint,
    ) -> Vec<RenderRequest> {
        match layout {
            CustomLayout::Combined => {
                vec![RenderRequest::custom_combined(window, fingerprint.clone())]
            }
            CustomLayout::Separate => SensorCategory::ALL
                .into_iter()
                .flat_map(|category| {
                    self.graphed(category)
                        .map(move |n| (category, n))
                        .collect::<Vec<_>>()
                })
                .map(|(category, n)| {
                    RenderRequest::custom_separate(category, window, n, fingerprint.clone())
                })
                .collect(),
        }
    }

    /// Rebuild every working log copy. A category that fails keeps its
    /// previous copy.
    pub async fn merge_logs(&self) {
        let paths = self.paths.clone();
        let merged = blocking(move || {
            let mut failures = Vec::new();
            for category in LogCategory::ALL {
                if let Err(e) = logs::merge(&paths, category) {
                    failures.push((category, e));
                }
            }
            Ok(failures)
        })
        .await;

        match merged {
            Ok(failures) => {
                for (category, e) in failures {
                    warn!(%category, error = %e, "log merge failed, keeping previous working copy");
                }
            }
            Err(e) => warn!(error = %e, "log merge task failed"),
        }
    }

    pub async fn evict(&self) -> io::Result<usize> {
        let cache = self.cache.clone();
        let cap = self.config.cache_cap;
        blocking(move || cache.evict(cap)).await
    }

    /// Read the working copies into per-sensor series for `window`.
    pub async fn load_sources(
        &self,
        window: TimeWindow,
        now: NaiveDateTime,
    ) -> io::Result<SeriesSources> {
        let config = Arc::clone(&self.config);
        let paths = self.paths.clone();
        blocking(move || {
            let read = |category: LogCategory| -> io::Result<Vec<LogRecord>> {
                Ok(
                    logs::filter_at(&paths.working(category), category, None, Some(window), now)?
                        .collect(),
                )
            };
            let for_sensor = |records: &[LogRecord], n: u8| -> Vec<LogRecord> {
                records.iter().filter(|r| r.sensor_id == n).cloned().collect()
            };

            let mut series = Vec::new();
            let mut max_sensor = 0;
            for category in SensorCategory::ALL {
                let log = LogCategory::from(category);
                let records = read(log)?;
                for (sensor, n) in config.sensors(category).iter().zip(1..=u8::MAX) {
                    max_sensor = max_sensor.max(n);
                    if !sensor.graph {
                        continue;
                    }
                    series.push(Series {
                        category: log,
                        sensor: Some(n),
                        title: sensor.name.clone(),
                        records: for_sensor(&records, n),
                    });
                }
            }

            let relay = read(LogCategory::Relay)?;
            for n in 1..=max_sensor {
                series.push(Series {
                    category: LogCategory::Relay,
                    sensor: Some(n),
                    title: format!("Relays {n}"),
                    records: for_sensor(&relay, n),
                });
            }
            series.push(Series {
                category: LogCategory::Relay,
                sensor: None,
                title: "Relays".to_string(),
                records: relay,
            });

            debug!(series = series.len(), window = %window.describe(), "loaded chart series");
            Ok(SeriesSources { series })
        })
        .await
    }

    /// Build, render and publish a single chart.
    pub async fn render_one(
        &self,
        request: &RenderRequest,
        sources: &SeriesSources,
        style: &ChartStyle,
        now: NaiveDateTime,
    ) -> Result<Artifact> {
        let unsupported = || ValidationError::Unsupported {
            kind: request.kind,
            what: "rendering",
        };
        let key = request.key().ok_or_else(unsupported)?;
        let script = script::build(request, sources, style, now).ok_or_else(unsupported)?;

        self.cache.ensure_dir()?;
        self.renderer.render(&script, self.cache.dir()).await?;
        Ok(self.cache.publish(&key)?)
    }

    /// Merge logs and render every chart in `requests`, one after another.
    ///
    /// A failed chart is reported in its outcome and does not stop the cycle.
    pub async fn render_all(
        &self,
        requests: &[RenderRequest],
        width: Option<u32>,
    ) -> Vec<ChartOutcome> {
        let now = Local::now().naive_local();
        let style = self.style(width);
        self.merge_logs().await;

        let mut loaded: Vec<(TimeWindow, SeriesSources)> = Vec::new();
        let mut outcomes = Vec::new();
        for request in self.expand(requests) {
            if !loaded.iter().any(|(w, _)| *w == request.window) {
                match self.load_sources(request.window, now).await {
                    Ok(sources) => loaded.push((request.window, sources)),
                    Err(e) => {
                        warn!(error = %e, "failed to read chart data");
                        outcomes.push(ChartOutcome {
                            request,
                            result: Err(e.into()),
                        });
                        continue;
                    }
                }
            }
            let Some((_, sources)) = loaded.iter().find(|(w, _)| *w == request.window) else {
                continue;
            };

            let result = self.render_one(&request, sources, &style, now).await;
            outcomes.push(ChartOutcome { request, result });
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(charts = outcomes.len(), failed, "render cycle finished");
        outcomes
    }

    /// The requests in `requests` whose artifact is not in the cache.
    ///
    /// A lookup that fails counts as a miss.
    pub fn uncached(&self, requests: &[RenderRequest]) -> Vec<RenderRequest> {
        requests
            .iter()
            .filter(|request| {
                let Some(key) = request.key() else {
                    return false;
                };
                match self.cache.lookup(&key) {
                    Ok(found) => found.is_none(),
                    Err(e) => {
                        warn!(artifact = %key.file_name(), error = %e, "artifact lookup failed");
                        true
                    }
                }
            })
            .cloned()
            .collect()
    }

    /// Split `all` selectors into per-sensor requests.
    pub fn expand(&self, requests: &[RenderRequest]) -> Vec<RenderRequest> {
        requests
            .iter()
            .flat_map(|r| {
                let count = r
                    .category
                    .map(|c| self.config.sensors(c).len())
                    .unwrap_or_default();
                r.expand(count)
            })
            .collect()
    }

    /// Render a legend under a fresh single-use fingerprint.
    pub async fn render_legend(&self, kind: ChartKind) -> Result<Artifact> {
        if !kind.is_legend() {
            return Err(ValidationError::Unsupported {
                kind,
                what: "legend rendering",
            }
            .into());
        }
        let request = RenderRequest::legend(kind, Fingerprint::mint());
        self.render_one(
            &request,
            &SeriesSources::default(),
            &self.style(None),
            Local::now().naive_local(),
        )
        .await
    }
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}
