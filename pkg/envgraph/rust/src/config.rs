// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::request::{Preset, SensorCategory};

const DEFAULT_CONFIG_PATH: &str = "/etc/envgraph/envgraph.yaml";

/// Relay columns carried by every relay log line.
pub const MAX_RELAYS: usize = 8;

/// Widest chart the renderer is asked to produce.
pub const MAX_GRAPH_WIDTH: u32 = 4000;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub port: u16,
    /// Directory holding the persistent (rotated) log segments.
    pub log_dir: PathBuf,
    /// Directory holding the pending segments written since the last rotation.
    pub staging_dir: PathBuf,
    /// Directory the merged working copies are rebuilt into.
    pub working_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub still_dir: PathBuf,
    pub hdr_dir: PathBuf,
    pub renderer: RendererConfig,
    pub cache_cap: usize,
    pub graph_width: u32,
    pub ht_sensors: Vec<SensorConfig>,
    pub co2_sensors: Vec<SensorConfig>,
    pub relay_names: Vec<String>,
    pub dashboard: DashboardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8050,
            log_dir: PathBuf::from("/var/lib/envgraph/log"),
            staging_dir: PathBuf::from("/var/lib/envgraph/log"),
            working_dir: PathBuf::from("/var/tmp/envgraph"),
            artifact_dir: PathBuf::from("/var/lib/envgraph/images"),
            still_dir: PathBuf::from("/var/lib/envgraph/camera-stills"),
            hdr_dir: PathBuf::from("/var/lib/envgraph/camera-hdr"),
            renderer: RendererConfig::default(),
            cache_cap: 20,
            graph_width: 900,
            ht_sensors: Vec::new(),
            co2_sensors: Vec::new(),
            relay_names: Vec::new(),
            dashboard: DashboardConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: "gnuplot".to_string(),
            args: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl RendererConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    /// Whether the sensor gets charts on the dashboard.
    #[serde(default = "default_true")]
    pub graph: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardLayout {
    /// Day and week charts per sensor.
    #[default]
    Default,
    /// One multi-panel chart for every sensor.
    Combined,
    /// One chart per sensor over the configured span.
    Separate,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub layout: DashboardLayout,
    pub span: Preset,
}

impl Config {
    pub fn sensors(&self, category: SensorCategory) -> &[SensorConfig] {
        match category {
            SensorCategory::Ht => &self.ht_sensors,
            SensorCategory::Co2 => &self.co2_sensors,
        }
    }

    /// Relay display names padded to [`MAX_RELAYS`] entries.
    pub fn relay_labels(&self) -> Vec<String> {
        (0..MAX_RELAYS)
            .map(|i| {
                self.relay_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("Relay {}", i + 1))
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.cache_cap == 0 {
            bail!("cache_cap must be at least 1");
        }
        if self.graph_width == 0 || self.graph_width > MAX_GRAPH_WIDTH {
            bail!(
                "graph_width must be between 1 and {MAX_GRAPH_WIDTH}, got {}",
                self.graph_width
            );
        }
        if self.relay_names.len() > MAX_RELAYS {
            bail!(
                "at most {MAX_RELAYS} relay names are supported, got {}",
                self.relay_names.len()
            );
        }
        let max_sensors = usize::from(u8::MAX);
        if self.ht_sensors.len() > max_sensors || self.co2_sensors.len() > max_sensors {
            bail!("too many sensors configured");
        }
        Ok(())
    }
}

/// Resolve the config path: explicit flag, then `ENVGRAPH_CONFIG`, then the default.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var("ENVGRAPH_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the YAML config at `path`. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = parse(&contents).with_context(|| format!("parsing {}", path.display()))?;
    info!(
        path = %path.display(),
        ht_sensors = config.ht_sensors.len(),
        co2_sensors = config.co2_sensors.len(),
        "loaded config"
    );
    Ok(config)
}

fn parse(contents: &str) -> Result<Config> {
    // serde_yaml maps an empty document to unit, not to an empty mapping.
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    config.validate()?;
    Ok(config)
}
