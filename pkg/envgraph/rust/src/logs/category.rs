// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::Config;
use crate::request::{SensorCategory, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    HumidityTemperature,
    Co2,
    Relay,
    Daemon,
}

impl LogCategory {
    pub const ALL: [LogCategory; 4] = [
        LogCategory::HumidityTemperature,
        LogCategory::Co2,
        LogCategory::Relay,
        LogCategory::Daemon,
    ];

    /// File stem shared by the segments and the working copy.
    pub fn stem(&self) -> &'static str {
        match self {
            LogCategory::HumidityTemperature => "sensor-ht",
            LogCategory::Co2 => "sensor-co2",
            LogCategory::Relay => "relay",
            LogCategory::Daemon => "daemon",
        }
    }

    /// Whether lines parse into typed [`LogRecord`](super::LogRecord)s.
    pub fn is_typed(&self) -> bool {
        !matches!(self, LogCategory::Daemon)
    }
}

impl From<SensorCategory> for LogCategory {
    fn from(category: SensorCategory) -> Self {
        match category {
            SensorCategory::Ht => LogCategory::HumidityTemperature,
            SensorCategory::Co2 => LogCategory::Co2,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

impl FromStr for LogCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogCategory::ALL
            .into_iter()
            .find(|c| c.stem() == s)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Locations of the persistent, pending and working copies of every log.
#[derive(Debug, Clone)]
pub struct LogPaths {
    pub log_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub working_dir: PathBuf,
}

impl LogPaths {
    pub fn new(
        log_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            staging_dir: staging_dir.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.log_dir, &config.staging_dir, &config.working_dir)
    }

    pub fn persistent(&self, category: LogCategory) -> PathBuf {
        self.log_dir.join(format!("{}.log", category.stem()))
    }

    pub fn pending(&self, category: LogCategory) -> PathBuf {
        self.staging_dir.join(format!("{}-tmp.log", category.stem()))
    }

    pub fn working(&self, category: LogCategory) -> PathBuf {
        self.working_dir.join(format!("{}.log", category.stem()))
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_paths() {
        let paths = LogPaths::new("/srv/log", "/run/log", "/var/tmp");
        assert_eq!(
            paths.persistent(LogCategory::HumidityTemperature),
            PathBuf::from("/srv/log/sensor-ht.log")
        );
        assert_eq!(
            paths.pending(LogCategory::Co2),
            PathBuf::from("/run/log/sensor-co2-tmp.log")
        );
        assert_eq!(
            paths.working(LogCategory::Relay),
            PathBuf::from("/var/tmp/relay.log")
        );
    }

    #[test]
    fn test_parse_category() {
        assert_eq!("daemon".parse::<LogCategory>().unwrap(), LogCategory::Daemon);
        assert_eq!(
            "sensor-ht".parse::<LogCategory>().unwrap(),
            LogCategory::HumidityTemperature
        );
        assert!("auth".parse::<LogCategory>().is_err());
    }
}
