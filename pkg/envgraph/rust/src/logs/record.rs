// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use chrono::{NaiveDate, NaiveDateTime};

use super::category::LogCategory;
use crate::config::MAX_RELAYS;

/// Format used for timestamps in generated chart data.
pub const DATA_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Leading whitespace fields holding `YYYY MM DD HH MM SS`.
const TIMESTAMP_FIELDS: usize = 6;

const HT_FIELDS: usize = 10;
const CO2_FIELDS: usize = 8;
const RELAY_FIELDS: usize = 15;

/// One parsed log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub sensor_id: u8,
    pub reading: Reading,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Ht {
        temperature: f64,
        humidity: f64,
        dew_point: f64,
    },
    Co2 {
        ppm: f64,
    },
    /// Seconds each relay was energized, relay 1 first.
    Relay {
        on_seconds: [f64; MAX_RELAYS],
    },
}

impl LogRecord {
    /// Parse one line of a `category` log. Lines with the wrong field count or
    /// unparseable fields yield `None`.
    pub fn parse(category: LogCategory, line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let expected = match category {
            LogCategory::HumidityTemperature => HT_FIELDS,
            LogCategory::Co2 => CO2_FIELDS,
            LogCategory::Relay => RELAY_FIELDS,
            LogCategory::Daemon => return None,
        };
        if fields.len() != expected {
            return None;
        }

        let (ts_fields, rest) = fields.split_at(TIMESTAMP_FIELDS);
        let timestamp = parse_timestamp(ts_fields)?;
        let (values, sensor) = rest.split_at(rest.len() - 1);
        let sensor_id = sensor.first()?.parse::<u8>().ok().filter(|id| *id > 0)?;
        let values = values
            .iter()
            .map(|v| v.parse::<f64>().ok())
            .collect::<Option<Vec<f64>>>()?;

        let reading = match (category, values.as_slice()) {
            (LogCategory::HumidityTemperature, [temperature, humidity, dew_point]) => Reading::Ht {
                temperature: *temperature,
                humidity: *humidity,
                dew_point: *dew_point,
            },
            (LogCategory::Co2, [ppm]) => Reading::Co2 { ppm: *ppm },
            (LogCategory::Relay, seconds) => Reading::Relay {
                on_seconds: seconds.try_into().ok()?,
            },
            _ => return None,
        };

        Some(Self {
            timestamp,
            sensor_id,
            reading,
        })
    }

    /// Numeric columns in chart-data order.
    pub fn values(&self) -> Vec<f64> {
        match &self.reading {
            Reading::Ht {
                temperature,
                humidity,
                dew_point,
            } => vec![*temperature, *humidity, *dew_point],
            Reading::Co2 { ppm } => vec![*ppm],
            Reading::Relay { on_seconds } => on_seconds.to_vec(),
        }
    }

    /// Render as one whitespace-separated chart-data row: timestamp then values.
    pub fn data_row(&self) -> String {
        let mut row = self.timestamp.format(DATA_TIME_FORMAT).to_string();
        for v in self.values() {
            row.push(' ');
            row.push_str(&v.to_string());
        }
        row
    }
}

fn parse_timestamp(fields: &[&str]) -> Option<NaiveDateTime> {
    let n = fields
        .iter()
        .map(|f| f.parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;
    match n.as_slice() {
        [year, month, day, hour, minute, second] => {
            NaiveDate::from_ymd_opt(i32::try_from(*year).ok()?, *month, *day)?
                .and_hms_opt(*hour, *minute, *second)
        }
        _ => None,
    }
}
