// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use chrono::{Local, NaiveDateTime};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;
use tracing::warn;

use super::category::LogCategory;
use super::record::LogRecord;
use crate::request::TimeWindow;

/// Lazily yields the records of one log file that match a sensor and window.
///
/// Each call to [`filter`] reopens the file, so iteration always restarts
/// from the first line. Malformed lines are skipped. A read error ends the
/// iteration early.
pub struct RecordIter {
    lines: Option<Lines<BufReader<File>>>,
    category: LogCategory,
    sensor: Option<u8>,
    window: Option<TimeWindow>,
    now: NaiveDateTime,
}

impl Iterator for RecordIter {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!(category = %self.category, error = %e, "log read failed, truncating");
                    self.lines = None;
                    return None;
                }
            };
            let Some(record) = LogRecord::parse(self.category, &line) else {
                continue;
            };
            if self.sensor.is_some_and(|id| id != record.sensor_id) {
                continue;
            }
            if let Some(window) = &self.window
                && !window.contains(record.timestamp, self.now)
            {
                continue;
            }
            return Some(record);
        }
    }
}

/// Records of `path` for `sensor` (all sensors when `None`) inside `window`
/// (all time when `None`). Preset windows are resolved against the current
/// local time. A missing file yields an empty sequence.
pub fn filter(
    path: &Path,
    category: LogCategory,
    sensor: Option<u8>,
    window: Option<TimeWindow>,
) -> io::Result<RecordIter> {
    filter_at(path, category, sensor, window, Local::now().naive_local())
}

/// [`filter`] with preset windows resolved against `now`.
pub fn filter_at(
    path: &Path,
    category: LogCategory,
    sensor: Option<u8>,
    window: Option<TimeWindow>,
    now: NaiveDateTime,
) -> io::Result<RecordIter> {
    let lines = match File::open(path) {
        // Free-form logs never yield records.
        Ok(_) if !category.is_typed() => None,
        Ok(file) => Some(BufReader::new(file).lines()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    Ok(RecordIter {
        lines,
        category,
        sensor,
        window,
        now,
    })
}

/// Most recent record for `sensor`.
pub fn latest(path: &Path, category: LogCategory, sensor: u8) -> io::Result<Option<LogRecord>> {
    Ok(filter(path, category, Some(sensor), None)?.last())
}

/// Last `n` raw lines of `path`. A missing file has no lines.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut tail = VecDeque::with_capacity(n);
    for line in BufReader::new(file).lines() {
        let line = line?;
        if tail.len() == n {
            tail.pop_front();
        }
        if n > 0 {
            tail.push_back(line);
        }
    }
    Ok(tail.into())
}
