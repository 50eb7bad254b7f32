// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Sensor, relay and daemon logs.
//!
//! - `category` - log families and where their segments live
//! - `merge` - rebuilds the working copy from the persistent and pending segments
//! - `record` - typed records parsed from whitespace-delimited lines
//! - `filter` - lazy, restartable record iteration filtered by sensor and window

pub mod category;
pub mod filter;
pub mod merge;
pub mod record;

pub use category::{LogCategory, LogPaths};
pub use filter::{RecordIter, filter, filter_at, latest, tail_lines};
pub use merge::merge;
pub use record::{LogRecord, Reading};
