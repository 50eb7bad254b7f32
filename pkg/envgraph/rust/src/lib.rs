// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Chart rendering and artifact cache for the environmental monitoring
//! dashboard.
//!
//! Sensor and relay logs are append-only text files. This crate merges the
//! persistent and pending segments of each log, filters them into typed
//! records, turns a chart request into a plotting script, runs the external
//! renderer, and publishes the resulting PNG into a capacity-bounded
//! artifact directory that the HTTP server streams back to browsers.
//!
//! ## Flow
//!
//! 1. [`fingerprint`] decides whether the dashboard view reuses the session's
//!    fingerprint or mints a new one and regenerates.
//! 2. [`logs`] rebuilds the working copy of each log and yields records.
//! 3. [`script`] builds a deterministic script for each chart.
//! 4. [`renderer`] runs the plotting engine into a temporary file and renames
//!    it into place.
//! 5. [`cache`] looks artifacts up and evicts the oldest beyond the cap.
//! 6. [`generate`] runs steps 2-5 for every chart of a render cycle.
//! 7. [`server`] maps image requests onto the cache, legends and camera
//!    captures.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod cache;
pub mod camera;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod generate;
pub mod logs;
pub mod renderer;
pub mod request;
pub mod script;
pub mod server;

pub use cache::{Artifact, ArtifactCache};
pub use config::Config;
pub use error::Error;
pub use fingerprint::{Fingerprint, SessionDecision};
pub use generate::Generator;
pub use request::{ChartKind, RenderRequest, SensorSelector, TimeWindow};
