// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

use crate::renderer::RenderError;
use crate::request::ValidationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
