// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Session fingerprints and the mint-or-reuse decision.
//!
//! A fingerprint scopes the artifacts of one dashboard session. It lives in
//! the client's `id` cookie and ends up in artifact file names, so only a
//! restricted alphabet is accepted back from the client.

use std::fmt;
use uuid::Uuid;

use crate::request::ValidationError;

const MAX_FINGERPRINT_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Mint a fresh, unique fingerprint.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a client-supplied fingerprint: 1-64 ASCII alphanumerics, `-` or `_`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let valid = !s.is_empty()
            && s.len() <= MAX_FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidFingerprint)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of the session trigger for one dashboard view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDecision {
    pub fingerprint: Fingerprint,
    /// The render cycle must regenerate every chart.
    pub must_regenerate: bool,
    /// The fingerprint is new and has to be handed back to the client.
    pub minted: bool,
}

/// Reuse the held fingerprint unless there is none or a new graph was asked for.
pub fn decide(existing: Option<Fingerprint>, regenerate: bool) -> SessionDecision {
    match existing {
        Some(fingerprint) if !regenerate => SessionDecision {
            fingerprint,
            must_regenerate: false,
            minted: false,
        },
        _ => SessionDecision {
            fingerprint: Fingerprint::mint(),
            must_regenerate: true,
            minted: true,
        },
    }
}
