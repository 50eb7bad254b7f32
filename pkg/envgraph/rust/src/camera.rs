// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Camera capture lookup.
//!
//! Capture files are written by an external collaborator with time-ordered
//! names, so the newest capture is the greatest file name.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::request::ChartKind;

/// Directory a camera kind reads from. Non-camera kinds have none.
pub fn capture_dir(config: &Config, kind: ChartKind) -> Option<&Path> {
    match kind {
        ChartKind::CamStill => Some(config.still_dir.as_path()),
        ChartKind::CamHdr => Some(config.hdr_dir.as_path()),
        _ => None,
    }
}

/// Most recent capture in `dir`, skipping hidden and in-progress files.
///
/// A missing or empty directory yields `None`.
pub fn newest_capture(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<(String, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') || name.ends_with(".tmp") {
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }
        if newest.as_ref().is_none_or(|(best, _)| name > *best) {
            newest = Some((name, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Image content type for a capture, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_newest_by_name() {
        let dir = TempDir::new().unwrap();
        for name in [
            "still-20260314-100000.jpg",
            "still-20260314-120000.jpg",
            "still-20260313-235959.jpg",
        ] {
            std::fs::write(dir.path().join(name), b"jpg").unwrap();
        }
        let newest = newest_capture(dir.path()).unwrap().unwrap();
        assert_eq!(newest, dir.path().join("still-20260314-120000.jpg"));
    }

    #[test]
    fn test_skips_hidden_temp_and_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("still-1.jpg"), b"jpg").unwrap();
        std::fs::write(dir.path().join(".still-9.jpg"), b"jpg").unwrap();
        std::fs::write(dir.path().join("still-8.jpg.tmp"), b"jpg").unwrap();
        std::fs::create_dir(dir.path().join("still-7")).unwrap();

        let newest = newest_capture(dir.path()).unwrap().unwrap();
        assert_eq!(newest, dir.path().join("still-1.jpg"));
    }

    #[test]
    fn test_empty_and_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(newest_capture(dir.path()).unwrap().is_none());
        assert!(newest_capture(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("a")), "image/jpeg");
    }

    #[test]
    fn test_hdr_reads_its_own_dir() {
        let config = Config {
            still_dir: PathBuf::from("/cam/still"),
            hdr_dir: PathBuf::from("/cam/hdr"),
            ..Config::default()
        };
        assert_eq!(capture_dir(&config, ChartKind::CamHdr), Some(Path::new("/cam/hdr")));
        assert_eq!(capture_dir(&config, ChartKind::CamStill), Some(Path::new("/cam/still")));
        assert_eq!(capture_dir(&config, ChartKind::Combined), None);
    }
}
