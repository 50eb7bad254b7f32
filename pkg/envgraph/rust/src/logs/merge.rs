// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::category::{LogCategory, LogPaths};

/// Rebuild the working copy of `category` as persistent-then-pending.
///
/// The working copy is written to a temporary file next to it and renamed into
/// place, so it is always either the previous or the new complete copy. A
/// missing segment is skipped; both missing yields an empty working copy.
pub fn merge(paths: &LogPaths, category: LogCategory) -> io::Result<PathBuf> {
    let working = paths.working(category);
    fs::create_dir_all(paths.working_dir())?;

    let tmp_path = paths.working_dir().join(format!(
        ".{}.log.{}.tmp",
        category.stem(),
        Uuid::new_v4().simple()
    ));

    let result = write_merged(
        &tmp_path,
        &paths.persistent(category),
        &paths.pending(category),
    )
    .and_then(|_| fs::rename(&tmp_path, &working));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    debug!(category = %category, path = %working.display(), "merged log segments");
    Ok(working)
}

fn write_merged(tmp_path: &Path, persistent: &Path, pending: &Path) -> io::Result<()> {
    let mut out = File::create(tmp_path)?;

    let copied = append_segment(&mut out, persistent)?;
    if copied > 0 && !ends_with_newline(persistent)? {
        // Keep the first pending record on its own line.
        out.write_all(b"\n")?;
    }
    append_segment(&mut out, pending)?;

    out.flush()
}

/// Copy `segment` into `out`, returning the number of bytes copied.
fn append_segment(out: &mut File, segment: &Path) -> io::Result<u64> {
    match File::open(segment) {
        Ok(mut file) => io::copy(&mut file, out),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %segment.display(), "log segment missing, skipping");
            Ok(0)
        }
        Err(e) => {
            warn!(path = %segment.display(), error = %e, "failed to open log segment");
            Err(e)
        }
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last.first() == Some(&b'\n'))
}
