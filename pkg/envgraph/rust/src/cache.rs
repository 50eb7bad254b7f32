// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Artifact cache backed by the artifact directory.
//!
//! The directory listing is the only state. An artifact's creation time is
//! its modification time: artifacts are renamed into place once and never
//! rewritten.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::request::ArtifactKey;

const ARTIFACT_PREFIX: &str = "graph-";
const ARTIFACT_EXTENSION: &str = ".png";

/// A rendered chart image present in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub key: ArtifactKey,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.artifact_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the artifact directory if it does not exist yet.
    pub fn ensure_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn lookup(&self, key: &ArtifactKey) -> io::Result<Option<Artifact>> {
        let path = self.path_for(key);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(Artifact {
                created_at: meta.modified()?,
                path,
                key: key.clone(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record an artifact the renderer has already renamed into place.
    ///
    /// Publishing the same key again returns the artifact as it stands.
    pub fn publish(&self, key: &ArtifactKey) -> io::Result<Artifact> {
        let artifact = self.lookup(key)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("artifact {} is not in the cache", key.file_name()),
            )
        })?;
        debug!(artifact = %artifact.path.display(), "published artifact");
        Ok(artifact)
    }

    /// Artifact files currently in the directory, oldest first.
    ///
    /// Ties on modification time are ordered by file name.
    pub fn list(&self) -> io::Result<Vec<(PathBuf, SystemTime)>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_artifact_name(name) {
                continue;
            }
            // Entries can vanish between listing and stat under concurrent eviction.
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    debug!(file = name, error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            files.push((entry.path(), meta.modified()?));
        }

        files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(files)
    }

    /// Delete the oldest artifacts until at most `cap` remain.
    ///
    /// Returns the number of files removed. A file that cannot be removed is
    /// logged and skipped.
    pub fn evict(&self, cap: usize) -> io::Result<usize> {
        let files = self.list()?;
        if files.len() <= cap {
            return Ok(0);
        }

        let excess = files.len() - cap;
        let mut removed = 0;
        for (path, _) in files.into_iter().take(excess) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to evict artifact")
                }
            }
        }

        if removed > 0 {
            info!(removed, cap, "evicted cached artifacts");
        }
        Ok(removed)
    }
}

fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::request::{ChartKind, Preset, RenderRequest, SensorCategory};
    use proptest::prelude::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn key(i: usize) -> ArtifactKey {
        RenderRequest::legend(
            ChartKind::LegendFull,
            Fingerprint::parse(&format!("fp{i:03}")).unwrap(),
        )
        .key()
        .unwrap()
    }

    /// Write an artifact file for `key` with a modification time `age` seconds
    /// after a fixed epoch.
    fn put(cache: &ArtifactCache, key: &ArtifactKey, age: u64) {
        let path = cache.path_for(key);
        std::fs::write(&path, b"png").unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + age))
            .unwrap();
    }

    fn setup() -> (TempDir, ArtifactCache) {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path());
        (dir, cache)
    }

    #[test]
    fn test_lookup_absent() {
        let (_dir, cache) = setup();
        assert!(cache.lookup(&key(1)).unwrap().is_none());
    }

    #[test]
    fn test_lookup_after_publish() {
        let (_dir, cache) = setup();
        let k = RenderRequest::separate(
            SensorCategory::Ht,
            Preset::Day1,
            2,
            Fingerprint::parse("abc").unwrap(),
        )
        .key()
        .unwrap();
        put(&cache, &k, 5);

        let published = cache.publish(&k).unwrap();
        let found = cache.lookup(&k).unwrap().unwrap();

        assert_eq!(published, found);
        assert_eq!(found.path, cache.dir().join("graph-htseparate1d-abc-2.png"));
        assert_eq!(found.key, k);
    }

    #[test]
    fn test_publish_is_idempotent() {
        let (_dir, cache) = setup();
        put(&cache, &key(1), 1);
        let first = cache.publish(&key(1)).unwrap();
        let second = cache.publish(&key(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.list().unwrap().len(), 1);
    }

    #[test]
    fn test_publish_missing_file_fails() {
        let (_dir, cache) = setup();
        let err = cache.publish(&key(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_evict_keeps_newest() {
        let (_dir, cache) = setup();
        for i in 0..25 {
            put(&cache, &key(i), i as u64);
        }

        assert_eq!(cache.evict(20).unwrap(), 5);

        let remaining = cache.list().unwrap();
        assert_eq!(remaining.len(), 20);
        for i in 0..5 {
            assert!(cache.lookup(&key(i)).unwrap().is_none(), "fp{i:03} kept");
        }
        for i in 5..25 {
            assert!(cache.lookup(&key(i)).unwrap().is_some(), "fp{i:03} evicted");
        }
    }

    #[test]
    fn test_evict_under_cap_is_noop() {
        let (_dir, cache) = setup();
        for i in 0..3 {
            put(&cache, &key(i), i as u64);
        }
        assert_eq!(cache.evict(20).unwrap(), 0);
        assert_eq!(cache.list().unwrap().len(), 3);
    }

    #[test]
    fn test_evict_ignores_foreign_and_temp_files() {
        let (dir, cache) = setup();
        put(&cache, &key(0), 0);
        put(&cache, &key(1), 1);
        std::fs::write(dir.path().join(".graph-legend-full-x.png.0a1b.tmp"), b"part").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(cache.evict(1).unwrap(), 1);

        assert!(dir.path().join(".graph-legend-full-x.png.0a1b.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(cache.lookup(&key(1)).unwrap().is_some());
    }

    #[test]
    fn test_evict_missing_dir() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path().join("absent"));
        assert_eq!(cache.evict(20).unwrap(), 0);
    }

    #[test]
    fn test_ties_broken_by_name() {
        let (_dir, cache) = setup();
        put(&cache, &key(2), 7);
        put(&cache, &key(1), 7);
        let names: Vec<_> = cache
            .list()
            .unwrap()
            .into_iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["graph-legend-full-fp001.png", "graph-legend-full-fp002.png"]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_evict_retains_exactly_newest(count in 0usize..40, cap in 0usize..30) {
            let (_dir, cache) = setup();
            for i in 0..count {
                put(&cache, &key(i), i as u64);
            }

            cache.evict(cap).unwrap();

            let kept = cache.list().unwrap().len();
            prop_assert!(kept <= cap);
            prop_assert_eq!(kept, count.min(cap));
            for i in 0..count {
                let present = cache.lookup(&key(i)).unwrap().is_some();
                prop_assert_eq!(present, i >= count.saturating_sub(cap));
            }
        }
    }
}
