// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! External plotting-engine invocation.
//!
//! The renderer never writes to an artifact's final path. Output goes to a
//! hidden temporary file in the artifact directory and is renamed into place
//! only after the process exits cleanly, leaves stderr empty and produces a
//! non-empty file.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::script::Script;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to spawn renderer `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("renderer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("renderer reported errors: {0}")]
    Stderr(String),

    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    #[error("renderer produced no output for {0}")]
    MissingOutput(String),

    #[error("renderer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Runs the plotting engine with a script on stdin.
#[derive(Debug, Clone)]
pub struct Renderer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Renderer {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.renderer.command.clone(),
            config.renderer.args.clone(),
            config.renderer.timeout(),
        )
    }

    /// Render `script` into `dir`, returning the final artifact path.
    ///
    /// On failure no file is left at the final path by this call and the
    /// temporary output is removed. Concurrent renders of the same script
    /// each succeed and the last rename wins; readers only ever see a
    /// complete file.
    pub async fn render(&self, script: &Script, dir: &Path) -> Result<PathBuf, RenderError> {
        let target = dir.join(&script.file_name);
        let tmp = dir.join(format!(
            ".{}.{}.tmp",
            script.file_name,
            uuid::Uuid::new_v4().simple()
        ));
        let started = Instant::now();

        let result = self.run(script, &tmp).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&tmp, &target)
                .await
                .map_err(RenderError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(
                    artifact = %target.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "rendered chart"
                );
                Ok(target)
            }
            Err(e) => {
                discard(&tmp).await;
                warn!(artifact = %script.file_name, error = %e, "render failed");
                Err(e)
            }
        }
    }

    async fn run(&self, script: &Script, output: &Path) -> Result<(), RenderError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let text = script.text(output);
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("renderer stdin was not captured"))?;

        let wait = async move {
            match stdin.write_all(text.as_bytes()).await {
                // The process may exit before reading everything; its exit
                // status decides the outcome.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("renderer closed stdin early");
                }
                other => other?,
            }
            drop(stdin);
            child.wait_with_output().await
        };

        let output_status = tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))??;

        let stderr = String::from_utf8_lossy(&output_status.stderr)
            .trim()
            .to_string();
        if !output_status.status.success() {
            return Err(RenderError::Exit {
                status: output_status.status.to_string(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            return Err(RenderError::Stderr(stderr));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(RenderError::MissingOutput(script.file_name.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RenderError::MissingOutput(script.file_name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove render temp file"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::request::{ChartKind, RenderRequest};
    use crate::script::{self, ChartStyle, SeriesSources};
    use tempfile::TempDir;

    /// Shell snippet that extracts the output path from the script on stdin.
    const READ_OUTPUT: &str = r#"out=$(sed -n 's/^set output "\(.*\)"$/\1/p')"#;

    pub(crate) fn fake(body: &str) -> Renderer {
        Renderer::new(
            "/bin/sh",
            vec!["-c".to_string(), format!("{READ_OUTPUT}; {body}")],
            Duration::from_secs(5),
        )
    }

    /// A renderer that writes a small PNG-like payload.
    pub(crate) fn ok_renderer() -> Renderer {
        fake(r#"printf '\211PNG-fake' > "$out""#)
    }

    fn legend_script() -> Script {
        let request = RenderRequest::legend(ChartKind::LegendSmall, Fingerprint::mint());
        script::build(
            &request,
            &SeriesSources::default(),
            &ChartStyle {
                width: 900,
                relay_labels: vec![],
            },
            chrono::Local::now().naive_local(),
        )
        .unwrap()
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_successful_render_is_renamed_into_place() {
        let dir = TempDir::new().unwrap();
        let script = legend_script();

        let path = ok_renderer().render(&script, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join(&script.file_name));
        assert!(std::fs::read(&path).unwrap().ends_with(b"PNG-fake"));
        assert_eq!(entries(dir.path()), vec![script.file_name.clone()]);
    }

    #[tokio::test]
    async fn test_concurrent_renders_of_same_target_both_succeed() {
        let dir = TempDir::new().unwrap();
        let script = legend_script();
        // Write in two steps with a pause so the renders overlap.
        let renderer = fake(r#"printf '\211PNG' > "$out"; sleep 0.2; printf '%s' -full >> "$out""#);

        let (first, second) = tokio::join!(
            renderer.render(&script, dir.path()),
            renderer.render(&script, dir.path())
        );

        let target = dir.path().join(&script.file_name);
        assert_eq!(first.unwrap(), target);
        assert_eq!(second.unwrap(), target);
        assert_eq!(entries(dir.path()), vec![script.file_name.clone()]);
        assert_eq!(std::fs::read(&target).unwrap(), b"\x89PNG-full");
    }

    #[tokio::test]
    async fn test_partial_write_then_failure_publishes_nothing() {
        let dir = TempDir::new().unwrap();
        let script = legend_script();
        let renderer = fake(r#"printf 'PART' > "$out"; exit 1"#);

        let err = renderer.render(&script, dir.path()).await.unwrap_err();

        assert!(matches!(err, RenderError::Exit { .. }));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_stderr_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let renderer = fake(r#"printf 'PNG' > "$out"; echo 'warning: bad range' >&2"#);

        let err = renderer
            .render(&legend_script(), dir.path())
            .await
            .unwrap_err();

        match err {
            RenderError::Stderr(msg) => assert_eq!(msg, "warning: bad range"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let renderer = fake("true");

        let err = renderer
            .render(&legend_script(), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let renderer = Renderer::new(
            "/bin/sh",
            vec![
                "-c".to_string(),
                format!(r#"{READ_OUTPUT}; printf 'PART' > "$out"; sleep 10"#),
            ],
            Duration::from_millis(300),
        );

        let err = renderer
            .render(&legend_script(), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Timeout(_)));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let renderer = Renderer::new(
            "/nonexistent/envgraph-renderer",
            vec![],
            Duration::from_secs(1),
        );

        let err = renderer
            .render(&legend_script(), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_existing_artifact_untouched_by_failed_render() {
        let dir = TempDir::new().unwrap();
        let script = legend_script();
        let target = dir.path().join(&script.file_name);
        std::fs::write(&target, b"previous").unwrap();

        let renderer = fake(r#"printf 'PART' > "$out"; exit 2"#);
        renderer.render(&script, dir.path()).await.unwrap_err();

        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    }
}
