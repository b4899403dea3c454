use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, OnceLock, PoisonError};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::progress;
use super::{EngineResources, MediaEngine, ProgressCallback};
use crate::error::{EngineError, EngineLoadError};

/// Number of stderr bytes kept in execution errors
const STDERR_TAIL: usize = 2048;

/// Media engine backed by the ffmpeg and ffprobe executables.
///
/// Named files live in a private temporary directory created on load and
/// removed when the engine is dropped.
pub struct FfmpegEngine {
    workspace: OnceLock<Workspace>,
    progress: Mutex<Option<ProgressCallback>>,
}

struct Workspace {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    dir: TempDir,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self {
            workspace: OnceLock::new(),
            progress: Mutex::new(None),
        }
    }

    /// Directory holding the engine's named files, once loaded
    pub fn workspace_dir(&self) -> Option<&Path> {
        self.workspace.get().map(|ws| ws.dir.path())
    }

    fn loaded_workspace(&self) -> Result<&Workspace, EngineError> {
        self.workspace.get().ok_or(EngineError::NotLoaded)
    }

    fn file_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        validate_name(name)?;
        Ok(self.loaded_workspace()?.dir.path().join(name))
    }

    fn observer(&self) -> Option<ProgressCallback> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Duration of a media file in seconds, used to scale progress
    async fn probe_duration(&self, ffprobe: &Path, input: &Path) -> Option<f64> {
        let output = Command::new(ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            tracing::debug!("ffprobe could not read {}", input.display());
            return None;
        }

        progress::parse_probe_duration(&output.stdout)
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    fn is_loaded(&self) -> bool {
        self.workspace.get().is_some()
    }

    async fn load(&self, resources: &EngineResources) -> Result<(), EngineLoadError> {
        verify_executable(&resources.core).await?;
        verify_executable(&resources.probe).await?;

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("clipscribe-");
            builder
        };
        let dir = match &resources.scratch_dir {
            Some(base) => {
                fs_err::create_dir_all(base).map_err(EngineLoadError::workspace)?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .map_err(EngineLoadError::workspace)?;

        tracing::debug!("Engine workspace at {}", dir.path().display());

        // A concurrent load that finished first keeps its workspace.
        if let Err(unused) = self.workspace.set(Workspace {
            ffmpeg: resources.core.clone(),
            ffprobe: resources.probe.clone(),
            dir,
        }) {
            tracing::debug!(
                "Engine already loaded, discarding workspace {}",
                unused.dir.path().display()
            );
        }

        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, data).await?;
        tracing::debug!(name, bytes = data.len(), "Wrote engine file");
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<(), EngineError> {
        let workspace = self.loaded_workspace()?;

        let duration = match input_name(args) {
            Some(name) => {
                let path = self.file_path(name)?;
                self.probe_duration(&workspace.ffprobe, &path).await
            }
            None => None,
        };

        tracing::debug!(?args, ?duration, "Running ffmpeg");

        let mut child = Command::new(&workspace.ffmpeg)
            .current_dir(workspace.dir.path())
            .args(["-nostdin", "-y", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::ExecutionFailed("ffmpeg stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::ExecutionFailed("ffmpeg stderr unavailable".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let observer = self.observer();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let Some(observer) = &observer else {
                continue;
            };
            if progress::is_progress_end(&line) {
                observer(1.0);
            } else if let (Some(elapsed), Some(total)) = (progress::parse_out_time(&line), duration) {
                if let Some(fraction) = progress::fraction(elapsed, total) {
                    observer(fraction);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(EngineError::ExecutionFailed(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr_tail(&stderr)
            )));
        }

        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.file_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::MissingFile(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn on_progress(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

/// Check that an executable runs and reports its version
async fn verify_executable(path: &Path) -> Result<(), EngineLoadError> {
    let locator = path.display().to_string();

    let output = Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| EngineLoadError::unavailable(locator.clone(), e))?;

    if !output.status.success() {
        return Err(EngineLoadError::unavailable(
            locator,
            format!("exited with {}", output.status),
        ));
    }

    Ok(())
}

/// Engine file names are flat; anything that could leave the workspace is rejected
fn validate_name(name: &str) -> Result<(), EngineError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');

    if invalid {
        return Err(EngineError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Name following the first `-i` flag
fn input_name(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|arg| arg == "-i")
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}

fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim_end();
    if trimmed.len() <= STDERR_TAIL {
        return trimmed;
    }
    let mut start = trimmed.len() - STDERR_TAIL;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_engine() -> FfmpegEngine {
        let engine = FfmpegEngine::new();
        let _ = engine.workspace.set(Workspace {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            dir: TempDir::new().unwrap(),
        });
        engine
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("input.mp4").is_ok());
        assert!(validate_name("output.mp3").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("dir\\file").is_err());
    }

    #[test]
    fn test_input_name() {
        let args: Vec<String> = ["-i", "input.mp4", "-map", "0:a", "output.mp3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(input_name(&args), Some("input.mp4"));
        assert_eq!(input_name(&args[2..]), None);
        assert_eq!(input_name(&["-i".to_string()]), None);
    }

    #[test]
    fn test_stderr_tail() {
        assert_eq!(stderr_tail("short error\n"), "short error");
        let long = "x".repeat(STDERR_TAIL + 10);
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL);
    }

    #[tokio::test]
    async fn test_unloaded_engine_rejects_io() {
        let engine = FfmpegEngine::new();
        assert!(!engine.is_loaded());
        assert!(matches!(
            engine.write_file("input.mp4", b"data").await,
            Err(EngineError::NotLoaded)
        ));
        assert!(matches!(engine.exec(&[]).await, Err(EngineError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_load_fails_for_missing_executable() {
        let engine = FfmpegEngine::new();
        let resources = EngineResources {
            core: PathBuf::from("/nonexistent/clipscribe-ffmpeg"),
            ..EngineResources::default()
        };

        let err = engine.load(&resources).await.unwrap_err();

        assert!(matches!(err, EngineLoadError::Unavailable { .. }));
        assert!(err.to_string().contains("clipscribe-ffmpeg"));
        assert!(!engine.is_loaded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_load_keeps_first_workspace() {
        let scratch = tempfile::tempdir().unwrap();
        // `true` accepts `-version` and exits 0, standing in for both executables.
        let resources = EngineResources {
            core: PathBuf::from("true"),
            probe: PathBuf::from("true"),
            scratch_dir: Some(scratch.path().to_path_buf()),
        };
        let engine = FfmpegEngine::new();

        engine.load(&resources).await.unwrap();
        let first = engine.workspace_dir().unwrap().to_path_buf();
        assert!(first.starts_with(scratch.path()));

        engine.load(&resources).await.unwrap();

        assert_eq!(engine.workspace_dir().unwrap(), first.as_path());
        let entries: Vec<_> = std::fs::read_dir(scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries, vec![first]);
    }

    #[tokio::test]
    async fn test_files_round_trip_in_workspace() {
        let engine = loaded_engine();

        engine.write_file("input.mp4", b"video bytes").await.unwrap();

        assert_eq!(engine.read_file("input.mp4").await.unwrap(), b"video bytes");
        assert!(engine.workspace_dir().unwrap().join("input.mp4").exists());
        assert!(matches!(
            engine.read_file("output.mp3").await,
            Err(EngineError::MissingFile(name)) if name == "output.mp3"
        ));
        assert!(matches!(
            engine.write_file("../escape", b"x").await,
            Err(EngineError::InvalidName(_))
        ));
    }
}
