//! Collaborators backed by local command-line tools: `yt-dlp` and `whisper`.

use super::{MediaFetcher, SpeechToText};
use crate::error::ServiceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Base name of the downloaded audio file inside the scratch directory.
const AUDIO_STEM: &str = "audio";

/// Downloads audio with `yt-dlp`, transcoding to mp3 through ffmpeg.
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch_audio(
        &self,
        reference: &str,
        scratch_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let template = scratch_dir.join(format!("{AUDIO_STEM}.%(ext)s"));

        let mut command = Command::new(&self.binary);
        command
            .args(["--no-playlist", "--quiet", "--no-progress"])
            .args(["-f", "bestaudio/best", "-x"])
            .args(["--audio-format", "mp3", "--audio-quality", "192K"])
            .arg("-o")
            .arg(&template)
            .arg(reference);

        run(&mut command, &self.binary).await?;
        find_audio(scratch_dir).await
    }
}

/// Transcribes with the openai-whisper command-line tool, on CPU.
pub struct Whisper {
    binary: PathBuf,
    model: String,
}

impl Whisper {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
        }
    }
}

impl Default for Whisper {
    fn default() -> Self {
        Self::new("whisper", "base")
    }
}

#[async_trait]
impl SpeechToText for Whisper {
    async fn transcribe(&self, audio: &Path) -> Result<String, ServiceError> {
        let output_dir = audio.parent().unwrap_or_else(|| Path::new("."));

        let mut command = Command::new(&self.binary);
        command
            .arg(audio)
            .args(["--model", self.model.as_str()])
            .args(["--device", "cpu", "--fp16", "False"])
            .args(["--output_format", "txt"])
            .arg("--output_dir")
            .arg(output_dir);

        run(&mut command, &self.binary).await?;

        let stem = audio
            .file_stem()
            .ok_or_else(|| ServiceError::process(format!("bad audio path {}", audio.display())))?;
        let transcript_path = output_dir.join(stem).with_extension("txt");

        tokio::fs::read_to_string(&transcript_path)
            .await
            .map_err(|e| {
                ServiceError::malformed(format!(
                    "whisper wrote no transcript at {}: {e}",
                    transcript_path.display()
                ))
            })
    }
}

async fn run(command: &mut Command, binary: &Path) -> Result<(), ServiceError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command = ?command, "spawning helper");

    let output = command.output().await.map_err(|e| {
        ServiceError::config(format!("failed to run {}: {e}", binary.display()))
    })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ServiceError::process(format!(
        "{} exited with {}: {}",
        binary.display(),
        output.status,
        tail(&stderr, 500)
    )))
}

async fn find_audio(dir: &Path) -> Result<PathBuf, ServiceError> {
    let expected = dir.join(format!("{AUDIO_STEM}.mp3"));
    if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
        return Ok(expected);
    }

    // Post-processing may keep a different extension.
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ServiceError::process(format!("cannot read {}: {e}", dir.display())))?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.file_stem().is_some_and(|stem| stem == AUDIO_STEM) {
            return Ok(path);
        }
    }

    Err(ServiceError::malformed("download finished but produced no audio file"))
}

fn tail(text: &str, max_chars: usize) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((start, _)) if text.chars().count() > max_chars => &text[start..],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tail() {
        assert_eq!(tail("  short \n", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 3), "abc");
    }

    #[tokio::test]
    async fn test_find_audio_prefers_mp3() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("audio.mp3"), b"id3").unwrap();
        std::fs::write(dir.path().join("audio.webm"), b"webm").unwrap();
        assert_eq!(find_audio(dir.path()).await.unwrap(), dir.path().join("audio.mp3"));
    }

    #[tokio::test]
    async fn test_find_audio_other_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("audio.m4a"), b"m4a").unwrap();
        assert_eq!(find_audio(dir.path()).await.unwrap(), dir.path().join("audio.m4a"));
    }

    #[tokio::test]
    async fn test_find_audio_missing() {
        let dir = TempDir::new().unwrap();
        assert!(find_audio(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_config_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = YtDlp::new(dir.path().join("no-such-yt-dlp"));
        let err = fetcher
            .fetch_audio("https://example.com/v", dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ServiceErrorKind::Config);
        assert!(err.message.contains("no-such-yt-dlp"));
    }
}
