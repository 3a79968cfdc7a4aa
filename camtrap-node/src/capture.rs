//! Capture pipeline adapter
//!
//! Image capture and inference are external programs. The cycle only
//! needs the detector's stdout, which it publishes verbatim.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

/// Capture or detector failure. Never fatal to the cycle.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to start {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command:?} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Take a picture and run detection on it
#[async_trait::async_trait]
pub trait CapturePipeline: Send {
    /// Returns the detector output
    async fn capture(&mut self) -> Result<String, CaptureError>;
}

/// Pipeline made of two shell commands
#[derive(Debug, Clone)]
pub struct ShellCapture {
    capture: String,
    detector: String,
}

impl ShellCapture {
    /// Both commands run under `sh -c`, capture first
    pub fn new(capture: impl Into<String>, detector: impl Into<String>) -> Self {
        Self {
            capture: capture.into(),
            detector: detector.into(),
        }
    }
}

#[async_trait::async_trait]
impl CapturePipeline for ShellCapture {
    async fn capture(&mut self) -> Result<String, CaptureError> {
        run_shell(&self.capture).await?;
        log::info!("Image captured");
        let output = run_shell(&self.detector).await?;
        log::info!("Detector output: {}", output.trim_end());
        Ok(output)
    }
}

async fn run_shell(command: &str) -> Result<String, CaptureError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CaptureError::Spawn {
            command: command.to_owned(),
            source,
        })?;

    if !output.status.success() {
        return Err(CaptureError::Failed {
            command: command.to_owned(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detector_stdout_is_returned() {
        let mut pipeline = ShellCapture::new("true", "printf 'cat 0.91\\n'");
        assert_eq!(pipeline.capture().await.unwrap(), "cat 0.91\n");
    }

    #[tokio::test]
    async fn test_failed_capture_skips_detector() {
        let mut pipeline = ShellCapture::new("echo no camera >&2; exit 3", "echo ran");
        match pipeline.capture().await {
            Err(CaptureError::Failed { command, stderr, .. }) => {
                assert!(command.starts_with("echo no camera"));
                assert_eq!(stderr, "no camera");
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
    }
}
