//! Local text extraction

use crate::error::{Result, VisionError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Extracts printed text from an image file.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, image_path: &Path) -> Result<String>;

    fn engine_name(&self) -> &str;
}

/// Runs the `tesseract` executable as `tesseract <image> stdout [-l <lang>]`.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    language: Option<String>,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_binary(self, binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..self
        }
    }

    pub fn with_language(self, language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract_text(&self, image_path: &Path) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .arg(image_path)
            .arg("stdout")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(language) = &self.language {
            command.arg("-l").arg(language);
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| VisionError::Ocr(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| {
                VisionError::Ocr(format!("could not run {}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            return Err(VisionError::Ocr(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn engine_name(&self) -> &str {
        "tesseract"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_ocr_error() {
        let ocr = TesseractOcr::new().with_binary("memora-missing-tesseract-binary");
        let result = ocr.extract_text(Path::new("photo.png")).await;
        assert!(matches!(result, Err(VisionError::Ocr(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_stdout_of_engine() -> anyhow::Result<()> {
        // `echo` stands in for tesseract and prints its own arguments.
        let ocr = TesseractOcr::new().with_binary("echo").with_language("eng");
        let text = ocr.extract_text(Path::new("/tmp/receipt.png")).await?;
        assert_eq!(text, "/tmp/receipt.png stdout -l eng");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_ocr_error() {
        let ocr = TesseractOcr::new().with_binary("false");
        let result = ocr.extract_text(Path::new("photo.png")).await;
        assert!(matches!(result, Err(VisionError::Ocr(_))));
    }
}
