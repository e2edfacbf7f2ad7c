//! Face analyzer run as a local executable.
//!
//! Invoked as `<command> detect [--anti-spoofing] <image-path>` or
//! `<command> represent <image-path>`; the reply is JSON on stdout. The
//! command may carry leading arguments, e.g. `python3 analyzer.py`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::process::Command;

use super::{
    parse_detect_reply, parse_represent_reply, AnalyzerError, DetectOptions, Detection,
    EmbeddingExtractor, FaceDetector,
};
use crate::capture::CaptureImage;
use crate::embedding::FeatureVector;

#[derive(Debug, Clone)]
pub struct CommandFaceAnalyzer {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl CommandFaceAnalyzer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    /// Split a whitespace-separated command line into program and leading arguments.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.into(),
            leading_args: parts.map(OsString::from).collect(),
            timeout,
        })
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>, AnalyzerError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                AnalyzerError::Timeout(format!(
                    "{} did not finish within {:?}",
                    self.program.display(),
                    self.timeout
                ))
            })?
            .map_err(|e| {
                AnalyzerError::Backend(format!("failed to run {}: {e}", self.program.display()))
            })?;

        // A typed error reply on stdout wins over the exit status.
        if output.status.success() || output.stdout.starts_with(b"{") {
            return Ok(output.stdout);
        }
        Err(AnalyzerError::Backend(format!(
            "{} exited with {}: {}",
            self.program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

impl FaceDetector for CommandFaceAnalyzer {
    fn detect<'a>(
        &'a self,
        image: &'a CaptureImage,
        options: DetectOptions,
    ) -> BoxFuture<'a, Result<Vec<Detection>, AnalyzerError>> {
        Box::pin(async move {
            let mut args = vec!["detect".into()];
            if options.anti_spoofing {
                args.push("--anti-spoofing".into());
            }
            args.push(image.path().as_os_str().to_owned());
            let stdout = self.run(args).await?;
            parse_detect_reply(&stdout)
        })
    }
}

impl EmbeddingExtractor for CommandFaceAnalyzer {
    fn extract<'a>(
        &'a self,
        image: &'a CaptureImage,
    ) -> BoxFuture<'a, Result<FeatureVector, AnalyzerError>> {
        Box::pin(async move {
            let args = vec!["represent".into(), image.path().as_os_str().to_owned()];
            let stdout = self.run(args).await?;
            parse_represent_reply(&stdout)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::images;
    use std::io::Write;

    /// Shell script run through `sh`, so the file never needs exec permission.
    fn analyzer_script(body: &str) -> (tempfile::TempPath, CommandFaceAnalyzer) {
        let mut file = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
        writeln!(file, "{body}").unwrap();
        let path = file.into_temp_path();
        let line = format!("sh {}", path.display());
        let analyzer = CommandFaceAnalyzer::from_command_line(&line, Duration::from_secs(10)).unwrap();
        (path, analyzer)
    }

    #[tokio::test]
    async fn detect_passes_flags_and_path() {
        let (_script, analyzer) = analyzer_script(
            r#"if [ "$1" = detect ] && [ "$2" = --anti-spoofing ] && [ -f "$3" ]; then
  echo '{"faces":[{"facial_area":{"x":1,"y":2,"w":3,"h":4},"is_real":true}]}'
else
  exit 1
fi"#,
        );
        let image = CaptureImage::decode(images::png_bytes(16, 16)).unwrap();
        let faces = analyzer
            .detect(&image, DetectOptions { anti_spoofing: true })
            .await
            .unwrap();
        assert_eq!(faces[0].is_real, Some(true));
    }

    #[tokio::test]
    async fn no_face_reply_is_typed_even_with_failing_exit_code() {
        let (_script, analyzer) = analyzer_script(r#"echo '{"error":{"kind":"no_face"}}'; exit 2"#);
        let image = CaptureImage::decode(images::png_bytes(16, 16)).unwrap();
        assert_eq!(analyzer.extract(&image).await, Err(AnalyzerError::NoFace));
    }

    #[tokio::test]
    async fn crash_without_reply_is_backend_failure() {
        let (_script, analyzer) = analyzer_script("echo boom >&2; exit 3");
        let image = CaptureImage::decode(images::png_bytes(16, 16)).unwrap();
        let err = analyzer.extract(&image).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Backend(msg) if msg.contains("boom")));
    }
}
