// ffmpeg frame extractor
//
// Two pipes, each owned by the attempt:
// - input adapter: media stream -> decoder stdin
// - output accumulator: decoder stdout -> buffer
// The decoder's exit status is the completion/error signal. Dropping the
// future kills the process (kill_on_drop) and closes the media stream.

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};

use super::errors::AttemptError;
use super::traits::{FrameExtractor, MediaStream};
use super::utils::tail_lines;

const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Arguments placed before the per-capture ones
pub fn default_global_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub struct FfmpegFrameExtractor {
    program: String,
    global_args: Vec<String>,
}

impl FfmpegFrameExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: default_global_args(),
        }
    }

    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    /// Full argument list: input-side seek, one frame, PNG on stdout
    pub fn build_args(&self, timestamp_seconds: f64) -> Vec<String> {
        let mut args = self.global_args.clone();
        args.extend(
            [
                "-ss".to_string(),
                format_seek(timestamp_seconds),
                "-i".to_string(),
                "pipe:0".to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-f".to_string(),
                "image2".to_string(),
                "-q:v".to_string(),
                "2".to_string(),
                "-vcodec".to_string(),
                "png".to_string(),
                "pipe:1".to_string(),
            ]
            .into_iter(),
        );
        args
    }
}

/// Seek offset without float noise, e.g. 12.5 -> "12.5", 3.0 -> "3"
fn format_seek(seconds: f64) -> String {
    let text = format!("{:.3}", seconds);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Copy the media stream into the decoder; the decoder closing stdin early is normal
async fn feed_input(mut input: MediaStream, mut stdin: ChildStdin) -> io::Result<u64> {
    let copied = tokio::io::copy(&mut input, &mut stdin).await;
    let closed = stdin.shutdown().await;

    match (copied, closed) {
        (Err(e), _) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        (Err(_), _) => Ok(0),
        (Ok(_), Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        (Ok(n), _) => Ok(n),
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(
        &self,
        input: MediaStream,
        timestamp_seconds: f64,
    ) -> Result<Vec<u8>, AttemptError> {
        let args = self.build_args(timestamp_seconds);
        tracing::debug!(program = %self.program, args = %args.join(" "), "starting decoder");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AttemptError::Decode(format!("failed to start {}: {}", self.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AttemptError::Decode("failed to open decoder stdin".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AttemptError::Decode("failed to open decoder stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AttemptError::Decode("failed to open decoder stderr".to_string()))?;

        let feed = feed_input(input, stdin);
        tokio::pin!(feed);

        let drain = async {
            let mut image = Vec::new();
            let mut diagnostics = Vec::new();
            let (out_res, err_res, status) = tokio::join!(
                stdout.read_to_end(&mut image),
                stderr.read_to_end(&mut diagnostics),
                child.wait()
            );
            (out_res.map(|_| image), err_res.map(|_| diagnostics), status)
        };
        tokio::pin!(drain);

        // The feed may still be waiting on the network once the decoder is
        // done with its single frame; it is dropped together with this scope.
        let mut feed_result: Option<io::Result<u64>> = None;
        let (image, diagnostics, status) = loop {
            tokio::select! {
                res = &mut feed, if feed_result.is_none() => feed_result = Some(res),
                out = &mut drain => break out,
            }
        };

        let status =
            status.map_err(|e| AttemptError::Decode(format!("failed to wait on decoder: {}", e)))?;
        let image =
            image.map_err(|e| AttemptError::Decode(format!("failed to read decoder output: {}", e)))?;
        let diagnostics = diagnostics.unwrap_or_default();
        let input_error = match feed_result {
            Some(Err(e)) => Some(e),
            _ => None,
        };

        if !status.success() {
            if let Some(e) = input_error {
                return Err(AttemptError::fetch(
                    None,
                    format!("media stream interrupted: {}", e),
                ));
            }
            let detail = tail_lines(&diagnostics, 3);
            return Err(AttemptError::Decode(if detail.is_empty() {
                format!("decoder exited with {}", status)
            } else {
                format!("decoder exited with {}: {}", status, detail)
            }));
        }

        if image.is_empty() {
            if let Some(e) = input_error {
                return Err(AttemptError::fetch(
                    None,
                    format!("media stream interrupted before any frame: {}", e),
                ));
            }
            return Err(AttemptError::EmptyOutput);
        }

        if !image.starts_with(PNG_SIGNATURE) {
            return Err(AttemptError::Decode(format!(
                "decoder output is not a PNG image ({} bytes)",
                image.len()
            )));
        }

        tracing::debug!(bytes = image.len(), "decoder produced frame");
        Ok(image)
    }
}
