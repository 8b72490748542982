// Fallback orchestrator
//
// Init -> list candidates -> (resolve -> fetch -> decode) per candidate -> first success
// Per-candidate failures are logged and skipped; only request-level errors surface.

use std::time::Duration;

use super::diagnostics::{diagnose_error, BlockingReason};
use super::errors::{AttemptError, CaptureError};
use super::extractor::FfmpegFrameExtractor;
use super::fetcher::HttpStreamFetcher;
use super::models::{AttemptResult, CandidateFormat, CaptureRequest, CapturedFrame, PlaybackContext};
use super::resolvers::{InnertubeResolver, InnertubeSettings, ResolverKind, YtDlpResolver, YtDlpSettings};
use super::tools::{ToolManager, ToolType};
use super::traits::{FrameExtractor, MediaResolver, StreamFetcher};
use crate::config::CaptureConfig;

pub struct FrameCapturer {
    resolver: Box<dyn MediaResolver>,
    fetcher: Box<dyn StreamFetcher>,
    extractor: Box<dyn FrameExtractor>,
    attempt_timeout: Duration,
}

impl FrameCapturer {
    pub fn new(
        resolver: Box<dyn MediaResolver>,
        fetcher: Box<dyn StreamFetcher>,
        extractor: Box<dyn FrameExtractor>,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            extractor,
            attempt_timeout: Duration::from_secs(90),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Wire the production components described by `config`
    pub fn from_config(config: &CaptureConfig) -> Result<Self, String> {
        let tools = ToolManager::new();

        let resolver: Box<dyn MediaResolver> = match config.resolver {
            ResolverKind::Innertube => Box::new(InnertubeResolver::new(InnertubeSettings {
                api_base: config.api_base.clone(),
                profile: config.client,
                proxy: config.proxy.clone(),
                timeout_seconds: config.metadata_timeout_secs,
            })),
            ResolverKind::YtDlp => Box::new(YtDlpResolver::new(YtDlpSettings {
                ytdlp_path: config
                    .ytdlp_path
                    .clone()
                    .unwrap_or_else(|| tools.resolve_path(ToolType::YtDlp)),
                proxy: config.proxy.clone(),
                timeout_seconds: config.metadata_timeout_secs,
                ..YtDlpSettings::default()
            })),
        };

        let client = HttpStreamFetcher::build_client(config.proxy.as_deref())?;
        let fetcher = HttpStreamFetcher::new(client, config.origin.clone());

        let ffmpeg = config
            .ffmpeg_path
            .clone()
            .unwrap_or_else(|| tools.resolve_path(ToolType::Ffmpeg));
        tracing::info!(resolver = %config.resolver, decoder = %ffmpeg, "frame capturer configured");

        Ok(Self::new(
            resolver,
            Box::new(fetcher),
            Box::new(FfmpegFrameExtractor::new(ffmpeg)),
        )
        .with_attempt_timeout(Duration::from_secs(config.attempt_timeout_secs)))
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    /// Capture one frame, trying candidates strictly in priority order
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CapturedFrame, CaptureError> {
        let video_id = request.video_id();
        tracing::info!(
            video_id,
            timestamp = request.timestamp_seconds(),
            resolver = self.resolver.name(),
            "capture requested"
        );

        let set = self.resolver.list_candidates(video_id).await.map_err(|e| {
            tracing::warn!(video_id, kind = e.kind().as_str(), error = %e, "candidate lookup failed");
            e
        })?;

        if set.candidates.is_empty() {
            return Err(CaptureError::NoPlayableFormats(format!(
                "no candidate formats for {}",
                video_id
            )));
        }

        let total = set.candidates.len();
        let mut attempted = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (index, format) in set.candidates.into_iter().enumerate() {
            tracing::info!(
                video_id,
                format = %format.label(),
                attempt = index + 1,
                of = total,
                "trying candidate"
            );
            attempted.push(format.format_id.clone());

            let outcome = self.attempt(request, &format, &set.context).await;
            let result = AttemptResult { format, outcome };

            match result.outcome {
                Ok(png) => {
                    tracing::info!(
                        video_id,
                        format_id = %result.format.format_id,
                        bytes = png.len(),
                        "frame captured"
                    );
                    return Ok(CapturedFrame {
                        png,
                        format_id: result.format.format_id,
                    });
                }
                Err(e) => {
                    let hint = diagnose_error(&e.to_string())
                        .or_else(|| e.http_status().and_then(BlockingReason::from_status))
                        .map(|reason| reason.description())
                        .unwrap_or("");
                    tracing::warn!(
                        video_id,
                        format_id = %result.format.format_id,
                        stage = e.stage().as_str(),
                        http_status = e.http_status(),
                        hint,
                        error = %e,
                        "candidate failed, moving on"
                    );
                    failures.push(format!(
                        "{}: {}: {}",
                        result.format.format_id,
                        e.stage().as_str(),
                        e
                    ));
                }
            }
        }

        tracing::error!(video_id, attempted = ?attempted, "all candidates failed");
        Err(CaptureError::Exhausted {
            attempted,
            failures,
        })
    }

    /// One candidate, bounded by the per-attempt timeout. Dropping the inner
    /// future on timeout closes the stream and kills the decoder.
    async fn attempt(
        &self,
        request: &CaptureRequest,
        format: &CandidateFormat,
        context: &PlaybackContext,
    ) -> Result<Vec<u8>, AttemptError> {
        let work = async {
            let url = self.resolver.resolve_url(format).await?;
            let stream = self.fetcher.open_stream(&url, context).await?;
            self.extractor
                .extract_frame(stream, request.timestamp_seconds())
                .await
        };

        match tokio::time::timeout(self.attempt_timeout, work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AttemptError::TimedOut(self.attempt_timeout)),
        }
    }
}
