// Capability traits for the three pipeline stages
//
// The orchestrator only knows these seams, so resolution strategies,
// transports and decoders can be swapped without touching fallback logic.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::errors::{AttemptError, CaptureError};
use super::models::{CandidateFormat, CandidateSet, PlaybackContext};

/// Sequential, back-pressured media byte source owned by one attempt
pub type MediaStream = Box<dyn AsyncRead + Send + Unpin>;

/// Turns a video id into ordered candidates and candidates into URLs
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Name of the resolver (for logging)
    fn name(&self) -> &'static str;

    /// Filtered, prioritized candidates for a video
    async fn list_candidates(&self, video_id: &str) -> Result<CandidateSet, CaptureError>;

    /// Directly fetchable URL for one candidate
    async fn resolve_url(&self, candidate: &CandidateFormat) -> Result<String, AttemptError>;
}

/// Opens a media byte stream for a resolved URL
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn open_stream(
        &self,
        url: &str,
        context: &PlaybackContext,
    ) -> Result<MediaStream, AttemptError>;
}

/// Seeks into a media stream and encodes exactly one frame as PNG
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(
        &self,
        input: MediaStream,
        timestamp_seconds: f64,
    ) -> Result<Vec<u8>, AttemptError>;
}
