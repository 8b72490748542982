// Data models for the frame-capture pipeline

use serde::{Deserialize, Serialize};

use super::errors::{AttemptError, CaptureError};

/// Validated capture request
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    video_id: String,
    timestamp_seconds: f64,
}

impl CaptureRequest {
    pub fn new(video_id: impl Into<String>, timestamp_seconds: f64) -> Result<Self, CaptureError> {
        let video_id = video_id.into().trim().to_string();
        if video_id.is_empty() {
            return Err(CaptureError::InvalidRequest(
                "videoId is required".to_string(),
            ));
        }
        if !timestamp_seconds.is_finite() || timestamp_seconds < 0.0 {
            return Err(CaptureError::InvalidRequest(format!(
                "timestamp must be a finite, non-negative number of seconds (got {})",
                timestamp_seconds
            )));
        }

        Ok(Self {
            video_id,
            timestamp_seconds,
        })
    }

    /// Build from raw query parameters
    pub fn parse(video_id: Option<&str>, timestamp: Option<&str>) -> Result<Self, CaptureError> {
        let video_id = video_id.unwrap_or_default();
        let timestamp = timestamp.map(str::trim).unwrap_or_default();
        if timestamp.is_empty() {
            return Err(CaptureError::InvalidRequest(
                "timestamp is required".to_string(),
            ));
        }
        let seconds: f64 = timestamp.parse().map_err(|_| {
            CaptureError::InvalidRequest(format!("timestamp is not a number: {:?}", timestamp))
        })?;

        Self::new(video_id, seconds)
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_seconds
    }

    /// File name offered to clients, e.g. `frame_abc12345678_12.50s.png`
    pub fn suggested_filename(&self) -> String {
        let safe_id: String = self
            .video_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        format!("frame_{}_{:.2}s.png", safe_id, self.timestamp_seconds)
    }
}

/// One streamable representation of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFormat {
    /// Platform format id (itag)
    pub format_id: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Vertical resolution; unknown sorts as 0
    pub height: Option<u32>,
    pub mime_type: String,
    /// DRM or rights-constrained
    pub is_restricted: bool,
    /// Ready-to-fetch URL, when the platform provides one
    pub url: Option<String>,
    /// Scrambled descriptor that must be resolved against the player
    pub signature_cipher: Option<String>,
}

impl CandidateFormat {
    /// Audio and video in a single stream
    pub fn is_progressive(&self) -> bool {
        self.has_video && self.has_audio
    }

    pub fn sort_height(&self) -> u32 {
        self.height.unwrap_or(0)
    }

    pub fn label(&self) -> String {
        let kind = if self.is_progressive() {
            "progressive"
        } else {
            "adaptive"
        };
        match self.height {
            Some(h) => format!("{} {}p {}", self.format_id, h, kind),
            None => format!("{} {}", self.format_id, kind),
        }
    }
}

/// Client context derived during resolution, reused when fetching streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackContext {
    /// Client profile name used for the lookup (e.g. "ANDROID")
    pub client_name: Option<String>,
    /// User agent consistent with that client
    pub user_agent: Option<String>,
    /// Content-playback-nonce for CDN requests
    pub playback_nonce: Option<String>,
}

/// Ordered, filtered candidates for one video
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<CandidateFormat>,
    pub context: PlaybackContext,
}

/// Outcome of one candidate attempt; never persisted
#[derive(Debug)]
pub struct AttemptResult {
    pub format: CandidateFormat,
    pub outcome: Result<Vec<u8>, AttemptError>,
}

/// Successful capture
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub png: Vec<u8>,
    /// Format that produced the frame
    pub format_id: String,
}
