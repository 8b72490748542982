// Error types for the frame-capture pipeline
//
// Two layers:
// - AttemptError: something went wrong with one candidate format. Always
//   recovered by the orchestrator, never returned to the caller as-is.
// - CaptureError: the terminal classification of a whole request.

use std::time::Duration;

use thiserror::Error;

/// Stage of a candidate attempt at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    Resolve,
    Fetch,
    Decode,
}

impl AttemptStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Decode => "decode",
        }
    }
}

/// Failure of a single candidate attempt
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    /// URL descrambling / signature resolution failed
    #[error("signature resolution failed: {0}")]
    Signature(String),

    /// The media stream could not be opened (non-success status, no body, network error)
    #[error("stream fetch failed{}: {reason}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Fetch { status: Option<u16>, reason: String },

    /// The decoding process failed or produced something that is not an image
    #[error("decoding failed: {0}")]
    Decode(String),

    /// The decoder finished cleanly but emitted zero bytes
    #[error("decoder completed without producing any image data")]
    EmptyOutput,

    /// The attempt did not finish within the per-attempt timeout
    #[error("attempt timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl AttemptError {
    pub fn fetch(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            status,
            reason: reason.into(),
        }
    }

    pub fn stage(&self) -> AttemptStage {
        match self {
            Self::Signature(_) => AttemptStage::Resolve,
            Self::Fetch { .. } | Self::TimedOut(_) => AttemptStage::Fetch,
            Self::Decode(_) | Self::EmptyOutput => AttemptStage::Decode,
        }
    }

    /// HTTP status carried by a fetch failure, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }
}

/// Stable classification of a failed capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidRequest,
    MetadataError,
    NoPlayableFormats,
    Exhausted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::MetadataError => "metadata_error",
            Self::NoPlayableFormats => "no_playable_formats",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Terminal failure of a capture request
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// Malformed input; detected before any network I/O
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The platform lookup itself failed (network, parse, session bootstrap)
    #[error("metadata lookup failed: {0}")]
    Metadata(String),

    /// Lookup succeeded but nothing usable was offered
    #[error("no playable formats: {0}")]
    NoPlayableFormats(String),

    /// Every candidate was attempted and none produced a frame
    #[error("all {} candidate formats failed", attempted.len())]
    Exhausted {
        /// Attempted format ids, in attempt order
        attempted: Vec<String>,
        /// One line per attempt: "<id>: <stage>: <reason>"
        failures: Vec<String>,
    },
}

impl CaptureError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::Metadata(_) => FailureKind::MetadataError,
            Self::NoPlayableFormats(_) => FailureKind::NoPlayableFormats,
            Self::Exhausted { .. } => FailureKind::Exhausted,
        }
    }

    pub fn attempted_format_ids(&self) -> Option<&[String]> {
        match self {
            Self::Exhausted { attempted, .. } => Some(attempted),
            _ => None,
        }
    }
}
