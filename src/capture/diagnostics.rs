// Failure hints - a best guess at why a lookup, stream or decode failed
//
// Hints only decorate logs and NoPlayableFormats reasons; they never change
// which candidate is tried next.

/// Likely cause behind a failure message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingReason {
    /// Widevine / PlayReady / FairPlay, purchases and rentals
    DrmProtected,
    PrivateVideo,
    VideoUnavailable,
    /// Sign-in wall for age-gated videos
    AgeRestricted,
    /// Sign-in wall raised by bot detection
    BotDetection,
    /// The client profile needs a proof-of-origin token
    PoTokenRequired,
    GeoBlocked,
    /// Live streams and premieres have no seekable progressive file
    LiveStream,
    RateLimited,
    /// Expired or mismatched signature, missing nonce, wrong client
    Http403Forbidden,
    /// Stream ended before the decoder found the index or the frame
    TruncatedMedia,
    /// Decoder cannot read the track's codec
    UnsupportedCodec,
    NetworkTimeout,
}

/// Matching order matters: permanent causes first, transport causes last
const RULES: &[(BlockingReason, &[&str])] = &[
    (
        BlockingReason::DrmProtected,
        &["drm", "widevine", "playready", "fairplay", "requires purchase", "rental"],
    ),
    (
        BlockingReason::PrivateVideo,
        &["private video", "video is private", "granted access"],
    ),
    (
        BlockingReason::VideoUnavailable,
        &["video unavailable", "video is unavailable", "has been removed", "no longer available"],
    ),
    (
        BlockingReason::AgeRestricted,
        &["age-restricted", "confirm your age", "age_verification", "age_check_required"],
    ),
    (
        BlockingReason::BotDetection,
        &["not a bot", "captcha", "unusual traffic"],
    ),
    (
        BlockingReason::PoTokenRequired,
        &["po token", "po_token", "proof of origin"],
    ),
    (
        BlockingReason::GeoBlocked,
        &["not available in your country", "blocked in your country"],
    ),
    (
        BlockingReason::LiveStream,
        &["live stream", "live event", "premiere", "is_live"],
    ),
    (
        BlockingReason::RateLimited,
        &["http 429", "too many requests", "rate limit"],
    ),
    (BlockingReason::Http403Forbidden, &["http 403", "forbidden"]),
    (
        BlockingReason::TruncatedMedia,
        &[
            "moov atom not found",
            "invalid data found when processing input",
            "stream interrupted",
            "end of file",
        ],
    ),
    (
        BlockingReason::UnsupportedCodec,
        &["decoder not found", "unknown codec", "unsupported codec"],
    ),
    (
        BlockingReason::NetworkTimeout,
        &["timed out", "timeout", "connection refused", "connection reset", "network unreachable"],
    ),
];

impl BlockingReason {
    /// Nothing any candidate or client profile can work around
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::PrivateVideo | Self::VideoUnavailable | Self::LiveStream
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::PrivateVideo => "private video",
            Self::VideoUnavailable => "video unavailable",
            Self::AgeRestricted => "age-restricted, sign-in required",
            Self::BotDetection => "bot detection triggered, try another client profile or proxy",
            Self::PoTokenRequired => "proof-of-origin token required by this client profile",
            Self::GeoBlocked => "not available from this region",
            Self::LiveStream => "live or upcoming stream",
            Self::RateLimited => "rate limited by the platform",
            Self::Http403Forbidden => "CDN refused the stream (signature, nonce or client mismatch)",
            Self::TruncatedMedia => "media ended before a frame could be decoded",
            Self::UnsupportedCodec => "decoder cannot read this codec",
            Self::NetworkTimeout => "network timeout",
        }
    }

    /// Hint for a bare HTTP status
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            403 => Some(Self::Http403Forbidden),
            429 => Some(Self::RateLimited),
            408 | 504 => Some(Self::NetworkTimeout),
            _ => None,
        }
    }
}

/// First matching reason for a failure message
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(reason, _)| *reason)
}
