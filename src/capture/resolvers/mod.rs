// Media resolver implementations
//
// - Innertube: direct player API calls, in-process signature deciphering
// - yt-dlp: delegates metadata to the yt-dlp binary
//
// Both produce the same CandidateSet, ordered by FormatSelector.

mod cipher;
mod innertube;
mod ytdlp;

use std::fmt;
use std::str::FromStr;

pub use cipher::{PlayerContext, SignatureOp};
pub use innertube::{ClientProfile, InnertubeResolver, InnertubeSettings, DEFAULT_API_BASE};
pub use ytdlp::{YtDlpResolver, YtDlpSettings};

/// Resolution strategy selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverKind {
    #[default]
    Innertube,
    YtDlp,
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Innertube => write!(f, "innertube"),
            Self::YtDlp => write!(f, "yt-dlp"),
        }
    }
}

impl FromStr for ResolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "innertube" => Ok(Self::Innertube),
            "yt-dlp" | "ytdlp" => Ok(Self::YtDlp),
            other => Err(format!("unknown resolver: {}", other)),
        }
    }
}
