// FormatSelector - candidate filtering and ordering
//
// Applied to whatever a resolver pulled out of the platform metadata:
// 1. Keep formats that carry a video track
// 2. Drop DRM / rights-constrained formats
// 3. Keep containers the decoder can read from a pipe (MP4 family)
// 4. Progressive (audio+video) before adaptive (video-only),
//    each by descending height, unknown height counting as 0

use super::models::CandidateFormat;

/// Container types accepted by the decoding pipeline
const COMPATIBLE_CONTAINERS: &[&str] = &["video/mp4", "video/3gpp", "video/quicktime"];

pub struct FormatSelector;

impl FormatSelector {
    /// Filter and order raw formats into attempt order
    pub fn select(formats: Vec<CandidateFormat>) -> Vec<CandidateFormat> {
        let playable: Vec<CandidateFormat> = formats
            .into_iter()
            .filter(|f| f.has_video)
            .filter(|f| !f.is_restricted)
            .filter(|f| Self::is_container_compatible(&f.mime_type))
            .collect();

        let (mut progressive, mut adaptive): (Vec<_>, Vec<_>) =
            playable.into_iter().partition(|f| f.has_audio);

        // sort_by is stable: equal heights keep metadata order
        progressive.sort_by(|a, b| b.sort_height().cmp(&a.sort_height()));
        adaptive.sort_by(|a, b| b.sort_height().cmp(&a.sort_height()));

        progressive.extend(adaptive);
        progressive
    }

    /// Check the container part of a mime type (`video/mp4; codecs="..."`)
    pub fn is_container_compatible(mime_type: &str) -> bool {
        let container = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        COMPATIBLE_CONTAINERS.contains(&container.as_str())
    }

    /// Codec list from a mime type, e.g. `["avc1.64001F", "mp4a.40.2"]`
    pub fn codecs(mime_type: &str) -> Vec<String> {
        mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                (key.trim() == "codecs").then(|| value.trim().trim_matches('"').to_string())
            })
            .flat_map(|list| {
                list.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Whether any codec in the mime type is an audio codec
    pub fn has_audio_codec(mime_type: &str) -> bool {
        const AUDIO_PREFIXES: &[&str] = &["mp4a", "opus", "vorbis", "ac-3", "ec-3", "flac"];
        Self::codecs(mime_type)
            .iter()
            .any(|c| AUDIO_PREFIXES.iter().any(|p| c.to_ascii_lowercase().starts_with(p)))
    }
}
