// yt-dlp resolver - uses the native `yt-dlp` binary for metadata
//
// Advantages:
// - yt-dlp tracks platform changes (ciphers, n-parameter) faster than we can
// - URLs come back already deciphered
//
// Disadvantages:
// - Spawns a process per lookup (slower)
// - No playback nonce; the CDN sees a plain client

use async_trait::async_trait;

use crate::capture::diagnostics::diagnose_error;
use crate::capture::errors::{AttemptError, CaptureError};
use crate::capture::format_selector::FormatSelector;
use crate::capture::models::{CandidateFormat, CandidateSet, PlaybackContext};
use crate::capture::traits::MediaResolver;
use crate::capture::utils::{run_output_with_timeout, tail_lines};

/// Settings for the yt-dlp resolver
#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    pub ytdlp_path: String,
    pub proxy: Option<String>,
    pub timeout_seconds: u64,
    /// Player clients to try in order (e.g. android, web)
    pub player_clients: Vec<String>,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            proxy: None,
            timeout_seconds: 30,
            player_clients: vec!["android".to_string(), "web".to_string()],
        }
    }
}

pub struct YtDlpResolver {
    settings: YtDlpSettings,
}

impl YtDlpResolver {
    pub fn new(settings: YtDlpSettings) -> Self {
        Self { settings }
    }

    /// Build command arguments
    fn build_args(&self, video_id: &str, client: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
            "--socket-timeout".to_string(),
            self.settings.timeout_seconds.to_string(),
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", client),
        ];

        if let Some(proxy) = &self.settings.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push("--".to_string());
        args.push(format!("https://www.youtube.com/watch?v={}", video_id));
        args
    }

    /// Map yt-dlp JSON into raw candidates and the playback context
    fn parse_json(stdout: &[u8]) -> Result<(Vec<CandidateFormat>, PlaybackContext), CaptureError> {
        let json: serde_json::Value = serde_json::from_slice(stdout)
            .map_err(|e| CaptureError::Metadata(format!("Invalid JSON from yt-dlp: {}", e)))?;

        let formats_array = json["formats"]
            .as_array()
            .ok_or_else(|| CaptureError::Metadata("No formats array in yt-dlp JSON".to_string()))?;

        let mut formats = Vec::new();
        for f in formats_array {
            // m3u8 / dash manifests cannot be piped into the decoder
            let protocol = f["protocol"].as_str().unwrap_or("https");
            if protocol != "https" && protocol != "http" {
                continue;
            }

            let vcodec = f["vcodec"].as_str().unwrap_or("none");
            let acodec = f["acodec"].as_str().unwrap_or("none");
            let ext = f["ext"].as_str().unwrap_or("");

            formats.push(CandidateFormat {
                format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                has_video: vcodec != "none" && !vcodec.is_empty(),
                has_audio: acodec != "none" && !acodec.is_empty(),
                height: f["height"].as_u64().map(|h| h as u32),
                mime_type: container_mime(vcodec != "none", ext),
                is_restricted: f["has_drm"].as_bool().unwrap_or(false),
                url: f["url"].as_str().map(|s| s.to_string()),
                signature_cipher: None,
            });
        }

        let user_agent = json["http_headers"]["User-Agent"]
            .as_str()
            .or_else(|| {
                formats_array
                    .iter()
                    .find_map(|f| f["http_headers"]["User-Agent"].as_str())
            })
            .map(|s| s.to_string());

        Ok((
            formats,
            PlaybackContext {
                client_name: None,
                user_agent,
                playback_nonce: None,
            },
        ))
    }

    /// Try metadata extraction with each player client in turn
    async fn try_with_clients(&self, video_id: &str) -> Result<CandidateSet, CaptureError> {
        let mut last_error = CaptureError::Metadata("No player clients configured".to_string());

        for client in &self.settings.player_clients {
            let args = self.build_args(video_id, client);
            tracing::debug!(client = %client, program = %self.settings.ytdlp_path, "running yt-dlp");

            let output = run_output_with_timeout(
                &self.settings.ytdlp_path,
                args,
                self.settings.timeout_seconds,
            )
            .await;

            match output {
                Ok(out) if out.status.success() => {
                    let (raw, mut context) = Self::parse_json(&out.stdout)?;
                    context.client_name = Some(client.to_uppercase());
                    let offered = raw.len();
                    let candidates = FormatSelector::select(raw);
                    if candidates.is_empty() {
                        tracing::warn!(client = %client, offered, "yt-dlp returned no playable formats");
                        last_error = CaptureError::NoPlayableFormats(format!(
                            "none of the {} formats offered to client {} is a non-restricted MP4 video stream",
                            offered, client
                        ));
                        continue;
                    }
                    tracing::info!(client = %client, candidates = candidates.len(), "yt-dlp lookup succeeded");
                    return Ok(CandidateSet {
                        candidates,
                        context,
                    });
                }
                Ok(out) => {
                    let stderr = tail_lines(&out.stderr, 3);
                    tracing::warn!(client = %client, stderr = %stderr, "yt-dlp lookup failed");
                    last_error = match diagnose_error(&stderr) {
                        Some(reason) if reason.is_permanent() => CaptureError::NoPlayableFormats(
                            format!("{} ({})", stderr, reason.description()),
                        ),
                        _ => CaptureError::Metadata(stderr),
                    };
                }
                Err(e) => {
                    tracing::warn!(client = %client, error = %e, "yt-dlp could not run");
                    last_error = CaptureError::Metadata(e);
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn list_candidates(&self, video_id: &str) -> Result<CandidateSet, CaptureError> {
        self.try_with_clients(video_id).await
    }

    async fn resolve_url(&self, candidate: &CandidateFormat) -> Result<String, AttemptError> {
        candidate
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AttemptError::Signature("yt-dlp returned no URL for format".to_string()))
    }
}

/// Mime type for a yt-dlp `ext`, spelled the way the player API spells it
fn container_mime(has_video: bool, ext: &str) -> String {
    let subtype = match ext {
        "3gp" => "3gpp",
        "mov" => "quicktime",
        other => other,
    };
    let kind = if has_video { "video" } else { "audio" };
    format!("{}/{}", kind, subtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "id": "abc12345678",
        "http_headers": { "User-Agent": "Mozilla/5.0 (yt-dlp)" },
        "formats": [
            { "format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "protocol": "https", "url": "https://cdn.example/18" },
            { "format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "protocol": "https", "url": "https://cdn.example/140" },
            { "format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "protocol": "https", "url": "https://cdn.example/137" },
            { "format_id": "96", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "mp4a.40.2", "height": 1080, "protocol": "m3u8_native", "url": "https://manifest.example/96.m3u8" },
            { "format_id": "22", "ext": "mp4", "vcodec": "avc1.64001F", "acodec": "mp4a.40.2", "height": 720, "protocol": "https", "has_drm": true, "url": "https://cdn.example/22" }
        ]
    }"#;

    #[test]
    fn test_parse_and_select() {
        let (raw, context) = YtDlpResolver::parse_json(DUMP.as_bytes()).unwrap();
        assert_eq!(raw.len(), 4, "m3u8 entries are skipped");
        assert_eq!(context.user_agent.as_deref(), Some("Mozilla/5.0 (yt-dlp)"));
        assert!(context.playback_nonce.is_none());

        let ids: Vec<String> = FormatSelector::select(raw)
            .into_iter()
            .map(|c| c.format_id)
            .collect();
        assert_eq!(ids, ["18", "137"]);
    }

    #[test]
    fn test_3gp_formats_stay_playable() {
        let dump = r#"{
            "formats": [
                { "format_id": "17", "ext": "3gp", "vcodec": "mp4v.20.3", "acodec": "mp4a.40.2", "height": 144, "protocol": "https", "url": "https://cdn.example/17" },
                { "format_id": "43", "ext": "webm", "vcodec": "vp8.0", "acodec": "vorbis", "height": 360, "protocol": "https", "url": "https://cdn.example/43" }
            ]
        }"#;
        let (raw, _) = YtDlpResolver::parse_json(dump.as_bytes()).unwrap();
        assert_eq!(raw[0].mime_type, "video/3gpp");

        let ids: Vec<String> = FormatSelector::select(raw)
            .into_iter()
            .map(|c| c.format_id)
            .collect();
        assert_eq!(ids, ["17"]);
    }

    #[test]
    fn test_invalid_json_is_metadata_error() {
        let err = YtDlpResolver::parse_json(b"not json").unwrap_err();
        assert!(matches!(err, CaptureError::Metadata(_)));
    }

    #[test]
    fn test_build_args() {
        let resolver = YtDlpResolver::new(YtDlpSettings {
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            ..YtDlpSettings::default()
        });
        let args = resolver.build_args("-abc1234567", "android");
        assert!(args.contains(&"youtube:player_client=android".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5h://127.0.0.1:1080"));
        // ids starting with '-' must not be read as options
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=-abc1234567");
    }

    #[tokio::test]
    async fn test_resolve_url_requires_url() {
        let resolver = YtDlpResolver::new(YtDlpSettings::default());
        let (raw, _) = YtDlpResolver::parse_json(DUMP.as_bytes()).unwrap();
        assert_eq!(
            resolver.resolve_url(&raw[0]).await.unwrap(),
            "https://cdn.example/18"
        );

        let mut missing = raw[0].clone();
        missing.url = None;
        assert!(matches!(
            resolver.resolve_url(&missing).await.unwrap_err(),
            AttemptError::Signature(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_metadata_error() {
        let resolver = YtDlpResolver::new(YtDlpSettings {
            ytdlp_path: "/nonexistent/yt-dlp".to_string(),
            ..YtDlpSettings::default()
        });
        let err = resolver.list_candidates("abc12345678").await.unwrap_err();
        assert!(matches!(err, CaptureError::Metadata(_)));
    }
}
