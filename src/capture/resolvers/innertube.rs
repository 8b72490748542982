// Innertube resolver - talks to the platform player API directly
//
// Session lifecycle: one session per resolver, created on first use and
// kept for the life of the process. Concurrent first requests share a
// single initialization (OnceCell); a failed initialization leaves the
// cell empty so the next request tries again.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::cipher::{find_player_id, PlayerContext};
use crate::capture::diagnostics::diagnose_error;
use crate::capture::errors::{AttemptError, CaptureError};
use crate::capture::format_selector::FormatSelector;
use crate::capture::models::{CandidateFormat, CandidateSet, PlaybackContext};
use crate::capture::traits::MediaResolver;
use crate::capture::utils::{generate_cpn, truncate};

pub const DEFAULT_API_BASE: &str = "https://www.youtube.com";

/// Client identity presented to the player API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientProfile {
    /// Android app; direct URLs, no deciphering (default)
    #[default]
    Android,
    /// iOS app; direct URLs
    Ios,
    /// Desktop web player; ciphered URLs, needs the player script
    Web,
}

impl ClientProfile {
    pub fn client_name(&self) -> &'static str {
        match self {
            Self::Android => "ANDROID",
            Self::Ios => "IOS",
            Self::Web => "WEB",
        }
    }

    /// Numeric id sent as X-YouTube-Client-Name
    pub fn client_id(&self) -> u8 {
        match self {
            Self::Android => 3,
            Self::Ios => 5,
            Self::Web => 1,
        }
    }

    pub fn client_version(&self) -> &'static str {
        match self {
            Self::Android => "19.35.36",
            Self::Ios => "19.29.1",
            Self::Web => "2.20240726.00.00",
        }
    }

    /// User agent of the client context; the web profile has none of its own
    pub fn user_agent(&self) -> Option<&'static str> {
        match self {
            Self::Android => Some("com.google.android.youtube/19.35.36 (Linux; U; Android 13) gzip"),
            Self::Ios => Some("com.google.ios.youtube/19.29.1 (iPhone16,2; U; CPU iOS 17_5_1 like Mac OS X;)"),
            Self::Web => None,
        }
    }

    pub fn requires_player(&self) -> bool {
        matches!(self, Self::Web)
    }

    fn context(&self) -> serde_json::Value {
        let mut client = json!({
            "clientName": self.client_name(),
            "clientVersion": self.client_version(),
            "hl": "en",
            "gl": "US",
        });
        let extra = match self {
            Self::Android => json!({
                "androidSdkVersion": 33,
                "osName": "Android",
                "osVersion": "13",
                "userAgent": self.user_agent(),
            }),
            Self::Ios => json!({
                "deviceMake": "Apple",
                "deviceModel": "iPhone16,2",
                "osName": "iPhone",
                "osVersion": "17.5.1.21F90",
                "userAgent": self.user_agent(),
            }),
            Self::Web => json!({}),
        };
        if let (Some(client), Some(extra)) = (client.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                client.insert(k.clone(), v.clone());
            }
        }
        json!({ "client": client })
    }
}

impl fmt::Display for ClientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Android => write!(f, "android"),
            Self::Ios => write!(f, "ios"),
            Self::Web => write!(f, "web"),
        }
    }
}

impl FromStr for ClientProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            "web" => Ok(Self::Web),
            other => Err(format!("unknown client profile: {}", other)),
        }
    }
}

/// Settings for the Innertube resolver
#[derive(Debug, Clone)]
pub struct InnertubeSettings {
    pub api_base: String,
    pub profile: ClientProfile,
    pub proxy: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for InnertubeSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            profile: ClientProfile::default(),
            proxy: None,
            timeout_seconds: 30,
        }
    }
}

/// Process-wide client session
pub struct InnertubeSession {
    http: reqwest::Client,
    api_base: String,
    profile: ClientProfile,
    player_id: Option<String>,
    player: OnceCell<PlayerContext>,
}

impl InnertubeSession {
    async fn create(settings: &InnertubeSettings) -> Result<Self, CaptureError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(settings.timeout_seconds));
        if let Some(proxy_url) = settings.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                CaptureError::Metadata(format!("invalid proxy URL {}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| CaptureError::Metadata(format!("failed to build HTTP client: {}", e)))?;

        let api_base = settings.api_base.trim_end_matches('/').to_string();

        // Only profiles that decipher need to know the player up front
        let player_id = if settings.profile.requires_player() {
            Some(Self::fetch_player_id(&http, &api_base).await?)
        } else {
            None
        };

        tracing::info!(
            profile = %settings.profile,
            player_id = ?player_id,
            "innertube session created"
        );

        Ok(Self {
            http,
            api_base,
            profile: settings.profile,
            player_id,
            player: OnceCell::new(),
        })
    }

    async fn fetch_player_id(http: &reqwest::Client, api_base: &str) -> Result<String, CaptureError> {
        let loader = http
            .get(format!("{}/iframe_api", api_base))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CaptureError::Metadata(format!("failed to load player loader: {}", e)))?
            .text()
            .await
            .map_err(|e| CaptureError::Metadata(format!("failed to read player loader: {}", e)))?;

        find_player_id(&loader)
            .ok_or_else(|| CaptureError::Metadata("player id not found in loader".to_string()))
    }

    /// Player script context, loaded once per session
    async fn player(&self) -> Result<&PlayerContext, String> {
        let player_id = self
            .player_id
            .as_deref()
            .ok_or_else(|| "session has no player id".to_string())?;

        self.player
            .get_or_try_init(|| async {
                let script_url = format!(
                    "{}/s/player/{}/player_ias.vflset/en_US/base.js",
                    self.api_base, player_id
                );
                let script = self
                    .http
                    .get(&script_url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| format!("failed to load player script: {}", e))?
                    .text()
                    .await
                    .map_err(|e| format!("failed to read player script: {}", e))?;

                let context = PlayerContext::parse(player_id, &script)?;
                tracing::debug!(
                    player_id,
                    operations = context.operations.len(),
                    "player script parsed"
                );
                Ok::<_, String>(context)
            })
            .await
    }

    async fn fetch_player_response(&self, video_id: &str) -> Result<PlayerResponse, CaptureError> {
        let mut body = json!({
            "context": self.profile.context(),
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        if self.profile.requires_player() {
            let player = self.player().await.map_err(CaptureError::Metadata)?;
            if let Some(sts) = player.signature_timestamp {
                body["playbackContext"] = json!({
                    "contentPlaybackContext": { "signatureTimestamp": sts }
                });
            }
        }

        let mut request = self
            .http
            .post(format!("{}/youtubei/v1/player?prettyPrint=false", self.api_base))
            .header("X-YouTube-Client-Name", self.profile.client_id().to_string())
            .header("X-YouTube-Client-Version", self.profile.client_version())
            .header("Origin", self.api_base.as_str())
            .json(&body);
        if let Some(ua) = self.profile.user_agent() {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CaptureError::Metadata(format!("player request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CaptureError::Metadata(format!(
                "player request returned HTTP {}: {}",
                status.as_u16(),
                truncate(&text, 200)
            )));
        }

        response
            .json::<PlayerResponse>()
            .await
            .map_err(|e| CaptureError::Metadata(format!("invalid player response: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    formats: Vec<RawFormat>,
    #[serde(default)]
    adaptive_formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFormat {
    itag: u32,
    url: Option<String>,
    signature_cipher: Option<String>,
    cipher: Option<String>,
    mime_type: Option<String>,
    height: Option<u32>,
    audio_quality: Option<String>,
    drm_families: Option<Vec<String>>,
    is_drc: Option<bool>,
}

impl RawFormat {
    fn into_candidate(self) -> CandidateFormat {
        let mime_type = self.mime_type.unwrap_or_default();
        let has_video = mime_type.starts_with("video/");
        let has_audio = mime_type.starts_with("audio/")
            || self.audio_quality.is_some()
            || FormatSelector::has_audio_codec(&mime_type);

        CandidateFormat {
            format_id: self.itag.to_string(),
            has_video,
            has_audio,
            height: self.height,
            // Only explicitly flagged formats count as restricted
            is_restricted: self.drm_families.is_some() || self.is_drc.unwrap_or(false),
            url: self.url,
            signature_cipher: self.signature_cipher.or(self.cipher),
            mime_type,
        }
    }
}

/// Map a player response into an ordered candidate set
fn candidates_from_response(
    response: PlayerResponse,
    profile: ClientProfile,
) -> Result<CandidateSet, CaptureError> {
    let playability = response.playability_status;
    let streaming = match response.streaming_data {
        Some(data) => data,
        None => {
            let reason = playability
                .map(|p| match p.reason {
                    Some(reason) => format!("{}: {}", p.status, reason),
                    None => p.status,
                })
                .unwrap_or_else(|| "no streaming data".to_string());
            let hint = diagnose_error(&reason)
                .map(|r| format!(" ({})", r.description()))
                .unwrap_or_default();
            return Err(CaptureError::NoPlayableFormats(format!("{}{}", reason, hint)));
        }
    };

    let raw: Vec<CandidateFormat> = streaming
        .adaptive_formats
        .into_iter()
        .chain(streaming.formats)
        .map(RawFormat::into_candidate)
        .collect();
    let offered = raw.len();

    let candidates = FormatSelector::select(raw);
    if candidates.is_empty() {
        return Err(CaptureError::NoPlayableFormats(format!(
            "none of the {} offered formats is a non-restricted MP4 video stream",
            offered
        )));
    }

    Ok(CandidateSet {
        candidates,
        context: PlaybackContext {
            client_name: Some(profile.client_name().to_string()),
            user_agent: profile.user_agent().map(str::to_string),
            playback_nonce: Some(generate_cpn()),
        },
    })
}

/// Resolver backed by the platform player API
pub struct InnertubeResolver {
    settings: InnertubeSettings,
    session: OnceCell<InnertubeSession>,
}

impl InnertubeResolver {
    pub fn new(settings: InnertubeSettings) -> Self {
        Self {
            settings,
            session: OnceCell::new(),
        }
    }

    async fn session(&self) -> Result<&InnertubeSession, CaptureError> {
        self.session
            .get_or_try_init(|| InnertubeSession::create(&self.settings))
            .await
    }
}

#[async_trait]
impl MediaResolver for InnertubeResolver {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn list_candidates(&self, video_id: &str) -> Result<CandidateSet, CaptureError> {
        let session = self.session().await?;
        let response = session.fetch_player_response(video_id).await?;
        let set = candidates_from_response(response, session.profile)?;

        tracing::info!(
            video_id,
            profile = %session.profile,
            candidates = ?set.candidates.iter().map(|c| c.label()).collect::<Vec<_>>(),
            "candidate formats listed"
        );
        Ok(set)
    }

    async fn resolve_url(&self, candidate: &CandidateFormat) -> Result<String, AttemptError> {
        if let Some(url) = candidate.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }

        let cipher = candidate.signature_cipher.as_deref().ok_or_else(|| {
            AttemptError::Signature("format has neither url nor signature cipher".to_string())
        })?;

        let session = self
            .session()
            .await
            .map_err(|e| AttemptError::Signature(e.to_string()))?;
        let player = session.player().await.map_err(AttemptError::Signature)?;

        player.resolve_cipher(cipher).map_err(AttemptError::Signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn response_from(value: serde_json::Value) -> PlayerResponse {
        serde_json::from_value(value).unwrap()
    }

    fn sample_response() -> serde_json::Value {
        json!({
            "playabilityStatus": { "status": "OK" },
            "streamingData": {
                "formats": [
                    { "itag": 18, "url": "https://cdn.example/18", "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"", "height": 360, "audioQuality": "AUDIO_QUALITY_LOW" },
                    { "itag": 22, "signatureCipher": "s=abc&url=https%3A%2F%2Fcdn.example%2F22", "mimeType": "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"", "height": 720, "audioQuality": "AUDIO_QUALITY_MEDIUM" }
                ],
                "adaptiveFormats": [
                    { "itag": 135, "url": "https://cdn.example/135", "mimeType": "video/mp4; codecs=\"avc1.4d401e\"", "height": 480 },
                    { "itag": 248, "url": "https://cdn.example/248", "mimeType": "video/webm; codecs=\"vp9\"", "height": 1080 },
                    { "itag": 140, "url": "https://cdn.example/140", "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"", "audioQuality": "AUDIO_QUALITY_MEDIUM" },
                    { "itag": 299, "url": "https://cdn.example/299", "mimeType": "video/mp4; codecs=\"avc1.64002a\"", "height": 1080, "drmFamilies": ["WIDEVINE"] }
                ]
            }
        })
    }

    #[test]
    fn test_candidates_ordered_and_filtered() {
        let set = candidates_from_response(response_from(sample_response()), ClientProfile::Android)
            .unwrap();
        let ids: Vec<&str> = set.candidates.iter().map(|c| c.format_id.as_str()).collect();
        assert_eq!(ids, ["22", "18", "135"]);
        assert!(set.candidates[0].signature_cipher.is_some());
        assert_eq!(set.context.client_name.as_deref(), Some("ANDROID"));
        assert!(set.context.user_agent.as_deref().unwrap().contains("android"));
        assert_eq!(set.context.playback_nonce.as_ref().map(String::len), Some(16));
    }

    #[test]
    fn test_missing_streaming_data_is_no_playable_formats() {
        let response = response_from(json!({
            "playabilityStatus": { "status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age" }
        }));
        let err = candidates_from_response(response, ClientProfile::Android).unwrap_err();
        assert!(matches!(err, CaptureError::NoPlayableFormats(_)));
        assert!(err.to_string().contains("LOGIN_REQUIRED"));
        assert!(err.to_string().contains("age-restricted"));
    }

    #[test]
    fn test_only_unusable_formats_is_no_playable_formats() {
        let response = response_from(json!({
            "playabilityStatus": { "status": "OK" },
            "streamingData": {
                "adaptiveFormats": [
                    { "itag": 251, "url": "https://cdn.example/251", "mimeType": "audio/webm; codecs=\"opus\"" },
                    { "itag": 248, "url": "https://cdn.example/248", "mimeType": "video/webm; codecs=\"vp9\"", "height": 1080 }
                ]
            }
        }));
        let err = candidates_from_response(response, ClientProfile::Android).unwrap_err();
        assert!(matches!(err, CaptureError::NoPlayableFormats(_)));
    }

    #[test]
    fn test_client_profile_parsing() {
        assert_eq!("ANDROID".parse::<ClientProfile>().unwrap(), ClientProfile::Android);
        assert_eq!("web".parse::<ClientProfile>().unwrap(), ClientProfile::Web);
        assert!("tv".parse::<ClientProfile>().is_err());
        assert!(ClientProfile::Web.user_agent().is_none());
        assert!(ClientProfile::Web.requires_player());
        let context = ClientProfile::Android.context();
        assert_eq!(context["client"]["clientName"], "ANDROID");
        assert_eq!(context["client"]["androidSdkVersion"], 33);
    }

    async fn spawn_platform(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn resolver_for(base: String, profile: ClientProfile) -> InnertubeResolver {
        InnertubeResolver::new(InnertubeSettings {
            api_base: base,
            profile,
            proxy: None,
            timeout_seconds: 5,
        })
    }

    #[tokio::test]
    async fn test_list_candidates_against_player_api() {
        let app = Router::new().route(
            "/youtubei/v1/player",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["videoId"], "abc12345678");
                assert_eq!(body["context"]["client"]["clientName"], "ANDROID");
                Json(sample_response())
            }),
        );
        let base = spawn_platform(app).await;
        let resolver = resolver_for(base, ClientProfile::Android);

        let set = resolver.list_candidates("abc12345678").await.unwrap();
        assert_eq!(set.candidates.len(), 3);

        let direct = resolver.resolve_url(&set.candidates[1]).await.unwrap();
        assert_eq!(direct, "https://cdn.example/18");

        // android sessions never load a player, so ciphers cannot be resolved
        let err = resolver.resolve_url(&set.candidates[0]).await.unwrap_err();
        assert!(matches!(err, AttemptError::Signature(_)));
    }

    #[tokio::test]
    async fn test_player_api_failure_is_metadata_error() {
        let app = Router::new().route(
            "/youtubei/v1/player",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_platform(app).await;
        let resolver = resolver_for(base, ClientProfile::Android);

        let err = resolver.list_candidates("abc12345678").await.unwrap_err();
        assert!(matches!(err, CaptureError::Metadata(_)));
        assert!(err.to_string().contains("500"));
    }

    const PLAYER: &str = r#"var Xy={Ab:function(a){a.reverse()},cD:function(a,b){a.splice(0,b)}};
        Qw=function(a){a=a.split("");Xy.cD(a,1);Xy.Ab(a,0);return a.join("")};
        var c={signatureTimestamp:20000};"#;

    const IFRAME_API: &str =
        r"var u='https:\/\/www.youtube.com\/s\/player\/0123abcd\/www-widgetapi.js';";

    #[tokio::test]
    async fn test_player_request_origin_follows_api_base() {
        let seen = Arc::new(Mutex::new(None::<String>));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/youtubei/v1/player",
            post(move |headers: axum::http::HeaderMap| {
                let recorded = recorded.clone();
                async move {
                    let origin = headers
                        .get("origin")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *recorded.lock().unwrap() = origin;
                    Json(sample_response())
                }
            }),
        );
        let base = spawn_platform(app).await;
        let resolver = resolver_for(format!("{}/", base), ClientProfile::Android);

        resolver.list_candidates("abc12345678").await.unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some(base.as_str()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_creates_one_session() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new()
            .route(
                "/iframe_api",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        IFRAME_API
                    }
                }),
            )
            .route(
                "/s/player/0123abcd/player_ias.vflset/en_US/base.js",
                get(|| async { PLAYER }),
            )
            .route("/youtubei/v1/player", post(|| async { Json(sample_response()) }));
        let base = spawn_platform(app).await;
        let resolver = Arc::new(resolver_for(base, ClientProfile::Web));

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.list_candidates("abc12345678").await })
            })
            .collect();
        for call in calls {
            let set = call.await.unwrap().unwrap();
            assert_eq!(set.candidates.len(), 3);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_web_profile_deciphers_with_player_script() {
        let app = Router::new()
            .route("/iframe_api", get(|| async { IFRAME_API }))
            .route(
                "/s/player/0123abcd/player_ias.vflset/en_US/base.js",
                get(|| async { PLAYER }),
            )
            .route(
                "/youtubei/v1/player",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(
                        body["playbackContext"]["contentPlaybackContext"]["signatureTimestamp"],
                        20000
                    );
                    Json(sample_response())
                }),
            );
        let base = spawn_platform(app).await;
        let resolver = resolver_for(base, ClientProfile::Web);

        let set = resolver.list_candidates("abc12345678").await.unwrap();
        assert!(set.context.user_agent.is_none());

        // "abc" -> splice 1 -> "bc" -> reverse -> "cb"
        let url = resolver.resolve_url(&set.candidates[0]).await.unwrap();
        assert_eq!(url, "https://cdn.example/22?signature=cb");
    }
}
