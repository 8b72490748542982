// Inbound request contract
//
// GET ?videoId=<id>&timestamp=<seconds>
//   400 {error}                      malformed input, no I/O performed
//   200 image/png, base64 body       frame captured
//   502 {error, attemptedFormatIds?} nothing playable / every candidate failed
//   500 {error, details}             metadata lookup failed

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::capture::{CaptureError, CaptureRequest, FrameCapturer};

/// Raw query parameters; validation happens in `CaptureRequest::parse`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureQuery {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
    pub timestamp: Option<String>,
}

/// Gateway-style response: status, headers, body, base64 transport flag
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl FunctionResponse {
    fn json(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string(),
            is_base64_encoded: false,
        }
    }

    fn png(png: &[u8], filename: &str) -> Self {
        Self {
            status_code: 200,
            headers: vec![
                ("Content-Type".to_string(), "image/png".to_string()),
                (
                    "Content-Disposition".to_string(),
                    format!("inline; filename=\"{}\"", filename),
                ),
            ],
            body: base64::engine::general_purpose::STANDARD.encode(png),
            is_base64_encoded: true,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Map a capture failure onto the response contract
pub fn error_response(error: &CaptureError) -> FunctionResponse {
    match error {
        CaptureError::InvalidRequest(message) => {
            FunctionResponse::json(400, json!({ "error": message }))
        }
        CaptureError::NoPlayableFormats(reason) => FunctionResponse::json(
            502,
            json!({ "error": format!("No playable video formats were found for this video: {}", reason) }),
        ),
        CaptureError::Exhausted { attempted, .. } => FunctionResponse::json(
            502,
            json!({
                "error": "Could not capture a frame from any available format.",
                "attemptedFormatIds": attempted,
            }),
        ),
        CaptureError::Metadata(details) => FunctionResponse::json(
            500,
            json!({
                "error": "Failed to retrieve video information.",
                "details": details,
            }),
        ),
    }
}

/// Validate, capture, and map the outcome
pub async fn handle(capturer: &FrameCapturer, query: &CaptureQuery) -> FunctionResponse {
    let request =
        match CaptureRequest::parse(query.video_id.as_deref(), query.timestamp.as_deref()) {
            Ok(request) => request,
            Err(e) => {
                tracing::info!(error = %e, "rejected capture request");
                return error_response(&e);
            }
        };

    match capturer.capture(&request).await {
        Ok(frame) => FunctionResponse::png(&frame.png, &request.suggested_filename()),
        Err(e) => {
            tracing::warn!(
                video_id = request.video_id(),
                kind = e.kind().as_str(),
                error = %e,
                "capture failed"
            );
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::capture::fetcher::{HttpStreamFetcher, DEFAULT_ORIGIN};
    use crate::capture::models::{CandidateFormat, CandidateSet, PlaybackContext};
    use crate::capture::traits::{FrameExtractor, MediaResolver, MediaStream, StreamFetcher};
    use crate::capture::AttemptError;

    fn query(video_id: Option<&str>, timestamp: Option<&str>) -> CaptureQuery {
        CaptureQuery {
            video_id: video_id.map(String::from),
            timestamp: timestamp.map(String::from),
        }
    }

    fn body_json(response: &FunctionResponse) -> serde_json::Value {
        serde_json::from_str(&response.body).unwrap()
    }

    /// One progressive 720p MP4 candidate with a ready URL
    struct SingleFormatResolver {
        url: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MediaResolver for SingleFormatResolver {
        fn name(&self) -> &'static str {
            "single"
        }

        async fn list_candidates(&self, _video_id: &str) -> Result<CandidateSet, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CandidateSet {
                candidates: vec![CandidateFormat {
                    format_id: "22".to_string(),
                    has_video: true,
                    has_audio: true,
                    height: Some(720),
                    mime_type: "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"".to_string(),
                    is_restricted: false,
                    url: Some(self.url.clone()),
                    signature_cipher: None,
                }],
                context: PlaybackContext::default(),
            })
        }

        async fn resolve_url(&self, candidate: &CandidateFormat) -> Result<String, AttemptError> {
            candidate
                .url
                .clone()
                .ok_or_else(|| AttemptError::Signature("no url".to_string()))
        }
    }

    struct UnusedFetcher;

    #[async_trait]
    impl StreamFetcher for UnusedFetcher {
        async fn open_stream(
            &self,
            _url: &str,
            _context: &PlaybackContext,
        ) -> Result<MediaStream, AttemptError> {
            Err(AttemptError::fetch(None, "not expected"))
        }
    }

    struct UnusedExtractor;

    #[async_trait]
    impl FrameExtractor for UnusedExtractor {
        async fn extract_frame(
            &self,
            _input: MediaStream,
            _timestamp_seconds: f64,
        ) -> Result<Vec<u8>, AttemptError> {
            Err(AttemptError::EmptyOutput)
        }
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_the_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let capturer = FrameCapturer::new(
            Box::new(SingleFormatResolver {
                url: "http://127.0.0.1:9/never".to_string(),
                calls: calls.clone(),
            }),
            Box::new(UnusedFetcher),
            Box::new(UnusedExtractor),
        );

        for q in [
            query(None, Some("12.5")),
            query(Some(""), Some("12.5")),
            query(Some("abc12345678"), None),
            query(Some("abc12345678"), Some("soon")),
            query(Some("abc12345678"), Some("NaN")),
            query(Some("abc12345678"), Some("-1")),
        ] {
            let response = handle(&capturer, &q).await;
            assert_eq!(response.status_code, 400, "query {:?}", q);
            assert!(body_json(&response)["error"].is_string());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_error_mapping() {
        let r = error_response(&CaptureError::NoPlayableFormats("webm only".to_string()));
        assert_eq!(r.status_code, 502);
        assert!(body_json(&r).get("attemptedFormatIds").is_none());

        let r = error_response(&CaptureError::Metadata("connection refused".to_string()));
        assert_eq!(r.status_code, 500);
        assert_eq!(body_json(&r)["details"], "connection refused");

        let r = error_response(&CaptureError::Exhausted {
            attempted: vec!["22".to_string(), "18".to_string()],
            failures: Vec::new(),
        });
        assert_eq!(r.status_code, 502);
        assert_eq!(body_json(&r)["attemptedFormatIds"], json!(["22", "18"]));
        assert_eq!(r.header("content-type"), Some("application/json"));
    }

    #[cfg(unix)]
    mod end_to_end {
        use super::*;
        use axum::http::StatusCode;
        use axum::routing::get;
        use axum::Router;
        use tokio::net::TcpListener;

        use crate::capture::extractor::FfmpegFrameExtractor;

        async fn spawn_cdn() -> String {
            let app = Router::new()
                .route(
                    "/ok/videoplayback",
                    get(|| async { (StatusCode::OK, vec![0u8; 4096]) }),
                )
                .route(
                    "/denied/videoplayback",
                    get(|| async { (StatusCode::FORBIDDEN, "Forbidden") }),
                );
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}", addr)
        }

        /// Stand-in decoder: drains stdin, checks the seek, writes a PNG header
        fn decoder() -> FfmpegFrameExtractor {
            FfmpegFrameExtractor::new("sh").with_global_args(vec![
                "-c".to_string(),
                "cat >/dev/null; [ \"$2\" = \"12.5\" ] && printf '\\211PNG\\r\\n\\032\\nframe'"
                    .to_string(),
                "sh".to_string(),
            ])
        }

        fn capturer(url: String) -> FrameCapturer {
            FrameCapturer::new(
                Box::new(SingleFormatResolver {
                    url,
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
                Box::new(HttpStreamFetcher::new(reqwest::Client::new(), DEFAULT_ORIGIN)),
                Box::new(decoder()),
            )
        }

        #[tokio::test]
        async fn test_capture_returns_base64_png() {
            let cdn = spawn_cdn().await;
            let capturer = capturer(format!("{}/ok/videoplayback?itag=22", cdn));

            let response = handle(&capturer, &query(Some("abc12345678"), Some("12.5"))).await;
            assert_eq!(response.status_code, 200);
            assert!(response.is_base64_encoded);
            assert_eq!(response.header("Content-Type"), Some("image/png"));
            assert_eq!(
                response.header("Content-Disposition"),
                Some("inline; filename=\"frame_abc12345678_12.50s.png\"")
            );

            let png = base64::engine::general_purpose::STANDARD
                .decode(&response.body)
                .unwrap();
            assert!(!png.is_empty());
            assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
        }

        #[tokio::test]
        async fn test_forbidden_stream_reports_attempted_format() {
            let cdn = spawn_cdn().await;
            let capturer = capturer(format!("{}/denied/videoplayback?itag=22", cdn));

            let response = handle(&capturer, &query(Some("abc12345678"), Some("12.5"))).await;
            assert_eq!(response.status_code, 502);
            assert_eq!(body_json(&response)["attemptedFormatIds"], json!(["22"]));
        }
    }
}
