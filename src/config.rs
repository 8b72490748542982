// Runtime configuration
//
// Layering (later wins): defaults -> config.json -> FRAME_CAPTURE_* env -> CLI flags

use serde::Deserialize;
use std::path::PathBuf;

use crate::capture::fetcher::DEFAULT_ORIGIN;
use crate::capture::resolvers::{ClientProfile, ResolverKind, DEFAULT_API_BASE};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Metadata resolution strategy ("innertube" or "yt-dlp")
    #[serde(deserialize_with = "de_from_str")]
    pub resolver: ResolverKind,
    /// Innertube client profile ("android", "ios", "web")
    #[serde(deserialize_with = "de_from_str")]
    pub client: ClientProfile,
    /// Decoder binary; detected when unset
    pub ffmpeg_path: Option<String>,
    /// yt-dlp binary; detected when unset
    pub ytdlp_path: Option<String>,
    /// Proxy for metadata and stream requests (http, https, socks5)
    pub proxy: Option<String>,
    /// Upper bound for one resolve -> fetch -> decode attempt
    pub attempt_timeout_secs: u64,
    /// Upper bound for a metadata lookup
    pub metadata_timeout_secs: u64,
    pub bind: String,
    pub log_level: String,
    /// Origin/Referer sent with stream requests
    pub origin: String,
    pub api_base: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverKind::default(),
            client: ClientProfile::default(),
            ffmpeg_path: None,
            ytdlp_path: None,
            proxy: None,
            attempt_timeout_secs: 90,
            metadata_timeout_secs: 30,
            bind: "127.0.0.1:8888".to_string(),
            log_level: "info".to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

fn de_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr<Err = String>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl CaptureConfig {
    /// Default location: `<config_dir>/yt-frame-capture/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("yt-frame-capture").join("config.json"))
    }

    /// Defaults, then the config file (if any), then environment overrides
    pub fn load() -> Result<Self, String> {
        let base = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
        config
            .validate()
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e))
    }

    /// Both timeouts must be at least one second
    pub fn validate(self) -> Result<Self, String> {
        if self.attempt_timeout_secs == 0 {
            return Err("attempt_timeout_secs must be a positive number of seconds".to_string());
        }
        if self.metadata_timeout_secs == 0 {
            return Err("metadata_timeout_secs must be a positive number of seconds".to_string());
        }
        Ok(self)
    }

    /// Apply `FRAME_CAPTURE_*` overrides read through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("FRAME_CAPTURE_RESOLVER") {
            self.resolver = v.parse()?;
        }
        if let Some(v) = var("FRAME_CAPTURE_CLIENT") {
            self.client = v.parse()?;
        }
        if let Some(v) = var("FRAME_CAPTURE_FFMPEG") {
            self.ffmpeg_path = Some(v);
        }
        if let Some(v) = var("FRAME_CAPTURE_YTDLP") {
            self.ytdlp_path = Some(v);
        }
        if let Some(v) = var("FRAME_CAPTURE_PROXY") {
            self.proxy = Some(v);
        }
        if let Some(v) = var("FRAME_CAPTURE_ATTEMPT_TIMEOUT") {
            self.attempt_timeout_secs = parse_secs("FRAME_CAPTURE_ATTEMPT_TIMEOUT", &v)?;
        }
        if let Some(v) = var("FRAME_CAPTURE_METADATA_TIMEOUT") {
            self.metadata_timeout_secs = parse_secs("FRAME_CAPTURE_METADATA_TIMEOUT", &v)?;
        }
        if let Some(v) = var("FRAME_CAPTURE_BIND") {
            self.bind = v;
        }
        if let Some(v) = var("FRAME_CAPTURE_LOG") {
            self.log_level = v;
        }

        Ok(self)
    }

    pub fn with_resolver(mut self, resolver: ResolverKind) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_client(mut self, client: ClientProfile) -> Self {
        self.client = client;
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_attempt_timeout(mut self, secs: u64) -> Self {
        self.attempt_timeout_secs = secs;
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, String> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(format!("{} must be a positive number of seconds", key)),
        Ok(secs) => Ok(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.resolver, ResolverKind::Innertube);
        assert_eq!(config.client, ClientProfile::Android);
        assert_eq!(config.attempt_timeout_secs, 90);
        assert_eq!(config.bind, "127.0.0.1:8888");
    }

    #[test]
    fn test_env_overrides() {
        let config = CaptureConfig::default()
            .with_env(env(&[
                ("FRAME_CAPTURE_RESOLVER", "yt-dlp"),
                ("FRAME_CAPTURE_CLIENT", "web"),
                ("FRAME_CAPTURE_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
                ("FRAME_CAPTURE_ATTEMPT_TIMEOUT", "45"),
                ("FRAME_CAPTURE_PROXY", ""),
            ]))
            .unwrap();
        assert_eq!(config.resolver, ResolverKind::YtDlp);
        assert_eq!(config.client, ClientProfile::Web);
        assert_eq!(config.ffmpeg_path.as_deref(), Some("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.attempt_timeout_secs, 45);
        assert!(config.proxy.is_none(), "blank values are ignored");
    }

    #[test]
    fn test_env_rejects_bad_values() {
        assert!(CaptureConfig::default()
            .with_env(env(&[("FRAME_CAPTURE_ATTEMPT_TIMEOUT", "0")]))
            .is_err());
        assert!(CaptureConfig::default()
            .with_env(env(&[("FRAME_CAPTURE_RESOLVER", "pytube")]))
            .is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{ "resolver": "yt-dlp", "attempt_timeout_secs": 20 }"#).unwrap();
        assert_eq!(config.resolver, ResolverKind::YtDlp);
        assert_eq!(config.attempt_timeout_secs, 20);
        assert_eq!(config.metadata_timeout_secs, 30);
        assert_eq!(config.origin, DEFAULT_ORIGIN);
    }

    #[test]
    fn test_file_rejects_zero_timeouts() {
        let path = std::env::temp_dir()
            .join(format!("frame-capture-config-{}.json", std::process::id()));

        std::fs::write(&path, r#"{ "attempt_timeout_secs": 0 }"#).unwrap();
        let err = CaptureConfig::from_file(&path).unwrap_err();
        assert!(err.contains("attempt_timeout_secs"));

        std::fs::write(&path, r#"{ "metadata_timeout_secs": 0 }"#).unwrap();
        let err = CaptureConfig::from_file(&path).unwrap_err();
        assert!(err.contains("metadata_timeout_secs"));

        std::fs::write(&path, r#"{ "attempt_timeout_secs": 15 }"#).unwrap();
        let config = CaptureConfig::from_file(&path).unwrap();
        assert_eq!(config.attempt_timeout_secs, 15);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_builders() {
        let config = CaptureConfig::default()
            .with_resolver(ResolverKind::YtDlp)
            .with_ffmpeg_path("ffmpeg6")
            .with_attempt_timeout(5)
            .with_bind("0.0.0.0:9000");
        assert_eq!(config.resolver, ResolverKind::YtDlp);
        assert_eq!(config.ffmpeg_path.as_deref(), Some("ffmpeg6"));
        assert_eq!(config.attempt_timeout_secs, 5);
        assert_eq!(config.bind, "0.0.0.0:9000");
    }
}
