use config::{Config as ConfigBuilder, Environment as EnvSource, File};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

use crate::models::{Role, RoomId};

/// Application configuration
///
/// Loaded once at startup from an optional config file, then overridden
/// by environment variables. Validation runs before anything is started;
/// an invalid production configuration aborts boot with every problem
/// listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub webrtc: WebRtcConfig,
    pub rooms: RoomsConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
    pub environment: RuntimeEnv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP control-plane bind address.
    pub host: String,
    pub port: u16,
    /// Signaling (WebSocket) bind port.
    pub websocket_port: u16,
    /// Soft ceiling on simultaneous peers; beyond it upgrades get 503.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9001,
            websocket_port: 9002,
            max_connections: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// Public IP advertised in ICE candidates. Required in production.
    pub announced_ip: Option<IpAddr>,
    /// STUN/TURN servers forwarded to clients in the welcome frame.
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            announced_ip: None,
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                username: None,
                credential: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    #[must_use]
    pub fn is_stun(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("stun:") || u.starts_with("stuns:"))
    }

    #[must_use]
    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub max_rooms: usize,
    pub max_viewers_per_room: usize,
    pub idle_timeout_seconds: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            max_rooms: 100,
            max_viewers_per_room: 100,
            idle_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub codec: String,
    pub max_bitrate_kbps: u32,
    pub min_bitrate_kbps: u32,
    pub target_bitrate_kbps: u32,
    pub max_framerate: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: "VP8".to_string(),
            max_bitrate_kbps: 2500,
            min_bitrate_kbps: 500,
            target_bitrate_kbps: 1500,
            max_framerate: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub codec: String,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: "Opus".to_string(),
            bitrate_kbps: 128,
            sample_rate: 48000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console: true,
        }
    }
}

impl Config {
    /// Load configuration with priority:
    /// 1. Environment variables (highest)
    /// 2. Config file (if present)
    /// 3. Defaults (lowest)
    pub fn load(config_file: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Prefixed variables map onto nested sections
        // (RELAYCAST_SERVER_PORT and friends); the well-known flat
        // variables below take precedence over both.
        builder = builder.add_source(
            EnvSource::with_prefix("RELAYCAST")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(None)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("HOST") {
            self.server.host = v;
        }
        set_parsed(&mut self.server.port, "PORT")?;
        set_parsed(&mut self.server.websocket_port, "WEBSOCKET_PORT")?;
        set_parsed(&mut self.server.max_connections, "MAX_CONNECTIONS")?;

        if let Ok(v) = std::env::var("ANNOUNCED_IP") {
            let ip = v
                .parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("ANNOUNCED_IP is not a valid IP address: {e}"))?;
            self.webrtc.announced_ip = Some(ip);
        }

        if let Ok(url) = std::env::var("STUN_URL") {
            let already_known = self
                .webrtc
                .ice_servers
                .iter()
                .any(|s| s.urls.contains(&url));
            if !already_known {
                self.webrtc.ice_servers.insert(
                    0,
                    IceServerConfig {
                        urls: vec![url],
                        username: None,
                        credential: None,
                    },
                );
            }
        }

        if let Ok(url) = std::env::var("TURN_URL") {
            let already_known = self
                .webrtc
                .ice_servers
                .iter()
                .any(|s| s.urls.contains(&url));
            if !already_known {
                self.webrtc.ice_servers.push(IceServerConfig {
                    urls: vec![url],
                    username: std::env::var("TURN_USERNAME").ok(),
                    credential: std::env::var("TURN_CREDENTIAL").ok(),
                });
            }
        }

        set_parsed(&mut self.rooms.max_rooms, "MAX_ROOMS")?;
        set_parsed(&mut self.rooms.max_viewers_per_room, "MAX_VIEWERS_PER_ROOM")?;
        set_parsed(&mut self.rooms.idle_timeout_seconds, "IDLE_TIMEOUT_SECONDS")?;

        if let Ok(v) = std::env::var("VIDEO_CODEC") {
            self.video.codec = v;
        }
        set_parsed(&mut self.video.max_bitrate_kbps, "VIDEO_MAX_BITRATE_KBPS")?;
        set_parsed(&mut self.video.min_bitrate_kbps, "VIDEO_MIN_BITRATE_KBPS")?;
        set_parsed(&mut self.video.target_bitrate_kbps, "VIDEO_TARGET_BITRATE_KBPS")?;
        set_parsed(&mut self.video.max_framerate, "VIDEO_MAX_FRAMERATE")?;

        if let Ok(v) = std::env::var("AUDIO_CODEC") {
            self.audio.codec = v;
        }
        set_parsed(&mut self.audio.bitrate_kbps, "AUDIO_BITRATE_KBPS")?;
        set_parsed(&mut self.audio.sample_rate, "AUDIO_SAMPLE_RATE")?;

        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }

        if let Ok(v) = std::env::var("NODE_ENV") {
            self.environment = if v.eq_ignore_ascii_case("production") {
                RuntimeEnv::Production
            } else {
                RuntimeEnv::Development
            };
        }

        Ok(())
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == RuntimeEnv::Production
    }

    /// Validate configuration (fail fast on misconfigurations)
    ///
    /// Every problem is collected so the boot diagnostic lists all of
    /// them at once; no partial start is permitted.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.server.websocket_port == 0 {
            errors.push("server.websocket_port must be non-zero".to_string());
        }
        if self.server.port == self.server.websocket_port {
            errors.push(format!(
                "server.port and server.websocket_port must differ (both are {})",
                self.server.port
            ));
        }
        if self.server.max_connections == 0 {
            errors.push("server.max_connections must be non-zero".to_string());
        }

        if self.rooms.max_rooms == 0 {
            errors.push("rooms.max_rooms must be non-zero".to_string());
        }
        if self.rooms.max_viewers_per_room == 0 {
            errors.push("rooms.max_viewers_per_room must be non-zero".to_string());
        }
        if self.rooms.idle_timeout_seconds == 0 {
            errors.push("rooms.idle_timeout_seconds must be non-zero".to_string());
        }

        if !matches!(self.video.codec.as_str(), "VP8" | "VP9" | "H264") {
            errors.push(format!(
                "video.codec must be one of VP8, VP9, H264 (got {})",
                self.video.codec
            ));
        }
        if self.video.max_bitrate_kbps == 0 || self.video.target_bitrate_kbps == 0 {
            errors.push("video bitrates must be non-zero".to_string());
        }
        if self.video.min_bitrate_kbps > self.video.max_bitrate_kbps {
            errors.push(format!(
                "video.min_bitrate_kbps ({}) exceeds video.max_bitrate_kbps ({})",
                self.video.min_bitrate_kbps, self.video.max_bitrate_kbps
            ));
        }
        if self.audio.sample_rate == 0 {
            errors.push("audio.sample_rate must be non-zero".to_string());
        }

        if !self.webrtc.ice_servers.iter().any(IceServerConfig::is_stun) {
            errors.push("webrtc.ice_servers must contain at least one STUN entry".to_string());
        }

        if self.is_production() && self.webrtc.announced_ip.is_none() {
            errors.push(
                "announced_ip is required in production (set ANNOUNCED_IP or webrtc.announced_ip)"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Non-fatal findings worth a log line after logging is up.
    #[must_use]
    pub fn production_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.is_production() && !self.webrtc.ice_servers.iter().any(IceServerConfig::is_turn) {
            warnings.push(
                "no TURN server configured; clients behind symmetric NAT may fail to connect"
                    .to_string(),
            );
        }
        warnings
    }

    /// HTTP control-plane bind address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Signaling server bind address
    #[must_use]
    pub fn websocket_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.websocket_port)
    }

    /// Signaling URL handed back from `POST /room/create`
    #[must_use]
    pub fn websocket_url(&self, room_id: &RoomId, role: Role) -> String {
        format!(
            "ws://{}:{}/room/{}/{}",
            self.server.host, self.server.websocket_port, room_id, role
        )
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, var: &str) -> anyhow::Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(var) {
        *slot = value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{var} is invalid: {e}"))?;
    }
    Ok(())
}
