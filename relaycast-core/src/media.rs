//! Media worker pool
//!
//! Owns a fixed set of media workers sized at boot and round-robins
//! router creation across them. Workers are separate subprocesses; every
//! call that crosses into one is async. Worker death is unrecoverable:
//! the supervisor is notified through the death channel and terminates
//! the whole process, so callers only ever observe success or process
//! exit, never a per-operation "worker died" error.

use std::net::{IpAddr, Ipv4Addr};
use std::num::{NonZeroU32, NonZeroU8};
use std::sync::atomic::{AtomicUsize, Ordering};

use mediasoup::prelude::*;
use mediasoup::worker::WorkerLogLevel;
use mediasoup::worker_manager::WorkerManager;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

/// Notice sent to the supervisor when a worker dies.
#[derive(Debug, Clone)]
pub struct WorkerDeath {
    pub message: String,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    next_worker: AtomicUsize,
    codecs: Vec<RtpCodecCapability>,
    announced_ip: Option<IpAddr>,
    initial_outgoing_bitrate: u32,
    max_incoming_bitrate: u32,
    // Keeps the worker supervisor thread alive for the pool's lifetime.
    _manager: WorkerManager,
}

impl WorkerPool {
    /// Create the pool with `max(1, cpu_count - 1)` workers.
    pub async fn new(config: &Config, dead_tx: mpsc::UnboundedSender<WorkerDeath>) -> Result<Self> {
        let size = std::cmp::max(1, num_cpus::get().saturating_sub(1));
        Self::with_size(config, size, dead_tx).await
    }

    /// Create the pool with an explicit worker count.
    pub async fn with_size(
        config: &Config,
        size: usize,
        dead_tx: mpsc::UnboundedSender<WorkerDeath>,
    ) -> Result<Self> {
        let manager = WorkerManager::new();
        let mut workers = Vec::with_capacity(size);

        for _ in 0..size {
            let mut settings = WorkerSettings::default();
            settings.log_level = WorkerLogLevel::Warn;

            let worker = manager
                .create_worker(settings)
                .await
                .map_err(|e| Error::Fatal(format!("Failed to create media worker: {e}")))?;

            worker
                .on_dead({
                    let dead_tx = dead_tx.clone();
                    let worker_id = worker.id();
                    move |reason| {
                        let message = match reason {
                            Ok(()) => format!("media worker {worker_id} exited"),
                            Err(error) => {
                                format!("media worker {worker_id} died: {error}")
                            }
                        };
                        let _ = dead_tx.send(WorkerDeath { message });
                    }
                })
                .detach();

            workers.push(worker);
        }

        info!(worker_count = workers.len(), "Media worker pool started");

        Ok(Self {
            workers,
            next_worker: AtomicUsize::new(0),
            codecs: media_codecs(config)?,
            announced_ip: config.webrtc.announced_ip,
            initial_outgoing_bitrate: config.video.target_bitrate_kbps.saturating_mul(1000),
            max_incoming_bitrate: config.video.max_bitrate_kbps.saturating_mul(1000),
            _manager: manager,
        })
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Allocate a router on the next worker in round-robin order.
    pub async fn create_router(&self) -> Result<Router> {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index]
            .create_router(RouterOptions::new(self.codecs.clone()))
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to create router: {e}")))
    }

    /// Create a WebRTC transport on the given router.
    ///
    /// Listens on all interfaces with the configured announced IP in ICE
    /// candidates, UDP preferred with TCP fallback, and the configured
    /// outgoing/incoming bitrate caps applied.
    pub async fn create_webrtc_transport(&self, router: &Router) -> Result<WebRtcTransport> {
        let mut options = WebRtcTransportOptions::new(TransportListenIps::new(TransportListenIp {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            announced_ip: self.announced_ip,
        }));
        options.enable_udp = true;
        options.enable_tcp = true;
        options.prefer_udp = true;
        options.initial_available_outgoing_bitrate = self.initial_outgoing_bitrate;

        let transport = router
            .create_webrtc_transport(options)
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to create WebRTC transport: {e}")))?;

        transport
            .set_max_incoming_bitrate(self.max_incoming_bitrate)
            .await
            .map_err(|e| Error::MediaWorker(format!("Failed to set max incoming bitrate: {e}")))?;

        Ok(transport)
    }
}

/// Codecs every router is configured with.
///
/// Clients negotiate down from this list; the configured video codec is
/// a preference for the client side, the router accepts all of them.
fn media_codecs(config: &Config) -> Result<Vec<RtpCodecCapability>> {
    let audio_clock_rate = NonZeroU32::new(config.audio.sample_rate)
        .ok_or_else(|| Error::Validation("audio.sample_rate must be non-zero".to_string()))?;
    let video_clock_rate =
        NonZeroU32::new(90000).ok_or_else(|| Error::Validation("bad video clock rate".into()))?;
    let channels = NonZeroU8::new(2)
        .ok_or_else(|| Error::Validation("bad audio channel count".to_string()))?;

    let video_rtcp_feedback = vec![
        RtcpFeedback::Nack,
        RtcpFeedback::NackPli,
        RtcpFeedback::CcmFir,
        RtcpFeedback::GoogRemb,
        RtcpFeedback::TransportCc,
    ];

    Ok(vec![
        RtpCodecCapability::Audio {
            mime_type: MimeTypeAudio::Opus,
            preferred_payload_type: None,
            clock_rate: audio_clock_rate,
            channels,
            parameters: RtpCodecParametersParameters::from([("useinbandfec", 1_u32.into())]),
            rtcp_feedback: vec![RtcpFeedback::TransportCc],
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp8,
            preferred_payload_type: None,
            clock_rate: video_clock_rate,
            parameters: RtpCodecParametersParameters::from([(
                "x-google-start-bitrate",
                1000_u32.into(),
            )]),
            rtcp_feedback: video_rtcp_feedback.clone(),
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::Vp9,
            preferred_payload_type: None,
            clock_rate: video_clock_rate,
            parameters: RtpCodecParametersParameters::from([
                ("profile-id", 2_u32.into()),
                ("x-google-start-bitrate", 1000_u32.into()),
            ]),
            rtcp_feedback: video_rtcp_feedback.clone(),
        },
        RtpCodecCapability::Video {
            mime_type: MimeTypeVideo::H264,
            preferred_payload_type: None,
            clock_rate: video_clock_rate,
            parameters: RtpCodecParametersParameters::from([
                ("packetization-mode", 1_u32.into()),
                ("profile-level-id", "42e01f".into()),
                ("level-asymmetry-allowed", 1_u32.into()),
                ("x-google-start-bitrate", 1000_u32.into()),
            ]),
            rtcp_feedback: video_rtcp_feedback,
        },
    ])
}
