//! # Stream Routing
//!
//! Demultiplexes validated frames onto the three logical streams by
//! ChannelID and dispatches payloads to the external aggregators. Frames
//! on the video route additionally feed their RSSI pair into the
//! [`QualityAccumulator`] before dispatch.
//!
//! One coarse routing lock serializes dispatch and guards aggregator
//! replacement during a session refresh: an in-flight frame always
//! completes against the pre-refresh or post-refresh sinks, never a torn
//! mix.

use crate::device::RxPacket;
use crate::frame::{ChannelId, RxFrame};
use crate::quality::QualityAccumulator;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

// ─── Frame handler seam ──────────────────────────────────────────────────────

/// Capability to consume one raw frame from the event pump.
///
/// The pump dispatches through this trait object instead of a closure so
/// that the handler's lifetime is owned explicitly by the threads using it.
pub trait FrameHandler: Send + Sync {
    fn handle_frame(&self, packet: &RxPacket);
}

// ─── Stream identity ─────────────────────────────────────────────────────────

/// The three logical streams sharing one physical radio link, in routing
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Telemetry,
    Datagram,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Telemetry => "telemetry",
            StreamKind::Datagram => "datagram",
        }
    }
}

// ─── Aggregator boundary ─────────────────────────────────────────────────────

/// Cumulative interval counters exposed by an aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub packets_total: u32,
    pub decrypt_err: u32,
    pub decrypt_ok: u32,
    pub fec_recovered: u32,
    pub lost: u32,
    pub bad: u32,
    pub overridden: u32,
    pub outgoing: u32,
}

/// Reconstructed physical-layer metadata handed to an aggregator with each
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub decrypt_flag: u8,
    pub antenna: [u8; 4],
    pub rssi: [i8; 4],
    pub noise: [i8; 4],
    pub freq: u32,
}

impl PacketMeta {
    /// Fill the four-slot arrays from the adapter's two-antenna reading;
    /// unused slots carry the placeholder value 1.
    pub fn from_rssi(rssi: [i8; 2]) -> Self {
        PacketMeta {
            decrypt_flag: 0,
            antenna: [1; 4],
            rssi: [rssi[0], rssi[1], 1, 1],
            noise: [1; 4],
            freq: 0,
        }
    }
}

/// External aggregator for one stream: reassembles, decrypts, and reorders
/// payloads, and exposes cumulative counters.
pub trait StreamSink: Send + Sync {
    /// Consume one payload, already stripped of the link-layer header and
    /// trailing integrity suffix.
    fn process_packet(&self, payload: &[u8], meta: &PacketMeta);

    /// Snapshot of the cumulative interval counters.
    fn stats(&self) -> StreamStats;

    /// Reset the interval counters.
    fn clear_stats(&self);
}

// ─── Routes ──────────────────────────────────────────────────────────────────

/// Association between a ChannelID and an aggregator instance.
pub struct StreamRoute {
    pub channel_id: ChannelId,
    pub sink: Arc<dyn StreamSink>,
}

/// The complete per-session route table, replaced wholesale on refresh.
pub struct RouteSet {
    pub video: StreamRoute,
    pub telemetry: StreamRoute,
    pub datagram: StreamRoute,
}

impl RouteSet {
    /// Match in fixed priority order: video, telemetry, datagram.
    fn lookup(&self, id: ChannelId) -> Option<(StreamKind, &StreamRoute)> {
        if id == self.video.channel_id {
            Some((StreamKind::Video, &self.video))
        } else if id == self.telemetry.channel_id {
            Some((StreamKind::Telemetry, &self.telemetry))
        } else if id == self.datagram.channel_id {
            Some((StreamKind::Datagram, &self.datagram))
        } else {
            None
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Classifies incoming frames and dispatches them to the matching
/// aggregator.
pub struct StreamRouter {
    routes: Mutex<RouteSet>,
    quality: Arc<QualityAccumulator>,
}

impl StreamRouter {
    pub fn new(routes: RouteSet, quality: Arc<QualityAccumulator>) -> Self {
        StreamRouter {
            routes: Mutex::new(routes),
            quality,
        }
    }

    /// Swap all three routes atomically with respect to frame dispatch.
    pub fn replace_routes(&self, routes: RouteSet) {
        let mut guard = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        *guard = routes;
    }

    /// The current video aggregator, for the stats-callback surface.
    pub fn video_sink(&self) -> Arc<dyn StreamSink> {
        let guard = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        guard.video.sink.clone()
    }
}

impl FrameHandler for StreamRouter {
    fn handle_frame(&self, packet: &RxPacket) {
        let Some(frame) = RxFrame::parse(&packet.data) else {
            // Not a protocol frame; silently dropped.
            return;
        };

        let meta = PacketMeta::from_rssi(packet.rssi);
        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());

        match routes.lookup(frame.channel_id()) {
            Some((StreamKind::Video, route)) => {
                self.quality.add_rssi(packet.rssi[0], packet.rssi[1]);
                route.sink.process_packet(frame.payload(), &meta);
            }
            Some((kind, route)) => {
                debug!(stream = kind.as_str(), "routing frame");
                route.sink.process_packet(frame.payload(), &meta);
            }
            None => {
                // Foreign or stale session; demultiplexing has no recovery path.
                warn!(channel_id = %frame.channel_id(), "unmatched channel id, dropping frame");
            }
        }
    }
}
