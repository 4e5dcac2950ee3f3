//! # Device-Session Control Surface
//!
//! [`LinkSession`] is what the host drives: build it from a [`LinkConfig`]
//! and a [`SinkFactory`], then `start` it against a claimed device,
//! `stop` it, `refresh` the stream routes on rekey/reconnect, and poll
//! `report_stats` to surface aggregator counters.

use crate::config::{LinkConfig, TELEMETRY_RADIO_PORT, VIDEO_RADIO_PORT};
use crate::device::{FrameTransmitter, RadioDevice};
use crate::frame::ChannelId;
use crate::quality::QualityAccumulator;
use crate::route::{RouteSet, StreamKind, StreamRoute, StreamRouter, StreamSink, StreamStats};
use crate::runtime::{LinkRuntime, SessionError};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Constructs aggregator instances. Aggregation (reassembly, decryption,
/// reordering) is the host's concern; the core only routes into it.
pub trait SinkFactory: Send + Sync {
    fn create(
        &self,
        kind: StreamKind,
        channel_id: ChannelId,
        epoch: u64,
    ) -> Result<Arc<dyn StreamSink>>;
}

/// Receives the periodic counter snapshot emitted by
/// [`LinkSession::report_stats`].
pub trait StatsObserver {
    fn on_stats(&self, stats: &StreamStats);
}

/// One logical link session: shared quality state, the stream router, and
/// (while started) the thread runtime.
pub struct LinkSession {
    config: LinkConfig,
    factory: Arc<dyn SinkFactory>,
    quality: Arc<QualityAccumulator>,
    router: Arc<StreamRouter>,
    /// Bumped on every refresh; handed to the factory so aggregators can
    /// rekey.
    epoch: AtomicU64,
    runtime: Mutex<Option<LinkRuntime>>,
}

impl LinkSession {
    /// Build a session and its initial route set (epoch 0).
    pub fn new(config: LinkConfig, factory: Arc<dyn SinkFactory>) -> Result<Self> {
        let quality = Arc::new(QualityAccumulator::new());
        let routes = build_routes(&config, factory.as_ref(), 0)?;
        let router = Arc::new(StreamRouter::new(routes, quality.clone()));
        Ok(LinkSession {
            config,
            factory,
            quality,
            router,
            epoch: AtomicU64::new(0),
            runtime: Mutex::new(None),
        })
    }

    pub fn quality(&self) -> Arc<QualityAccumulator> {
        self.quality.clone()
    }

    pub fn router(&self) -> Arc<StreamRouter> {
        self.router.clone()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Begin classify/route/report against a claimed device.
    ///
    /// Fails with [`SessionError::AlreadyRunning`] if the session is
    /// already started; a device initialization failure has already run
    /// the coordinated shutdown when it reaches the caller.
    pub fn start(
        &self,
        device: Arc<dyn RadioDevice>,
        transmitter: Arc<dyn FrameTransmitter>,
    ) -> Result<(), SessionError> {
        let mut guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let runtime = LinkRuntime::start(
            &self.config,
            device,
            transmitter,
            self.router.clone(),
            self.quality.clone(),
        )?;
        *guard = Some(runtime);
        Ok(())
    }

    /// Request and complete the coordinated shutdown. Idempotent.
    pub fn stop(&self) {
        let runtime = {
            let mut guard = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(mut runtime) = runtime {
            runtime.shutdown();
            info!("link session stopped");
        }
    }

    /// Regenerate all three stream routes from the factory with a bumped
    /// epoch, swapping them wholesale under the routing lock. In-flight
    /// frames complete against the old or new aggregators, never a mix.
    pub fn refresh(&self) -> Result<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let routes = build_routes(&self.config, self.factory.as_ref(), epoch)?;
        self.router.replace_routes(routes);
        info!(epoch, "stream routes refreshed");
        Ok(())
    }

    /// Emit one counter snapshot from the video aggregator.
    ///
    /// Feeds the interval's (recovered, lost) totals into the quality
    /// accumulator, hands the snapshot to the observer, then resets the
    /// aggregator's interval counters.
    pub fn report_stats(&self, observer: &dyn StatsObserver) {
        let sink = self.router.video_sink();
        let stats = sink.stats();
        self.quality.add_fec_data(stats.fec_recovered, stats.lost);
        observer.on_stats(&stats);
        sink.clear_stats();
    }
}

fn build_routes(config: &LinkConfig, factory: &dyn SinkFactory, epoch: u64) -> Result<RouteSet> {
    let make = |kind: StreamKind, port: u8| -> Result<StreamRoute> {
        let channel_id = ChannelId::new(config.link_id, port);
        let sink = factory.create(kind, channel_id, epoch)?;
        Ok(StreamRoute { channel_id, sink })
    };
    Ok(RouteSet {
        video: make(StreamKind::Video, VIDEO_RADIO_PORT)?,
        telemetry: make(StreamKind::Telemetry, TELEMETRY_RADIO_PORT)?,
        datagram: make(StreamKind::Datagram, config.datagram_radio_port)?,
    })
}
