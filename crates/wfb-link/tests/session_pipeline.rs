//! End-to-end session tests: a mock RF device replays captured-style frames
//! through the event pump, and the assertions follow them across the
//! classifier, the stream router, the quality accumulator, and the
//! aggregator boundary.

use anyhow::Result;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wfb_link::config::{LinkConfig, TxConfig};
use wfb_link::device::{Bandwidth, FrameTransmitter, RadioDevice, RxPacket};
use wfb_link::frame::{build_frame, ChannelId};
use wfb_link::route::{PacketMeta, StreamKind, StreamSink, StreamStats};
use wfb_link::session::{LinkSession, SinkFactory, StatsObserver};
use wfb_link::FrameHandler;

// ─── Mocks ──────────────────────────────────────────────────────────────────

/// Aggregator stand-in that records every payload it is handed.
#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<Vec<u8>>>,
    stats: Mutex<StreamStats>,
}

impl StreamSink for RecordingSink {
    fn process_packet(&self, payload: &[u8], _meta: &PacketMeta) {
        self.received.lock().unwrap().push(payload.to_vec());
    }

    fn stats(&self) -> StreamStats {
        *self.stats.lock().unwrap()
    }

    fn clear_stats(&self) {
        *self.stats.lock().unwrap() = StreamStats::default();
    }
}

/// Factory handing out one recording sink per stream, remembering them all.
#[derive(Default)]
struct RecordingFactory {
    sinks: Mutex<Vec<(StreamKind, u64, Arc<RecordingSink>)>>,
}

impl RecordingFactory {
    fn sink_for(&self, kind: StreamKind) -> Arc<RecordingSink> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _, _)| *k == kind)
            .map(|(_, _, sink)| sink.clone())
            .expect("factory should have created the sink")
    }
}

impl SinkFactory for RecordingFactory {
    fn create(
        &self,
        kind: StreamKind,
        _channel_id: ChannelId,
        epoch: u64,
    ) -> Result<Arc<dyn StreamSink>> {
        let sink = Arc::new(RecordingSink::default());
        self.sinks.lock().unwrap().push((kind, epoch, sink.clone()));
        Ok(sink)
    }
}

/// Device that replays a queue of frames through the registered handler,
/// one per `handle_events` iteration.
struct ReplayDevice {
    frames: Mutex<VecDeque<RxPacket>>,
    handler: Mutex<Option<Arc<dyn FrameHandler>>>,
    stop: AtomicBool,
}

impl ReplayDevice {
    fn new(frames: Vec<RxPacket>) -> Self {
        ReplayDevice {
            frames: Mutex::new(frames.into()),
            handler: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    fn drained(&self) -> bool {
        self.frames.lock().unwrap().is_empty()
    }
}

impl RadioDevice for ReplayDevice {
    fn init(
        &self,
        _channel: u8,
        _bandwidth: Bandwidth,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<()> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn handle_events(&self) -> Result<()> {
        // Frames only start flowing once init has registered the handler,
        // mirroring the real driver's bring-up order.
        let handler = self.handler.lock().unwrap().clone();
        let Some(handler) = handler else {
            std::thread::sleep(Duration::from_millis(1));
            return Ok(());
        };
        let next = self.frames.lock().unwrap().pop_front();
        match next {
            Some(packet) => handler.handle_frame(&packet),
            None => std::thread::sleep(Duration::from_millis(1)),
        }
        Ok(())
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn set_tx_power(&self, _dbm: u8) {}
}

#[derive(Default)]
struct IdleTransmitter {
    stop: AtomicBool,
}

impl FrameTransmitter for IdleTransmitter {
    fn run(&self, _config: &TxConfig) -> Result<()> {
        while !self.stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

struct NullObserver;

impl StatsObserver for NullObserver {
    fn on_stats(&self, _stats: &StreamStats) {}
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn test_config() -> LinkConfig {
    LinkConfig {
        stats_addr: "127.0.0.1:39998".parse().unwrap(),
        // Long warm-up keeps the reporter from consuming the quality window
        // while assertions read accumulator state; shutdown interrupts the
        // warm-up wait, so stop() still joins promptly.
        warmup_secs: 3600,
        report_period_ms: 10,
        ..LinkConfig::default()
    }
}

fn packet(link_id: u32, port: u8, payload: &[u8], rssi: [i8; 2]) -> RxPacket {
    RxPacket {
        data: Bytes::from(build_frame(ChannelId::new(link_id, port), payload)),
        rssi,
    }
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[test]
fn frames_flow_from_device_to_per_stream_sinks() {
    let config = test_config();
    let link_id = config.link_id;
    let factory = Arc::new(RecordingFactory::default());
    let session = LinkSession::new(config.clone(), factory.clone()).unwrap();

    let device = Arc::new(ReplayDevice::new(vec![
        packet(link_id, 0x00, b"video-0", [60, 55]),
        packet(link_id, 0x10, b"telemetry-0", [60, 55]),
        packet(link_id, config.datagram_radio_port, b"datagram-0", [60, 55]),
        packet(link_id, 0x00, b"video-1", [64, 59]),
        // foreign session traffic must be dropped, not fatal
        packet(link_id + 1, 0x00, b"foreign", [60, 55]),
    ]));
    let transmitter = Arc::new(IdleTransmitter::default());

    session.start(device.clone(), transmitter).unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || device.drained()),
        "event pump should replay all frames"
    );
    session.stop();

    let video = factory.sink_for(StreamKind::Video);
    let telemetry = factory.sink_for(StreamKind::Telemetry);
    let datagram = factory.sink_for(StreamKind::Datagram);

    assert_eq!(
        *video.received.lock().unwrap(),
        vec![b"video-0".to_vec(), b"video-1".to_vec()]
    );
    assert_eq!(
        *telemetry.received.lock().unwrap(),
        vec![b"telemetry-0".to_vec()]
    );
    assert_eq!(
        *datagram.received.lock().unwrap(),
        vec![b"datagram-0".to_vec()]
    );

    // Only the two video frames fed the accumulator: means (62, 57) → 62.
    assert!((session.quality().average_rssi() - 62.0).abs() < 1e-9);
}

#[test]
fn second_start_is_rejected_while_running() {
    let factory = Arc::new(RecordingFactory::default());
    let session = LinkSession::new(test_config(), factory).unwrap();

    let device = Arc::new(ReplayDevice::new(Vec::new()));
    let transmitter = Arc::new(IdleTransmitter::default());
    session.start(device.clone(), transmitter.clone()).unwrap();

    let err = session
        .start(device, transmitter)
        .expect_err("second start must fail");
    assert!(matches!(err, wfb_link::SessionError::AlreadyRunning));

    session.stop();
}

#[test]
fn refresh_swaps_aggregators_for_subsequent_frames() {
    let config = test_config();
    let link_id = config.link_id;
    let factory = Arc::new(RecordingFactory::default());
    let session = LinkSession::new(config, factory.clone()).unwrap();

    let old_video = factory.sink_for(StreamKind::Video);
    session.refresh().unwrap();
    let new_video = factory.sink_for(StreamKind::Video);

    let device = Arc::new(ReplayDevice::new(vec![packet(
        link_id,
        0x00,
        b"post-refresh",
        [60, 60],
    )]));
    let transmitter = Arc::new(IdleTransmitter::default());
    session.start(device.clone(), transmitter).unwrap();
    assert!(wait_until(Duration::from_secs(2), || device.drained()));
    session.stop();

    assert!(old_video.received.lock().unwrap().is_empty());
    assert_eq!(
        *new_video.received.lock().unwrap(),
        vec![b"post-refresh".to_vec()]
    );
}

#[test]
fn stats_report_feeds_quality_and_resets_interval() {
    let factory = Arc::new(RecordingFactory::default());
    let session = LinkSession::new(test_config(), factory.clone()).unwrap();
    let video = factory.sink_for(StreamKind::Video);

    *video.stats.lock().unwrap() = StreamStats {
        packets_total: 50,
        fec_recovered: 7,
        lost: 1,
        ..StreamStats::default()
    };

    session.report_stats(&NullObserver);
    assert_eq!(video.stats().packets_total, 0, "interval counters reset");

    let reading = session.quality().calculate_signal_quality();
    assert_eq!(reading.recovered_last_second, 7);
    assert_eq!(reading.lost_last_second, 1);
}
