//! # Quality Reporter
//!
//! Periodic loop that drains the [`QualityAccumulator`], remaps the score
//! to the wire range, and emits two classes of length-prefixed UDP
//! datagrams to the downstream consumer: a status report every interval
//! and, after any lossy interval, a bounded burst of keyframe requests.
//!
//! The wire shape is a fixed legacy contract — the duplicated quality
//! fields and the trailing `23:20` must be reproduced exactly.

use crate::quality::{map_range, QualityAccumulator, QUALITY_MAX, QUALITY_MIN};
use bytes::{BufMut, Bytes, BytesMut};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rand::RngExt;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

// ─── Wire constants ──────────────────────────────────────────────────────────

/// Lower bound of the wire-level quality range.
pub const WIRE_QUALITY_MIN: f64 = 1000.0;

/// Upper bound of the wire-level quality range.
pub const WIRE_QUALITY_MAX: f64 = 2000.0;

/// Keyframe requests sent after a lossy interval: one per tick for up to
/// ten consecutive 100 ms ticks (~1 s), bounded to avoid flooding.
pub const KEYFRAME_BURST: u32 = 10;

/// Length of the random lowercase suffix on keyframe requests. Purely for
/// datagram-content de-duplication on the receiver side.
pub const KEYFRAME_SUFFIX_LEN: usize = 4;

// ─── Wire encoding ───────────────────────────────────────────────────────────

/// Remap a `[-1024, 1024]` score to the `[1000, 2000]` wire range.
pub fn wire_quality(quality: i32) -> i32 {
    map_range(
        f64::from(quality),
        f64::from(QUALITY_MIN),
        f64::from(QUALITY_MAX),
        WIRE_QUALITY_MIN,
        WIRE_QUALITY_MAX,
    ) as i32
}

fn frame_datagram(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

/// Encode the status datagram: 4-byte big-endian length prefix followed by
/// `"<epoch>:<q>:<q>:<recovered>:<lost>:<q>:<q>:23:20\n"`.
pub fn encode_status(epoch: i64, quality: i32, recovered: u32, lost: u32) -> Bytes {
    let line =
        format!("{epoch}:{quality}:{quality}:{recovered}:{lost}:{quality}:{quality}:23:20\n");
    frame_datagram(line.as_bytes())
}

/// Encode a keyframe-request datagram: length prefix followed by
/// `"special:request_keyframe:<suffix>"`.
pub fn encode_keyframe_request(suffix: &str) -> Bytes {
    frame_datagram(format!("special:request_keyframe:{suffix}").as_bytes())
}

/// Random lowercase a–z suffix for keyframe requests.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
        .collect()
}

// ─── Keyframe pacing ─────────────────────────────────────────────────────────

/// Countdown re-armed by loss: after any lossy interval the next
/// [`KEYFRAME_BURST`] ticks each request a keyframe, then the pacer goes
/// quiet until loss recurs.
#[derive(Debug, Default)]
pub struct KeyframePacer {
    remaining: u32,
}

impl KeyframePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one reporting interval. Returns whether a keyframe request
    /// should be sent this tick.
    pub fn tick(&mut self, lost_last_interval: u32) -> bool {
        if lost_last_interval > 0 {
            self.remaining = KEYFRAME_BURST;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }
}

// ─── Reporter loop ───────────────────────────────────────────────────────────

/// The periodic quality-report loop. Runs on its own named thread owned by
/// the runtime; stops when signalled on its stop channel or when a status
/// send fails (fatal to telemetry only, not to routing or transmit).
pub struct QualityReporter {
    quality: Arc<QualityAccumulator>,
    dest: SocketAddr,
    period: Duration,
    warmup: Duration,
}

impl QualityReporter {
    pub fn new(
        quality: Arc<QualityAccumulator>,
        dest: SocketAddr,
        period: Duration,
        warmup: Duration,
    ) -> Self {
        QualityReporter {
            quality,
            dest,
            period,
            warmup,
        }
    }

    /// Run the loop until stopped. Consumes the reporter.
    pub fn run(self, stop: Receiver<()>) {
        if wait_or_stop(&stop, self.warmup) {
            return;
        }

        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, "failed to bind quality report socket");
                return;
            }
        };

        let mut pacer = KeyframePacer::new();

        loop {
            let reading = self.quality.calculate_signal_quality();
            let quality = wire_quality(reading.quality);
            debug!(
                quality,
                recovered = reading.recovered_last_second,
                lost = reading.lost_last_second,
                "link quality"
            );

            let status = encode_status(
                unix_epoch(),
                quality,
                reading.recovered_last_second,
                reading.lost_last_second,
            );
            if let Err(e) = socket.send_to(&status, self.dest) {
                warn!(error = %e, "status send failed, stopping quality reporter");
                break;
            }

            if pacer.tick(reading.lost_last_second) {
                let request = encode_keyframe_request(&random_suffix(KEYFRAME_SUFFIX_LEN));
                if let Err(e) = socket.send_to(&request, self.dest) {
                    warn!(error = %e, "keyframe request send failed");
                }
            }

            // Fixed-interval cadence; processing time is not compensated.
            if wait_or_stop(&stop, self.period) {
                break;
            }
        }
    }
}

/// Sleep for `timeout` unless a stop arrives first. Returns whether the
/// loop should stop.
fn wait_or_stop(stop: &Receiver<()>, timeout: Duration) -> bool {
    match stop.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

fn unix_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
