//! # Link-Quality Scoring
//!
//! Accumulates per-frame RSSI samples and per-interval FEC outcomes, and
//! collapses them into a single bounded quality score on demand.
//!
//! Producers (the frame-routing path and the stats callback) append samples
//! from any thread; the quality reporter consumes them once per reporting
//! interval via [`QualityAccumulator::calculate_signal_quality`], which
//! scores and then clears the window in one critical section.

use std::sync::Mutex;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Lower bound of the quality score, doubling as the "no data" sentinel.
pub const QUALITY_MIN: i32 = -1024;

/// Upper bound of the quality score.
pub const QUALITY_MAX: i32 = 1024;

/// Assumed operating floor of the combined RSSI, mapped to [`QUALITY_MIN`].
pub const RSSI_RANGE_LOW: f64 = 30.0;

/// Assumed operating ceiling of the combined RSSI, mapped to [`QUALITY_MAX`].
pub const RSSI_RANGE_HIGH: f64 = 90.0;

/// Score penalty per FEC-recovered packet in the interval.
const RECOVERED_PENALTY: i64 = 10;

/// Score penalty per unrecoverable packet in the interval. Uncorrected loss
/// is an order of magnitude worse than FEC-recovered loss.
const LOST_PENALTY: i64 = 100;

// ─── Linear remap ────────────────────────────────────────────────────────────

/// Linearly remap `value` from `[in_min, in_max]` to `[out_min, out_max]`.
///
/// No clamping: inputs outside the source range produce outputs outside the
/// target range. Callers clamp where the wire or score contract requires it.
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

// ─── Quality reading ─────────────────────────────────────────────────────────

/// One scoring outcome, produced fresh per call and never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityReading {
    /// Bounded score in `[QUALITY_MIN, QUALITY_MAX]`; `QUALITY_MIN` also
    /// stands in for "no FEC data this interval".
    pub quality: i32,
    /// FEC-recovered packet total consumed in this cycle.
    pub recovered_last_second: u32,
    /// Lost packet total consumed in this cycle.
    pub lost_last_second: u32,
}

impl QualityReading {
    fn no_data() -> Self {
        QualityReading {
            quality: QUALITY_MIN,
            recovered_last_second: 0,
            lost_last_second: 0,
        }
    }
}

// ─── Accumulator ─────────────────────────────────────────────────────────────

/// Not-yet-scored samples for the current reporting interval.
#[derive(Default)]
struct SampleWindow {
    /// Per-antenna RSSI pairs, one per video frame.
    rssi: Vec<(i8, i8)>,
    /// (recovered, lost) pairs, one per stats callback.
    fec: Vec<(u32, u32)>,
}

impl SampleWindow {
    /// Best-antenna heuristic: the maximum of the two per-antenna RSSI means.
    /// Zero samples yield 0.0 for both means.
    fn best_antenna_avg(&self) -> f64 {
        if self.rssi.is_empty() {
            return 0.0;
        }
        let count = self.rssi.len() as f64;
        let (sum1, sum2) = self
            .rssi
            .iter()
            .fold((0.0f64, 0.0f64), |(a, b), &(r1, r2)| {
                (a + f64::from(r1), b + f64::from(r2))
            });
        (sum1 / count).max(sum2 / count)
    }

    /// FEC totals for the interval.
    fn fec_totals(&self) -> (u32, u32) {
        self.fec.iter().fold((0, 0), |(rec, lost), &(r, l)| {
            (rec.saturating_add(r), lost.saturating_add(l))
        })
    }

    fn clear(&mut self) {
        self.rssi.clear();
        self.fec.clear();
    }
}

/// Thread-safe, explicitly owned quality scorer.
///
/// Shared between the stream router and the quality reporter via `Arc`.
/// One exclusive lock guards the whole accumulate-or-score critical section;
/// a sample added concurrently with a scoring call lands in either that
/// cycle or the next, never a torn mix.
#[derive(Default)]
pub struct QualityAccumulator {
    window: Mutex<SampleWindow>,
}

impl QualityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one per-antenna RSSI sample. Called on the video routing path.
    pub fn add_rssi(&self, ant1: i8, ant2: i8) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.rssi.push((ant1, ant2));
    }

    /// Append one (recovered, lost) FEC sample. Called from the stats callback.
    pub fn add_fec_data(&self, recovered: u32, lost: u32) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.fec.push((recovered, lost));
    }

    /// Current best-antenna average RSSI without consuming the window.
    pub fn average_rssi(&self) -> f64 {
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.best_antenna_avg()
    }

    /// Score the current window and clear it.
    ///
    /// With zero FEC samples the sentinel reading is returned and the RSSI
    /// window is cleared anyway, so two consecutive no-data calls both yield
    /// the sentinel. Otherwise the combined RSSI is remapped from
    /// `[RSSI_RANGE_LOW, RSSI_RANGE_HIGH]` to `[QUALITY_MIN, QUALITY_MAX]`
    /// and the graduated recovered/lost penalty is applied before the final
    /// clamp.
    pub fn calculate_signal_quality(&self) -> QualityReading {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());

        if window.fec.is_empty() {
            window.clear();
            return QualityReading::no_data();
        }

        let (recovered, lost) = window.fec_totals();
        let avg_rssi = window.best_antenna_avg();
        window.clear();

        let mapped = map_range(
            avg_rssi,
            RSSI_RANGE_LOW,
            RSSI_RANGE_HIGH,
            f64::from(QUALITY_MIN),
            f64::from(QUALITY_MAX),
        );

        let penalized = mapped as i64
            - i64::from(recovered) * RECOVERED_PENALTY
            - i64::from(lost) * LOST_PENALTY;
        let quality = penalized.clamp(i64::from(QUALITY_MIN), i64::from(QUALITY_MAX)) as i32;

        QualityReading {
            quality,
            recovered_last_second: recovered,
            lost_last_second: lost,
        }
    }
}
