//! External driver boundary.
//!
//! The RF adapter driver and the raw transmit framing engine live outside
//! this crate. These traits pin down exactly what the session core needs
//! from them: a blocking event-dispatch call that hands frames to a
//! [`FrameHandler`], a cooperative per-device stop flag, and a stoppable
//! transmit loop. Mock implementations back the tests.

use crate::config::TxConfig;
use crate::route::FrameHandler;
use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;

/// RF channel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bandwidth {
    #[default]
    Bw20,
    Bw40,
}

impl Bandwidth {
    /// Anything other than 40 MHz falls back to 20 MHz, matching the
    /// driver's two supported widths.
    pub fn from_mhz(mhz: u32) -> Self {
        if mhz == 40 {
            Bandwidth::Bw40
        } else {
            Bandwidth::Bw20
        }
    }

    pub fn mhz(self) -> u32 {
        match self {
            Bandwidth::Bw20 => 20,
            Bandwidth::Bw40 => 40,
        }
    }
}

/// One raw frame as delivered by the adapter, with physical-layer metadata.
#[derive(Debug, Clone)]
pub struct RxPacket {
    /// Raw frame bytes, link-layer header and FCS included.
    pub data: Bytes,
    /// Per-antenna signal strength of this frame.
    pub rssi: [i8; 2],
}

/// A claimed USB RF adapter.
///
/// `handle_events` runs one blocking event-dispatch iteration; every
/// successfully dispatched event may synchronously invoke the registered
/// [`FrameHandler`]. Stop requests are cooperative: the event pump observes
/// `stop_requested` once per iteration, so stopping is not immediate.
pub trait RadioDevice: Send + Sync {
    /// Program the device for the given channel and width and register the
    /// frame handler. Must be called after the event pump is running.
    fn init(&self, channel: u8, bandwidth: Bandwidth, handler: Arc<dyn FrameHandler>)
        -> Result<()>;

    /// Dispatch pending device events, blocking until at least one arrives
    /// or the call fails.
    fn handle_events(&self) -> Result<()>;

    /// Raise the per-device stop flag.
    fn request_stop(&self);

    /// Whether a stop has been requested.
    fn stop_requested(&self) -> bool;

    /// Set the transmit power in dBm.
    fn set_tx_power(&self, dbm: u8);
}

/// The outbound raw-frame transmit engine.
pub trait FrameTransmitter: Send + Sync {
    /// Run the send loop until stopped. Blocking; driven on its own thread.
    fn run(&self, config: &TxConfig) -> Result<()>;

    /// Signal the send loop to stop.
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_from_mhz() {
        assert_eq!(Bandwidth::from_mhz(40), Bandwidth::Bw40);
        assert_eq!(Bandwidth::from_mhz(20), Bandwidth::Bw20);
        assert_eq!(Bandwidth::from_mhz(80), Bandwidth::Bw20);
        assert_eq!(Bandwidth::Bw40.mhz(), 40);
    }
}
