//! Session configuration.
//!
//! All values carry the well-known defaults of the ground-station link:
//! link id derived from the default link domain, video/telemetry radio
//! ports 0x00/0x10, and the legacy stats endpoint on port 9999.

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Radio port of the video stream.
pub const VIDEO_RADIO_PORT: u8 = 0x00;

/// Radio port of the telemetry/command stream.
pub const TELEMETRY_RADIO_PORT: u8 = 0x10;

/// Top-level link session configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Link identifier shared by all three stream ChannelIDs.
    pub link_id: u32,
    /// Radio port of the generic datagram stream.
    pub datagram_radio_port: u8,
    /// RF channel number.
    pub channel: u8,
    /// Channel width in MHz (20 or 40).
    pub bandwidth_mhz: u32,
    /// Destination for status and keyframe-request datagrams.
    pub stats_addr: SocketAddr,
    /// Quality reporter cadence.
    pub report_period_ms: u64,
    /// Delay before the first quality report, letting the link settle.
    pub warmup_secs: u64,
    /// Transmit power applied once the session is up, in dBm.
    pub tx_power_dbm: u8,
    /// Outbound transmit loop parameters.
    pub tx: TxConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            // sha1-derived id of the default link domain
            link_id: 7_669_206,
            datagram_radio_port: 0x20,
            channel: 161,
            bandwidth_mhz: 20,
            stats_addr: SocketAddr::from(([10, 5, 0, 10], 9999)),
            report_period_ms: 100,
            warmup_secs: 10,
            tx_power_dbm: 30,
            tx: TxConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Parse a TOML document into a config, filling omitted fields with
    /// defaults.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid link configuration")
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_millis(self.report_period_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }
}

/// Fixed parameter set for the outbound transmit loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    /// Local UDP port the transmit loop consumes from.
    pub udp_port: u16,
    /// Radio port stamped on outgoing frames.
    pub radio_port: u8,
    /// FEC block shape: data packets per block.
    pub k: u32,
    /// FEC block shape: total packets per block.
    pub n: u32,
    /// Modulation/coding scheme index.
    pub mcs_index: u8,
    /// Transmit channel width in MHz.
    pub bandwidth_mhz: u32,
    pub stbc: bool,
    pub ldpc: bool,
    pub vht_mode: bool,
    pub short_gi: bool,
}

impl Default for TxConfig {
    fn default() -> Self {
        TxConfig {
            udp_port: 8001,
            radio_port: 0x20,
            k: 1,
            n: 2,
            mcs_index: 2,
            bandwidth_mhz: 20,
            stbc: true,
            ldpc: true,
            vht_mode: false,
            short_gi: false,
        }
    }
}
