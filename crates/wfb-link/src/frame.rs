//! # Frame Classification
//!
//! Validation of raw radio frames and extraction of the embedded logical
//! channel identifier.
//!
//! ## Link-layer frame shape
//!
//! ```text
//!  0        2        4      6            10                    24
//! +--------+--------+------+------------+---- ··· ------------+-- ··· --+----+
//! | frame  | dura-  | "WB" | ChannelID  | addr2/addr3, seq    | payload |FCS |
//! | control| tion   |magic | (u32, BE)  | (mirror of addr1)   |         |(4) |
//! +--------+--------+------+------------+---------------------+---------+----+
//! ```
//!
//! Each protocol frame is an injected 802.11 data frame whose address fields
//! carry the two-byte `WB` magic followed by the big-endian ChannelID. The
//! classifier strips the fixed 24-byte header and the 4-byte trailing
//! integrity suffix before the payload moves on to an aggregator.

use std::fmt;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Fixed 802.11 data-frame header length.
pub const LINK_HEADER_LEN: usize = 24;

/// Trailing frame check sequence length.
pub const FCS_LEN: usize = 4;

/// Shortest frame the classifier will accept: a bare header and suffix.
/// The payload may be empty.
pub const MIN_FRAME_LEN: usize = LINK_HEADER_LEN + FCS_LEN;

/// Frame-control bytes of an injected data frame (data subtype, ToDS).
const FRAME_CONTROL: [u8; 2] = [0x08, 0x01];

/// Protocol magic opening every address field.
const CHANNEL_MAGIC: [u8; 2] = *b"WB";

/// First address field (magic + ChannelID) starts after frame control and
/// duration.
const ADDR1_OFFSET: usize = 4;

/// Big-endian ChannelID inside the first address field.
const CHANNEL_ID_OFFSET: usize = ADDR1_OFFSET + CHANNEL_MAGIC.len();

// ─── ChannelId ───────────────────────────────────────────────────────────────

/// 32-bit logical stream identifier: `(link_id << 8) | radio_port`.
///
/// Derived once per session from a fixed link id; stable for the lifetime
/// of a link session. Transmitted big-endian inside each frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u32);

impl ChannelId {
    pub fn new(link_id: u32, radio_port: u8) -> Self {
        ChannelId((link_id << 8) | u32::from(radio_port))
    }

    pub fn from_raw(raw: u32) -> Self {
        ChannelId(raw)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn link_id(self) -> u32 {
        self.0 >> 8
    }

    pub fn radio_port(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Wire representation, as embedded in the frame address fields.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChannelId(link={}, port={:#04x})",
            self.link_id(),
            self.radio_port()
        )
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ─── RxFrame ─────────────────────────────────────────────────────────────────

/// A validated borrowed view over one raw radio frame.
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    data: &'a [u8],
    channel_id: ChannelId,
}

impl<'a> RxFrame<'a> {
    /// Validate a raw frame and extract its ChannelID.
    ///
    /// Returns `None` for anything that is not a protocol frame: too short,
    /// wrong frame control, or missing magic. Unmatched frames are expected
    /// in multi-tenant RF environments and are simply dropped upstream.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < MIN_FRAME_LEN {
            return None;
        }
        if data[0..2] != FRAME_CONTROL {
            return None;
        }
        if data[ADDR1_OFFSET..ADDR1_OFFSET + 2] != CHANNEL_MAGIC {
            return None;
        }

        let raw = u32::from_be_bytes(
            data[CHANNEL_ID_OFFSET..CHANNEL_ID_OFFSET + 4]
                .try_into()
                .ok()?,
        );

        Some(RxFrame {
            data,
            channel_id: ChannelId::from_raw(raw),
        })
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Payload with the link-layer header and trailing FCS stripped.
    pub fn payload(&self) -> &'a [u8] {
        &self.data[LINK_HEADER_LEN..self.data.len() - FCS_LEN]
    }
}

/// Build a protocol frame around `payload` for the given channel.
///
/// Test and simulation helper; real frames come off the radio.
pub fn build_frame(channel_id: ChannelId, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LINK_HEADER_LEN + payload.len() + FCS_LEN);
    frame.extend_from_slice(&FRAME_CONTROL);
    frame.extend_from_slice(&[0x00, 0x00]); // duration
    for _ in 0..3 {
        frame.extend_from_slice(&CHANNEL_MAGIC);
        frame.extend_from_slice(&channel_id.to_be_bytes());
    }
    frame.extend_from_slice(&[0x00, 0x00]); // sequence control
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&[0u8; FCS_LEN]);
    frame
}
