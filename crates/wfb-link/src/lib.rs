//! # wfb-link
//!
//! Real-time core of a wireless video/telemetry bridge: demultiplexes raw
//! radio frames from a USB RF adapter into video, telemetry, and datagram
//! streams, scores link quality from RSSI and FEC outcomes, and reports a
//! periodic quality summary (plus loss-triggered keyframe requests) over a
//! framed UDP side channel.
//!
//! ## Crate structure
//!
//! - [`config`] — session configuration and well-known defaults
//! - [`quality`] — bounded link-quality scoring from RSSI + FEC samples
//! - [`frame`] — raw-frame validation and ChannelID extraction
//! - [`route`] — per-stream demultiplexing to external aggregators
//! - [`device`] — RF adapter and transmit-engine trait boundary
//! - [`runtime`] — event pump / transmit / reporter thread supervision
//! - [`reporter`] — periodic UDP quality reports and keyframe pacing
//! - [`session`] — host-facing start/stop/refresh control surface

pub mod config;
pub mod device;
pub mod frame;
pub mod quality;
pub mod reporter;
pub mod route;
pub mod runtime;
pub mod session;

pub use config::LinkConfig;
pub use frame::ChannelId;
pub use quality::{QualityAccumulator, QualityReading};
pub use route::{FrameHandler, StreamKind, StreamRouter, StreamSink, StreamStats};
pub use runtime::SessionError;
pub use session::{LinkSession, SinkFactory, StatsObserver};
