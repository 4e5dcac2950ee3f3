//! # Session Runtime
//!
//! Owns and supervises the three threads of an active device session:
//!
//! - **event pump** — blocking device event dispatch, frames handed
//!   synchronously to the router;
//! - **transmit loop** — the external transmit engine driven by a fixed
//!   [`TxConfig`];
//! - **quality reporter** — the periodic UDP telemetry loop.
//!
//! Startup: pump and transmit loop first, then the channel/bandwidth
//! device initialization, then the reporter. Shutdown walks the reverse
//! producer/consumer direction — stop flag, transmit stop, join transmit,
//! join pump, join reporter — so no thread is joined while it could still
//! be producing for a torn-down consumer.

use crate::config::LinkConfig;
use crate::device::{Bandwidth, FrameTransmitter, RadioDevice};
use crate::quality::QualityAccumulator;
use crate::reporter::QualityReporter;
use crate::route::{FrameHandler, StreamRouter};
use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info};

/// Structured failure surface of session startup.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Device claim or channel programming failed. The coordinated
    /// shutdown has already run; retry policy belongs to the host.
    #[error("device initialization failed: {0}")]
    DeviceInit(#[source] anyhow::Error),

    #[error("link session is already running")]
    AlreadyRunning,

    #[error("failed to spawn {thread} thread")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Supervisor for one device session's threads.
///
/// Created by [`LinkRuntime::start`]; dropping it runs the coordinated
/// shutdown.
pub struct LinkRuntime {
    device: Arc<dyn RadioDevice>,
    transmitter: Arc<dyn FrameTransmitter>,
    event_handle: Option<JoinHandle<()>>,
    tx_handle: Option<JoinHandle<()>>,
    reporter_handle: Option<JoinHandle<()>>,
    reporter_stop: Option<Sender<()>>,
}

impl LinkRuntime {
    /// Spawn the session threads and initialize the device.
    ///
    /// On a device initialization error the already-spawned threads are
    /// shut down in order before the error propagates.
    pub fn start(
        config: &LinkConfig,
        device: Arc<dyn RadioDevice>,
        transmitter: Arc<dyn FrameTransmitter>,
        router: Arc<StreamRouter>,
        quality: Arc<QualityAccumulator>,
    ) -> Result<Self, SessionError> {
        // Event pump: observes the stop flag once per iteration, so a stop
        // request takes effect on the next dispatch return.
        let pump_device = device.clone();
        let event_handle = thread::Builder::new()
            .name("wfb-events".into())
            .spawn(move || loop {
                if pump_device.stop_requested() {
                    debug!("event pump observed stop request");
                    break;
                }
                if let Err(e) = pump_device.handle_events() {
                    error!(error = %e, "event dispatch failed, stopping pump");
                    break;
                }
            })
            .map_err(|source| SessionError::Spawn {
                thread: "wfb-events",
                source,
            })?;

        let mut runtime = LinkRuntime {
            device: device.clone(),
            transmitter: transmitter.clone(),
            event_handle: Some(event_handle),
            tx_handle: None,
            reporter_handle: None,
            reporter_stop: None,
        };

        let tx_config = config.tx.clone();
        let tx_engine = transmitter.clone();
        let tx_spawn = thread::Builder::new().name("wfb-tx".into()).spawn(move || {
            if let Err(e) = tx_engine.run(&tx_config) {
                error!(error = %e, "transmit loop failed");
            }
            debug!("transmit loop exited");
        });
        match tx_spawn {
            Ok(handle) => runtime.tx_handle = Some(handle),
            Err(source) => {
                runtime.shutdown();
                return Err(SessionError::Spawn {
                    thread: "wfb-tx",
                    source,
                });
            }
        }

        // Channel/bandwidth-dependent device bring-up; the reporter starts
        // only after this succeeds.
        let handler: Arc<dyn FrameHandler> = router;
        if let Err(e) = device.init(
            config.channel,
            Bandwidth::from_mhz(config.bandwidth_mhz),
            handler,
        ) {
            runtime.shutdown();
            return Err(SessionError::DeviceInit(e));
        }

        let (stop_tx, stop_rx) = bounded(1);
        let reporter = QualityReporter::new(
            quality,
            config.stats_addr,
            config.report_period(),
            config.warmup(),
        );
        let reporter_spawn = thread::Builder::new()
            .name("wfb-quality".into())
            .spawn(move || reporter.run(stop_rx));
        match reporter_spawn {
            Ok(handle) => {
                runtime.reporter_handle = Some(handle);
                runtime.reporter_stop = Some(stop_tx);
            }
            Err(source) => {
                runtime.shutdown();
                return Err(SessionError::Spawn {
                    thread: "wfb-quality",
                    source,
                });
            }
        }

        device.set_tx_power(config.tx_power_dbm);
        info!(
            channel = config.channel,
            bandwidth_mhz = config.bandwidth_mhz,
            "link session running"
        );

        Ok(runtime)
    }

    /// Coordinated shutdown: stop flag → transmit stop → join transmit →
    /// join pump → signal and join reporter. Idempotent.
    pub fn shutdown(&mut self) {
        self.device.request_stop();
        self.transmitter.stop();
        if let Some(handle) = self.tx_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.event_handle.take() {
            let _ = handle.join();
        }
        if let Some(stop) = self.reporter_stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.reporter_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LinkRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
