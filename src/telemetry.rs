//! Background battery telemetry listener.
//!
//! The firmware bridge multicasts battery ADC messages on the loopback
//! interface (the bootstrap script adds the multicast route at boot). Each
//! datagram is an array of little-endian f32 voltage readings; the battery
//! rail sits at a fixed index. A spawned task owns the socket and is the
//! single writer of a watch channel; the render loop only ever reads the
//! latest value and never blocks on a message.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Error};
use log::{error, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::battery::{NO_TELEMETRY, READ_ERROR};
use crate::config::TelemetryConfig;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Reading {
    volts: f32,
    received_at: Instant,
}

#[cfg(test)]
impl Reading {
    pub(crate) fn now(volts: f32) -> Reading {
        Reading {
            volts,
            received_at: Instant::now(),
        }
    }
}

/// Read side of the telemetry feed, owned by the display loop.
pub struct TelemetryHandle {
    rx: Option<watch::Receiver<Reading>>,
    timeout: Duration,
}

impl TelemetryHandle {
    /// Latest battery voltage, or the no-telemetry sentinel when the
    /// subscription is disabled or the last message is older than the
    /// timeout. Stale data is the only hazard here, so a timestamp check is
    /// all the synchronization the reader needs.
    /// Handle wired to an in-process sender instead of a socket, for tests
    /// that drive the display loop with scripted readings.
    #[cfg(test)]
    pub(crate) fn manual(timeout: Duration) -> (watch::Sender<Reading>, TelemetryHandle) {
        let (tx, rx) = watch::channel(Reading {
            volts: NO_TELEMETRY,
            received_at: Instant::now(),
        });
        let handle = TelemetryHandle {
            rx: Some(rx),
            timeout,
        };
        (tx, handle)
    }

    pub fn latest_volts(&self) -> f32 {
        match &self.rx {
            None => NO_TELEMETRY,
            Some(rx) => {
                let reading = *rx.borrow();
                if reading.received_at.elapsed() > self.timeout {
                    NO_TELEMETRY
                } else {
                    reading.volts
                }
            }
        }
    }
}

/// Resolve the telemetry capability once at startup. `None` in the config
/// means no subscription: the handle then always reports no telemetry.
pub fn start(config: Option<TelemetryConfig>) -> Result<TelemetryHandle, Error> {
    let config = match config {
        Some(config) => config,
        None => {
            info!("Telemetry disabled by config; battery screen will show no data");
            return Ok(TelemetryHandle {
                rx: None,
                timeout: Duration::ZERO,
            });
        }
    };

    let group: Ipv4Addr = config
        .group
        .parse()
        .with_context(|| format!("invalid multicast group '{}'", config.group))?;

    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port))
        .with_context(|| format!("failed to bind telemetry port {}", config.port))?;
    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .with_context(|| format!("failed to join multicast group {}", group))?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket)?;

    let (tx, rx) = watch::channel(Reading {
        volts: NO_TELEMETRY,
        received_at: Instant::now(),
    });

    let timeout = Duration::from_secs(config.timeout_secs);
    let voltage_index = config.voltage_index;

    tokio::spawn(async move {
        info!(
            "Telemetry listener running on {}:{} (voltage index {})",
            group, config.port, voltage_index
        );
        let mut buf = [0u8; 512];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, _peer)) => {
                    let volts = decode_volts(&buf[..len], voltage_index);
                    if volts == READ_ERROR {
                        warn!("Unparseable telemetry datagram ({} bytes)", len);
                    }
                    let _ = tx.send(Reading {
                        volts,
                        received_at: Instant::now(),
                    });
                }
                Err(e) => {
                    error!("Telemetry socket error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    Ok(TelemetryHandle {
        rx: Some(rx),
        timeout,
    })
}

/// Decode one datagram: a packed array of little-endian f32 readings. A
/// short or ragged payload, or an index past the end of the array, yields
/// the read-error sentinel.
pub fn decode_volts(payload: &[u8], index: usize) -> f32 {
    if payload.is_empty() || payload.len() % 4 != 0 {
        return READ_ERROR;
    }
    match payload.chunks_exact(4).nth(index) {
        Some(chunk) => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        None => READ_ERROR,
    }
}
