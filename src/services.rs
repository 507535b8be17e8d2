//! Per-service status via `systemctl`.

use std::fmt;

use anyhow::{bail, Context, Error};
use log::error;

use crate::probe::command_output;

/// The robot's own systemd units and the short names that fit the screen.
pub const SERVICES: [(&str, &str); 8] = [
    ("mbot-start-network", "start-net"),
    ("mbot-publish-info", "pub-info"),
    ("mbot-rplidar-driver", "lidar-drv"),
    ("mbot-lcm-serial", "lcm-ser"),
    ("mbot-web-server", "webapp"),
    ("mbot-motion-controller", "motion"),
    ("mbot-slam", "slam"),
    ("mbot-oled", "oled"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Loaded,
    Failed,
    Active,
    Inactive,
    NotFound,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Loaded => "loaded",
            ServiceState::Failed => "failed",
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
            ServiceState::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// Status of one unit, derived fresh each render cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub short_name: &'static str,
    pub state: ServiceState,
    pub detail: String,
}

impl ServiceEntry {
    /// One display row, e.g. `webapp: active (running)`.
    pub fn label(&self) -> String {
        if self.detail.is_empty() {
            format!("{}: {}", self.short_name, self.state)
        } else {
            format!("{}: {} ({})", self.short_name, self.state, self.detail)
        }
    }

    fn not_found(short_name: &'static str) -> ServiceEntry {
        ServiceEntry {
            short_name,
            state: ServiceState::NotFound,
            detail: String::new(),
        }
    }
}

/// Query every unit in [`SERVICES`]. A unit that systemd does not know, or a
/// failing `systemctl` call, yields a `not found` entry rather than an error.
pub async fn probe_services() -> Vec<ServiceEntry> {
    let mut entries = Vec::with_capacity(SERVICES.len());
    for (unit, short_name) in SERVICES {
        match query_unit(unit, short_name).await {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                error!("Failed to query service {}: {}", unit, e);
                entries.push(ServiceEntry::not_found(short_name));
            }
        }
    }
    entries
}

async fn query_unit(unit: &str, short_name: &'static str) -> Result<ServiceEntry, Error> {
    let pattern = format!("{}.service", unit);
    let output = command_output(
        "systemctl",
        &[
            "list-units",
            "--type=service",
            "--all",
            "--no-pager",
            "--no-legend",
            &pattern,
        ],
    )
    .await
    .context("systemctl failed")?;

    let line = match output.lines().find(|l| l.contains(&pattern)) {
        Some(line) => line,
        None => return Ok(ServiceEntry::not_found(short_name)),
    };
    let (load, active, sub) = parse_unit_line(line, &pattern)?;

    let state = match active.as_str() {
        "active" => ServiceState::Active,
        "inactive" => ServiceState::Inactive,
        "failed" => ServiceState::Failed,
        _ if load == "not-found" => ServiceState::NotFound,
        _ => ServiceState::Loaded,
    };

    Ok(ServiceEntry {
        short_name,
        state,
        detail: sub,
    })
}

/// Pull `(load, active, sub)` out of one `systemctl list-units` row.
/// Failed units are prefixed with a bullet marker, so fields are located
/// relative to the unit name instead of the start of the line.
pub fn parse_unit_line(line: &str, unit_name: &str) -> Result<(String, String, String), Error> {
    let mut fields = line
        .split_whitespace()
        .skip_while(|f| *f != unit_name)
        .skip(1);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(load), Some(active), Some(sub)) => {
            Ok((load.to_string(), active.to_string(), sub.to_string()))
        }
        _ => bail!("unexpected systemctl output: '{}'", line),
    }
}
