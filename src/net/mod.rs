//! One-shot network bootstrap, run as a systemd unit at boot.
//!
//! Order matters: the hostname edit has to land before NetworkManager
//! profiles are created, since the access-point SSID is derived from it.
//! Every subprocess step here is best-effort (logged, never fatal); only
//! hardware detection and config parsing abort the script, and those live
//! with the callers in the binary.

pub mod wifi;

use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Error};
use log::{error, info, warn};
use sysinfo::System;

use crate::config::NetworkConfig;
use crate::gpio::{pins_for_model, BoardPins};
use wifi::WifiPlan;

/// The wireless device the robot uses.
pub const WIFI_DEVICE: &str = "wlan0";
/// Reserved profile name for the fallback access point.
pub const AP_PROFILE: &str = "mbot_wifi_ap";
/// NetworkManager needs a moment between creating an AP profile and
/// activating it.
const AP_SETTLE: Duration = Duration::from_secs(10);

/// Shell seam for the nmcli/ip/hostnamectl steps. Tests substitute a
/// recording runner, the same way the boot pin sequence is tested.
pub trait CommandRunner {
    /// Run a command and capture stdout; non-zero exit is an error.
    fn run(&mut self, program: &str, args: &[&str]) -> Result<String, Error>;

    /// Wait in place, e.g. for NetworkManager to settle.
    fn settle(&mut self, wait: Duration);
}

pub struct Shell;

impl CommandRunner for Shell {
    fn run(&mut self, program: &str, args: &[&str]) -> Result<String, Error> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", program))?;
        if !output.status.success() {
            bail!("{} exited with {}", program, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn settle(&mut self, wait: Duration) {
        thread::sleep(wait);
    }
}

/// Run a command for its side effect; failure is logged and swallowed.
fn run_logged(runner: &mut dyn CommandRunner, program: &str, args: &[&str]) {
    if let Err(e) = runner.run(program, args) {
        error!("{} {} failed: {:#}", program, args.join(" "), e);
    }
}

/// Identify the host board and its boot-control GPIO lines. Unknown
/// hardware is fatal for the whole script.
pub fn detect_model() -> Result<(String, BoardPins), Error> {
    let model = std::fs::read_to_string("/proc/device-tree/model")
        .context("failed to read /proc/device-tree/model")?;
    let model = model.trim_end_matches('\0').trim().to_string();
    match pins_for_model(&model) {
        Some(pins) => Ok((model, pins)),
        None => bail!("unknown hardware: '{}'", model),
    }
}

/// Where `mbot_config.txt` lives depends on the OS image.
pub fn config_path() -> Result<PathBuf, Error> {
    let os_release =
        std::fs::read_to_string("/etc/os-release").context("failed to read /etc/os-release")?;
    config_path_for(&os_release)
}

pub fn config_path_for(os_release: &str) -> Result<PathBuf, Error> {
    if os_release.contains("Ubuntu") || os_release.contains("bookworm") {
        Ok(PathBuf::from("/boot/firmware/mbot_config.txt"))
    } else if os_release.contains("bullseye") {
        Ok(PathBuf::from("/boot/mbot_config.txt"))
    } else {
        bail!("unsupported OS release, cannot locate mbot_config.txt")
    }
}

/// Rewrite the old hostname to the configured one in `/etc/hosts`, apply it
/// live, and persist it to `/etc/hostname`. Partial failure is logged but
/// not rolled back.
pub fn apply_hostname(runner: &mut dyn CommandRunner, config: &NetworkConfig) {
    let new = &config.hostname;
    let old = System::host_name().unwrap_or_default();

    // /etc/hosts first, so the loopback alias follows the rename.
    if old.is_empty() {
        warn!("Could not determine current hostname; /etc/hosts left alone");
    } else {
        match std::fs::read_to_string("/etc/hosts") {
            Ok(hosts) => {
                let rewritten = hosts.replace(&old, new);
                if let Err(e) = std::fs::write("/etc/hosts", rewritten) {
                    error!("Failed to rewrite /etc/hosts: {}", e);
                }
            }
            Err(e) => error!("Failed to read /etc/hosts: {}", e),
        }
    }

    run_logged(runner, "hostnamectl", &["set-hostname", new]);

    if let Err(e) = std::fs::write("/etc/hostname", format!("{}\n", new)) {
        error!("Failed to write /etc/hostname: {}", e);
    }
    info!("Hostname set to '{}'", new);
}

/// Mark loopback multicast-capable and route the local multicast range over
/// it, so same-host pub/sub traffic (including battery telemetry) works
/// before any network is up.
pub fn enable_multicast_loopback(runner: &mut dyn CommandRunner) {
    run_logged(runner, "ip", &["link", "set", "lo", "multicast", "on"]);
    run_logged(runner, "ip", &["route", "add", "224.0.0.0/4", "dev", "lo"]);
}

/// Decide and execute the WiFi strategy.
pub fn configure_wifi(runner: &mut dyn CommandRunner, config: &NetworkConfig) {
    let active = runner
        .run(
            "nmcli",
            &["-t", "-f", "NAME,DEVICE,STATE", "c", "show", "--active"],
        )
        .unwrap_or_else(|e| {
            error!("Failed to list active connections: {}", e);
            String::new()
        });

    if let Some(profile) = wifi::active_wifi_profile(&active, WIFI_DEVICE) {
        info!("Connected to active WiFi network '{}'. Done.", profile);
        return;
    }

    info!("Looking for home network '{}'", config.home_ssid);
    let scan = runner
        .run("nmcli", &["-t", "-f", "BSSID,SSID,CHAN,SIGNAL", "dev", "wifi", "list"])
        .unwrap_or_else(|e| {
            error!("WiFi scan failed: {}", e);
            String::new()
        });
    let candidates = wifi::parse_scan(&scan, &config.home_ssid);
    for candidate in &candidates {
        info!(
            "  {} chan {} signal {}",
            candidate.bssid, candidate.channel, candidate.signal
        );
    }

    let known = runner
        .run("nmcli", &["-t", "-f", "NAME", "connection", "show"])
        .map(|output| wifi::known_connection_names(&output))
        .unwrap_or_else(|e| {
            error!("Failed to list saved connections: {}", e);
            Vec::new()
        });

    match wifi::choose(&candidates, &known, &config.home_ssid) {
        WifiPlan::JoinNew { bssid } => {
            run_logged(
                runner,
                "nmcli",
                &["dev", "wifi", "connect", &bssid, "password", &config.home_password],
            );
            info!(
                "Started connection to WiFi network '{}'. Done.",
                config.home_ssid
            );
        }
        WifiPlan::BringUpExisting => {
            run_logged(runner, "nmcli", &["connection", "up", &config.home_ssid]);
            info!(
                "Started connection to WiFi network '{}'. Done.",
                config.home_ssid
            );
        }
        WifiPlan::StartAccessPoint => {
            info!("No networks found, starting Access Point");
            start_access_point(runner, config, &known);
        }
    }
}

/// Create and activate the fallback access point: 5 GHz, WPA-PSK, shared
/// IPv4 on a fixed private subnet.
fn start_access_point(runner: &mut dyn CommandRunner, config: &NetworkConfig, known: &[String]) {
    // A stale profile would advertise an SSID derived from the previous
    // hostname, so remove it before creating a fresh one.
    if known.iter().any(|name| name == AP_PROFILE) {
        info!("Access point profile already exists, removing");
        run_logged(runner, "nmcli", &["connection", "delete", AP_PROFILE]);
    }

    run_logged(
        runner,
        "nmcli",
        &[
            "connection", "add", "type", "wifi", "ifname", "*", "con-name", AP_PROFILE,
            "autoconnect", "no", "ssid", &config.ap_ssid,
        ],
    );
    run_logged(
        runner,
        "nmcli",
        &[
            "connection", "modify", AP_PROFILE, "802-11-wireless.mode", "ap",
            "802-11-wireless.band", "a", "ipv4.method", "shared",
        ],
    );
    run_logged(
        runner,
        "nmcli",
        &[
            "connection", "modify", AP_PROFILE, "wifi-sec.key-mgmt", "wpa-psk",
            "wifi-sec.psk", &config.ap_password,
        ],
    );
    run_logged(
        runner,
        "nmcli",
        &[
            "connection", "modify", AP_PROFILE, "ipv4.addresses", "192.168.3.1/24",
            "ipv4.gateway", "192.168.3.1",
        ],
    );
    info!("Access point '{}' created", config.ap_ssid);

    runner.settle(AP_SETTLE);
    run_logged(runner, "nmcli", &["connection", "up", AP_PROFILE]);
    info!("Access point started");
}
