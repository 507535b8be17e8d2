//! System and network state probes for the status screens.
//!
//! Memory, load and uptime come from the `sysinfo` crate; hostname, SSID and
//! IP address still come from the usual command line tools, parsed with
//! regular expressions. Every probe is independently fault tolerant: on any
//! failure it logs and returns a placeholder string, and every external
//! command is bounded by a timeout so a hung utility cannot stall the render
//! loop.

use std::time::Duration;

use anyhow::{bail, Context, Error};
use log::error;
use regex::Regex;
use sysinfo::System;
use tokio::process::Command;
use tokio::time::timeout;

use crate::services::{self, ServiceEntry};
use crate::telemetry::TelemetryHandle;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Interface names tried for the robot's wireless address, in order.
const WIRELESS_INTERFACES: [&str; 3] = ["wlan0", "wlp0s20f3", "wifi0"];

/// Everything the screens need, rebuilt once per render cycle.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub hostname: String,
    pub uptime: String,
    pub ssid: String,
    pub ip: String,
    pub mem_used_pct: String,
    pub load_avg: String,
    pub battery_volts: f32,
    pub services: Vec<ServiceEntry>,
}

/// Build a fresh snapshot. A single failing probe never aborts the cycle.
pub async fn refresh(telemetry: &TelemetryHandle) -> DisplayState {
    DisplayState {
        hostname: hostname(),
        uptime: uptime().await,
        ssid: connected_ssid().await,
        ip: wireless_ip().await,
        mem_used_pct: mem_used_pct(),
        load_avg: load_avg().await,
        battery_volts: telemetry.latest_volts(),
        services: services::probe_services().await,
    }
}

/// Run a command with a bounded runtime and return its stdout. Expiry of the
/// timeout counts as a probe failure like any other.
pub async fn command_output(program: &str, args: &[&str]) -> Result<String, Error> {
    let output = timeout(COMMAND_TIMEOUT, Command::new(program).args(args).output())
        .await
        .with_context(|| format!("{} timed out", program))?
        .with_context(|| format!("failed to run {}", program))?;
    if !output.status.success() {
        bail!("{} exited with {}", program, output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn hostname() -> String {
    match System::host_name() {
        Some(name) => name,
        None => {
            error!("Failed to get hostname");
            "Error".to_string()
        }
    }
}

pub async fn uptime() -> String {
    let secs = System::uptime();
    if secs > 0 {
        return format_uptime(secs);
    }
    // Text-scraping fallback for platforms where sysinfo comes up empty.
    match command_output("uptime", &["-p"]).await {
        Ok(output) => parse_uptime_pretty(output.trim()),
        Err(e) => {
            error!("Failed to get uptime: {}", e);
            "Error".to_string()
        }
    }
}

/// Compact `XhYm` form that fits the WiFi screen.
pub fn format_uptime(secs: u64) -> String {
    let minutes = (secs / 60) % 60;
    let hours = secs / 3600;
    if hours == 0 {
        format!("{}m", minutes)
    } else {
        format!("{}h{}m", hours, minutes)
    }
}

/// Reformat the output of `uptime -p`. Falls back to the raw string with the
/// leading `up ` stripped when the shape is unexpected (e.g. day counts).
pub fn parse_uptime_pretty(pretty: &str) -> String {
    let re = Regex::new(r"^up (\d+) hour[s]*, (\d+) minute[s]*$|^up (\d+) minute[s]*$");
    if let Ok(re) = re {
        if let Some(caps) = re.captures(pretty) {
            if let Some(minutes_only) = caps.get(3) {
                return format!("{}m", minutes_only.as_str());
            }
            if let (Some(hours), Some(minutes)) = (caps.get(1), caps.get(2)) {
                return format!("{}h{}m", hours.as_str(), minutes.as_str());
            }
        }
    }
    pretty.strip_prefix("up ").unwrap_or(pretty).to_string()
}

pub async fn connected_ssid() -> String {
    if let Ok(output) = command_output("iwgetid", &["-r"]).await {
        let ssid = output.trim();
        if !ssid.is_empty() {
            return ssid.to_string();
        }
        return "N/A".to_string();
    }
    // Fall back to NetworkManager.
    match command_output("nmcli", &["-t", "-f", "active,ssid", "dev", "wifi"]).await {
        Ok(output) => parse_nmcli_active_ssid(&output),
        Err(e) => {
            error!("Failed to get connected SSID: {}", e);
            "Error".to_string()
        }
    }
}

pub fn parse_nmcli_active_ssid(output: &str) -> String {
    for line in output.lines() {
        if let Some(ssid) = line.strip_prefix("yes:") {
            if !ssid.is_empty() {
                return ssid.to_string();
            }
        }
    }
    "N/A".to_string()
}

pub async fn wireless_ip() -> String {
    for interface in WIRELESS_INTERFACES {
        if let Ok(output) = command_output("ip", &["addr", "show", interface]).await {
            if let Some(ip) = extract_inet_addr(&output) {
                return ip;
            }
        }
    }
    // No named interface carries an address; ask the routing table which
    // source address would reach the outside world.
    if let Ok(output) = command_output("ip", &["route", "get", "8.8.8.8"]).await {
        if let Some(ip) = extract_route_src(&output) {
            return ip;
        }
    }
    "IP Not Found".to_string()
}

pub fn extract_inet_addr(output: &str) -> Option<String> {
    let re = Regex::new(r"inet ([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)").ok()?;
    Some(re.captures(output)?.get(1)?.as_str().to_string())
}

pub fn extract_route_src(output: &str) -> Option<String> {
    let re = Regex::new(r"src ([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)").ok()?;
    Some(re.captures(output)?.get(1)?.as_str().to_string())
}

pub fn mem_used_pct() -> String {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        error!("Failed to get memory usage");
        return "Error".to_string();
    }
    let used = sys.used_memory();
    format!("{:.2}%", used as f64 * 100.0 / total as f64)
}

pub async fn load_avg() -> String {
    let load = System::load_average();
    if load.one > 0.0 || load.five > 0.0 || load.fifteen > 0.0 {
        return format!("{:.2}, {:.2}, {:.2}", load.one, load.five, load.fifteen);
    }
    // An all-zero triple usually means the platform is unsupported; scrape
    // `top` the way the old scripts did.
    match command_output("top", &["-bn1"]).await {
        Ok(output) => match extract_load_average(&output) {
            Some(load) => load,
            None => {
                error!("Failed to parse load average from top");
                "Error".to_string()
            }
        },
        Err(e) => {
            error!("Failed to get load average: {}", e);
            "Error".to_string()
        }
    }
}

pub fn extract_load_average(top_output: &str) -> Option<String> {
    let re = Regex::new(r"load average: (.*)").ok()?;
    Some(re.captures(top_output)?.get(1)?.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uptime_compactly() {
        assert_eq!(format_uptime(5 * 60), "5m");
        assert_eq!(format_uptime(3600 + 22 * 60), "1h22m");
        assert_eq!(format_uptime(26 * 3600 + 60), "26h1m");
    }

    #[test]
    fn parses_uptime_pretty_output() {
        assert_eq!(parse_uptime_pretty("up 2 hours, 13 minutes"), "2h13m");
        assert_eq!(parse_uptime_pretty("up 1 hour, 1 minute"), "1h1m");
        assert_eq!(parse_uptime_pretty("up 45 minutes"), "45m");
        // Unexpected shapes keep the raw text, minus the prefix.
        assert_eq!(
            parse_uptime_pretty("up 3 days, 2 hours, 13 minutes"),
            "3 days, 2 hours, 13 minutes"
        );
        assert_eq!(parse_uptime_pretty(""), "");
    }

    #[test]
    fn extracts_inet_address() {
        let output = "\
3: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500
    inet 192.168.1.42/24 brd 192.168.1.255 scope global dynamic wlan0
    inet6 fe80::1/64 scope link";
        assert_eq!(
            extract_inet_addr(output),
            Some("192.168.1.42".to_string())
        );
        assert_eq!(extract_inet_addr("no address here"), None);
        assert_eq!(extract_inet_addr(""), None);
    }

    #[test]
    fn extracts_route_source() {
        let output = "8.8.8.8 via 192.168.1.1 dev wlan0 src 192.168.1.42 uid 1000";
        assert_eq!(extract_route_src(output), Some("192.168.1.42".to_string()));
        assert_eq!(extract_route_src("8.8.8.8 unreachable"), None);
    }

    #[test]
    fn parses_nmcli_active_ssid() {
        let output = "no:OtherNet\nyes:CampusNet\n";
        assert_eq!(parse_nmcli_active_ssid(output), "CampusNet");
        assert_eq!(parse_nmcli_active_ssid("no:OtherNet\n"), "N/A");
        assert_eq!(parse_nmcli_active_ssid("yes:\n"), "N/A");
        assert_eq!(parse_nmcli_active_ssid(""), "N/A");
    }

    #[test]
    fn extracts_load_average_from_top() {
        let output = "\
top - 12:00:01 up 10 min,  1 user,  load average: 0.52, 0.41, 0.30
Tasks: 101 total,   1 running";
        assert_eq!(
            extract_load_average(output),
            Some("0.52, 0.41, 0.30".to_string())
        );
        assert_eq!(extract_load_average("Tasks: 101 total"), None);
    }
}
