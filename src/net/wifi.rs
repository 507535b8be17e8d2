//! WiFi scan parsing and the connection decision.
//!
//! All inputs are the terse (`-t`) output of `nmcli`, which separates
//! fields with `:` and escapes literal colons (as in BSSIDs) with a
//! backslash. The decision itself is pure so it can be tested without a
//! radio.

/// One access point seen in a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNetwork {
    pub bssid: String,
    pub ssid: String,
    pub channel: u32,
    pub signal: u32,
}

/// What the bootstrap script should do about WiFi.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiPlan {
    /// The home network is visible and not yet saved; connect to the
    /// preferred BSSID with the configured password.
    JoinNew { bssid: String },
    /// The home network is visible and already saved; bring the profile up.
    BringUpExisting,
    /// Nothing we know is in range; host an access point instead.
    StartAccessPoint,
}

/// Split one line of `nmcli -t` output on unescaped colons.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Name of the profile the wireless device is activated on, if any.
/// Expects `nmcli -t -f NAME,DEVICE,STATE c show --active` output.
pub fn active_wifi_profile(output: &str, device: &str) -> Option<String> {
    for line in output.lines() {
        let fields = split_terse(line.trim());
        if fields.len() >= 3 && fields[1] == device && fields[2] == "activated" {
            return Some(fields[0].clone());
        }
    }
    None
}

/// Parse `nmcli -t -f BSSID,SSID,CHAN,SIGNAL dev wifi list` output, keeping
/// only access points broadcasting the home SSID. Lines that do not parse
/// are skipped.
pub fn parse_scan(output: &str, home_ssid: &str) -> Vec<ScannedNetwork> {
    let mut networks = Vec::new();
    for line in output.lines() {
        let fields = split_terse(line.trim());
        if fields.len() < 4 || fields[1] != home_ssid {
            continue;
        }
        let (channel, signal) = match (fields[2].parse(), fields[3].parse()) {
            (Ok(channel), Ok(signal)) => (channel, signal),
            _ => continue,
        };
        networks.push(ScannedNetwork {
            bssid: fields[0].clone(),
            ssid: fields[1].clone(),
            channel,
            signal,
        });
    }
    networks
}

/// Saved connection profile names from `nmcli -t -f NAME connection show`.
pub fn known_connection_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| split_terse(line.trim()).into_iter().next())
        .filter(|name| !name.is_empty())
        .collect()
}

/// The preferred access point: the one maximizing `(channel, signal)`
/// lexicographically. Ties go to the earliest scan entry.
pub fn pick_preferred(networks: &[ScannedNetwork]) -> Option<&ScannedNetwork> {
    let mut best: Option<&ScannedNetwork> = None;
    for network in networks {
        let better = match best {
            None => true,
            Some(b) => (network.channel, network.signal) > (b.channel, b.signal),
        };
        if better {
            best = Some(network);
        }
    }
    best
}

/// Decide what to do once the scan results and saved profiles are in hand.
pub fn choose(candidates: &[ScannedNetwork], known: &[String], home_ssid: &str) -> WifiPlan {
    match pick_preferred(candidates) {
        Some(best) => {
            if known.iter().any(|name| name == home_ssid) {
                WifiPlan::BringUpExisting
            } else {
                WifiPlan::JoinNew {
                    bssid: best.bssid.clone(),
                }
            }
        }
        None => WifiPlan::StartAccessPoint,
    }
}
