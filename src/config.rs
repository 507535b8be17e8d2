use std::path::Path;

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

/// Settings for the OLED display daemon, loaded from a RON file. Every field
/// has a default so the daemon also runs with no config file at all.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Rotating log file for the daemon.
    pub log_file: String,
    /// I2C address of the SSD1306 panel.
    pub i2c_address: u8,
    /// Use the smaller font pair on dense screens.
    pub compact_fonts: bool,
    /// Battery telemetry subscription. `None` disables the listener and the
    /// battery screen permanently shows the no-telemetry text.
    pub telemetry: Option<TelemetryConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Multicast group the firmware bridge publishes battery readings on.
    pub group: String,
    pub port: u16,
    /// Index of the battery rail inside the voltage array of each message.
    pub voltage_index: usize,
    /// Seconds of silence after which the reading counts as stale.
    pub timeout_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            log_file: "/var/log/mbot/mbot_oled_display.log".to_string(),
            i2c_address: 0x3C,
            compact_fonts: false,
            telemetry: Some(TelemetryConfig::default()),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            group: "239.255.76.67".to_string(),
            port: 7667,
            voltage_index: 3,
            timeout_secs: 10,
        }
    }
}

impl DisplayConfig {
    pub fn load(path: &Path) -> Result<DisplayConfig, Error> {
        let config = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: DisplayConfig = ron::from_str(&config)?;
        Ok(config)
    }

    /// Missing config file is not an error for the daemon; a malformed one is.
    pub fn load_or_default(path: &Path) -> Result<DisplayConfig, Error> {
        if path.exists() {
            DisplayConfig::load(path)
        } else {
            Ok(DisplayConfig::default())
        }
    }
}

/// How the attached microcontroller should be started after boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Autostart {
    /// Normal firmware boot.
    Run,
    /// Enter the bootloader for flashing.
    Bootload,
    /// Hold the microcontroller in reset.
    Disable,
    /// Unrecognized value, kept verbatim so it can be logged.
    Other(String),
}

impl Autostart {
    fn parse(value: &str) -> Autostart {
        match value {
            "run" => Autostart::Run,
            "bootload" => Autostart::Bootload,
            "disable" => Autostart::Disable,
            other => Autostart::Other(other.to_string()),
        }
    }
}

/// Contents of `mbot_config.txt`, one `key=value` pair per line. The file is
/// shared with other tooling on the robot, so the format stays plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub hostname: String,
    pub ap_ssid: String,
    pub ap_password: String,
    pub home_ssid: String,
    pub home_password: String,
    pub autostart: Autostart,
}

impl NetworkConfig {
    pub fn load(path: &Path) -> Result<NetworkConfig, Error> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        NetworkConfig::parse(&contents)
    }

    /// Parse the `key=value` format. A non-empty line without exactly one
    /// `=` is a fatal parse error; unknown keys are ignored.
    pub fn parse(contents: &str) -> Result<NetworkConfig, Error> {
        let mut hostname = None;
        let mut ap_ssid = None;
        let mut ap_password = None;
        let mut home_ssid = None;
        let mut home_password = None;
        let mut autostart = None;

        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('=').collect();
            if fields.len() != 2 {
                bail!("malformed config line {}: '{}'", number + 1, line);
            }
            let (key, value) = (fields[0], fields[1]);

            match key {
                "mbot_hostname" => hostname = Some(value.to_string()),
                "mbot_ap_ssid" => ap_ssid = Some(value.to_string()),
                "mbot_ap_password" => ap_password = Some(value.to_string()),
                "new_wifi_ssid" => home_ssid = Some(value.to_string()),
                "new_wifi_password" => home_password = Some(value.to_string()),
                "autostart" => autostart = Some(Autostart::parse(value)),
                _ => {}
            }
        }

        let hostname = hostname.context("config is missing mbot_hostname")?;
        // The AP SSID defaults to the hostname so a fleet of robots each
        // advertise a distinct network.
        let ap_ssid = ap_ssid.unwrap_or_else(|| format!("{}-AP", hostname));

        Ok(NetworkConfig {
            hostname,
            ap_ssid,
            ap_password: ap_password.context("config is missing mbot_ap_password")?,
            home_ssid: home_ssid.context("config is missing new_wifi_ssid")?,
            home_password: home_password.context("config is missing new_wifi_password")?,
            autostart: autostart.context("config is missing autostart")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
mbot_hostname=mbot-example
mbot_ap_ssid=mbot-example-AP
mbot_ap_password=i<3robots!
new_wifi_ssid=CampusNet
new_wifi_password=hunter2
autostart=run
";

    #[test]
    fn parses_complete_config() {
        let config = NetworkConfig::parse(GOOD).unwrap();
        assert_eq!(
            config,
            NetworkConfig {
                hostname: "mbot-example".to_string(),
                ap_ssid: "mbot-example-AP".to_string(),
                ap_password: "i<3robots!".to_string(),
                home_ssid: "CampusNet".to_string(),
                home_password: "hunter2".to_string(),
                autostart: Autostart::Run,
            }
        );
    }

    #[test]
    fn ap_ssid_defaults_to_hostname() {
        let without = GOOD
            .lines()
            .filter(|l| !l.starts_with("mbot_ap_ssid"))
            .collect::<Vec<_>>()
            .join("\n");
        let config = NetworkConfig::parse(&without).unwrap();
        assert_eq!(config.ap_ssid, "mbot-example-AP");
    }

    #[test]
    fn line_without_equals_is_fatal() {
        let bad = format!("{}garbage line\n", GOOD);
        assert!(NetworkConfig::parse(&bad).is_err());
    }

    #[test]
    fn line_with_two_equals_is_fatal() {
        let bad = format!("{}autostart=run=fast\n", GOOD);
        assert!(NetworkConfig::parse(&bad).is_err());
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let without = GOOD
            .lines()
            .filter(|l| !l.starts_with("autostart"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(NetworkConfig::parse(&without).is_err());
    }

    #[test]
    fn unknown_autostart_value_is_kept_for_logging() {
        let swapped = GOOD.replace("autostart=run", "autostart=fast");
        let config = NetworkConfig::parse(&swapped).unwrap();
        assert_eq!(config.autostart, Autostart::Other("fast".to_string()));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let extra = format!("{}mbot_extra_flag=1\n", GOOD);
        assert!(NetworkConfig::parse(&extra).is_ok());
    }

    #[test]
    fn display_config_round_trips_through_ron() {
        let config = DisplayConfig::default();
        let text = ron::to_string(&config).unwrap();
        let parsed: DisplayConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
