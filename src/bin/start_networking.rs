use std::path::Path;

use anyhow::{Context, Error};
use log::{error, info};

use mbot_sys_utils::config::NetworkConfig;
use mbot_sys_utils::gpio::{self, Pinctrl};
use mbot_sys_utils::net::Shell;
use mbot_sys_utils::{logging, net};

const LOG_PATH: &str = "/var/log/mbot/mbot_start_networking.log";

fn main() {
    if let Err(e) = run() {
        // Hardware detection and config parsing are the only fatal steps.
        error!("{:#}", e);
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let _logger = logging::init_boot_logging(Path::new(LOG_PATH))?;
    info!(
        "===== {} =====",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let (model, pins) = net::detect_model()?;
    info!("Detected {}", model);

    let config_path = net::config_path()?;
    let config = NetworkConfig::load(&config_path)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;

    let mut shell = Shell;
    net::apply_hostname(&mut shell, &config);
    net::enable_multicast_loopback(&mut shell);
    net::configure_wifi(&mut shell, &config);

    // Best-effort like the other system steps; a missing pinctrl should not
    // fail the boot.
    if let Err(e) = gpio::sequence_boot_pins(&mut Pinctrl, pins, &config.autostart) {
        error!("Boot pin sequencing failed: {:#}", e);
    }

    Ok(())
}
