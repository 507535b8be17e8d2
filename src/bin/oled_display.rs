use std::path::Path;

use anyhow::{Context, Error};
use log::info;
use tokio::signal::unix::{signal, SignalKind};

use mbot_sys_utils::logging;
use mbot_sys_utils::prelude::*;

const CONFIG_PATH: &str = "/etc/mbot/oled_display.ron";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = DisplayConfig::load_or_default(Path::new(CONFIG_PATH))?;
    let _logger = logging::init_display_logging(Path::new(&config.log_file))?;

    info!("Starting OLED status display");

    // Display or font setup failing means there is nothing useful this
    // process can do; refuse to run.
    let oled = Oled::new(config.i2c_address).context("failed to initialize OLED device")?;
    let fonts = FontSet::new(config.compact_fonts);

    let feed = start(config.telemetry.clone()).context("failed to start telemetry listener")?;

    let mut sigterm = signal(SignalKind::terminate())?;

    // The render loop never returns; a signal drops it mid-cycle, which
    // releases the display and the telemetry socket.
    tokio::select! {
        _ = run_loop(oled, fonts, feed) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    Ok(())
}
