//! SSD1306 panel access and the screen rotation loop.
//!
//! Hardware access only compiles with the `pi` feature, the same way GPIO
//! and I2C are gated elsewhere; without it, frames are drawn into a no-op
//! target so the full loop stays runnable on a development machine.

use std::convert::Infallible;
use std::time::Duration;

use anyhow::Error;
use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use log::error;
use tokio::time::sleep;

#[cfg(feature = "pi")]
use rppal::i2c::I2c;
#[cfg(feature = "pi")]
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use crate::battery::{classify, BatteryCondition};
use crate::probe;
use crate::screens::{self, FontSet, Screen, SERVICES_PER_PAGE};
use crate::telemetry::TelemetryHandle;

const SCREEN_CHANGE_DELAY: Duration = Duration::from_secs(3);
const QR_SCREEN_CHANGE_DELAY: Duration = Duration::from_secs(8);
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(5);
const FLASH_TOGGLE_DELAY: Duration = Duration::from_millis(400);

#[cfg(feature = "pi")]
pub type Frame = Ssd1306<
    I2CInterface<I2c>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;
#[cfg(not(feature = "pi"))]
pub type Frame = NullFrame;

pub type DrawError = <Frame as DrawTarget>::Error;

/// Discards everything drawn into it. Stand-in frame for builds without
/// display hardware.
pub struct NullFrame;

impl OriginDimensions for NullFrame {
    fn size(&self) -> Size {
        Size::new(128, 64)
    }
}

impl DrawTarget for NullFrame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, _pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        Ok(())
    }
}

/// The status panel. Owns the I2C device; a failed open or init is fatal
/// for the daemon at startup.
pub struct Oled {
    #[cfg(feature = "pi")]
    device: Frame,
    #[cfg(not(feature = "pi"))]
    frame: NullFrame,
    #[cfg(not(feature = "pi"))]
    frames_pushed: usize,
}

impl Oled {
    #[cfg(feature = "pi")]
    pub fn new(address: u8) -> Result<Self, Error> {
        use anyhow::Context;

        let i2c = I2c::new().context("failed to open I2C bus")?;
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut device = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        device.init().map_err(display_err)?;
        Ok(Oled { device })
    }

    #[cfg(not(feature = "pi"))]
    pub fn new(_address: u8) -> Result<Self, Error> {
        Ok(Oled {
            frame: NullFrame,
            frames_pushed: 0,
        })
    }

    /// Number of frames pushed to the no-op target since startup.
    #[cfg(not(feature = "pi"))]
    pub fn frames_pushed(&self) -> usize {
        self.frames_pushed
    }

    /// Clear the buffer, run the drawing closure, push the result to the
    /// panel.
    pub fn draw_frame<F>(&mut self, draw: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Frame) -> Result<(), DrawError>,
    {
        #[cfg(feature = "pi")]
        {
            self.device.clear_buffer();
            draw(&mut self.device).map_err(display_err)?;
            self.device.flush().map_err(display_err)?;
        }
        #[cfg(not(feature = "pi"))]
        {
            match draw(&mut self.frame) {
                Ok(()) => self.frames_pushed += 1,
                Err(never) => match never {},
            }
        }
        Ok(())
    }

}

#[cfg(feature = "pi")]
fn display_err<E: core::fmt::Debug>(e: E) -> Error {
    anyhow::anyhow!("display error: {:?}", e)
}

/// The rotation: WiFi, QR, battery, resources, then the service pages, each
/// with its fixed dwell time. Runs until the process is signalled; an
/// unhandled error in one iteration logs, sleeps and retries from the top.
pub async fn run_loop(
    mut oled: Oled,
    fonts: FontSet,
    telemetry: TelemetryHandle,
) -> Infallible {
    loop {
        if let Err(e) = run_cycle(&mut oled, &fonts, &telemetry).await {
            error!("Unhandled error during display cycle: {:#}", e);
            sleep(ERROR_RETRY_DELAY).await;
        }
    }
}

async fn run_cycle(
    oled: &mut Oled,
    fonts: &FontSet,
    telemetry: &TelemetryHandle,
) -> Result<(), Error> {
    // A low pack interrupts the rotation until a fresh reading recovers.
    flash_while_low(oled, fonts, telemetry).await?;

    let state = probe::refresh(telemetry).await;

    show(oled, Screen::WifiInfo, &state, fonts)?;
    sleep(SCREEN_CHANGE_DELAY).await;

    show(oled, Screen::QrCode, &state, fonts)?;
    sleep(QR_SCREEN_CHANGE_DELAY).await;

    show(oled, Screen::Battery, &state, fonts)?;
    sleep(SCREEN_CHANGE_DELAY).await;

    show(oled, Screen::Resources, &state, fonts)?;
    sleep(SCREEN_CHANGE_DELAY).await;

    let pages = (state.services.len() + SERVICES_PER_PAGE - 1) / SERVICES_PER_PAGE;
    for page in 0..pages {
        show(oled, Screen::Services(page), &state, fonts)?;
        sleep(SCREEN_CHANGE_DELAY).await;
    }

    Ok(())
}

async fn flash_while_low(
    oled: &mut Oled,
    fonts: &FontSet,
    telemetry: &TelemetryHandle,
) -> Result<(), Error> {
    let mut inverted = true;
    loop {
        let volts = telemetry.latest_volts();
        if classify(volts) != BatteryCondition::LowBattery {
            return Ok(());
        }
        oled.draw_frame(|frame| screens::draw_low_battery(frame, volts, inverted, fonts))?;
        inverted = !inverted;
        sleep(FLASH_TOGGLE_DELAY).await;
    }
}

fn show(
    oled: &mut Oled,
    screen: Screen,
    state: &probe::DisplayState,
    fonts: &FontSet,
) -> Result<(), Error> {
    oled.draw_frame(|frame| screens::render_screen(frame, screen, state, fonts))
}

#[cfg(all(test, not(feature = "pi")))]
mod tests {
    use super::*;
    use crate::telemetry::{Reading, TelemetryHandle};
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn low_battery_flash_holds_until_recovery() {
        let (tx, telemetry) = TelemetryHandle::manual(Duration::from_secs(60));
        tx.send(Reading::now(8.2)).unwrap();

        let mut oled = Oled::new(0x3C).unwrap();
        let fonts = FontSet::new(false);

        {
            let flash = flash_while_low(&mut oled, &fonts, &telemetry);
            tokio::pin!(flash);

            // Still toggling a virtual second in.
            assert!(timeout(Duration::from_secs(1), flash.as_mut())
                .await
                .is_err());

            tx.send(Reading::now(9.5)).unwrap();
            timeout(Duration::from_secs(1), flash.as_mut())
                .await
                .expect("flash loop should stop once the pack recovers")
                .unwrap();
        }

        // At 0.4 s per toggle, a second of flashing pushes both the inverted
        // and the normal phase at least once.
        assert!(oled.frames_pushed() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn normal_voltage_never_flashes() {
        let (tx, telemetry) = TelemetryHandle::manual(Duration::from_secs(60));
        tx.send(Reading::now(11.2)).unwrap();

        let mut oled = Oled::new(0x3C).unwrap();
        let fonts = FontSet::new(false);

        flash_while_low(&mut oled, &fonts, &telemetry)
            .await
            .unwrap();
        assert_eq!(oled.frames_pushed(), 0);
    }
}
