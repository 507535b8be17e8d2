//! Boot-mode pin sequencing for the attached microcontroller.
//!
//! Two GPIO lines select how the control board comes up: BTLD chooses
//! between firmware and bootloader, RUN releases the reset. Line numbers
//! differ per host board, and on the Pi 5 they are kernel-global, so the
//! lines are driven through `pinctrl` rather than a memory-mapped library.

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Error};
use log::{error, info};

use crate::config::Autostart;

/// Settle delay between pin transitions, for hardware state propagation.
const PIN_SETTLE: Duration = Duration::from_millis(100);

/// The two boot-control lines for a detected host board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardPins {
    pub btld: u32,
    pub run: u32,
}

/// GPIO line numbers per host model. On a Jetson, header pin 7 is line 216
/// and pin 11 is line 50; on a Pi 4 the same header pins are BCM 4 and 17;
/// the Pi 5 moved them behind the RP1 at 588 and 575.
pub fn pins_for_model(model: &str) -> Option<BoardPins> {
    if model.contains("Raspberry Pi 4") {
        Some(BoardPins { btld: 4, run: 17 })
    } else if model.contains("Raspberry Pi 5") {
        Some(BoardPins { btld: 588, run: 575 })
    } else if model.contains("NVIDIA Jetson") {
        Some(BoardPins { btld: 50, run: 216 })
    } else {
        None
    }
}

/// Seam over the pin tool so the sequencing order is testable.
pub trait PinDriver {
    fn set_output(&mut self, pin: u32) -> Result<(), Error>;
    fn write(&mut self, pin: u32, high: bool) -> Result<(), Error>;
    fn settle(&mut self, delay: Duration);
}

/// Drives lines through the `pinctrl` utility.
pub struct Pinctrl;

impl Pinctrl {
    fn pinctrl(&self, pin: u32, mode: &str) -> Result<(), Error> {
        let pin = pin.to_string();
        let status = Command::new("pinctrl")
            .args(["set", pin.as_str(), mode])
            .status()
            .context("failed to run pinctrl")?;
        if !status.success() {
            bail!("pinctrl set {} {} exited with {}", pin, mode, status);
        }
        Ok(())
    }
}

impl PinDriver for Pinctrl {
    fn set_output(&mut self, pin: u32) -> Result<(), Error> {
        self.pinctrl(pin, "op")
    }

    fn write(&mut self, pin: u32, high: bool) -> Result<(), Error> {
        self.pinctrl(pin, if high { "dh" } else { "dl" })
    }

    fn settle(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// Drive the boot lines for the configured autostart mode. Both lines are
/// set as outputs first; an unrecognized mode logs and leaves them undriven.
pub fn sequence_boot_pins(
    driver: &mut dyn PinDriver,
    pins: BoardPins,
    autostart: &Autostart,
) -> Result<(), Error> {
    driver.set_output(pins.btld)?;
    driver.set_output(pins.run)?;
    driver.settle(PIN_SETTLE);

    match autostart {
        Autostart::Run => {
            driver.write(pins.run, false)?;
            driver.write(pins.btld, true)?;
            driver.settle(PIN_SETTLE);
            driver.write(pins.run, true)?;
            driver.settle(PIN_SETTLE);
            info!("Autostart is set to run");
        }
        Autostart::Bootload => {
            driver.write(pins.btld, false)?;
            driver.write(pins.run, false)?;
            driver.settle(PIN_SETTLE);
            driver.write(pins.run, true)?;
            info!("Autostart is set to bootload");
        }
        Autostart::Disable => {
            driver.write(pins.btld, true)?;
            driver.write(pins.run, false)?;
            driver.settle(PIN_SETTLE);
            info!("Autostart is disabled; control board held in reset");
        }
        Autostart::Other(value) => {
            error!(
                "Unrecognized autostart value '{}', should be run, bootload or disable",
                value
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Op {
        Output(u32),
        Write(u32, bool),
        Settle,
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl PinDriver for Recorder {
        fn set_output(&mut self, pin: u32) -> Result<(), Error> {
            self.ops.push(Op::Output(pin));
            Ok(())
        }

        fn write(&mut self, pin: u32, high: bool) -> Result<(), Error> {
            self.ops.push(Op::Write(pin, high));
            Ok(())
        }

        fn settle(&mut self, _delay: Duration) {
            self.ops.push(Op::Settle);
        }
    }

    const PINS: BoardPins = BoardPins { btld: 4, run: 17 };

    #[test]
    fn model_lookup_table() {
        assert_eq!(
            pins_for_model("Raspberry Pi 4 Model B Rev 1.4"),
            Some(BoardPins { btld: 4, run: 17 })
        );
        assert_eq!(
            pins_for_model("Raspberry Pi 5 Model B Rev 1.0"),
            Some(BoardPins { btld: 588, run: 575 })
        );
        assert_eq!(
            pins_for_model("NVIDIA Jetson Nano Developer Kit"),
            Some(BoardPins { btld: 50, run: 216 })
        );
        assert_eq!(pins_for_model("Generic x86_64"), None);
    }

    #[test]
    fn bootload_sequence() {
        let mut recorder = Recorder::default();
        sequence_boot_pins(&mut recorder, PINS, &Autostart::Bootload).unwrap();
        assert_eq!(
            recorder.ops,
            vec![
                Op::Output(4),
                Op::Output(17),
                Op::Settle,
                Op::Write(4, false),
                Op::Write(17, false),
                Op::Settle,
                Op::Write(17, true),
            ]
        );
    }

    #[test]
    fn run_sequence_releases_reset_last() {
        let mut recorder = Recorder::default();
        sequence_boot_pins(&mut recorder, PINS, &Autostart::Run).unwrap();
        assert_eq!(
            recorder.ops,
            vec![
                Op::Output(4),
                Op::Output(17),
                Op::Settle,
                Op::Write(17, false),
                Op::Write(4, true),
                Op::Settle,
                Op::Write(17, true),
                Op::Settle,
            ]
        );
    }

    #[test]
    fn disable_holds_reset() {
        let mut recorder = Recorder::default();
        sequence_boot_pins(&mut recorder, PINS, &Autostart::Disable).unwrap();
        assert_eq!(
            recorder.ops,
            vec![
                Op::Output(4),
                Op::Output(17),
                Op::Settle,
                Op::Write(4, true),
                Op::Write(17, false),
                Op::Settle,
            ]
        );
    }

    #[test]
    fn unknown_mode_leaves_pins_undriven() {
        let mut recorder = Recorder::default();
        sequence_boot_pins(&mut recorder, PINS, &Autostart::Other("fast".to_string())).unwrap();
        assert_eq!(
            recorder.ops,
            vec![Op::Output(4), Op::Output(17), Op::Settle]
        );
    }
}
