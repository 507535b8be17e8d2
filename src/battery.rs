//! Battery voltage classification.
//!
//! The control board reports the battery rail through an ADC. Depending on
//! how the robot is wired up, the reading lands in one of a few telltale
//! ranges that mean something is physically wrong (jumper cap missing, board
//! unpowered, 6V jumper selected) rather than a real pack voltage.

/// Sentinel voltage: no telemetry message received within the timeout.
pub const NO_TELEMETRY: f32 = -1.0;
/// Sentinel voltage: the last telemetry message could not be decoded.
pub const READ_ERROR: f32 = -2.0;

/// Flashing-alert band. A reading strictly inside `(7, 9)` volts means the
/// pack is running low and the display should flash until it recovers.
pub const LOW_BATTERY_MIN: f32 = 7.0;
pub const LOW_BATTERY_MAX: f32 = 9.0;

/// How a voltage reading should be presented on the battery screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryCondition {
    NoTelemetry,
    ReadError,
    /// `0 < v <= 1.5`: the ADC jumper cap is missing.
    JumperMissing,
    /// `3.5 < v <= 5.5`: only USB power, the control board is unpowered.
    BoardUnpowered,
    /// `6 < v < 7`: the 6V supply jumper is selected.
    Jumper6v,
    /// `7 < v < 9`: pack is low, flash the alert screen.
    LowBattery,
    Normal,
}

/// Classify a voltage reading. Total over all f32 inputs: anything outside
/// the special ranges falls through to `Normal`.
///
/// The boundary value 7 belongs to neither the 6V-jumper band nor the
/// low-battery band; both comparisons are strict on that side.
pub fn classify(volts: f32) -> BatteryCondition {
    if volts == NO_TELEMETRY {
        BatteryCondition::NoTelemetry
    } else if volts == READ_ERROR {
        BatteryCondition::ReadError
    } else if volts > 0.0 && volts <= 1.5 {
        BatteryCondition::JumperMissing
    } else if volts > 3.5 && volts <= 5.5 {
        BatteryCondition::BoardUnpowered
    } else if volts > 6.0 && volts < LOW_BATTERY_MIN {
        BatteryCondition::Jumper6v
    } else if volts > LOW_BATTERY_MIN && volts < LOW_BATTERY_MAX {
        BatteryCondition::LowBattery
    } else {
        BatteryCondition::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        assert_eq!(classify(NO_TELEMETRY), BatteryCondition::NoTelemetry);
        assert_eq!(classify(READ_ERROR), BatteryCondition::ReadError);
    }

    #[test]
    fn jumper_missing_band() {
        assert_eq!(classify(0.1), BatteryCondition::JumperMissing);
        assert_eq!(classify(1.5), BatteryCondition::JumperMissing);
        // 0 itself is not "greater than 0"
        assert_eq!(classify(0.0), BatteryCondition::Normal);
        assert_eq!(classify(1.6), BatteryCondition::Normal);
    }

    #[test]
    fn board_unpowered_band() {
        assert_eq!(classify(3.5), BatteryCondition::Normal);
        assert_eq!(classify(3.6), BatteryCondition::BoardUnpowered);
        assert_eq!(classify(5.5), BatteryCondition::BoardUnpowered);
        assert_eq!(classify(5.6), BatteryCondition::Normal);
    }

    #[test]
    fn jumper_6v_band() {
        assert_eq!(classify(6.0), BatteryCondition::Normal);
        assert_eq!(classify(6.5), BatteryCondition::Jumper6v);
        assert_eq!(classify(6.99), BatteryCondition::Jumper6v);
    }

    #[test]
    fn seven_volts_is_in_neither_band() {
        // Both neighbouring bands exclude the boundary itself.
        assert_eq!(classify(7.0), BatteryCondition::Normal);
    }

    #[test]
    fn low_battery_band() {
        assert_eq!(classify(7.01), BatteryCondition::LowBattery);
        assert_eq!(classify(8.2), BatteryCondition::LowBattery);
        assert_eq!(classify(8.99), BatteryCondition::LowBattery);
        assert_eq!(classify(9.0), BatteryCondition::Normal);
    }

    #[test]
    fn healthy_pack_is_normal() {
        assert_eq!(classify(11.1), BatteryCondition::Normal);
        assert_eq!(classify(12.6), BatteryCondition::Normal);
    }
}
