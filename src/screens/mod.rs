//! Screen layouts for the 128×64 status panel.
//!
//! Every screen draws text, separator lines and bitmaps at fixed pixel
//! coordinates onto any monochrome `DrawTarget`, so the same code renders to
//! the SSD1306 buffer on the robot and to a mock display in tests.

use embedded_graphics::{
    mono_font::{ascii::FONT_5X8, ascii::FONT_6X10, MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use profont::{PROFONT_12_POINT, PROFONT_14_POINT};
use qrcode::{Color as QrModule, EcLevel, QrCode};

use crate::battery::{classify, BatteryCondition};
use crate::probe::DisplayState;

pub const DISPLAY_WIDTH: i32 = 128;
pub const DISPLAY_HEIGHT: i32 = 64;

/// Service rows per page of the services screen.
pub const SERVICES_PER_PAGE: usize = 3;

/// One member of the fixed screen rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    WifiInfo,
    QrCode,
    Battery,
    Resources,
    Services(usize),
}

/// Fonts used by the screens. The compact set trades legibility for an
/// extra row of headroom on dense screens.
#[derive(Clone, Copy)]
pub struct FontSet {
    pub small: &'static MonoFont<'static>,
    pub body: &'static MonoFont<'static>,
    pub alert: &'static MonoFont<'static>,
}

impl FontSet {
    pub fn new(compact: bool) -> FontSet {
        if compact {
            FontSet {
                small: &FONT_5X8,
                body: &FONT_6X10,
                alert: &PROFONT_14_POINT,
            }
        } else {
            FontSet {
                small: &FONT_6X10,
                body: &PROFONT_12_POINT,
                alert: &PROFONT_14_POINT,
            }
        }
    }
}

/// Draw one screen of the rotation from the current state snapshot.
pub fn render_screen<D>(
    target: &mut D,
    screen: Screen,
    state: &DisplayState,
    fonts: &FontSet,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    match screen {
        Screen::WifiInfo => draw_wifi_info(target, state, fonts),
        Screen::QrCode => draw_qr_screen(target, state, fonts),
        Screen::Battery => draw_battery(target, state, fonts),
        Screen::Resources => draw_resources(target, state, fonts),
        Screen::Services(page) => draw_services(target, state, page, fonts),
    }
}

fn draw_wifi_info<D>(target: &mut D, state: &DisplayState, fonts: &FontSet) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, &state.hostname, 1, 1, fonts.body)?;
    text(target, &format!("SSID: {}", state.ssid), 1, 17, fonts.body)?;
    text(target, &format!("Uptime: {}", state.uptime), 1, 33, fonts.small)?;
    separator(target, 48, DISPLAY_WIDTH - 1)?;
    text(target, &state.ip, 1, 49, fonts.body)?;
    Ok(())
}

fn draw_battery<D>(target: &mut D, state: &DisplayState, fonts: &FontSet) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "Battery Info", 1, 1, fonts.body)?;

    let volts = state.battery_volts;
    match classify(volts) {
        BatteryCondition::NoTelemetry => {
            text(target, "Voltage: ???", 1, 18, fonts.body)?;
            text(target, "no telemetry received", 1, 36, fonts.small)?;
        }
        BatteryCondition::ReadError => {
            text(target, "Voltage: ???", 1, 18, fonts.body)?;
            text(target, "read error", 1, 36, fonts.small)?;
        }
        BatteryCondition::JumperMissing => {
            text(target, "jumper cap missing", 1, 24, fonts.small)?;
        }
        BatteryCondition::BoardUnpowered => {
            text(target, "control board unpowered", 1, 24, fonts.small)?;
        }
        BatteryCondition::Jumper6v => {
            text(target, &format!("Voltage: {:.2} V", volts), 1, 18, fonts.body)?;
            text(target, "6V jumper selected", 1, 36, fonts.small)?;
        }
        BatteryCondition::LowBattery | BatteryCondition::Normal => {
            text(target, &format!("Voltage: {:.2} V", volts), 1, 24, fonts.body)?;
        }
    }

    separator(target, 48, DISPLAY_WIDTH - 1)?;
    text(target, &state.ip, 1, 49, fonts.body)?;
    Ok(())
}

fn draw_qr_screen<D>(target: &mut D, state: &DisplayState, fonts: &FontSet) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "WebApp QR", 1, 1, fonts.small)?;
    separator(target, 32, 63)?;
    // The address is split after the second dot so both halves fit the
    // 64-pixel column next to the code.
    let (head, tail) = split_ip(&state.ip);
    text(target, head, 1, 33, fonts.body)?;
    text(target, tail, 1, 49, fonts.body)?;

    match QrCode::with_error_correction_level(format!("http://{}", state.ip), EcLevel::L) {
        Ok(code) => draw_qr_code(target, &code, Point::new(64, 0), 64)?,
        Err(_) => text(target, "QR error", 70, 28, fonts.small)?,
    }
    Ok(())
}

fn draw_resources<D>(target: &mut D, state: &DisplayState, fonts: &FontSet) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "Load Average:", 1, 1, fonts.small)?;
    text(target, &state.load_avg, 20, 17, fonts.small)?;
    text(target, &format!("RAM Used: {}", state.mem_used_pct), 1, 33, fonts.small)?;
    separator(target, 48, DISPLAY_WIDTH - 1)?;
    text(target, &state.ip, 1, 49, fonts.body)?;
    Ok(())
}

fn draw_services<D>(
    target: &mut D,
    state: &DisplayState,
    page: usize,
    fonts: &FontSet,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let start = page * SERVICES_PER_PAGE;
    for (row, entry) in state
        .services
        .iter()
        .skip(start)
        .take(SERVICES_PER_PAGE)
        .enumerate()
    {
        text(target, &entry.label(), 1, 1 + 16 * row as i32, fonts.small)?;
    }
    separator(target, 48, DISPLAY_WIDTH - 1)?;
    text(target, &state.ip, 1, 49, fonts.body)?;
    Ok(())
}

/// Full-screen low battery alert. Rendered alternately inverted and normal
/// to produce the flash effect.
pub fn draw_low_battery<D>(
    target: &mut D,
    volts: f32,
    inverted: bool,
    fonts: &FontSet,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let (background, foreground) = if inverted {
        (BinaryColor::On, BinaryColor::Off)
    } else {
        (BinaryColor::Off, BinaryColor::On)
    };

    Rectangle::new(
        Point::zero(),
        Size::new(DISPLAY_WIDTH as u32, DISPLAY_HEIGHT as u32),
    )
    .into_styled(PrimitiveStyle::with_fill(background))
    .draw(target)?;

    let message = "LOW BATTERY";
    let x = centered_x(message, fonts.alert);
    colored_text(target, message, x, 14, fonts.alert, foreground)?;

    let volts = format!("{:.2} V", volts);
    let x = centered_x(&volts, fonts.body);
    colored_text(target, &volts, x, 40, fonts.body, foreground)?;
    Ok(())
}

fn centered_x(s: &str, font: &MonoFont<'_>) -> i32 {
    let width = (s.len() as u32 * font.character_size.width) as i32;
    ((DISPLAY_WIDTH - width) / 2).max(0)
}

/// Split an IPv4 string just after its second dot, e.g.
/// `192.168.1.42` → (`192.168.`, `1.42`).
pub fn split_ip(ip: &str) -> (&str, &str) {
    let mut dots = ip
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .map(|(i, _)| i);
    match (dots.next(), dots.next()) {
        (_, Some(second)) => ip.split_at(second + 1),
        _ => (ip, ""),
    }
}

fn draw_qr_code<D>(
    target: &mut D,
    code: &QrCode,
    origin: Point,
    size: u32,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    const QUIET_MODULES: u32 = 2;

    // Light background square first so the dark modules have contrast on an
    // otherwise black panel.
    Rectangle::new(origin, Size::new(size, size))
        .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
        .draw(target)?;

    let width = code.width() as u32;
    let total = width + 2 * QUIET_MODULES;
    let scale = (size / total).max(1);
    let rendered = (scale * total) as i32;
    let offset = origin + Point::new((size as i32 - rendered).max(0) / 2, (size as i32 - rendered).max(0) / 2);

    let modules = code.to_colors();
    for y in 0..width {
        for x in 0..width {
            if modules[(y * width + x) as usize] == QrModule::Dark {
                let top_left = offset
                    + Point::new(
                        ((QUIET_MODULES + x) * scale) as i32,
                        ((QUIET_MODULES + y) * scale) as i32,
                    );
                Rectangle::new(top_left, Size::new(scale, scale))
                    .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
                    .draw(target)?;
            }
        }
    }
    Ok(())
}

fn text<D>(target: &mut D, s: &str, x: i32, y: i32, font: &MonoFont<'static>) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    colored_text(target, s, x, y, font, BinaryColor::On)
}

fn colored_text<D>(
    target: &mut D,
    s: &str,
    x: i32,
    y: i32,
    font: &MonoFont<'static>,
    color: BinaryColor,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    Text::with_baseline(s, Point::new(x, y), MonoTextStyle::new(font, color), Baseline::Top)
        .draw(target)?;
    Ok(())
}

fn separator<D>(target: &mut D, y: i32, x_end: i32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    Line::new(Point::new(0, y), Point::new(x_end, y))
        .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::NO_TELEMETRY;
    use crate::services::{ServiceEntry, ServiceState};
    use embedded_graphics::mock_display::MockDisplay;

    fn mock() -> MockDisplay<BinaryColor> {
        let mut display = MockDisplay::new();
        // Screens are 128 px wide and freely overprint the separator line;
        // the 64×64 mock only checks that drawing does not error.
        display.set_allow_overdraw(true);
        display.set_allow_out_of_bounds_drawing(true);
        display
    }

    fn state() -> DisplayState {
        DisplayState {
            hostname: "mbot-example".to_string(),
            uptime: "1h22m".to_string(),
            ssid: "CampusNet".to_string(),
            ip: "192.168.1.42".to_string(),
            mem_used_pct: "41.27%".to_string(),
            load_avg: "0.52, 0.41, 0.30".to_string(),
            battery_volts: 11.2,
            services: vec![
                ServiceEntry {
                    short_name: "webapp",
                    state: ServiceState::Active,
                    detail: "running".to_string(),
                },
                ServiceEntry {
                    short_name: "slam",
                    state: ServiceState::NotFound,
                    detail: String::new(),
                },
            ],
        }
    }

    #[test]
    fn splits_ip_after_second_dot() {
        assert_eq!(split_ip("192.168.1.42"), ("192.168.", "1.42"));
        assert_eq!(split_ip("10.0.0.1"), ("10.0.", "0.1"));
        // Placeholders without two dots stay on one row.
        assert_eq!(split_ip("IP Not Found"), ("IP Not Found", ""));
        assert_eq!(split_ip(""), ("", ""));
    }

    #[test]
    fn renders_every_screen() {
        let state = state();
        let fonts = FontSet::new(false);
        for screen in [
            Screen::WifiInfo,
            Screen::QrCode,
            Screen::Battery,
            Screen::Resources,
            Screen::Services(0),
            Screen::Services(1),
        ] {
            let mut display = mock();
            render_screen(&mut display, screen, &state, &fonts).unwrap();
        }
    }

    #[test]
    fn renders_battery_placeholders() {
        let fonts = FontSet::new(false);
        let mut state = state();
        for volts in [NO_TELEMETRY, -2.0, 1.0, 4.2, 6.5, 8.2] {
            state.battery_volts = volts;
            let mut display = mock();
            render_screen(&mut display, Screen::Battery, &state, &fonts).unwrap();
        }
    }

    #[test]
    fn renders_low_battery_flash_frames() {
        let fonts = FontSet::new(true);
        for inverted in [false, true] {
            let mut display = mock();
            draw_low_battery(&mut display, 8.2, inverted, &fonts).unwrap();
        }
    }
}
