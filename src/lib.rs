pub mod battery;
pub mod config;
pub mod display;
pub mod gpio;
pub mod logging;
pub mod net;
pub mod probe;
pub mod screens;
pub mod services;
pub mod telemetry;

pub mod prelude {
    pub use crate::{battery::*, config::*, display::*, screens::*, telemetry::*};
}
