//! Source-measure unit driver.
//!
//! - `state`: function/mode types, [`SourceSettings`] and the driver-side
//!   [`InstrumentState`]
//! - `validation`: local safety checks run before any command is written
//! - `keithley_2401`: the [`Keithley2401`] driver itself

pub mod keithley_2401;
pub mod state;
pub mod validation;

pub use keithley_2401::{Keithley2401, MODEL_NUMBER};
pub use state::{
    ActiveConfiguration, DriveMode, InstrumentState, SourceFunction, SourceSettings,
    CURRENT_HARD_MAX,
};
