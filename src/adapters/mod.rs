//! Command channel implementations
//!
//! The driver talks to the instrument through [`CommandChannel`], a blocking
//! text-in/text-out link. This module contains the implementations:
//!
//! - [`VisaChannel`]: real hardware through a VISA runtime (`instrument_visa` feature)
//! - [`SimulatedSmu`]: behavioral model of the instrument for dry runs
//! - [`MockChannel`]: scripted test double with a call log

pub mod mock;
pub mod simulated;
pub mod visa_adapter;

pub use mock::MockChannel;
pub use simulated::SimulatedSmu;
pub use visa_adapter::VisaChannel;

use crate::error::AppResult;

/// Synchronous write/read/query link to an instrument.
///
/// Every call blocks until the underlying transport completes. There is no
/// timeout in this contract; implementations that need bounded latency apply
/// their own.
pub trait CommandChannel {
    /// Send one command. No reply is read.
    fn write(&mut self, command: &str) -> AppResult<()>;

    /// Block until the next reply is available and return it.
    fn read(&mut self) -> AppResult<String>;

    /// Send a command and read its reply.
    fn query(&mut self, command: &str) -> AppResult<String> {
        self.write(command)?;
        self.read()
    }

    /// Connection identifier for metadata (e.g. `GPIB0::3::INSTR`).
    fn resource_name(&self) -> String {
        "unknown".to_string()
    }
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn write(&mut self, command: &str) -> AppResult<()> {
        (**self).write(command)
    }

    fn read(&mut self) -> AppResult<String> {
        (**self).read()
    }

    fn query(&mut self, command: &str) -> AppResult<String> {
        (**self).query(command)
    }

    fn resource_name(&self) -> String {
        (**self).resource_name()
    }
}
