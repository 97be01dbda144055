//! VISA command channel for GPIB/USB/Ethernet instruments
//!
//! Wraps the visa-rs crate behind [`CommandChannel`]. VISA I/O is blocking,
//! which matches the driver's synchronous model, so calls go straight through.
//!
//! Supports resource strings like:
//! - "GPIB0::3::INSTR" (GPIB interface)
//! - "USB0::0x05E6::0x2401::SERIAL::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)

use super::CommandChannel;
use crate::error::{AppResult, SmuError};
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::attribute::AttrTmoValue;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// Builder for [`VisaChannel`].
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use smu_daq::adapters::visa_adapter::VisaChannelBuilder;
///
/// let channel = VisaChannelBuilder::new("GPIB0::3::INSTR")
///     .with_timeout(Duration::from_secs(10))
///     .open()?;
/// # Ok::<(), smu_daq::error::SmuError>(())
/// ```
#[derive(Debug, Clone)]
pub struct VisaChannelBuilder {
    resource_name: String,
    timeout: Duration,
    write_terminator: String,
}

impl VisaChannelBuilder {
    /// Start from a VISA resource string.
    pub fn new(resource_name: &str) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            timeout: Duration::from_secs(5),
            write_terminator: "\n".to_string(),
        }
    }

    /// Timeout for opening the resource and for every read and write on it.
    ///
    /// Transfers that exceed it fail with [`SmuError::Io`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Characters appended to every command.
    pub fn with_write_terminator(mut self, terminator: &str) -> Self {
        self.write_terminator = terminator.to_string();
        self
    }

    /// Open the resource.
    ///
    /// # Errors
    /// `Channel` if the VISA runtime cannot open the resource;
    /// `FeatureNotEnabled` when built without `instrument_visa`.
    #[cfg(feature = "instrument_visa")]
    pub fn open(self) -> AppResult<VisaChannel> {
        let rm = DefaultRM::new().map_err(|e| visa_error("create resource manager", e))?;
        let c_string = CString::new(self.resource_name.as_str()).map_err(|e| {
            SmuError::Channel(format!("invalid resource '{}': {e}", self.resource_name))
        })?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let instrument = rm
            .open(&visa_string, AccessMode::NO_LOCK, self.timeout)
            .map_err(|e| visa_error(&format!("open {}", self.resource_name), e))?;

        // the open timeout above does not carry over to transfers
        let tmo = AttrTmoValue::new_checked(transfer_timeout_ms(self.timeout))
            .ok_or_else(|| {
                SmuError::Configuration(format!("unsupported VISA timeout {:?}", self.timeout))
            })?;
        instrument
            .set_attr(tmo)
            .map_err(|e| visa_error("set I/O timeout", e))?;

        debug!(
            resource = %self.resource_name,
            timeout_ms = transfer_timeout_ms(self.timeout),
            "VISA resource opened"
        );

        Ok(VisaChannel {
            resource_name: self.resource_name,
            timeout: self.timeout,
            write_terminator: self.write_terminator,
            _rm: rm,
            instrument,
        })
    }

    #[cfg(not(feature = "instrument_visa"))]
    pub fn open(self) -> AppResult<VisaChannel> {
        Err(SmuError::FeatureNotEnabled("instrument_visa".to_string()))
    }
}

/// Command channel over a VISA session.
#[cfg(feature = "instrument_visa")]
pub struct VisaChannel {
    resource_name: String,
    timeout: Duration,
    write_terminator: String,
    _rm: DefaultRM,
    instrument: Instrument,
}

/// Placeholder when VISA support is not compiled in; cannot be constructed.
#[cfg(not(feature = "instrument_visa"))]
pub struct VisaChannel {
    resource_name: String,
    timeout: Duration,
}

impl VisaChannel {
    /// Builder for a resource string.
    pub fn builder(resource_name: &str) -> VisaChannelBuilder {
        VisaChannelBuilder::new(resource_name)
    }

    /// VISA resource string this channel was opened on.
    pub fn resource(&self) -> &str {
        &self.resource_name
    }

    /// Timeout applied to opening and to every transfer.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// `VI_ATTR_TMO_VALUE` in milliseconds. Saturates below the infinite-wait
/// sentinel so a long timeout never turns into no timeout.
fn transfer_timeout_ms(timeout: Duration) -> u32 {
    const VI_TMO_INFINITE: u32 = 0xFFFF_FFFF;
    u32::try_from(timeout.as_millis())
        .map_or(VI_TMO_INFINITE - 1, |ms| ms.min(VI_TMO_INFINITE - 1))
}

#[cfg(feature = "instrument_visa")]
fn visa_error(action: &str, err: impl std::fmt::Display) -> SmuError {
    SmuError::Channel(format!("VISA failed to {action}: {err}"))
}

#[cfg(feature = "instrument_visa")]
impl CommandChannel for VisaChannel {
    fn write(&mut self, command: &str) -> AppResult<()> {
        let framed = format!("{}{}", command, self.write_terminator);
        (&self.instrument)
            .write_all(framed.as_bytes())?;
        debug!(resource = %self.resource_name, command, "VISA write");
        Ok(())
    }

    fn read(&mut self) -> AppResult<String> {
        let mut line = String::new();
        BufReader::new(&self.instrument)
            .read_line(&mut line)?;
        let reply = line.trim_end_matches(['\r', '\n', '\0']).to_string();
        debug!(resource = %self.resource_name, bytes = reply.len(), "VISA read");
        Ok(reply)
    }

    fn resource_name(&self) -> String {
        self.resource_name.clone()
    }
}

#[cfg(not(feature = "instrument_visa"))]
impl CommandChannel for VisaChannel {
    fn write(&mut self, _command: &str) -> AppResult<()> {
        Err(SmuError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    fn read(&mut self) -> AppResult<String> {
        Err(SmuError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    fn resource_name(&self) -> String {
        self.resource_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = VisaChannelBuilder::new("GPIB0::3::INSTR");
        assert_eq!(builder.resource_name, "GPIB0::3::INSTR");
        assert_eq!(builder.timeout, Duration::from_secs(5));
        assert_eq!(builder.write_terminator, "\n");
    }

    #[test]
    fn test_builder_overrides() {
        let builder = VisaChannel::builder("TCPIP0::192.168.1.100::INSTR")
            .with_timeout(Duration::from_millis(2000))
            .with_write_terminator("\r\n");
        assert_eq!(builder.timeout, Duration::from_millis(2000));
        assert_eq!(builder.write_terminator, "\r\n");
    }

    #[test]
    fn test_transfer_timeout_ms() {
        assert_eq!(transfer_timeout_ms(Duration::from_secs(5)), 5000);
        assert_eq!(transfer_timeout_ms(Duration::from_micros(1500)), 1);
        assert_eq!(transfer_timeout_ms(Duration::from_secs(u64::MAX)), 0xFFFF_FFFE);
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[test]
    fn test_open_without_feature() {
        let result = VisaChannelBuilder::new("GPIB0::3::INSTR").open();
        assert!(matches!(result, Err(SmuError::FeatureNotEnabled(_))));
    }
}
