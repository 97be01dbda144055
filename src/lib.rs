//! Driver and measurement runs for a Keithley 2401 source-measure unit.
//!
//! The crate is layered bottom-up:
//!
//! - [`adapters`]: the [`CommandChannel`](adapters::CommandChannel) link to the
//!   instrument (VISA, a scripted mock, a simulated resistive load)
//! - [`measurement`]: readings and the `:READ?` reply parser
//! - [`instrument`]: the [`Keithley2401`](instrument::Keithley2401) driver with
//!   its state machine and safety limits
//! - [`experiment`]: sweep generation and timed measurement runs
//!
//! plus [`config`], [`logging`], [`metadata`] and [`error`] shared by all of
//! them.

pub mod adapters;
pub mod config;
pub mod error;
pub mod experiment;
pub mod instrument;
pub mod logging;
pub mod measurement;
pub mod metadata;
