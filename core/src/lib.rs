//! Signal-processing core for an unattended spectrum-monitoring sensor.
//!
//! Captures of complex baseband samples are reduced to compact data products
//! (power spectra, time-domain power statistics, amplitude probability
//! distributions) and noise-diode captures are reduced to Y-factor gain and
//! noise-figure calibrations. Hardware, scheduling and persistence are reached
//! through the traits in [`sensor::hardware`] and [`calibration::store`].

pub mod actions;
pub mod calibration;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod sensor;
pub mod telemetry;

pub use prelude::{Action, ActionOutput, ProcessingError, ProcessingResult, SensorContext};
