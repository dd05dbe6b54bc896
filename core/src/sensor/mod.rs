//! Boundary to the sensor hardware: captured samples, analyzer and
//! preselector traits, and the measurement records handed downstream.

pub mod capture;
pub mod hardware;
pub mod measurement;

pub use capture::Capture;
pub use hardware::{AcquisitionRequest, Preselector, RfPath, SiganSettings, SignalAnalyzer};
pub use measurement::{MeasurementPayload, MeasurementResult};
