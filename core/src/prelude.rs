use crate::calibration::store::CalibrationStore;
use crate::calibration::CalibrationReport;
use crate::sensor::hardware::{Preselector, SignalAnalyzer};
use crate::sensor::measurement::MeasurementResult;

/// Common error type for every processing step and action.
#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    #[error("insufficient samples: {0}")]
    InsufficientSamples(String),
    #[error("invalid filter specification: {0}")]
    InvalidFilterSpec(String),
    #[error("sample rate mismatch: noise diode on {on} Hz, noise diode off {off} Hz")]
    SampleRateMismatch { on: f64, off: f64 },
    #[error("degenerate Y-factor {0}: noise diode on/off power ratio must be finite and above 1")]
    DegenerateYFactor(f64),
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("calibration store failure: {0}")]
    CalibrationStore(String),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Hardware and shared state an action runs against for one task.
pub struct SensorContext<'a> {
    pub sigan: &'a mut dyn SignalAnalyzer,
    pub preselector: &'a mut dyn Preselector,
    pub calibration: &'a dyn CalibrationStore,
}

/// Result handed back to the scheduler when an action returns normally.
#[derive(Debug, Clone)]
pub enum ActionOutput {
    Measurements(Vec<MeasurementResult>),
    Calibration(Vec<CalibrationReport>),
}

impl ActionOutput {
    /// Human-readable detail line attached to the task result.
    pub fn detail(&self) -> String {
        match self {
            ActionOutput::Measurements(results) => {
                format!("{} measurement(s) completed", results.len())
            }
            ActionOutput::Calibration(reports) => reports
                .iter()
                .map(CalibrationReport::detail)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A schedulable unit of work. Returning an error marks the task as failed and
/// the error's message becomes the task detail.
pub trait Action {
    fn name(&self) -> &str;
    fn summary(&self) -> String;
    fn execute(
        &mut self,
        sensor: &mut SensorContext<'_>,
        task_id: u64,
    ) -> ProcessingResult<ActionOutput>;
}
