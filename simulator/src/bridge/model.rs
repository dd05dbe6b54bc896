use chrono::{DateTime, Utc};
use seacore::calibration::CalibrationReport;
use seacore::sensor::MeasurementResult;
use serde::Serialize;

use crate::workflow::runner::{TaskOutcome, WorkflowResult};

/// Latest workflow results as served over HTTP.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BridgeModel {
    pub updated: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskOutcome>,
    pub calibrations: Vec<CalibrationReport>,
    pub measurements: Vec<MeasurementResult>,
}

impl From<&WorkflowResult> for BridgeModel {
    fn from(result: &WorkflowResult) -> Self {
        Self {
            updated: Some(Utc::now()),
            tasks: result.outcomes.clone(),
            calibrations: result.calibrations.clone(),
            measurements: result.measurements.clone(),
        }
    }
}
