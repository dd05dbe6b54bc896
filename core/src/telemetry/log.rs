use log::{debug, info, warn};
use std::time::Instant;

/// Scoped wrapper over the `log` facade so every line names the component
/// that produced it.
#[derive(Debug, Clone)]
pub struct LogManager {
    scope: String,
}

impl LogManager {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.scope, message);
    }

    pub fn debug(&self, message: &str) {
        debug!("[{}] {}", self.scope, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.scope, message);
    }

    /// Runs `stage` and emits its wall-clock duration at debug level.
    pub fn timed<T>(&self, label: &str, stage: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let output = stage();
        debug!(
            "[{}] {} took {:.3} ms",
            self.scope,
            label,
            start.elapsed().as_secs_f64() * 1e3
        );
        output
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("seacore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_returns_stage_output() {
        let logger = LogManager::new("test");
        assert_eq!(logger.scope(), "test");
        assert_eq!(logger.timed("add", || 2 + 3), 5);
    }
}
