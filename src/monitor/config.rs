use std::time::Duration;

/// Monitor tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Lower bound applied to every requested poll period.
    pub min_period: Duration,
    /// Delay before the first tick of a new watch. Zero fires immediately.
    pub initial_delay: Duration,
    /// Worker thread name prefix; each worker appends `-<resource id>`.
    pub thread_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_period: Duration::from_millis(250),
            initial_delay: Duration::ZERO,
            thread_name: "vastwatch-monitor".to_string(),
        }
    }
}

impl MonitorConfig {
    /// The period actually used for a requested one.
    #[must_use]
    pub fn effective_period(&self, requested: Duration) -> Duration {
        requested.max(self.min_period)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_min_period(mut self, min_period: Duration) -> Self {
        self.min_period = min_period;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}
